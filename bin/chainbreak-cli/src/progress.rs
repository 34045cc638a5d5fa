// SPDX-License-Identifier: MIT
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Spinner for a step that waits on the chain or on solc. Hidden in JSON
/// mode so stdout stays machine-readable.
pub fn spinner(msg: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        style("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn finish(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("✓ {msg}"));
    pb.finish_with_message(msg.to_string());
}

pub fn fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("✗ {msg}"));
    pb.finish_with_message(msg.to_string());
}

/// Mark the spinner failed if `result` is an error, then pass it through.
pub fn fail_on_err<T>(pb: &ProgressBar, result: anyhow::Result<T>, msg: &str) -> anyhow::Result<T> {
    if result.is_err() {
        fail(pb, msg);
    }
    result
}
