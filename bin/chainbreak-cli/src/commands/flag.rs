// SPDX-License-Identifier: MIT
use anyhow::{bail, Result};
use clap::Args;

use crate::commands::print_json;
use crate::config::{flag_client, resolve_host, ConnectionArgs};

#[derive(Args, Debug)]
pub struct FlagArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn run(args: FlagArgs, json_output: bool) -> Result<()> {
    let host = resolve_host(&args.connection)?;
    let Some(client) = flag_client(&args.connection, host.as_ref())? else {
        bail!(
            "No challenge host provided. Use --base-url, --flag-url, CHAINBREAK_BASE_URL, \
             or ~/.chainbreak/config.toml"
        );
    };

    let flag = client.flag().await?;
    if json_output {
        return print_json(&serde_json::json!({ "flag": flag }));
    }
    println!("{flag}");
    Ok(())
}
