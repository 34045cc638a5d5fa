// SPDX-License-Identifier: MIT
mod commands;
mod config;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "chainbreak",
    version,
    about = "Replay on-chain pseudo-randomness and solve smart-contract CTF instances"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output results as JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Magic Vault: replay the block-derived password.
    Vault(commands::vault::VaultArgs),

    /// Token To Wonderland: underflow the token balance and buy the key.
    Wonderland(commands::wonderland::WonderlandArgs),

    /// Survival of the Fittest: one strong attack, then loot.
    Survival(commands::survival::SurvivalArgs),

    /// Distract and Destroy: attack through a contract after EOA aggro.
    Distract(commands::distract::DistractArgs),

    /// Evaluate a replication formula offline.
    Replicate(commands::replicate::ReplicateArgs),

    /// Fetch the flag from the challenge host.
    Flag(commands::flag::FlagArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Replicate(_)) {
        tracing::warn!("chainbreak sends real transactions. Authorized CTF instances only.");
    }

    match cli.command {
        Commands::Vault(args) => commands::vault::run(args, cli.json).await,
        Commands::Wonderland(args) => commands::wonderland::run(args, cli.json).await,
        Commands::Survival(args) => commands::survival::run(args, cli.json).await,
        Commands::Distract(args) => commands::distract::run(args, cli.json).await,
        Commands::Replicate(args) => commands::replicate::run(args, cli.json).await,
        Commands::Flag(args) => commands::flag::run(args, cli.json).await,
    }
}
