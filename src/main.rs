// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use pkgplan::TransactionRequest;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { db_path } => commands::cmd_init(&db_path),
        Commands::Plan {
            install,
            remove,
            reinstall,
            purge,
            remove_depends,
            options,
        } => {
            let request = TransactionRequest::new()
                .install(install)
                .remove(remove)
                .reinstall(reinstall)
                .purge(purge)
                .remove_depends(remove_depends);
            commands::cmd_plan(request, &options)
        }
        Commands::DistUpgrade { options } => commands::cmd_dist_upgrade(&options),
        Commands::Autoremove { options } => commands::cmd_autoremove(&options),
    }
}
