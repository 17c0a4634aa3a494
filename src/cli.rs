// src/cli.rs
//! CLI definitions for pkgplan
//!
//! Command implementations live in the `commands` module.

use clap::{Args, Parser, Subcommand};
use pkgplan::db::DEFAULT_DB_PATH;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pkgplan")]
#[command(version)]
#[command(about = "Plan package transactions against a package database", long_about = None)]
pub struct Cli {
    /// Log planner decisions (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every planning command
#[derive(Args, Debug, Clone)]
pub struct PlanOptions {
    /// Keep the resulting marks in the database instead of only simulating
    #[arg(long)]
    pub apply: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to the database file
    #[arg(short, long, default_value = DEFAULT_DB_PATH)]
    pub db_path: String,

    /// Planner configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the package database
    Init {
        /// Path to the database file
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Plan installs, removals and reinstalls
    Plan {
        /// Packages to install (name, name>=version, or a package file)
        #[arg(long, num_args = 1..)]
        install: Vec<String>,

        /// Packages to remove
        #[arg(long, num_args = 1..)]
        remove: Vec<String>,

        /// Installed packages to reinstall
        #[arg(long, num_args = 1..)]
        reinstall: Vec<String>,

        /// Remove configuration files too
        #[arg(long)]
        purge: bool,

        /// Also remove packages that depend on removed ones
        #[arg(long)]
        remove_depends: bool,

        #[command(flatten)]
        options: PlanOptions,
    },

    /// Plan upgrading every installed package
    DistUpgrade {
        #[command(flatten)]
        options: PlanOptions,
    },

    /// Plan removing automatically installed packages nothing needs
    Autoremove {
        #[command(flatten)]
        options: PlanOptions,
    },
}
