// src/commands.rs
//! Command handlers for the pkgplan binary

use crate::cli::PlanOptions;
use anyhow::{Context, Result};
use pkgplan::{MemoryCache, Planner, PlannerConfig, TransactionRequest, TransactionResult};
use rusqlite::Connection;
use tracing::info;

/// Format size as human-readable
fn format_size(size: i64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    let abs = size.unsigned_abs();
    if abs >= GB {
        format!("{:.1} GB", abs as f64 / GB as f64)
    } else if abs >= MB {
        format!("{:.1} MB", abs as f64 / MB as f64)
    } else if abs >= KB {
        format!("{:.1} KB", abs as f64 / KB as f64)
    } else {
        format!("{} bytes", abs)
    }
}

fn print_list(title: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }
    println!("{}:", title);
    println!("  {}", names.join(" "));
}

fn print_result(result: &TransactionResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    print_list("The following additional packages will be installed", &result.extra_installed);
    print_list("The following packages will be REMOVED", &result.removed);
    print_list("The following NEW packages will be installed", &result.new_installed);
    print_list("The following packages will be upgraded", &result.upgraded);
    print_list("The following packages will be DOWNGRADED", &result.downgraded);
    println!(
        "{} upgraded, {} newly installed, {} downgraded, {} to remove.",
        result.upgraded_count(),
        result.new_installed_count(),
        result.downgraded_count(),
        result.removed_count()
    );
    if result.download_size > 0 {
        println!(
            "Need to get {} of archives.",
            format_size(i64::try_from(result.download_size).unwrap_or(i64::MAX))
        );
    }
    if result.install_size > 0 {
        println!(
            "After this operation, {} of additional disk space will be used.",
            format_size(result.install_size)
        );
    } else if result.install_size < 0 {
        println!(
            "After this operation, {} disk space will be freed.",
            format_size(result.install_size)
        );
    }
    Ok(())
}

fn load(options: &PlanOptions) -> Result<(Connection, MemoryCache, PlannerConfig)> {
    let config = PlannerConfig::load(options.config.as_deref())
        .context("Failed to load planner configuration")?;
    let conn = pkgplan::db::open(&options.db_path)
        .with_context(|| format!("Failed to open database {}", options.db_path))?;
    let cache = pkgplan::db::load_cache(&conn).context("Failed to load package database")?;
    Ok((conn, cache, config))
}

/// Persist marks of an applied plan, then print it
fn finish(
    mut conn: Connection,
    cache: &MemoryCache,
    result: &TransactionResult,
    options: &PlanOptions,
) -> Result<()> {
    if options.apply {
        let saved = pkgplan::db::transaction(&mut conn, |tx| pkgplan::db::save_marks(tx, cache))
            .context("Failed to save marks")?;
        info!("Committed {} mark(s) to {}", saved, options.db_path);
    }
    print_result(result, options.json)
}

/// Create the database
pub fn cmd_init(db_path: &str) -> Result<()> {
    pkgplan::db::init(db_path)
        .with_context(|| format!("Failed to initialize database at {}", db_path))?;
    println!("Database initialized successfully at: {}", db_path);
    Ok(())
}

/// Plan a transaction request
pub fn cmd_plan(request: TransactionRequest, options: &PlanOptions) -> Result<()> {
    let (conn, mut cache, config) = load(options)?;
    let result = Planner::with_config(&mut cache, &config).plan(&request, options.apply)?;
    finish(conn, &cache, &result, options)
}

/// Plan a dist-upgrade
pub fn cmd_dist_upgrade(options: &PlanOptions) -> Result<()> {
    let (conn, mut cache, config) = load(options)?;
    let result = Planner::with_config(&mut cache, &config).plan_dist_upgrade(options.apply)?;
    finish(conn, &cache, &result, options)
}

/// Plan an autoremove
pub fn cmd_autoremove(options: &PlanOptions) -> Result<()> {
    let (conn, mut cache, config) = load(options)?;
    let result = Planner::with_config(&mut cache, &config).plan_autoremove(options.apply)?;
    finish(conn, &cache, &result, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(-3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_size(i64::MIN), "8589934592.0 GB");
    }
}
