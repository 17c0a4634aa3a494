// src/db/migrations.rs
//! Database migration implementations

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Initial schema - Version 1
///
/// - packages: one row per package name, with its installed version
/// - versions: every known version of a package
/// - provides / depends: per-version relationship edges
/// - marks: committed planner marks waiting for execution
pub fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            essential INTEGER NOT NULL DEFAULT 0,
            auto_installed INTEGER NOT NULL DEFAULT 0,
            installed_version TEXT
        );

        CREATE TABLE versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id INTEGER NOT NULL,
            version TEXT NOT NULL,
            size INTEGER NOT NULL DEFAULT 0,
            installed_size INTEGER NOT NULL DEFAULT 0,
            downloadable INTEGER NOT NULL DEFAULT 1,
            origin TEXT,
            UNIQUE(package_id, version),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_versions_package_id ON versions(package_id);

        CREATE TABLE provides (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            provided_version TEXT,
            FOREIGN KEY (version_id) REFERENCES versions(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_provides_version_id ON provides(version_id);
        CREATE INDEX idx_provides_name ON provides(name);

        -- Alternatives of one OR group are consecutive rows; all but the
        -- last have or_next set
        CREATE TABLE depends (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version_id INTEGER NOT NULL,
            dep_type TEXT NOT NULL CHECK(dep_type IN (
                'depends', 'predepends', 'recommends', 'suggests', 'enhances',
                'conflicts', 'breaks', 'obsoletes', 'replaces'
            )),
            target TEXT NOT NULL,
            op TEXT,
            constraint_version TEXT,
            or_next INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (version_id) REFERENCES versions(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_depends_version_id ON depends(version_id);
        CREATE INDEX idx_depends_target ON depends(target);

        CREATE TABLE marks (
            package_id INTEGER PRIMARY KEY,
            mark TEXT NOT NULL CHECK(mark IN ('keep', 'install', 'delete', 'purge')),
            reinstall INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}
