// src/db/mod.rs

//! SQLite persistence for the package database
//!
//! The planner works on a [`MemoryCache`]; this module fills one from the
//! database file and writes committed marks back.

pub mod migrations;
pub mod schema;

pub use schema::{SCHEMA_VERSION, get_schema_version, migrate};

use crate::cache::{
    Dependency, DepType, Mark, MemoryCache, PackageDatabase, PackageId, Provide, VersionSpec,
};
use crate::error::{Error, Result};
use crate::version::{CompareOp, Constraint};
use rusqlite::{Connection, Transaction, params};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Default database location
pub const DEFAULT_DB_PATH: &str = "/var/lib/pkgplan/pkgplan.db";

/// Create the database file and bring its schema up to date
pub fn init(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("Journal mode: {}", mode);
    migrate(&conn)?;
    info!("Initialized package database at {}", db_path);
    Ok(())
}

/// Open an existing database
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Database not found at {}, run 'pkgplan init' first", db_path),
        )));
    }
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    migrate(&conn)?;
    Ok(conn)
}

/// Run `f` inside a transaction, committing only if it succeeds
pub fn transaction<F, T>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}

/// Insert a package row and return its id
pub fn insert_package(conn: &Connection, name: &str, essential: bool) -> Result<i64> {
    conn.execute(
        "INSERT INTO packages (name, essential) VALUES (?1, ?2)",
        params![name, essential],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record which version of a package is installed
pub fn set_installed(
    conn: &Connection,
    package_id: i64,
    version: Option<&str>,
    auto_installed: bool,
) -> Result<()> {
    conn.execute(
        "UPDATE packages SET installed_version = ?2, auto_installed = ?3 WHERE id = ?1",
        params![package_id, version, auto_installed],
    )?;
    Ok(())
}

/// Insert a version with its provides and dependency edges
pub fn insert_version(conn: &Connection, package_id: i64, spec: &VersionSpec) -> Result<i64> {
    conn.execute(
        "INSERT INTO versions (package_id, version, size, installed_size, downloadable, origin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            package_id,
            &spec.version,
            spec.size as i64,
            spec.installed_size as i64,
            spec.downloadable,
            &spec.origin,
        ],
    )?;
    let version_id = conn.last_insert_rowid();

    for provide in &spec.provides {
        conn.execute(
            "INSERT INTO provides (version_id, name, provided_version) VALUES (?1, ?2, ?3)",
            params![version_id, &provide.name, &provide.version],
        )?;
    }
    for dep in &spec.depends {
        conn.execute(
            "INSERT INTO depends (version_id, dep_type, target, op, constraint_version, or_next)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                version_id,
                dep.dep_type.as_str(),
                &dep.target,
                dep.constraint.as_ref().map(|c| c.op.as_str()),
                dep.constraint.as_ref().map(|c| c.version.as_str()),
                dep.or_next,
            ],
        )?;
    }
    Ok(version_id)
}

struct PackageRow {
    id: i64,
    name: String,
    essential: bool,
    auto_installed: bool,
    installed_version: Option<String>,
}

struct VersionRow {
    id: i64,
    package_id: i64,
    spec: VersionSpec,
}

struct DependRow {
    dep_type: String,
    target: String,
    op: Option<String>,
    version: Option<String>,
    or_next: bool,
}

impl DependRow {
    fn into_dependency(self) -> Result<Dependency> {
        let dep_type: DepType = self.dep_type.parse().map_err(Error::Unknown)?;
        let mut dep = Dependency::new(dep_type, self.target);
        if let (Some(op), Some(version)) = (self.op, self.version) {
            let op: CompareOp = op.parse().map_err(Error::Unknown)?;
            dep.constraint = Some(Constraint::new(op, version));
        }
        dep.or_next = self.or_next;
        Ok(dep)
    }
}

fn mark_from_str(s: &str) -> Result<Mark> {
    match s {
        "keep" => Ok(Mark::Keep),
        "install" => Ok(Mark::Install),
        "delete" => Ok(Mark::Delete { purge: false }),
        "purge" => Ok(Mark::Delete { purge: true }),
        other => Err(Error::Unknown(format!("Invalid mark in database: {}", other))),
    }
}

fn mark_as_str(mark: Mark) -> &'static str {
    match mark {
        Mark::Keep => "keep",
        Mark::Install => "install",
        Mark::Delete { purge: false } => "delete",
        Mark::Delete { purge: true } => "purge",
    }
}

fn load_versions(conn: &Connection) -> Result<Vec<VersionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, package_id, version, size, installed_size, downloadable, origin
         FROM versions ORDER BY id",
    )?;
    let mut versions = stmt
        .query_map([], |row| {
            let mut spec = VersionSpec::new(row.get::<_, String>(2)?)
                .sizes(row.get::<_, i64>(3)?.max(0) as u64, row.get::<_, i64>(4)?.max(0) as u64)
                .downloadable(row.get(5)?);
            spec.origin = row.get(6)?;
            Ok(VersionRow {
                id: row.get(0)?,
                package_id: row.get(1)?,
                spec,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut provides_stmt = conn.prepare(
        "SELECT name, provided_version FROM provides WHERE version_id = ?1 ORDER BY id",
    )?;
    let mut depends_stmt = conn.prepare(
        "SELECT dep_type, target, op, constraint_version, or_next
         FROM depends WHERE version_id = ?1 ORDER BY id",
    )?;

    for row in &mut versions {
        let provides = provides_stmt
            .query_map([row.id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        row.spec
            .provides
            .extend(provides.into_iter().map(|(name, version)| Provide { name, version }));

        let depends = depends_stmt
            .query_map([row.id], |r| {
                Ok(DependRow {
                    dep_type: r.get(0)?,
                    target: r.get(1)?,
                    op: r.get(2)?,
                    version: r.get(3)?,
                    or_next: r.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for dep in depends {
            row.spec.depends.push(dep.into_dependency()?);
        }
    }
    Ok(versions)
}

/// Build a [`MemoryCache`] from the database
///
/// Marks saved by an applied plan are restored, so a new plan starts from
/// the pending transaction.
pub fn load_cache(conn: &Connection) -> Result<MemoryCache> {
    let mut cache = MemoryCache::new();
    let mut ids: HashMap<i64, PackageId> = HashMap::new();
    let mut installed: HashMap<i64, String> = HashMap::new();

    let mut stmt = conn.prepare(
        "SELECT id, name, essential, auto_installed, installed_version FROM packages ORDER BY id",
    )?;
    let packages = stmt
        .query_map([], |row| {
            Ok(PackageRow {
                id: row.get(0)?,
                name: row.get(1)?,
                essential: row.get(2)?,
                auto_installed: row.get(3)?,
                installed_version: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for row in packages {
        let pkg = cache.add_package(&row.name);
        cache.set_essential(pkg, row.essential);
        cache.set_auto_installed(pkg, row.auto_installed);
        if let Some(version) = row.installed_version {
            installed.insert(row.id, version);
        }
        ids.insert(row.id, pkg);
    }

    for row in load_versions(conn)? {
        let Some(&pkg) = ids.get(&row.package_id) else {
            continue;
        };
        let is_current = installed.get(&row.package_id) == Some(&row.spec.version);
        let ver = cache.add_version(pkg, row.spec);
        if is_current {
            cache.set_installed(pkg, Some(ver));
        }
    }

    let mut stmt = conn.prepare("SELECT package_id, mark, reinstall FROM marks")?;
    let marks = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (package_id, mark, reinstall) in marks {
        let Some(&pkg) = ids.get(&package_id) else {
            continue;
        };
        cache.set_mark(pkg, mark_from_str(&mark)?);
        cache.set_reinstall(pkg, reinstall);
    }

    debug!("Loaded {} package entries", cache.len());
    Ok(cache)
}

/// Replace the stored marks with the cache's current ones
///
/// Packages that only exist in memory (imported package files, virtual
/// names) have no row to attach a mark to and are skipped. Returns the
/// number of marks written.
pub fn save_marks(conn: &Connection, cache: &MemoryCache) -> Result<usize> {
    conn.execute("DELETE FROM marks", [])?;

    let mut saved = 0;
    for pkg in cache.package_ids() {
        let state = cache.state(pkg);
        if state.mark == Mark::Keep && !state.reinstall {
            continue;
        }
        let name = cache.package_name(pkg);
        saved += conn.execute(
            "INSERT INTO marks (package_id, mark, reinstall)
             SELECT id, ?2, ?3 FROM packages WHERE name = ?1",
            params![name, mark_as_str(state.mark), state.reinstall],
        )?;
        conn.execute(
            "UPDATE packages SET auto_installed = ?2 WHERE name = ?1",
            params![name, state.auto_installed],
        )?;
    }

    info!("Saved {} pending mark(s)", saved);
    Ok(saved)
}
