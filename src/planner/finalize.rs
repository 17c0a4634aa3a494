// src/planner/finalize.rs

//! Final dependency resolution
//!
//! Protects what the caller asked for, lets the solver settle everything
//! else, and turns whatever stays broken into a diagnostic.

use super::PlanContext;
use crate::cache::{AutoMark, PackageDatabase};
use crate::error::{Error, Result};
use crate::solver::DependencySolver;
use tracing::{debug, warn};

pub(super) fn finalize<D, S>(
    db: &mut D,
    solver: &mut S,
    ctx: &PlanContext,
    remove_depends: bool,
) -> Result<()>
where
    D: PackageDatabase,
    S: DependencySolver,
{
    debug!(
        "Finalizing: {} install, {} remove, {} reinstall requested",
        ctx.requested_install.len(),
        ctx.remove_targets.len(),
        ctx.requested_reinstall.len()
    );

    solver.begin(&*db);
    if remove_depends {
        solver.enable_remove_depends();
    }

    for name in &ctx.requested_install {
        let Some(pkg) = db.find_package(name) else {
            continue;
        };
        if !db.will_install(pkg) {
            continue;
        }
        solver.clear(pkg);
        solver.protect(pkg);
    }

    for (_, pkg) in &ctx.remove_targets {
        if !db.is_delete(*pkg) {
            continue;
        }
        solver.clear(*pkg);
        solver.protect(*pkg);
        solver.remove(*pkg);
    }

    solver.install_protect(db);
    if !solver.resolve(db, true) {
        // Tolerated: the broken-package scan below decides
        let discarded = db.take_errors();
        warn!("Solver could not fix everything: {}", discarded.join("; "));
    }

    // The solver may have dropped a requested install while fixing others
    for name in &ctx.requested_install {
        let Some(pkg) = db.find_package(name) else {
            continue;
        };
        if !db.will_install(pkg) && db.current(pkg).is_none() {
            debug!("Re-marking {} after resolution", name);
            db.mark_install(pkg, AutoMark::Manual, false);
        }
    }

    if db.broken_count() != 0 {
        return Err(broken_diagnostic(&*db));
    }

    let pending = db.take_errors();
    if !pending.is_empty() {
        return Err(Error::broken(pending.join("; ")));
    }
    Ok(())
}

/// Describe every broken package and the first dependency it is missing
pub(super) fn broken_diagnostic<D: PackageDatabase>(db: &D) -> Error {
    let mut entries = Vec::new();
    let mut first = None;

    for pkg in db.package_ids() {
        if !db.is_inst_broken(pkg) && !db.is_now_broken(pkg) {
            continue;
        }
        let name = db.package_name(pkg).to_string();
        let unmet = db.first_unmet_dependency(pkg).map(|d| d.to_string());
        let entry = match &unmet {
            Some(dep) => format!("{} (depends: {})", name, dep),
            None => name.clone(),
        };
        entries.push(entry);
        if first.is_none() {
            first = Some((name, unmet));
        }
    }

    match first {
        Some((package, dependency)) => Error::DependencyBroken {
            package: Some(package),
            dependency,
            detail: format!("Broken: {}", entries.join("; ")),
        },
        None => Error::broken("This may mean that you have requested an impossible situation"),
    }
}
