// src/planner/mark.rs

//! Install, reinstall and remove marking

use super::PlanContext;
use super::provider::{resolve_install_target, resolve_remove_target};
use crate::cache::{AutoMark, PackageDatabase, PackageId};
use crate::error::{Error, Result};
use crate::import::FileImporter;
use crate::requirement::Requirement;
use crate::solver::DependencySolver;
use tracing::debug;

/// Resolve and mark every install requirement, in request order
pub(super) fn mark_installs<D, S>(
    db: &mut D,
    solver: &mut S,
    requirements: &[Requirement],
    install_virtual: bool,
    ctx: &mut PlanContext,
) -> Result<()>
where
    D: PackageDatabase,
    S: DependencySolver,
{
    for req in requirements {
        let pkg = resolve_install_target(&*db, solver, req, install_virtual)?;
        ctx.requested_install
            .insert(db.package_name(pkg).to_string());

        db.mark_install(pkg, AutoMark::Manual, false);
        if db.is_inst_broken(pkg) {
            debug!("{} is broken after marking, completing dependencies", db.package_name(pkg));
            db.mark_install(pkg, AutoMark::DontChange, true);
        }
    }
    Ok(())
}

/// First package with a version read from the given file
fn find_by_origin<D: PackageDatabase>(db: &D, path: &str) -> Option<PackageId> {
    db.package_ids().find(|&pkg| {
        db.package(pkg).versions.iter().any(|&ver| {
            db.version(ver)
                .origin
                .as_deref()
                .is_some_and(|origin| !origin.is_empty() && path.contains(origin))
        })
    })
}

/// Resolve and flag reinstall requirements
///
/// A package-file argument is matched against version origins; anything else
/// resolves like an install. Either way the package must be installed, and a
/// by-name reinstall needs a downloadable installed version.
pub(super) fn mark_reinstalls<D, S, I>(
    db: &mut D,
    solver: &mut S,
    importer: &I,
    requirements: &[Requirement],
    install_virtual: bool,
    ctx: &mut PlanContext,
) -> Result<()>
where
    D: PackageDatabase,
    S: DependencySolver,
    I: FileImporter,
{
    for req in requirements {
        let from_file = importer.is_package_file(&req.name);
        let pkg = if from_file {
            find_by_origin(&*db, &req.name).ok_or_else(|| {
                Error::PackageNotFound(format!(
                    "Unable to find package from package file: {}",
                    req.name
                ))
            })?
        } else {
            resolve_install_target(&*db, solver, req, install_virtual)?
        };

        let name = db.package_name(pkg).to_string();
        let Some(current) = db.current(pkg) else {
            return Err(Error::PackageNotFound(format!(
                "Package {} is not installed, so cannot be reinstalled",
                name
            )));
        };

        if !from_file && !db.version(current).downloadable {
            return Err(Error::DownloadFailed(format!(
                "Reinstallation of {} {} is not possible, it cannot be downloaded",
                name,
                db.version(current).version
            )));
        }

        debug!("Marking {} for reinstall", name);
        db.set_reinstall(pkg, true);
        ctx.requested_reinstall.insert(name);
    }
    Ok(())
}

/// Resolve and mark removals
///
/// Essential packages abort the whole transaction.
pub(super) fn mark_removals<D: PackageDatabase>(
    db: &mut D,
    requirements: &[Requirement],
    purge: bool,
    ctx: &mut PlanContext,
) -> Result<()> {
    for req in requirements {
        ctx.requested_remove.insert(req.name.clone());
        let pkg = resolve_remove_target(&*db, req)?;

        if db.package(pkg).essential {
            return Err(Error::EssentialPackageProtected(
                db.package_name(pkg).to_string(),
            ));
        }

        debug!("Marking {} for removal{}", db.package_name(pkg), if purge { " (purge)" } else { "" });
        db.mark_delete(pkg, purge);
        ctx.remove_targets.push((req.name.clone(), pkg));
    }
    Ok(())
}
