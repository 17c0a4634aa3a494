// src/planner/conflict.rs

//! Conflicts between explicitly requested installs
//!
//! Only the requested set is checked here; conflicts the solver pulls in
//! later are its own business.

use crate::cache::{DepType, PackageDatabase, PackageId};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use tracing::debug;

/// Fail if one requested package's candidate conflicts with another's
///
/// Packages are visited in name order, so the reported pair does not depend
/// on the order the caller listed them in.
pub(super) fn check_conflicts<D: PackageDatabase>(db: &D, requested: &BTreeSet<String>) -> Result<()> {
    if requested.len() < 2 {
        return Ok(());
    }
    debug!("Checking {} requested packages for conflicts", requested.len());

    let packages: Vec<PackageId> = requested
        .iter()
        .filter_map(|name| db.find_package(name))
        .collect();

    for &pkg in &packages {
        let Some(ver) = db.candidate(pkg) else {
            continue;
        };
        for dep in &db.version(ver).depends {
            if dep.dep_type != DepType::Conflicts {
                continue;
            }
            let Some(target) = db.find_package(&dep.target) else {
                continue;
            };
            if target == pkg || !packages.contains(&target) {
                continue;
            }
            let Some(target_ver) = db.candidate(target) else {
                continue;
            };
            if db
                .comparator()
                .satisfies(&db.version(target_ver).version, dep.constraint.as_ref())
            {
                return Err(Error::ConflictDetected {
                    first: db.package_name(pkg).to_string(),
                    second: db.package_name(target).to_string(),
                });
            }
        }
    }
    Ok(())
}
