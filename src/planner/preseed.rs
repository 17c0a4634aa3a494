// src/planner/preseed.rs

//! Pre-solver passes over the marked packages

use crate::cache::{AutoMark, PackageDatabase, PackageId, VersionSelect, or_groups};
use crate::error::{Error, Result};
use tracing::debug;

/// Mark one alternative of every unmet critical dependency of the packages
/// being installed
///
/// Best effort: the first alternative with a usable candidate is taken and
/// the solver has the final word. Returns how many packages were marked.
pub(super) fn preseed_installs<D: PackageDatabase>(db: &mut D) -> usize {
    let marked: Vec<PackageId> = db.package_ids().filter(|&p| db.will_install(p)).collect();
    let mut seeded = 0;

    for pkg in marked {
        if !db.will_install(pkg) {
            continue;
        }
        let Some(ver) = db.install_version(pkg) else {
            continue;
        };
        let depends = db.version(ver).depends.clone();

        for group in or_groups(&depends) {
            let Some(last) = group.last() else {
                continue;
            };
            if !last.dep_type.is_critical() || last.dep_type.is_negative() {
                continue;
            }
            if db.group_satisfied(pkg, group, VersionSelect::Install) {
                continue;
            }
            for dep in group {
                let Some(&target) = db
                    .matching_packages(pkg, dep, VersionSelect::Candidate)
                    .first()
                else {
                    continue;
                };
                if !db.will_install(target) && db.candidate(target).is_some() {
                    debug!("Preseeding {} for {}", db.package_name(target), db.package_name(pkg));
                    db.mark_install(target, AutoMark::Auto, true);
                    seeded += 1;
                }
                break;
            }
        }
    }
    seeded
}

/// Re-check every pending removal against the essential flag
///
/// Catches essential packages that ended up marked for deletion through
/// dependency completion rather than a direct request.
pub(super) fn preseed_removals<D: PackageDatabase>(db: &D) -> Result<()> {
    for pkg in db.package_ids() {
        if db.is_delete(pkg) && db.package(pkg).essential {
            return Err(Error::EssentialPackageProtected(
                db.package_name(pkg).to_string(),
            ));
        }
    }
    Ok(())
}
