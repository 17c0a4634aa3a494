// src/planner/upgrade.rs

//! Whole-system plans
//!
//! Dist-upgrade and autoremove do not take a request. They share the
//! controller's snapshot handling with [`Planner::plan`].

use super::finalize::broken_diagnostic;
use super::{PlanState, Planner, TransactionResult, collect_changes};
use crate::cache::{AutoMark, DepType, PackageDatabase, PackageId, VersionSelect};
use crate::error::{Error, Result};
use crate::import::FileImporter;
use crate::solver::DependencySolver;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Installed packages whose candidate is newer than the installed version
fn upgradable<D: PackageDatabase>(db: &D) -> Vec<PackageId> {
    db.package_ids()
        .filter(|&pkg| match (db.current(pkg), db.candidate(pkg)) {
            (Some(cur), Some(cand)) => {
                db.comparator()
                    .compare(&db.version(cand).version, &db.version(cur).version)
                    == Ordering::Greater
            }
            _ => false,
        })
        .collect()
}

/// Auto-installed packages nothing manually installed needs
///
/// Walks Depends/PreDepends of installed versions (providers included)
/// starting from every manually installed or essential package.
fn unneeded_packages<D: PackageDatabase>(db: &D) -> Vec<PackageId> {
    let mut reachable: HashSet<PackageId> = HashSet::new();
    let mut queue: VecDeque<PackageId> = db
        .package_ids()
        .filter(|&pkg| {
            db.current(pkg).is_some()
                && (!db.state(pkg).auto_installed || db.package(pkg).essential)
        })
        .collect();

    while let Some(pkg) = queue.pop_front() {
        if !reachable.insert(pkg) {
            continue;
        }
        let Some(cur) = db.current(pkg) else {
            continue;
        };
        for dep in &db.version(cur).depends {
            if !matches!(dep.dep_type, DepType::Depends | DepType::PreDepends) {
                continue;
            }
            for target in db.matching_packages(pkg, dep, VersionSelect::Now) {
                if !reachable.contains(&target) {
                    queue.push_back(target);
                }
            }
        }
    }

    db.package_ids()
        .filter(|&pkg| db.current(pkg).is_some() && !reachable.contains(&pkg))
        .collect()
}

impl<'a, D, S, I> Planner<'a, D, S, I>
where
    D: PackageDatabase,
    S: DependencySolver,
    I: FileImporter,
{
    /// Plan upgrading every installed package to its candidate
    ///
    /// Upgrades the solver cannot satisfy are held back; anything still
    /// broken afterwards fails the plan.
    pub fn plan_dist_upgrade(&mut self, apply: bool) -> Result<TransactionResult> {
        self.state = PlanState::Idle;
        self.discard_stale_errors();
        info!("Planning dist-upgrade ({})", if apply { "apply" } else { "simulate" });

        self.execute(apply, |planner| {
            let upgrades = upgradable(&*planner.db);
            debug!("{} package(s) have newer candidates", upgrades.len());
            for pkg in upgrades {
                planner.db.mark_install(pkg, AutoMark::DontChange, true);
            }

            planner.enter(PlanState::Resolving);
            planner.solver.begin(&*planner.db);
            planner.solver.install_protect(planner.db);
            if !planner.solver.resolve(planner.db, true) {
                warn!("Solver could not settle the upgrade");
            }
            if planner.db.broken_count() != 0 {
                return Err(broken_diagnostic(&*planner.db));
            }

            planner.enter(PlanState::Collecting);
            Ok(collect_changes(&*planner.db, &BTreeSet::new(), &BTreeSet::new()))
        })
    }

    /// Plan removing auto-installed packages that are no longer needed
    pub fn plan_autoremove(&mut self, apply: bool) -> Result<TransactionResult> {
        self.state = PlanState::Idle;
        self.discard_stale_errors();
        info!("Planning autoremove ({})", if apply { "apply" } else { "simulate" });

        self.execute(apply, |planner| {
            if planner.db.broken_count() != 0 {
                return Err(Error::broken("Cache has broken packages"));
            }

            let unneeded = unneeded_packages(&*planner.db);
            let mut names = BTreeSet::new();
            for &pkg in &unneeded {
                debug!("{} is no longer needed", planner.db.package_name(pkg));
                names.insert(planner.db.package_name(pkg).to_string());
                planner.db.mark_delete(pkg, false);
            }

            planner.enter(PlanState::Resolving);
            if planner.db.broken_count() != 0 {
                planner.solver.begin(&*planner.db);
                if !planner.solver.resolve(planner.db, false) {
                    return Err(Error::broken(
                        "Failed to resolve dependencies during autoremove",
                    ));
                }
            }

            planner.enter(PlanState::Collecting);
            Ok(collect_changes(&*planner.db, &BTreeSet::new(), &names))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Dependency, MemoryCache, VersionSpec};
    use crate::error::ErrorKind;

    fn installed(cache: &mut MemoryCache, name: &str, spec: VersionSpec) -> PackageId {
        let pkg = cache.add_package(name);
        let ver = cache.add_version(pkg, spec);
        cache.set_installed(pkg, Some(ver));
        pkg
    }

    #[test]
    fn test_dist_upgrade_pulls_new_dependency() {
        let mut cache = MemoryCache::new();
        let foo = installed(&mut cache, "foo", VersionSpec::new("1.0").sizes(10, 100));
        cache.add_version(
            foo,
            VersionSpec::new("1.1").sizes(20, 150).dep(Dependency::depends("libnew")),
        );
        let lib = cache.add_package("libnew");
        cache.add_version(lib, VersionSpec::new("1.0").sizes(5, 40));

        let mut planner = Planner::new(&mut cache);
        let result = planner.plan_dist_upgrade(false).unwrap();
        assert_eq!(result.upgraded, vec!["foo"]);
        assert_eq!(result.new_installed, vec!["libnew"]);
        assert_eq!(result.extra_installed, vec!["libnew"]);
        assert_eq!(result.download_size, 25);
        assert_eq!(result.install_size, 90);
        assert_eq!(planner.state(), PlanState::Done);

        // simulate leaves nothing marked
        assert!(!cache.will_install(foo));
        assert!(!cache.will_install(lib));
    }

    #[test]
    fn test_dist_upgrade_holds_back_unsatisfiable() {
        let mut cache = MemoryCache::new();
        let foo = installed(&mut cache, "foo", VersionSpec::new("1.0"));
        cache.add_version(foo, VersionSpec::new("2.0").dep(Dependency::depends("missing")));
        installed(&mut cache, "bar", VersionSpec::new("1.0"));

        let mut planner = Planner::new(&mut cache);
        let result = planner.plan_dist_upgrade(true).unwrap();
        assert!(result.is_empty());
        assert!(!cache.will_install(foo));
    }

    #[test]
    fn test_autoremove_removes_orphans() {
        let mut cache = MemoryCache::new();
        installed(&mut cache, "app", VersionSpec::new("1.0").dep(Dependency::depends("libfoo")));
        let foo = installed(&mut cache, "libfoo", VersionSpec::new("1.0").sizes(0, 300));
        cache.set_auto_installed(foo, true);
        let old = installed(&mut cache, "libold", VersionSpec::new("0.9").sizes(0, 200));
        cache.set_auto_installed(old, true);

        let mut planner = Planner::new(&mut cache);
        let result = planner.plan_autoremove(true).unwrap();
        assert_eq!(result.removed, vec!["libold"]);
        assert!(result.extra_removed.is_empty());
        assert_eq!(result.install_size, -200);
        assert!(cache.is_delete(old));
        assert!(!cache.is_delete(foo));
    }

    #[test]
    fn test_autoremove_follows_providers() {
        let mut cache = MemoryCache::new();
        installed(&mut cache, "mailer", VersionSpec::new("1.0").dep(Dependency::depends("mta")));
        let postfix = installed(&mut cache, "postfix", VersionSpec::new("3.8").provides("mta", None));
        cache.set_auto_installed(postfix, true);

        let mut planner = Planner::new(&mut cache);
        assert!(planner.plan_autoremove(false).unwrap().is_empty());
    }

    #[test]
    fn test_autoremove_refuses_broken_cache() {
        let mut cache = MemoryCache::new();
        installed(&mut cache, "app", VersionSpec::new("1.0").dep(Dependency::depends("gone")));

        let mut planner = Planner::new(&mut cache);
        let err = planner.plan_autoremove(false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyBroken);
        assert!(err.to_string().contains("Cache has broken packages"));
    }
}
