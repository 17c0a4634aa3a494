// src/solver/problem.rs

//! Score-driven problem resolver
//!
//! Works pass by pass over the packages whose post-transaction state is
//! broken, highest score first. Protected packages keep their marks; every
//! other broken package is either completed, reverted to its current state,
//! or (with remove-depends) removed.

use super::DependencySolver;
use crate::cache::{AutoMark, Dependency, PackageDatabase, PackageId, VersionSelect};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Queued on the database when resolution gives up
pub const HELD_BROKEN_MESSAGE: &str = "Unable to correct problems, you have held broken packages";

const DEFAULT_MAX_PASSES: usize = 10;

const ESSENTIAL_SCORE: i64 = 100;
const INSTALLED_SCORE: i64 = 10;

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    protected: bool,
    to_remove: bool,
}

/// Default [`DependencySolver`]
#[derive(Debug)]
pub struct ProblemResolver {
    flags: BTreeMap<PackageId, Flags>,
    scores: HashMap<PackageId, i64>,
    remove_depends: bool,
    max_passes: usize,
}

impl Default for ProblemResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProblemResolver {
    pub fn new() -> Self {
        Self {
            flags: BTreeMap::new(),
            scores: HashMap::new(),
            remove_depends: false,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Bound the number of passes `resolve` makes
    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes.max(1);
        self
    }

    pub fn is_protected(&self, pkg: PackageId) -> bool {
        self.flags.get(&pkg).is_some_and(|f| f.protected)
    }

    fn is_to_remove(&self, pkg: PackageId) -> bool {
        self.flags.get(&pkg).is_some_and(|f| f.to_remove)
    }

    pub fn score(&self, pkg: PackageId) -> i64 {
        self.scores.get(&pkg).copied().unwrap_or(0)
    }

    /// Score every package: essential and installed packages rank high, and
    /// each candidate that depends on a package adds one
    fn make_scores<D: PackageDatabase>(&mut self, db: &D) {
        self.scores.clear();
        for pkg in db.package_ids() {
            let Some(ver) = db.candidate(pkg) else {
                continue;
            };
            for dep in &db.version(ver).depends {
                if dep.dep_type.is_negative() || !dep.dep_type.is_critical() {
                    continue;
                }
                for target in db.matching_packages(pkg, dep, VersionSelect::Candidate) {
                    if target != pkg {
                        *self.scores.entry(target).or_insert(0) += 1;
                    }
                }
            }
        }
        for pkg in db.package_ids() {
            let entry = db.package(pkg);
            let mut bonus = 0;
            if entry.essential {
                bonus += ESSENTIAL_SCORE;
            }
            if entry.current.is_some() {
                bonus += INSTALLED_SCORE;
            }
            if bonus > 0 {
                *self.scores.entry(pkg).or_insert(0) += bonus;
            }
        }
    }

    fn sort_by_score<D: PackageDatabase>(&self, db: &D, packages: &mut [PackageId]) {
        packages.sort_by(|&a, &b| {
            self.score(b)
                .cmp(&self.score(a))
                .then_with(|| db.package_name(a).cmp(db.package_name(b)))
        });
    }

    /// Installed alternative that was marked for deletion by someone the
    /// resolver may overrule
    fn restorable_alternative<D: PackageDatabase>(
        &self,
        db: &D,
        owner: PackageId,
        group: &[Dependency],
    ) -> Option<PackageId> {
        group.iter().find_map(|dep| {
            db.matching_packages(owner, dep, VersionSelect::Now)
                .into_iter()
                .find(|&p| db.is_delete(p) && !self.is_protected(p))
        })
    }

    /// Make room for `owner` by reverting or removing what it conflicts with
    fn fix_conflict<D: PackageDatabase>(
        &self,
        db: &mut D,
        owner: PackageId,
        group: &[Dependency],
    ) -> bool {
        let mut changed = false;
        for dep in group {
            for other in db.matching_packages(owner, dep, VersionSelect::Install) {
                if self.is_protected(other) {
                    continue;
                }
                if db.will_install(other) {
                    debug!(
                        "Keeping {} back, it conflicts with {}",
                        db.package_name(other),
                        db.package_name(owner)
                    );
                    db.mark_keep(other);
                    changed = true;
                } else if db.current(other).is_some() && !db.package(other).essential {
                    debug!(
                        "Removing {}, it conflicts with {}",
                        db.package_name(other),
                        db.package_name(owner)
                    );
                    db.mark_delete(other, false);
                    changed = true;
                }
            }
        }
        changed
    }

    fn fix_package<D: PackageDatabase>(&mut self, db: &mut D, pkg: PackageId, allow_fix: bool) -> bool {
        let protected = self.is_protected(pkg);
        let mut changed = false;

        for group in db.unsatisfied_groups(pkg, VersionSelect::Install) {
            if db.group_satisfied(pkg, &group, VersionSelect::Install) {
                continue;
            }
            let negative = group.first().is_some_and(|d| d.dep_type.is_negative());

            if negative {
                if self.fix_conflict(db, pkg, &group) {
                    changed = true;
                    continue;
                }
            } else {
                if allow_fix
                    && let Some(target) = db.installable_alternative(pkg, &group)
                    && !self.is_to_remove(target)
                    && !self.is_protected(target)
                {
                    db.mark_install(target, AutoMark::Auto, true);
                    if db.group_satisfied(pkg, &group, VersionSelect::Install) {
                        changed = true;
                        continue;
                    }
                }
                if protected && let Some(target) = self.restorable_alternative(db, pkg, &group) {
                    debug!(
                        "Keeping {}, {} needs it",
                        db.package_name(target),
                        db.package_name(pkg)
                    );
                    db.mark_keep(target);
                    changed = true;
                    continue;
                }
            }

            if protected {
                continue;
            }

            if db.will_install(pkg) {
                debug!("Holding back {}", db.package_name(pkg));
                db.mark_keep(pkg);
                return true;
            }
            if self.remove_depends && db.current(pkg).is_some() && !db.package(pkg).essential {
                debug!("Removing {}, its dependencies are gone", db.package_name(pkg));
                db.mark_delete(pkg, false);
                return true;
            }
        }

        changed
    }
}

impl DependencySolver for ProblemResolver {
    fn begin<D: PackageDatabase>(&mut self, db: &D) {
        self.flags.clear();
        self.remove_depends = false;
        self.make_scores(db);
    }

    fn protect(&mut self, pkg: PackageId) {
        self.flags.entry(pkg).or_default().protected = true;
    }

    fn remove(&mut self, pkg: PackageId) {
        self.flags.entry(pkg).or_default().to_remove = true;
    }

    fn clear(&mut self, pkg: PackageId) {
        self.flags.remove(&pkg);
    }

    fn enable_remove_depends(&mut self) {
        self.remove_depends = true;
    }

    fn install_protect<D: PackageDatabase>(&mut self, db: &mut D) {
        for (&pkg, flags) in &self.flags {
            if !flags.protected {
                continue;
            }
            if flags.to_remove {
                if !db.is_delete(pkg) {
                    db.mark_delete(pkg, false);
                }
            } else if !db.will_install(pkg) && db.current(pkg).is_none() {
                db.mark_install(pkg, AutoMark::DontChange, false);
            }
        }
    }

    fn resolve<D: PackageDatabase>(&mut self, db: &mut D, allow_fix: bool) -> bool {
        for pass in 0..self.max_passes {
            let mut broken: Vec<PackageId> = db
                .package_ids()
                .filter(|&p| db.is_inst_broken(p))
                .collect();
            if broken.is_empty() {
                debug!("Resolved after {} pass(es)", pass);
                return true;
            }
            debug!("Pass {}: {} broken package(s)", pass + 1, broken.len());
            self.sort_by_score(db, &mut broken);

            let mut changed = false;
            for pkg in broken {
                if db.is_inst_broken(pkg) {
                    changed |= self.fix_package(db, pkg, allow_fix);
                }
            }
            if !changed {
                break;
            }
        }

        if db.broken_count() == 0 {
            return true;
        }
        warn!("Resolver gave up with {} broken package(s)", db.broken_count());
        db.push_error(HELD_BROKEN_MESSAGE.to_string());
        false
    }

    fn score_sort<D: PackageDatabase>(&mut self, db: &D, packages: &mut [PackageId]) {
        self.make_scores(db);
        self.sort_by_score(db, packages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Dependency, MemoryCache, VersionSpec};

    fn installed(cache: &mut MemoryCache, name: &str, spec: VersionSpec) -> PackageId {
        let pkg = cache.add_package(name);
        let ver = cache.add_version(pkg, spec);
        cache.set_installed(pkg, Some(ver));
        pkg
    }

    fn available(cache: &mut MemoryCache, name: &str, spec: VersionSpec) -> PackageId {
        let pkg = cache.add_package(name);
        cache.add_version(pkg, spec);
        pkg
    }

    #[test]
    fn test_score_sort_is_deterministic() {
        let mut cache = MemoryCache::new();
        let zeta = available(&mut cache, "zeta", VersionSpec::new("1.0"));
        let alpha = available(&mut cache, "alpha", VersionSpec::new("1.0"));
        let inst = installed(&mut cache, "middle", VersionSpec::new("1.0"));
        let base = installed(&mut cache, "base", VersionSpec::new("1.0"));
        cache.set_essential(base, true);

        let mut resolver = ProblemResolver::new();
        let mut list = vec![zeta, alpha, inst, base];
        resolver.score_sort(&cache, &mut list);
        assert_eq!(list, vec![base, inst, alpha, zeta]);
    }

    #[test]
    fn test_reverse_dependencies_raise_score() {
        let mut cache = MemoryCache::new();
        let lib = available(&mut cache, "zlib", VersionSpec::new("1.3"));
        let other = available(&mut cache, "alib", VersionSpec::new("1.0"));
        available(&mut cache, "app", VersionSpec::new("1.0").dep(Dependency::depends("zlib")));

        let mut resolver = ProblemResolver::new();
        let mut list = vec![other, lib];
        resolver.score_sort(&cache, &mut list);
        assert_eq!(list, vec![lib, other]);
    }

    #[test]
    fn test_resolve_installs_missing_dependency() {
        let mut cache = MemoryCache::new();
        let foo = available(&mut cache, "foo", VersionSpec::new("1.0").dep(Dependency::depends("bar")));
        let bar = available(&mut cache, "bar", VersionSpec::new("1.0"));
        cache.mark_install(foo, AutoMark::Manual, false);

        let mut resolver = ProblemResolver::new();
        resolver.begin(&cache);
        resolver.protect(foo);
        assert!(resolver.resolve(&mut cache, true));
        assert!(cache.will_install(bar));
    }

    #[test]
    fn test_resolve_holds_back_unprotected_install() {
        let mut cache = MemoryCache::new();
        let foo = available(&mut cache, "foo", VersionSpec::new("1.0").dep(Dependency::depends("missing")));
        cache.mark_install(foo, AutoMark::Manual, false);

        let mut resolver = ProblemResolver::new();
        resolver.begin(&cache);
        assert!(resolver.resolve(&mut cache, true));
        assert!(!cache.will_install(foo));
        assert!(cache.take_errors().is_empty());
    }

    #[test]
    fn test_resolve_fails_for_protected_broken_install() {
        let mut cache = MemoryCache::new();
        let foo = available(&mut cache, "foo", VersionSpec::new("1.0").dep(Dependency::depends("missing")));
        cache.mark_install(foo, AutoMark::Manual, false);

        let mut resolver = ProblemResolver::new();
        resolver.begin(&cache);
        resolver.protect(foo);
        assert!(!resolver.resolve(&mut cache, true));
        assert!(cache.will_install(foo));
        assert_eq!(cache.take_errors(), vec![HELD_BROKEN_MESSAGE.to_string()]);
    }

    #[test]
    fn test_remove_depends_cascades() {
        let mut cache = MemoryCache::new();
        let lib = installed(&mut cache, "libbar", VersionSpec::new("1.0"));
        let app = installed(&mut cache, "app", VersionSpec::new("1.0").dep(Dependency::depends("libbar")));
        cache.mark_delete(lib, false);

        let mut resolver = ProblemResolver::new();
        resolver.begin(&cache);
        resolver.protect(lib);
        resolver.remove(lib);
        resolver.enable_remove_depends();
        assert!(resolver.resolve(&mut cache, true));
        assert!(cache.is_delete(app));
    }

    #[test]
    fn test_without_remove_depends_dependent_stays_broken() {
        let mut cache = MemoryCache::new();
        let lib = installed(&mut cache, "libbar", VersionSpec::new("1.0"));
        let app = installed(&mut cache, "app", VersionSpec::new("1.0").dep(Dependency::depends("libbar")));
        cache.mark_delete(lib, false);

        let mut resolver = ProblemResolver::new();
        resolver.begin(&cache);
        resolver.protect(lib);
        resolver.remove(lib);
        assert!(!resolver.resolve(&mut cache, true));
        assert!(cache.is_inst_broken(app));
    }

    #[test]
    fn test_protected_package_restores_unprotected_deletion() {
        let mut cache = MemoryCache::new();
        let lib = installed(&mut cache, "libbar", VersionSpec::new("1.0"));
        let app = available(&mut cache, "app", VersionSpec::new("1.0").dep(Dependency::depends("libbar")));
        cache.mark_delete(lib, false);
        cache.mark_install(app, AutoMark::Manual, false);

        let mut resolver = ProblemResolver::new();
        resolver.begin(&cache);
        resolver.protect(app);
        assert!(resolver.resolve(&mut cache, true));
        assert!(!cache.is_delete(lib));
        assert!(cache.will_install(app));
    }

    #[test]
    fn test_conflict_removes_installed_package() {
        let mut cache = MemoryCache::new();
        let old = installed(&mut cache, "sendmail", VersionSpec::new("8.17"));
        let new = available(
            &mut cache,
            "postfix",
            VersionSpec::new("3.8").dep(Dependency::conflicts("sendmail")),
        );
        cache.mark_install(new, AutoMark::Manual, false);

        let mut resolver = ProblemResolver::new();
        resolver.begin(&cache);
        resolver.protect(new);
        assert!(resolver.resolve(&mut cache, false));
        assert!(cache.is_delete(old));
    }

    #[test]
    fn test_install_protect_reapplies_marks() {
        let mut cache = MemoryCache::new();
        let foo = available(&mut cache, "foo", VersionSpec::new("1.0"));
        let gone = installed(&mut cache, "gone", VersionSpec::new("1.0"));

        let mut resolver = ProblemResolver::new();
        resolver.begin(&cache);
        resolver.protect(foo);
        resolver.protect(gone);
        resolver.remove(gone);
        resolver.install_protect(&mut cache);
        assert!(cache.will_install(foo));
        assert!(cache.is_delete(gone));
    }
}
