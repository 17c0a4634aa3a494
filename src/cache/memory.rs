// src/cache/memory.rs

//! In-memory package database
//!
//! Packages, versions and mark states live in three parallel arenas indexed
//! by [`PackageId`] and [`VersionId`]. A provides index maps virtual names to
//! the versions providing them, and every provided name that has no real
//! package gets a virtual package entry of its own.

use super::{
    AutoMark, Mark, Package, PackageDatabase, PackageId, PackageVersion, StateCache,
    VersionId, VersionSelect, VersionSpec,
};
use crate::error::{Error, Result};
use crate::version::{RpmComparator, VersionComparator};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// How deep dependency completion recurses from one install mark
const MAX_FIX_DEPTH: usize = 32;

/// Saved mark states of a [`MemoryCache`]
///
/// Also records how many packages and versions existed, so entries
/// registered later (package-file imports) are dropped on restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySnapshot {
    states: Vec<StateCache>,
    pinned: HashSet<PackageId>,
    packages: usize,
    versions: usize,
}

/// Arena-backed package database
#[derive(Debug, Default)]
pub struct MemoryCache {
    packages: Vec<Package>,
    versions: Vec<PackageVersion>,
    states: Vec<StateCache>,
    by_name: HashMap<String, PackageId>,
    provides: HashMap<String, Vec<VersionId>>,
    /// Packages whose candidate was chosen explicitly
    pinned: HashSet<PackageId>,
    errors: Vec<String>,
    comparator: RpmComparator,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Add a package, or return the existing entry with that name
    pub fn add_package(&mut self, name: &str) -> PackageId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = PackageId(self.packages.len() as u32);
        self.packages.push(Package {
            id,
            name: name.to_string(),
            essential: false,
            versions: Vec::new(),
            current: None,
        });
        self.states.push(StateCache::default());
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Add a version from repository metadata
    ///
    /// Provided names without a package of their own get a virtual entry.
    pub fn add_version(&mut self, pkg: PackageId, spec: VersionSpec) -> VersionId {
        let provided: Vec<String> = spec.provides.iter().map(|p| p.name.clone()).collect();
        let id = self.insert_version(pkg, spec);
        for name in provided {
            self.add_package(&name);
        }
        id
    }

    fn insert_version(&mut self, pkg: PackageId, spec: VersionSpec) -> VersionId {
        let id = VersionId(self.versions.len() as u32);
        for provide in &spec.provides {
            self.provides
                .entry(provide.name.clone())
                .or_default()
                .push(id);
        }
        self.versions.push(PackageVersion {
            id,
            package: pkg,
            version: spec.version,
            size: spec.size,
            installed_size: spec.installed_size,
            provides: spec.provides,
            depends: spec.depends,
            downloadable: spec.downloadable,
            origin: spec.origin,
        });
        self.packages[pkg.index()].versions.push(id);
        if !self.pinned.contains(&pkg) {
            self.states[pkg.index()].candidate = self.best_version(pkg);
        }
        id
    }

    /// Highest version of a package by the comparator
    fn best_version(&self, pkg: PackageId) -> Option<VersionId> {
        self.packages[pkg.index()]
            .versions
            .iter()
            .copied()
            .max_by(|&a, &b| {
                self.comparator
                    .compare(&self.versions[a.index()].version, &self.versions[b.index()].version)
                    .then_with(|| a.cmp(&b))
            })
    }

    pub fn set_essential(&mut self, pkg: PackageId, essential: bool) {
        self.packages[pkg.index()].essential = essential;
    }

    /// Record the installed version of a package
    pub fn set_installed(&mut self, pkg: PackageId, version: Option<VersionId>) {
        self.packages[pkg.index()].current = version;
    }

    pub fn set_auto_installed(&mut self, pkg: PackageId, auto: bool) {
        self.states[pkg.index()].auto_installed = auto;
    }

    /// Override the candidate policy for one package
    pub fn set_candidate(&mut self, pkg: PackageId, version: Option<VersionId>) {
        self.pinned.insert(pkg);
        self.states[pkg.index()].candidate = version;
    }

    /// Restore a persisted mark without running dependency completion
    pub fn set_mark(&mut self, pkg: PackageId, mark: Mark) {
        self.states[pkg.index()].mark = mark;
    }

    /// Look up a version of a package by its version string
    pub fn find_version(&self, pkg: PackageId, version: &str) -> Option<VersionId> {
        self.packages[pkg.index()]
            .versions
            .iter()
            .copied()
            .find(|&v| {
                self.comparator
                    .compare(&self.versions[v.index()].version, version)
                    == Ordering::Equal
            })
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Drop versions and packages beyond the given arena lengths
    fn truncate(&mut self, packages: usize, versions: usize) {
        if self.versions.len() > versions {
            let dropped = self.versions.split_off(versions);
            debug!("Dropping {} version(s) registered since snapshot", dropped.len());
            for ver in &dropped {
                for provide in &ver.provides {
                    if let Some(list) = self.provides.get_mut(&provide.name) {
                        list.retain(|v| v.index() < versions);
                        if list.is_empty() {
                            self.provides.remove(&provide.name);
                        }
                    }
                }
                self.packages[ver.package.index()]
                    .versions
                    .retain(|v| v.index() < versions);
            }
        }
        if self.packages.len() > packages {
            for pkg in self.packages.split_off(packages) {
                self.by_name.remove(&pkg.name);
            }
        }
    }

    fn mark_install_depth(&mut self, pkg: PackageId, auto: AutoMark, auto_fix: bool, depth: usize) {
        let idx = pkg.index();
        let current = self.packages[idx].current;
        let Some(candidate) = self.states[idx].candidate else {
            debug!("{} has no candidate version, not marking", self.packages[idx].name);
            return;
        };

        if current == Some(candidate) {
            self.states[idx].mark = Mark::Keep;
            return;
        }

        let state = &mut self.states[idx];
        state.mark = Mark::Install;
        match auto {
            AutoMark::Manual => state.auto_installed = false,
            AutoMark::Auto if current.is_none() => state.auto_installed = true,
            _ => {}
        }

        if !auto_fix || depth >= MAX_FIX_DEPTH {
            return;
        }

        for group in self.unsatisfied_groups(pkg, VersionSelect::Install) {
            let negative = group.first().is_some_and(|d| d.dep_type.is_negative());
            if negative {
                for dep in &group {
                    for other in self.matching_packages(pkg, dep, VersionSelect::Install) {
                        let entry = &self.packages[other.index()];
                        if entry.essential || entry.current.is_none() {
                            continue;
                        }
                        debug!(
                            "Removing {} which conflicts with {}",
                            entry.name, self.packages[idx].name
                        );
                        self.mark_delete(other, false);
                    }
                }
            } else if let Some(target) = self.installable_alternative(pkg, &group) {
                debug!(
                    "Installing {} for {}",
                    self.packages[target.index()].name,
                    self.packages[idx].name
                );
                self.mark_install_depth(target, AutoMark::Auto, true, depth + 1);
            }
        }
    }
}

impl PackageDatabase for MemoryCache {
    type Snapshot = MemorySnapshot;

    fn package_ids(&self) -> impl Iterator<Item = PackageId> + '_ {
        self.packages.iter().map(|p| p.id)
    }

    fn find_package(&self, name: &str) -> Option<PackageId> {
        self.by_name.get(name).copied()
    }

    fn package(&self, id: PackageId) -> &Package {
        &self.packages[id.index()]
    }

    fn version(&self, id: VersionId) -> &PackageVersion {
        &self.versions[id.index()]
    }

    fn state(&self, id: PackageId) -> &StateCache {
        &self.states[id.index()]
    }

    fn comparator(&self) -> &dyn VersionComparator {
        &self.comparator
    }

    fn provided_by(&self, name: &str) -> Vec<VersionId> {
        self.provides.get(name).cloned().unwrap_or_default()
    }

    fn mark_install(&mut self, pkg: PackageId, auto: AutoMark, auto_fix: bool) {
        self.mark_install_depth(pkg, auto, auto_fix, 0);
    }

    fn mark_delete(&mut self, pkg: PackageId, purge: bool) {
        let installed = self.packages[pkg.index()].current.is_some();
        let state = &mut self.states[pkg.index()];
        state.reinstall = false;
        state.mark = if installed {
            Mark::Delete { purge }
        } else {
            Mark::Keep
        };
    }

    fn mark_keep(&mut self, pkg: PackageId) {
        self.states[pkg.index()].mark = Mark::Keep;
    }

    fn set_reinstall(&mut self, pkg: PackageId, reinstall: bool) {
        if self.packages[pkg.index()].current.is_some() {
            self.states[pkg.index()].reinstall = reinstall;
        }
    }

    fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            states: self.states.clone(),
            pinned: self.pinned.clone(),
            packages: self.packages.len(),
            versions: self.versions.len(),
        }
    }

    fn restore(&mut self, snapshot: MemorySnapshot) {
        self.truncate(snapshot.packages, snapshot.versions);
        self.states = snapshot.states;
        self.pinned = snapshot.pinned;
    }

    /// Imported versions are reachable by name and through the provides
    /// index, but do not create virtual package entries.
    fn register_file_version(&mut self, name: &str, spec: VersionSpec) -> Result<PackageId> {
        if name.is_empty() {
            return Err(Error::Import("package file has no name".to_string()));
        }
        let pkg = self.add_package(name);
        let ver = match self.find_version(pkg, &spec.version) {
            Some(existing) if self.versions[existing.index()].origin == spec.origin => existing,
            _ => self.insert_version(pkg, spec),
        };
        self.set_candidate(pkg, Some(ver));
        Ok(pkg)
    }

    fn push_error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Dependency;
    use crate::version::CompareOp;

    fn installed(cache: &mut MemoryCache, name: &str, version: &str) -> PackageId {
        let pkg = cache.add_package(name);
        let ver = cache.add_version(pkg, VersionSpec::new(version));
        cache.set_installed(pkg, Some(ver));
        pkg
    }

    #[test]
    fn test_candidate_is_highest_version() {
        let mut cache = MemoryCache::new();
        let pkg = cache.add_package("foo");
        cache.add_version(pkg, VersionSpec::new("1.10"));
        let older = cache.add_version(pkg, VersionSpec::new("1.9"));
        assert_ne!(cache.candidate(pkg), Some(older));
        assert_eq!(cache.version(cache.candidate(pkg).unwrap()).version, "1.10");
    }

    #[test]
    fn test_pinned_candidate_survives_new_versions() {
        let mut cache = MemoryCache::new();
        let pkg = cache.add_package("foo");
        let old = cache.add_version(pkg, VersionSpec::new("1.0"));
        cache.set_candidate(pkg, Some(old));
        cache.add_version(pkg, VersionSpec::new("2.0"));
        assert_eq!(cache.candidate(pkg), Some(old));
    }

    #[test]
    fn test_provides_create_virtual_entry() {
        let mut cache = MemoryCache::new();
        let pkg = cache.add_package("postfix");
        cache.add_version(pkg, VersionSpec::new("3.8").provides("mail-transport-agent", None));
        let mta = cache.find_package("mail-transport-agent").unwrap();
        assert!(cache.package(mta).is_virtual());
        assert_eq!(cache.provided_by("mail-transport-agent").len(), 1);
    }

    #[test]
    fn test_mark_install_up_to_date_keeps() {
        let mut cache = MemoryCache::new();
        let pkg = installed(&mut cache, "foo", "1.0");
        cache.mark_install(pkg, AutoMark::Manual, false);
        assert_eq!(cache.state(pkg).mark, Mark::Keep);
    }

    #[test]
    fn test_mark_install_auto_fix_pulls_dependency() {
        let mut cache = MemoryCache::new();
        let foo = cache.add_package("foo");
        cache.add_version(foo, VersionSpec::new("1.0").dep(Dependency::depends("bar")));
        let bar = cache.add_package("bar");
        cache.add_version(bar, VersionSpec::new("2.0"));

        cache.mark_install(foo, AutoMark::Manual, false);
        assert!(cache.is_inst_broken(foo));

        cache.mark_install(foo, AutoMark::DontChange, true);
        assert!(cache.will_install(bar));
        assert!(cache.state(bar).auto_installed);
        assert!(!cache.state(foo).auto_installed);
        assert_eq!(cache.broken_count(), 0);
    }

    #[test]
    fn test_auto_fix_respects_version_constraint() {
        let mut cache = MemoryCache::new();
        let foo = cache.add_package("foo");
        cache.add_version(
            foo,
            VersionSpec::new("1.0").dep(Dependency::depends("bar").version(CompareOp::GreaterEq, "3.0")),
        );
        let bar = cache.add_package("bar");
        cache.add_version(bar, VersionSpec::new("2.0"));

        cache.mark_install(foo, AutoMark::Manual, true);
        assert!(!cache.will_install(bar));
        assert!(cache.is_inst_broken(foo));
        assert_eq!(
            cache.first_unmet_dependency(foo).unwrap().to_string(),
            "bar >= 3.0"
        );
    }

    #[test]
    fn test_auto_fix_removes_conflicting_installed_package() {
        let mut cache = MemoryCache::new();
        let old = installed(&mut cache, "sendmail", "8.17");
        let new = cache.add_package("postfix");
        cache.add_version(new, VersionSpec::new("3.8").dep(Dependency::conflicts("sendmail")));

        cache.mark_install(new, AutoMark::Manual, true);
        assert!(cache.is_delete(old));
        assert!(!cache.is_inst_broken(new));
    }

    #[test]
    fn test_auto_fix_never_removes_essential() {
        let mut cache = MemoryCache::new();
        let base = installed(&mut cache, "glibc", "2.38");
        cache.set_essential(base, true);
        let pkg = cache.add_package("musl-compat");
        cache.add_version(pkg, VersionSpec::new("1.0").dep(Dependency::conflicts("glibc")));

        cache.mark_install(pkg, AutoMark::Manual, true);
        assert!(!cache.is_delete(base));
        assert!(cache.is_inst_broken(pkg));
    }

    #[test]
    fn test_self_provide_is_not_a_conflict() {
        let mut cache = MemoryCache::new();
        let pkg = cache.add_package("postfix");
        cache.add_version(
            pkg,
            VersionSpec::new("3.8")
                .provides("mail-transport-agent", None)
                .dep(Dependency::conflicts("mail-transport-agent")),
        );
        cache.mark_install(pkg, AutoMark::Manual, false);
        assert!(!cache.is_inst_broken(pkg));
    }

    #[test]
    fn test_delete_breaks_installed_dependent() {
        let mut cache = MemoryCache::new();
        let lib = installed(&mut cache, "libbar", "1.0");
        let app = cache.add_package("app");
        let v = cache.add_version(app, VersionSpec::new("1.0").dep(Dependency::depends("libbar")));
        cache.set_installed(app, Some(v));

        assert_eq!(cache.broken_count(), 0);
        cache.mark_delete(lib, false);
        assert!(cache.is_inst_broken(app));
        assert!(!cache.is_now_broken(app));
    }

    #[test]
    fn test_mark_delete_uninstalled_is_keep() {
        let mut cache = MemoryCache::new();
        let pkg = cache.add_package("foo");
        cache.add_version(pkg, VersionSpec::new("1.0"));
        cache.mark_delete(pkg, true);
        assert_eq!(cache.state(pkg).mark, Mark::Keep);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut cache = MemoryCache::new();
        let pkg = cache.add_package("foo");
        cache.add_version(pkg, VersionSpec::new("1.0"));
        let before = cache.snapshot();

        cache.mark_install(pkg, AutoMark::Manual, false);
        assert!(cache.will_install(pkg));

        cache.restore(before.clone());
        assert_eq!(cache.snapshot(), before);
    }

    #[test]
    fn test_register_file_version_becomes_candidate() {
        let mut cache = MemoryCache::new();
        let pkg = cache.add_package("foo");
        cache.add_version(pkg, VersionSpec::new("2.0"));

        let id = cache
            .register_file_version("foo", VersionSpec::new("1.5").origin("/tmp/foo-1.5.rpm"))
            .unwrap();
        assert_eq!(id, pkg);
        let cand = cache.candidate(pkg).unwrap();
        assert_eq!(cache.version(cand).version, "1.5");
        assert_eq!(cache.version(cand).origin.as_deref(), Some("/tmp/foo-1.5.rpm"));
    }

    #[test]
    fn test_restore_drops_registered_versions() {
        let mut cache = MemoryCache::new();
        let foo = cache.add_package("foo");
        let repo = cache.add_version(foo, VersionSpec::new("2.0"));
        let before = cache.snapshot();

        cache
            .register_file_version("foo", VersionSpec::new("1.5").origin("/tmp/foo-1.5.rpm"))
            .unwrap();
        cache
            .register_file_version(
                "tool",
                VersionSpec::new("0.1").provides("tool-api", None).origin("/tmp/tool.rpm"),
            )
            .unwrap();
        assert_ne!(cache.candidate(foo), Some(repo));

        cache.restore(before.clone());
        assert_eq!(cache.snapshot(), before);
        assert_eq!(cache.candidate(foo), Some(repo));
        assert_eq!(cache.package(foo).versions, vec![repo]);
        assert!(cache.find_package("tool").is_none());
        assert!(cache.provided_by("tool-api").is_empty());

        // the candidate policy applies again to later versions
        let newer = cache.add_version(foo, VersionSpec::new("3.0"));
        assert_eq!(cache.candidate(foo), Some(newer));
    }

    #[test]
    fn test_error_queue_drains() {
        let mut cache = MemoryCache::new();
        cache.push_error("E: one".into());
        assert_eq!(cache.take_errors(), vec!["E: one".to_string()]);
        assert!(cache.take_errors().is_empty());
    }
}
