// src/cache/mod.rs

//! Package database
//!
//! The planner never owns package data. It works through [`PackageDatabase`],
//! which hands out stable arena ids for packages and versions and keeps one
//! mutable [`StateCache`] per package. Everything the planner asks about a
//! package's future (will it be installed, is it broken) is derived from those
//! states by the provided methods on the trait.

pub mod memory;

pub use memory::{MemoryCache, MemorySnapshot};

use crate::error::Result;
use crate::version::{CompareOp, Constraint, VersionComparator};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Index of a package in the database arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub u32);

impl PackageId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a package version in the database arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId(pub u32);

impl VersionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dependency edge types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepType {
    Depends,
    PreDepends,
    Recommends,
    Suggests,
    Enhances,
    Conflicts,
    Breaks,
    Obsoletes,
    Replaces,
}

impl DepType {
    /// Critical edges must hold for a package state to be consistent
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            DepType::Depends
                | DepType::PreDepends
                | DepType::Conflicts
                | DepType::Breaks
                | DepType::Obsoletes
        )
    }

    /// Negative edges are satisfied when nothing matches them
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            DepType::Conflicts | DepType::Breaks | DepType::Obsoletes
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepType::Depends => "depends",
            DepType::PreDepends => "predepends",
            DepType::Recommends => "recommends",
            DepType::Suggests => "suggests",
            DepType::Enhances => "enhances",
            DepType::Conflicts => "conflicts",
            DepType::Breaks => "breaks",
            DepType::Obsoletes => "obsoletes",
            DepType::Replaces => "replaces",
        }
    }
}

impl fmt::Display for DepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "depends" => Ok(DepType::Depends),
            "predepends" => Ok(DepType::PreDepends),
            "recommends" => Ok(DepType::Recommends),
            "suggests" => Ok(DepType::Suggests),
            "enhances" => Ok(DepType::Enhances),
            "conflicts" => Ok(DepType::Conflicts),
            "breaks" => Ok(DepType::Breaks),
            "obsoletes" => Ok(DepType::Obsoletes),
            "replaces" => Ok(DepType::Replaces),
            _ => Err(format!("Invalid dependency type: {s}")),
        }
    }
}

/// One dependency edge of a package version
///
/// Alternatives of an OR group are stored consecutively; every member but the
/// last has `or_next` set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub dep_type: DepType,
    pub target: String,
    pub constraint: Option<Constraint>,
    pub or_next: bool,
}

impl Dependency {
    pub fn new(dep_type: DepType, target: impl Into<String>) -> Self {
        Self {
            dep_type,
            target: target.into(),
            constraint: None,
            or_next: false,
        }
    }

    pub fn depends(target: impl Into<String>) -> Self {
        Self::new(DepType::Depends, target)
    }

    pub fn conflicts(target: impl Into<String>) -> Self {
        Self::new(DepType::Conflicts, target)
    }

    /// Attach a version constraint
    pub fn version(mut self, op: CompareOp, version: impl Into<String>) -> Self {
        self.constraint = Some(Constraint::new(op, version));
        self
    }

    /// Mark this edge as followed by another alternative
    pub fn or(mut self) -> Self {
        self.or_next = true;
        self
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(c) => write!(f, "{} {}", self.target, c),
            None => write!(f, "{}", self.target),
        }
    }
}

/// Split a dependency list into OR groups
pub fn or_groups(depends: &[Dependency]) -> Vec<&[Dependency]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (i, dep) in depends.iter().enumerate() {
        if !dep.or_next || i + 1 == depends.len() {
            groups.push(&depends[start..=i]);
            start = i + 1;
        }
    }
    groups
}

/// A virtual name a version satisfies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provide {
    pub name: String,
    pub version: Option<String>,
}

/// Everything needed to add a version to a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    pub version: String,
    /// Archive size in bytes
    pub size: u64,
    pub installed_size: u64,
    pub provides: Vec<Provide>,
    pub depends: Vec<Dependency>,
    pub downloadable: bool,
    /// Package file this version was read from, if any
    pub origin: Option<String>,
}

impl VersionSpec {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            size: 0,
            installed_size: 0,
            provides: Vec::new(),
            depends: Vec::new(),
            downloadable: true,
            origin: None,
        }
    }

    pub fn sizes(mut self, size: u64, installed_size: u64) -> Self {
        self.size = size;
        self.installed_size = installed_size;
        self
    }

    pub fn provides(mut self, name: impl Into<String>, version: Option<&str>) -> Self {
        self.provides.push(Provide {
            name: name.into(),
            version: version.map(str::to_string),
        });
        self
    }

    pub fn dep(mut self, dep: Dependency) -> Self {
        self.depends.push(dep);
        self
    }

    pub fn downloadable(mut self, downloadable: bool) -> Self {
        self.downloadable = downloadable;
        self
    }

    pub fn origin(mut self, path: impl Into<String>) -> Self {
        self.origin = Some(path.into());
        self
    }
}

/// A concrete version of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub id: VersionId,
    pub package: PackageId,
    pub version: String,
    pub size: u64,
    pub installed_size: u64,
    pub provides: Vec<Provide>,
    pub depends: Vec<Dependency>,
    pub downloadable: bool,
    pub origin: Option<String>,
}

/// A package entry
///
/// An entry with no versions is a purely virtual name that exists only
/// because other versions provide it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub essential: bool,
    pub versions: Vec<VersionId>,
    /// Installed version
    pub current: Option<VersionId>,
}

impl Package {
    pub fn is_virtual(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn is_installed(&self) -> bool {
        self.current.is_some()
    }
}

/// Requested change for a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mark {
    #[default]
    Keep,
    Install,
    Delete {
        purge: bool,
    },
}

/// How an install mark affects the auto-installed flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoMark {
    Manual,
    Auto,
    DontChange,
}

/// Mutable per-package planning state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateCache {
    pub mark: Mark,
    /// Version policy would install
    pub candidate: Option<VersionId>,
    pub reinstall: bool,
    pub auto_installed: bool,
}

/// Which version of a package a query looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelect {
    /// The installed version
    Now,
    /// The version the package will have after the transaction
    Install,
    /// The policy candidate
    Candidate,
}

/// Package database collaborator
pub trait PackageDatabase {
    /// Opaque copy of every package's mark state
    type Snapshot;

    fn package_ids(&self) -> impl Iterator<Item = PackageId> + '_;
    fn find_package(&self, name: &str) -> Option<PackageId>;
    fn package(&self, id: PackageId) -> &Package;
    fn version(&self, id: VersionId) -> &PackageVersion;
    fn state(&self, id: PackageId) -> &StateCache;
    fn comparator(&self) -> &dyn VersionComparator;

    /// Mark a package for installation of its candidate
    ///
    /// With `auto_fix` the database completes unmet dependencies of the
    /// candidate on its own.
    fn mark_install(&mut self, pkg: PackageId, auto: AutoMark, auto_fix: bool);
    fn mark_delete(&mut self, pkg: PackageId, purge: bool);
    fn mark_keep(&mut self, pkg: PackageId);
    fn set_reinstall(&mut self, pkg: PackageId, reinstall: bool);

    fn snapshot(&self) -> Self::Snapshot;
    /// Put every mark state back and forget entries registered since the
    /// snapshot was taken
    fn restore(&mut self, snapshot: Self::Snapshot);

    /// Register a version read from a package file and make it the candidate
    ///
    /// The entry lasts until the next [`restore`](Self::restore) of an
    /// earlier snapshot.
    fn register_file_version(&mut self, name: &str, spec: VersionSpec) -> Result<PackageId>;

    fn push_error(&mut self, message: String);
    /// Drain the pending error queue
    fn take_errors(&mut self) -> Vec<String>;

    /// Versions whose provides list names `name`
    ///
    /// The default is a full scan; implementations may keep an index.
    fn provided_by(&self, name: &str) -> Vec<VersionId> {
        let mut found = Vec::new();
        for pkg in self.package_ids() {
            for &ver in &self.package(pkg).versions {
                if self.version(ver).provides.iter().any(|p| p.name == name) {
                    found.push(ver);
                }
            }
        }
        found
    }

    fn candidate(&self, pkg: PackageId) -> Option<VersionId> {
        self.state(pkg).candidate
    }

    fn current(&self, pkg: PackageId) -> Option<VersionId> {
        self.package(pkg).current
    }

    fn install_version(&self, pkg: PackageId) -> Option<VersionId> {
        let state = self.state(pkg);
        match state.mark {
            Mark::Install => state.candidate,
            Mark::Delete { .. } => None,
            Mark::Keep => self.package(pkg).current,
        }
    }

    fn select_version(&self, pkg: PackageId, which: VersionSelect) -> Option<VersionId> {
        match which {
            VersionSelect::Now => self.current(pkg),
            VersionSelect::Install => self.install_version(pkg),
            VersionSelect::Candidate => self.candidate(pkg),
        }
    }

    fn package_name(&self, pkg: PackageId) -> &str {
        &self.package(pkg).name
    }

    fn will_install(&self, pkg: PackageId) -> bool {
        self.state(pkg).mark == Mark::Install
    }

    fn is_new_install(&self, pkg: PackageId) -> bool {
        self.will_install(pkg) && self.current(pkg).is_none()
    }

    /// How the version to install compares to the installed one
    fn version_change(&self, pkg: PackageId) -> Option<Ordering> {
        if !self.will_install(pkg) {
            return None;
        }
        let (cand, cur) = (self.candidate(pkg)?, self.current(pkg)?);
        Some(
            self.comparator()
                .compare(&self.version(cand).version, &self.version(cur).version),
        )
    }

    /// An installed package moving to another version that is not older,
    /// including an equal version from a different origin
    fn is_upgrade(&self, pkg: PackageId) -> bool {
        self.version_change(pkg)
            .is_some_and(|order| order != Ordering::Less)
    }

    fn is_downgrade(&self, pkg: PackageId) -> bool {
        self.version_change(pkg) == Some(Ordering::Less)
    }

    fn is_delete(&self, pkg: PackageId) -> bool {
        matches!(self.state(pkg).mark, Mark::Delete { .. })
    }

    fn is_reinstall(&self, pkg: PackageId) -> bool {
        self.state(pkg).reinstall && self.current(pkg).is_some()
    }

    /// Packages whose selected version matches a single dependency edge
    ///
    /// The target package itself is listed before providers. For negative
    /// edges the owning package never matches itself.
    fn matching_packages(
        &self,
        owner: PackageId,
        dep: &Dependency,
        which: VersionSelect,
    ) -> Vec<PackageId> {
        let cmp = self.comparator();
        let mut matches = Vec::new();

        if let Some(target) = self.find_package(&dep.target)
            && let Some(ver) = self.select_version(target, which)
            && cmp.satisfies(&self.version(ver).version, dep.constraint.as_ref())
        {
            matches.push(target);
        }

        for ver in self.provided_by(&dep.target) {
            let version = self.version(ver);
            let pkg = version.package;
            if matches.contains(&pkg) || self.select_version(pkg, which) != Some(ver) {
                continue;
            }
            let provided = version.provides.iter().any(|p| {
                p.name == dep.target
                    && match (&dep.constraint, &p.version) {
                        (None, _) => true,
                        (Some(c), Some(v)) => cmp.check(v, c.op, &c.version),
                        (Some(_), None) => false,
                    }
            });
            if provided {
                matches.push(pkg);
            }
        }

        if dep.dep_type.is_negative() {
            matches.retain(|&p| p != owner);
        }
        matches
    }

    fn dependency_satisfied(&self, owner: PackageId, dep: &Dependency, which: VersionSelect) -> bool {
        let matched = !self.matching_packages(owner, dep, which).is_empty();
        matched != dep.dep_type.is_negative()
    }

    /// An OR group holds when any positive alternative matches, or when no
    /// negative edge matches
    fn group_satisfied(&self, owner: PackageId, group: &[Dependency], which: VersionSelect) -> bool {
        let Some(first) = group.first() else {
            return true;
        };
        if first.dep_type.is_negative() {
            group
                .iter()
                .all(|dep| self.dependency_satisfied(owner, dep, which))
        } else {
            group
                .iter()
                .any(|dep| self.dependency_satisfied(owner, dep, which))
        }
    }

    /// Critical groups of the selected version that do not hold
    fn unsatisfied_groups(&self, pkg: PackageId, which: VersionSelect) -> Vec<Vec<Dependency>> {
        let Some(ver) = self.select_version(pkg, which) else {
            return Vec::new();
        };
        or_groups(&self.version(ver).depends)
            .into_iter()
            .filter(|g| g.last().is_some_and(|d| d.dep_type.is_critical()))
            .filter(|g| !self.group_satisfied(pkg, g, which))
            .map(|g| g.to_vec())
            .collect()
    }

    /// Whether the post-transaction version has an unmet critical dependency
    fn is_inst_broken(&self, pkg: PackageId) -> bool {
        !self.unsatisfied_groups(pkg, VersionSelect::Install).is_empty()
    }

    /// Whether the installed version has an unmet critical dependency today
    fn is_now_broken(&self, pkg: PackageId) -> bool {
        !self.unsatisfied_groups(pkg, VersionSelect::Now).is_empty()
    }

    fn broken_count(&self) -> usize {
        self.package_ids()
            .filter(|&pkg| self.is_inst_broken(pkg))
            .count()
    }

    /// First Depends/PreDepends edge of the install version with nothing
    /// installed to satisfy it
    fn first_unmet_dependency(&self, pkg: PackageId) -> Option<Dependency> {
        let ver = self.install_version(pkg)?;
        self.version(ver)
            .depends
            .iter()
            .filter(|d| matches!(d.dep_type, DepType::Depends | DepType::PreDepends))
            .find(|d| !self.dependency_satisfied(pkg, d, VersionSelect::Install))
            .cloned()
    }

    /// First alternative of a group whose candidate would satisfy it
    ///
    /// Among several matching packages an installed one is preferred.
    fn installable_alternative(&self, owner: PackageId, group: &[Dependency]) -> Option<PackageId> {
        for dep in group {
            let found = self.matching_packages(owner, dep, VersionSelect::Candidate);
            let choice = found
                .iter()
                .copied()
                .find(|&p| self.current(p).is_some())
                .or_else(|| found.first().copied());
            if choice.is_some() {
                return choice;
            }
        }
        None
    }
}
