// src/solver/mod.rs

//! Dependency solver
//!
//! The planner only needs a small contract from the solver: protect
//! packages from being touched, ask for a consistent state, and rank
//! candidate packages when several could satisfy a request.

mod problem;

pub use problem::{HELD_BROKEN_MESSAGE, ProblemResolver};

use crate::cache::{PackageDatabase, PackageId};

/// Solver collaborator used by the planner
pub trait DependencySolver {
    /// Start a new resolution: drop all flags and recompute scores
    fn begin<D: PackageDatabase>(&mut self, db: &D);

    /// Keep the package's current mark; the solver will not change it
    fn protect(&mut self, pkg: PackageId);

    /// The package is meant to go away
    fn remove(&mut self, pkg: PackageId);

    /// Forget protect/remove flags for a package
    fn clear(&mut self, pkg: PackageId);

    /// Allow installed packages with unmet dependencies to be removed
    fn enable_remove_depends(&mut self);

    /// Re-apply the marks of protected packages
    fn install_protect<D: PackageDatabase>(&mut self, db: &mut D);

    /// Try to reach a state with no broken packages
    ///
    /// Returns `false` and queues an error on the database when problems
    /// remain. `allow_fix` lets the solver install missing dependencies.
    fn resolve<D: PackageDatabase>(&mut self, db: &mut D, allow_fix: bool) -> bool;

    /// Order packages best first, deterministically
    fn score_sort<D: PackageDatabase>(&mut self, db: &D, packages: &mut [PackageId]);
}
