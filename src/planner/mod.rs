// src/planner/mod.rs

//! Transaction planner
//!
//! Turns a [`TransactionRequest`] into a [`TransactionResult`] against a
//! [`PackageDatabase`]. One call runs these steps in order:
//!
//! 1. Import package-file arguments
//! 2. Mark installs, reinstalls, then removals
//! 3. Check conflicts between the explicitly requested installs
//! 4. Preseed install dependencies and re-check removals
//! 5. Finalize with the dependency solver
//! 6. Collect the resulting changes
//!
//! The database is snapshotted before the imports. In simulate mode it is
//! restored afterwards, dropping imported versions along with the marks. On
//! failure it is restored in both modes, so a failed call never leaves
//! partial marks or imports behind.

mod changes;
mod conflict;
mod finalize;
mod mark;
mod preseed;
mod provider;
mod upgrade;

pub use changes::collect_changes;
pub use provider::{resolve_install_target, resolve_remove_target};

use crate::cache::{PackageDatabase, PackageId};
use crate::config::{PlannerConfig, PlannerSettings};
use crate::error::{Error, Result};
use crate::import::{FileImporter, RpmFileImporter};
use crate::requirement::Requirement;
use crate::solver::{DependencySolver, ProblemResolver};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// What the caller wants changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRequest {
    pub install: Vec<Requirement>,
    pub remove: Vec<Requirement>,
    pub reinstall: Vec<Requirement>,
    /// Remove configuration along with packages
    pub purge: bool,
    /// Let the solver remove packages whose dependencies are removed
    pub allow_remove_depends: bool,
}

fn parse_all<I, S>(names: I) -> Vec<Requirement>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| Requirement::parse(n.as_ref()))
        .collect()
}

impl TransactionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.install.extend(parse_all(names));
        self
    }

    pub fn remove<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.remove.extend(parse_all(names));
        self
    }

    pub fn reinstall<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reinstall.extend(parse_all(names));
        self
    }

    pub fn purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    pub fn remove_depends(mut self, allow: bool) -> Self {
        self.allow_remove_depends = allow;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.remove.is_empty() && self.reinstall.is_empty()
    }

    fn validate(&self) -> Result<()> {
        let all = self.install.iter().chain(&self.remove).chain(&self.reinstall);
        for req in all {
            if req.name.is_empty() {
                return Err(Error::InvalidParameters(format!(
                    "empty package name in requirement '{}'",
                    req
                )));
            }
        }
        Ok(())
    }
}

/// Summary of a planned transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub new_installed: Vec<String>,
    pub upgraded: Vec<String>,
    /// Installed packages moving to an older version
    pub downgraded: Vec<String>,
    pub removed: Vec<String>,
    /// Installs nobody asked for by name
    pub extra_installed: Vec<String>,
    /// Removals nobody asked for by name
    pub extra_removed: Vec<String>,
    pub download_size: u64,
    /// Change in installed size; negative when space is freed
    pub install_size: i64,
}

impl TransactionResult {
    pub fn new_installed_count(&self) -> usize {
        self.new_installed.len()
    }

    pub fn upgraded_count(&self) -> usize {
        self.upgraded.len()
    }

    pub fn downgraded_count(&self) -> usize {
        self.downgraded.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    pub fn extra_installed_count(&self) -> usize {
        self.extra_installed.len()
    }

    pub fn extra_removed_count(&self) -> usize {
        self.extra_removed.len()
    }

    /// Nothing would change
    pub fn is_empty(&self) -> bool {
        self.new_installed.is_empty()
            && self.upgraded.is_empty()
            && self.downgraded.is_empty()
            && self.removed.is_empty()
    }
}

/// Controller state for one planning call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Idle,
    Marking,
    Resolving,
    Collecting,
    Committed,
    RolledBack,
    Done,
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanState::Idle => "idle",
            PlanState::Marking => "marking",
            PlanState::Resolving => "resolving",
            PlanState::Collecting => "collecting",
            PlanState::Committed => "committed",
            PlanState::RolledBack => "rolled-back",
            PlanState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Names gathered while marking
#[derive(Debug, Default)]
pub(crate) struct PlanContext {
    /// Canonical names of resolved install targets
    pub requested_install: BTreeSet<String>,
    /// Names as the caller wrote them
    pub requested_remove: BTreeSet<String>,
    pub requested_reinstall: BTreeSet<String>,
    /// (name the caller used, package it resolved to)
    pub remove_targets: Vec<(String, PackageId)>,
}

impl PlanContext {
    /// Removals that count as requested: the caller's names plus the
    /// packages they resolved to
    pub fn removal_names<D: PackageDatabase>(&self, db: &D) -> BTreeSet<String> {
        let mut names = self.requested_remove.clone();
        for (_, pkg) in &self.remove_targets {
            names.insert(db.package_name(*pkg).to_string());
        }
        names
    }
}

/// Transaction controller
///
/// Holds the database for the duration of its lifetime, so calls against one
/// database are serialized by the borrow.
pub struct Planner<'a, D, S = ProblemResolver, I = RpmFileImporter> {
    db: &'a mut D,
    solver: S,
    importer: I,
    settings: PlannerSettings,
    state: PlanState,
}

impl<'a, D: PackageDatabase> Planner<'a, D> {
    pub fn new(db: &'a mut D) -> Self {
        Self::with_config(db, &PlannerConfig::default())
    }

    pub fn with_config(db: &'a mut D, config: &PlannerConfig) -> Self {
        let settings = config.planner.clone();
        Self {
            db,
            solver: ProblemResolver::new().with_max_passes(settings.max_fix_passes),
            importer: RpmFileImporter::new(settings.package_file_extensions.clone()),
            settings,
            state: PlanState::Idle,
        }
    }
}

impl<'a, D, S, I> Planner<'a, D, S, I>
where
    D: PackageDatabase,
    S: DependencySolver,
    I: FileImporter,
{
    pub fn with_parts(db: &'a mut D, solver: S, importer: I, settings: PlannerSettings) -> Self {
        Self {
            db,
            solver,
            importer,
            settings,
            state: PlanState::Idle,
        }
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn db(&self) -> &D {
        &*self.db
    }

    fn enter(&mut self, next: PlanState) {
        debug!("Planner state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Plan a transaction
    ///
    /// With `apply` the resulting marks, and any versions imported from
    /// package files, stay on the database for execution; otherwise the
    /// database is left exactly as it was.
    pub fn plan(&mut self, request: &TransactionRequest, apply: bool) -> Result<TransactionResult> {
        self.state = PlanState::Idle;
        self.discard_stale_errors();
        request.validate()?;

        info!(
            "Planning: {} install, {} remove, {} reinstall ({})",
            request.install.len(),
            request.remove.len(),
            request.reinstall.len(),
            if apply { "apply" } else { "simulate" }
        );

        self.execute(apply, |planner| {
            let request = planner.import_files(request)?;
            let remove_depends = request.allow_remove_depends || planner.settings.remove_depends;
            let mut ctx = PlanContext::default();
            let install_virtual = planner.settings.install_virtual;

            mark::mark_installs(
                planner.db,
                &mut planner.solver,
                &request.install,
                install_virtual,
                &mut ctx,
            )?;
            mark::mark_reinstalls(
                planner.db,
                &mut planner.solver,
                &planner.importer,
                &request.reinstall,
                install_virtual,
                &mut ctx,
            )?;
            mark::mark_removals(planner.db, &request.remove, request.purge, &mut ctx)?;

            conflict::check_conflicts(&*planner.db, &ctx.requested_install)?;
            let seeded = preseed::preseed_installs(planner.db);
            debug!("Preseeded {} dependencies", seeded);
            preseed::preseed_removals(&*planner.db)?;

            planner.enter(PlanState::Resolving);
            finalize::finalize(planner.db, &mut planner.solver, &ctx, remove_depends)?;

            planner.enter(PlanState::Collecting);
            let removals = ctx.removal_names(&*planner.db);
            Ok(collect_changes(&*planner.db, &ctx.requested_install, &removals))
        })
    }

    /// Shared simulate/apply scaffolding around a set of planning steps
    fn execute<F>(&mut self, apply: bool, steps: F) -> Result<TransactionResult>
    where
        F: FnOnce(&mut Self) -> Result<TransactionResult>,
    {
        let snapshot = self.db.snapshot();
        self.enter(PlanState::Marking);

        let outcome = match steps(self) {
            Ok(result) if apply => {
                self.enter(PlanState::Committed);
                Ok(result)
            }
            Ok(result) => {
                self.db.restore(snapshot);
                self.enter(PlanState::RolledBack);
                Ok(result)
            }
            Err(e) => {
                warn!("Planning failed, rolling back marks: {}", e);
                self.db.restore(snapshot);
                self.enter(PlanState::RolledBack);
                Err(e)
            }
        };

        let pending = self.db.take_errors();
        self.enter(PlanState::Done);

        match outcome {
            Ok(result) => {
                if !pending.is_empty() {
                    warn!("Discarding pending errors: {}", pending.join("; "));
                }
                info!(
                    "Plan: {} new, {} upgraded, {} removed, {} to download",
                    result.new_installed_count(),
                    result.upgraded_count(),
                    result.removed_count(),
                    result.download_size
                );
                Ok(result)
            }
            Err(e) => Err(e.with_context(&pending)),
        }
    }

    /// Errors queued by earlier unrelated operations must not show up in
    /// this call's result
    fn discard_stale_errors(&mut self) {
        let stale = self.db.take_errors();
        if !stale.is_empty() {
            warn!("Discarding {} stale database error(s)", stale.len());
        }
    }

    /// Register package-file arguments and replace them by package names
    fn import_files(&mut self, request: &TransactionRequest) -> Result<TransactionRequest> {
        let mut request = request.clone();
        let lists = [&mut request.install, &mut request.remove];
        for list in lists {
            for req in list.iter_mut() {
                if !self.importer.is_package_file(&req.name) {
                    continue;
                }
                let name = self.importer.import(self.db, &req.name)?;
                debug!("{} resolved to package {}", req.name, name);
                *req = Requirement::named(name);
            }
        }
        Ok(request)
    }
}
