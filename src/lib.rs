// src/lib.rs

//! Package transaction planner
//!
//! Resolves requested installs, removals and reinstalls against a package
//! database, lets a dependency solver settle the consequences, and reports
//! what the transaction would do.
//!
//! # Architecture
//!
//! - [`cache`]: package database trait and the in-memory arena behind it
//! - [`solver`]: dependency solver contract and the default problem resolver
//! - [`planner`]: the transaction controller and its marking steps
//! - [`db`]: SQLite storage the command line front end loads from
//!
//! ```no_run
//! use pkgplan::{MemoryCache, Planner, TransactionRequest, VersionSpec};
//!
//! let mut cache = MemoryCache::new();
//! let editor = cache.add_package("editor");
//! cache.add_version(editor, VersionSpec::new("1.0").sizes(1000, 4000));
//!
//! let mut planner = Planner::new(&mut cache);
//! let result = planner.plan(&TransactionRequest::new().install(["editor"]), false)?;
//! assert_eq!(result.new_installed, vec!["editor"]);
//! # Ok::<(), pkgplan::Error>(())
//! ```

pub mod cache;
pub mod config;
pub mod db;
mod error;
pub mod import;
pub mod planner;
pub mod requirement;
pub mod solver;
pub mod version;

pub use cache::{
    AutoMark, DepType, Dependency, Mark, MemoryCache, PackageDatabase, PackageId, VersionId,
    VersionSpec,
};
pub use config::{PlannerConfig, PlannerSettings};
pub use error::{Error, ErrorKind, ProviderChoice, Result};
pub use import::{FileImporter, RpmFileImporter};
pub use planner::{PlanState, Planner, TransactionRequest, TransactionResult};
pub use requirement::Requirement;
pub use solver::{DependencySolver, ProblemResolver};
pub use version::{CompareOp, Constraint, RpmComparator, VersionComparator};
