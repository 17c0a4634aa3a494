// src/import.rs

//! Package file imports
//!
//! Install and remove arguments that name a package file on disk are read
//! and registered with the database before planning starts, so the rest of
//! the planner only ever sees package names.

use crate::cache::{DepType, Dependency, PackageDatabase, VersionSpec};
use crate::error::{Error, Result};
use crate::version::{CompareOp, Constraint};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// File-import collaborator
pub trait FileImporter {
    /// Whether a request argument names a package file
    fn is_package_file(&self, arg: &str) -> bool;

    /// Register the file's package with the database and return its name
    fn import<D: PackageDatabase>(&self, db: &mut D, path: &str) -> Result<String>;
}

/// Imports `.rpm` files using the `rpm` crate header parser
#[derive(Debug, Clone)]
pub struct RpmFileImporter {
    extensions: Vec<String>,
}

impl Default for RpmFileImporter {
    fn default() -> Self {
        Self::new(vec![".rpm".to_string()])
    }
}

impl RpmFileImporter {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    /// Read an RPM file into a package name and version entry
    pub fn read(path: &str) -> Result<(String, VersionSpec)> {
        debug!("Reading RPM package: {}", path);

        let file_len = std::fs::metadata(path)
            .map_err(|e| Error::Import(format!("Failed to stat {}: {}", path, e)))?
            .len();
        let file = File::open(path)
            .map_err(|e| Error::Import(format!("Failed to open RPM file: {}", e)))?;
        let mut reader = BufReader::new(file);
        let pkg = rpm::Package::parse(&mut reader)
            .map_err(|e| Error::Import(format!("Failed to parse RPM: {}", e)))?;
        let meta = &pkg.metadata;

        let name = meta
            .get_name()
            .map_err(|e| Error::Import(format!("Failed to get package name: {}", e)))?
            .to_string();
        let version = meta
            .get_version()
            .map_err(|e| Error::Import(format!("Failed to get package version: {}", e)))?;
        let release = meta.get_release().ok().filter(|r| !r.is_empty());
        let epoch = meta.get_epoch().unwrap_or(0);

        let mut evr = String::new();
        if epoch > 0 {
            evr.push_str(&format!("{}:", epoch));
        }
        evr.push_str(version);
        if let Some(release) = release {
            evr.push('-');
            evr.push_str(release);
        }

        let installed_size: u64 = meta
            .get_file_entries()
            .map(|entries| entries.iter().map(|e| e.size as u64).sum())
            .unwrap_or(0);

        let mut spec = VersionSpec::new(evr)
            .sizes(file_len, installed_size)
            .origin(path);

        for provide in meta.get_provides().unwrap_or_default() {
            let version = (!provide.version.is_empty()).then_some(provide.version.as_str());
            spec = spec.provides(provide.name.as_str(), version);
        }

        let edges = [
            (DepType::Depends, meta.get_requires().unwrap_or_default()),
            (DepType::Conflicts, meta.get_conflicts().unwrap_or_default()),
            (DepType::Obsoletes, meta.get_obsoletes().unwrap_or_default()),
        ];
        for (dep_type, deps) in edges {
            for dep in deps {
                // rpmlib features and file paths are not package names
                if dep.name.starts_with("rpmlib(") || dep.name.starts_with('/') {
                    continue;
                }
                let mut edge = Dependency::new(dep_type, dep.name.as_str());
                if !dep.version.is_empty()
                    && let Some(op) = op_from_flags(dep.flags)
                {
                    edge.constraint = Some(Constraint::new(op, dep.version.as_str()));
                }
                spec = spec.dep(edge);
            }
        }

        debug!(
            "Read RPM: {} {} ({} provides, {} dependencies)",
            name,
            spec.version,
            spec.provides.len(),
            spec.depends.len()
        );

        Ok((name, spec))
    }
}

/// Convert RPM dependency flags to a comparison operator
fn op_from_flags(flags: rpm::DependencyFlags) -> Option<CompareOp> {
    use rpm::DependencyFlags;

    let less = flags.contains(DependencyFlags::LESS);
    let greater = flags.contains(DependencyFlags::GREATER);
    let equal = flags.contains(DependencyFlags::EQUAL);
    match (less, greater, equal) {
        (true, false, true) => Some(CompareOp::LessEq),
        (false, true, true) => Some(CompareOp::GreaterEq),
        (true, false, false) => Some(CompareOp::Less),
        (false, true, false) => Some(CompareOp::Greater),
        (false, false, true) => Some(CompareOp::Equals),
        (true, true, false) => Some(CompareOp::NotEquals),
        _ => None,
    }
}

impl FileImporter for RpmFileImporter {
    fn is_package_file(&self, arg: &str) -> bool {
        let lower = arg.to_ascii_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
            && Path::new(arg).file_stem().is_some()
    }

    fn import<D: PackageDatabase>(&self, db: &mut D, path: &str) -> Result<String> {
        let (name, spec) = Self::read(path)?;
        let version = spec.version.clone();
        db.register_file_version(&name, spec)?;
        info!("Imported {} {} from {}", name, version, path);
        Ok(name)
    }
}
