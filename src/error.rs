// src/error.rs

//! Error types for the planner
//!
//! Every planner step returns [`Result`]; the transaction controller stops at
//! the first failure and hands exactly one [`Error`] back to the caller.

use std::fmt;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a failed planning call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameters,
    PackageNotFound,
    NoInstallableProviders,
    AmbiguousVirtualPackage,
    ConflictDetected,
    EssentialPackageProtected,
    DependencyBroken,
    DownloadFailed,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidParameters => "invalid-parameters",
            ErrorKind::PackageNotFound => "package-not-found",
            ErrorKind::NoInstallableProviders => "no-installable-providers",
            ErrorKind::AmbiguousVirtualPackage => "ambiguous-virtual-package",
            ErrorKind::ConflictDetected => "conflict-detected",
            ErrorKind::EssentialPackageProtected => "essential-package-protected",
            ErrorKind::DependencyBroken => "dependency-broken",
            ErrorKind::DownloadFailed => "download-failed",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One provider of a virtual package, as reported in an ambiguity error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderChoice {
    pub name: String,
    /// Candidate version string, if the provider has one
    pub version: Option<String>,
    pub installed: bool,
}

impl fmt::Display for ProviderChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(ref version) = self.version {
            write!(f, " {}", version)?;
        }
        if self.installed {
            write!(f, " [Installed]")?;
        }
        Ok(())
    }
}

fn format_providers(providers: &[ProviderChoice]) -> String {
    providers
        .iter()
        .map(|p| format!("  {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors that can occur while planning a transaction
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    PackageNotFound(String),

    #[error("Package {0} has no installable candidate or providers")]
    NoInstallableProviders(String),

    #[error("Virtual package {name} is provided by:\n{}", format_providers(.providers))]
    AmbiguousVirtualPackage {
        name: String,
        providers: Vec<ProviderChoice>,
    },

    #[error("Conflicting packages: {first} and {second}")]
    ConflictDetected { first: String, second: String },

    #[error("Cannot remove essential package: {0}")]
    EssentialPackageProtected(String),

    /// Impossible request. `package` and `dependency` name the first broken
    /// package and its first unmet critical dependency when attributable.
    #[error("Some packages could not be installed. {detail}")]
    DependencyBroken {
        package: Option<String>,
        dependency: Option<String>,
        detail: String,
    },

    #[error("{0}")]
    DownloadFailed(String),

    #[error("{0}")]
    Unknown(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Package import failed: {0}")]
    Import(String),
}

impl Error {
    /// Classify this error according to the planner taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidParameters(_) => ErrorKind::InvalidParameters,
            Error::PackageNotFound(_) => ErrorKind::PackageNotFound,
            Error::NoInstallableProviders(_) => ErrorKind::NoInstallableProviders,
            Error::AmbiguousVirtualPackage { .. } => ErrorKind::AmbiguousVirtualPackage,
            Error::ConflictDetected { .. } => ErrorKind::ConflictDetected,
            Error::EssentialPackageProtected(_) => ErrorKind::EssentialPackageProtected,
            Error::DependencyBroken { .. } => ErrorKind::DependencyBroken,
            Error::DownloadFailed(_) => ErrorKind::DownloadFailed,
            Error::Unknown(_)
            | Error::Database(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::Import(_) => ErrorKind::Unknown,
        }
    }

    /// Build a `DependencyBroken` error that cannot be attributed to a package
    pub fn broken(detail: impl Into<String>) -> Self {
        Error::DependencyBroken {
            package: None,
            dependency: None,
            detail: detail.into(),
        }
    }

    /// Fold drained lower-layer messages into this error's detail
    ///
    /// Only errors whose payload is free text absorb the context; structured
    /// variants are returned untouched so callers can still match on them.
    pub fn with_context(self, messages: &[String]) -> Self {
        if messages.is_empty() {
            return self;
        }
        let extra = messages.join("; ");
        match self {
            Error::PackageNotFound(msg) => Error::PackageNotFound(format!("{}; {}", msg, extra)),
            Error::DownloadFailed(msg) => Error::DownloadFailed(format!("{}; {}", msg, extra)),
            Error::Unknown(msg) => Error::Unknown(format!("{}; {}", msg, extra)),
            Error::InvalidParameters(msg) => {
                Error::InvalidParameters(format!("{}; {}", msg, extra))
            }
            Error::DependencyBroken {
                package,
                dependency,
                detail,
            } => Error::DependencyBroken {
                package,
                dependency,
                detail: format!("{}; {}", detail, extra),
            },
            other => other,
        }
    }
}
