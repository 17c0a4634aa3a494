// src/config.rs

//! Planner configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! [planner]
//! install_virtual = false
//! remove_depends = false
//! package_file_extensions = [".rpm"]
//! max_fix_passes = 10
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pkgplan/planner.toml";

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub planner: PlannerSettings,
}

/// The `[planner]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Pick the best-scored provider of a virtual package instead of
    /// reporting the name as ambiguous
    #[serde(default)]
    pub install_virtual: bool,

    /// Let the solver remove installed packages whose dependencies go away
    #[serde(default)]
    pub remove_depends: bool,

    /// Arguments ending in one of these are treated as package files
    #[serde(default = "default_extensions")]
    pub package_file_extensions: Vec<String>,

    /// Upper bound on solver passes
    #[serde(default = "default_max_fix_passes")]
    pub max_fix_passes: usize,
}

fn default_extensions() -> Vec<String> {
    vec![".rpm".to_string()]
}

fn default_max_fix_passes() -> usize {
    10
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            install_virtual: false,
            remove_depends: false,
            package_file_extensions: default_extensions(),
            max_fix_passes: default_max_fix_passes(),
        }
    }
}

impl PlannerConfig {
    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: PlannerConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration
    ///
    /// With no explicit path the default location is used, and a missing
    /// default file means default settings. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.planner.max_fix_passes == 0 {
            return Err(Error::Config("max_fix_passes must be at least 1".to_string()));
        }
        if let Some(ext) = self
            .planner
            .package_file_extensions
            .iter()
            .find(|e| !e.starts_with('.') || e.len() < 2)
        {
            return Err(Error::Config(format!(
                "Invalid package file extension '{}'",
                ext
            )));
        }
        Ok(())
    }
}
