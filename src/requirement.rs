// src/requirement.rs

//! Requirement strings as typed by users: `name`, `name>=1.2`, `name = 2:3.0-1`

use crate::version::{CompareOp, Constraint};
use std::fmt;

/// A package name with an optional version constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub name: String,
    pub constraint: Option<Constraint>,
}

impl Requirement {
    /// A bare name with no constraint
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }

    /// Parse a raw requirement string
    ///
    /// Operators are scanned in the order `<=`, `>=`, `!=`, `=`, `<`, `>`; the
    /// name is everything before the first match and the version everything
    /// after it, trimmed. Any string is accepted. An operator with nothing
    /// after it yields no constraint.
    pub fn parse(raw: &str) -> Self {
        for op in CompareOp::SCAN_ORDER {
            let Some(pos) = raw.find(op.as_str()) else {
                continue;
            };
            let name = raw[..pos].trim().to_string();
            let version = raw[pos + op.as_str().len()..].trim();
            let constraint = if version.is_empty() {
                None
            } else {
                Some(Constraint::new(op, version))
            };
            return Self { name, constraint };
        }

        Self::named(raw.trim())
    }

    pub fn op(&self) -> Option<CompareOp> {
        self.constraint.as_ref().map(|c| c.op)
    }

    pub fn version(&self) -> Option<&str> {
        self.constraint.as_ref().map(|c| c.version.as_str())
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(c) => write!(f, "{} {}", self.name, c),
            None => write!(f, "{}", self.name),
        }
    }
}
