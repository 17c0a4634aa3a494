// src/version/mod.rs

//! Version handling and the comparator used by the planner
//!
//! Versions are RPM-style `[epoch:]version[-release]` strings compared
//! segment by segment (digits numerically, letters lexically, `~` sorting
//! before everything and `^` after the base version).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed RPM version with epoch, version, and release components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RpmVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    /// Parse an RPM version string
    ///
    /// Format: [epoch:]version[-release]
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1.2.3-4.el8" → epoch=0, version="1.2.3", release=Some("4.el8")
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (epoch_str, rest) = match s.find(':') {
            Some(colon_pos) => (&s[..colon_pos], &s[colon_pos + 1..]),
            None => ("0", s),
        };

        let epoch = if epoch_str.is_empty() {
            0 // ":1.0.0" carries an empty epoch
        } else {
            epoch_str.parse::<u64>().map_err(|e| {
                Error::InvalidParameters(format!("Invalid epoch in version '{}': {}", s, e))
            })?
        };

        // The release starts at the last dash; versions may not contain one
        let (version, release) = match rest.rfind('-') {
            Some(dash_pos) => (
                rest[..dash_pos].to_string(),
                Some(rest[dash_pos + 1..].to_string()),
            ),
            None => (rest.to_string(), None),
        };

        if version.is_empty() {
            return Err(Error::InvalidParameters(format!(
                "Empty version component in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Compare two RPM versions
    ///
    /// A missing release on either side matches any release.
    pub fn compare(&self, other: &RpmVersion) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match rpmvercmp(&self.version, &other.version) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (&self.release, &other.release) {
            (Some(a), Some(b)) => rpmvercmp(a, b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Segment-wise comparison of two version fragments (rpmvercmp)
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut one = a.as_bytes();
    let mut two = b.as_bytes();

    loop {
        let skip = |s: &[u8]| {
            s.iter()
                .position(|c| c.is_ascii_alphanumeric() || *c == b'~' || *c == b'^')
                .unwrap_or(s.len())
        };
        one = &one[skip(one)..];
        two = &two[skip(two)..];

        // Tilde sorts before everything, even the end of the string
        if one.first() == Some(&b'~') || two.first() == Some(&b'~') {
            if one.first() != Some(&b'~') {
                return Ordering::Greater;
            }
            if two.first() != Some(&b'~') {
                return Ordering::Less;
            }
            one = &one[1..];
            two = &two[1..];
            continue;
        }

        // Caret sorts after the end of the string but before anything else
        if one.first() == Some(&b'^') || two.first() == Some(&b'^') {
            if one.is_empty() {
                return Ordering::Less;
            }
            if two.is_empty() {
                return Ordering::Greater;
            }
            if one.first() != Some(&b'^') {
                return Ordering::Greater;
            }
            if two.first() != Some(&b'^') {
                return Ordering::Less;
            }
            one = &one[1..];
            two = &two[1..];
            continue;
        }

        if one.is_empty() || two.is_empty() {
            break;
        }

        let numeric = one[0].is_ascii_digit();
        let segment_len = |s: &[u8]| {
            s.iter()
                .position(|c| {
                    if numeric {
                        !c.is_ascii_digit()
                    } else {
                        !c.is_ascii_alphabetic()
                    }
                })
                .unwrap_or(s.len())
        };
        let len_one = segment_len(one);
        let len_two = segment_len(two);
        let (seg_one, rest_one) = one.split_at(len_one);
        let (seg_two, rest_two) = two.split_at(len_two);

        // Segments of different types: numeric is newer
        if seg_two.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            let trim = |s: &[u8]| {
                let start = s.iter().position(|c| *c != b'0').unwrap_or(s.len());
                s[start..].to_vec()
            };
            let n1 = trim(seg_one);
            let n2 = trim(seg_two);
            n1.len().cmp(&n2.len()).then_with(|| n1.cmp(&n2))
        } else {
            seg_one.cmp(seg_two)
        };

        if ord != Ordering::Equal {
            return ord;
        }

        one = rest_one;
        two = rest_two;
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

/// Compare two version strings, falling back to a plain segment comparison
/// when either side does not parse as an RPM version
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (RpmVersion::parse(a), RpmVersion::parse(b)) {
        (Ok(v1), Ok(v2)) => v1.compare(&v2),
        _ => rpmvercmp(a, b),
    }
}

/// Version comparison operators accepted in requirements and dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessEq,
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = ">=")]
    GreaterEq,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "!=")]
    NotEquals,
}

impl CompareOp {
    /// Operators in the order a requirement string is scanned for them
    ///
    /// Two-character operators come first so ">=" is never read as ">".
    pub const SCAN_ORDER: [CompareOp; 6] = [
        CompareOp::LessEq,
        CompareOp::GreaterEq,
        CompareOp::NotEquals,
        CompareOp::Equals,
        CompareOp::Less,
        CompareOp::Greater,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Less => "<",
            CompareOp::LessEq => "<=",
            CompareOp::Equals => "=",
            CompareOp::GreaterEq => ">=",
            CompareOp::Greater => ">",
            CompareOp::NotEquals => "!=",
        }
    }

    /// Whether an ordering of `version` relative to the constraint satisfies
    /// this operator
    pub fn accepts(&self, ord: Ordering) -> bool {
        match self {
            CompareOp::Less => ord == Ordering::Less,
            CompareOp::LessEq => ord != Ordering::Greater,
            CompareOp::Equals => ord == Ordering::Equal,
            CompareOp::GreaterEq => ord != Ordering::Less,
            CompareOp::Greater => ord == Ordering::Greater,
            CompareOp::NotEquals => ord != Ordering::Equal,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "<" | "<<" => Ok(CompareOp::Less),
            "<=" => Ok(CompareOp::LessEq),
            "=" | "==" => Ok(CompareOp::Equals),
            ">=" => Ok(CompareOp::GreaterEq),
            ">" | ">>" => Ok(CompareOp::Greater),
            "!=" => Ok(CompareOp::NotEquals),
            other => Err(format!("Invalid comparison operator: {other}")),
        }
    }
}

/// An operator plus the version it compares against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub op: CompareOp,
    pub version: String,
}

impl Constraint {
    pub fn new(op: CompareOp, version: impl Into<String>) -> Self {
        Self {
            op,
            version: version.into(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.version)
    }
}

/// Version comparison collaborator used by the planner and the database
pub trait VersionComparator {
    /// Order two version strings
    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// Check `version <op> constraint`
    fn check(&self, version: &str, op: CompareOp, constraint: &str) -> bool {
        op.accepts(self.compare(version, constraint))
    }

    /// Check a version against an optional constraint; `None` always matches
    fn satisfies(&self, version: &str, constraint: Option<&Constraint>) -> bool {
        match constraint {
            Some(c) => self.check(version, c.op, &c.version),
            None => true,
        }
    }
}

/// Default comparator for RPM-style versions
#[derive(Debug, Clone, Copy, Default)]
pub struct RpmComparator;

impl VersionComparator for RpmComparator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        compare_versions(a, b)
    }
}
