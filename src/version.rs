//! Opaque, ordered version strings and the advertised-availability record.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::Method;

/// An opaque version string.
///
/// Versions are compared numerically component-by-component when every
/// dot-separated component on both sides parses as an integer, and
/// fall back to plain string comparison otherwise. This matches the
/// common `MAJOR.MINOR.PATCH` convention used by router and plugin
/// releases without requiring callers to commit to a fixed arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    /// Wrap a raw version string.
    pub fn new(raw: impl Into<String>) -> Self {
        Version(raw.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse this version into a numeric component tuple, if every
    /// dot-separated component is a valid non-negative integer.
    fn numeric_components(&self) -> Option<Vec<u64>> {
        self.0
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version::new(s)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric_components(), other.numeric_components()) {
            (Some(a), Some(b)) => {
                let len = a.len().max(b.len());
                for i in 0..len {
                    let ai = a.get(i).copied().unwrap_or(0);
                    let bi = b.get(i).copied().unwrap_or(0);
                    match ai.cmp(&bi) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                Ordering::Equal
            }
            _ => self.0.cmp(&other.0),
        }
    }
}

/// A version the coordinator has learned is available, together with the
/// sources it can be fetched from.
///
/// Two records for the same `(kind, id)` merge additively: a newer
/// version replaces the record outright, but a repeated announcement of
/// the *same* version only adds any sources that weren't already known
/// (see [`AvailableVersion::merge_sources`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableVersion {
    /// The version being advertised.
    pub version: Version,
    /// The minimum installed version required before this update applies,
    /// if the announcing checker cares.
    pub min_version: Option<Version>,
    /// Candidate sources, keyed by the method used to fetch from them.
    pub sources: HashMap<Method, Vec<String>>,
}

impl AvailableVersion {
    /// Build a record with a single source.
    pub fn new(version: Version, min_version: Option<Version>, method: Method, uri: impl Into<String>) -> Self {
        let mut sources = HashMap::new();
        sources.insert(method, vec![uri.into()]);
        AvailableVersion { version, min_version, sources }
    }

    /// Merge `other`'s sources into `self`, skipping URIs already present
    /// for a given method. Callers are expected to have already checked
    /// that `other.version == self.version`.
    pub fn merge_sources(&mut self, other: &AvailableVersion) {
        for (method, uris) in &other.sources {
            let entry = self.sources.entry(*method).or_default();
            for uri in uris {
                if !entry.contains(uri) {
                    entry.push(uri.clone());
                }
            }
        }
    }
}
