//! Version comparison for release tags.
//!
//! Versions are dot-separated non-negative integers with an optional leading
//! `v`. Missing trailing components count as zero, so `1.2` equals `1.2.0`.
//! Anything else (empty strings, pre-release suffixes, letters) is rejected
//! with [`CoreError::Validation`] rather than compared loosely.

use anyhow::Result;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::CoreError;

/// Where `latest` stands relative to `current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrdering {
    Newer,
    Older,
    Equal,
}

/// A parsed dotted version.
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    fn component(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = strip_v(s.trim());
        if trimmed.is_empty() {
            return Err(CoreError::Validation(format!(
                "Malformed version string '{}'",
                s
            )));
        }

        let parts = trimmed
            .split('.')
            .map(|part| {
                // u64::from_str accepts a leading '+', which is not a version digit
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(CoreError::Validation(format!(
                        "Malformed version string '{}'",
                        s
                    )));
                }
                part.parse::<u64>().map_err(|_| {
                    CoreError::Validation(format!("Version component out of range in '{}'", s))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { parts })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", joined.join("."))
    }
}

/// Strips a single leading `v`/`V` from a tag.
pub fn strip_v(tag: &str) -> &str {
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

/// Version comparator - pure functions over version strings.
pub struct VersionComparator;

impl VersionComparator {
    /// Compare `latest` against `current`.
    pub fn compare(current: &str, latest: &str) -> Result<VersionOrdering> {
        let current: Version = current.parse()?;
        let latest: Version = latest.parse()?;

        Ok(match latest.cmp(&current) {
            Ordering::Greater => VersionOrdering::Newer,
            Ordering::Less => VersionOrdering::Older,
            Ordering::Equal => VersionOrdering::Equal,
        })
    }

    /// True only when `latest` is strictly newer than `current`.
    pub fn is_newer(current: &str, latest: &str) -> Result<bool> {
        Ok(Self::compare(current, latest)? == VersionOrdering::Newer)
    }
}
