//! Version strings and comparable version tuples
//!
//! Schema directories are named with underscores (`1_30_0`) while devices
//! report dotted versions (`1.30.0`). Both forms parse to the same
//! [`VersionTuple`].

use std::fmt;

/// Normalize a version string to directory form (dots become underscores)
pub fn normalize_version(version: &str) -> String {
    version.replace('.', "_")
}

/// Convert a normalized version back to dotted form
pub fn denormalize_version(version: &str) -> String {
    version.replace('_', ".")
}

/// Ordered tuple of non-negative integers parsed from a version string
///
/// Components that are not purely ASCII digits are dropped, so `1.30.0-rc1`
/// parses as `(1, 30)`. A tuple with no components is unparseable.
/// Ordering is lexicographic; a proper prefix orders before its extensions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VersionTuple(Vec<u64>);

impl VersionTuple {
    /// Parse a dotted or underscored version string
    ///
    /// Returns `None` when no component could be parsed.
    pub fn parse(version: &str) -> Option<Self> {
        let parts: Vec<u64> = normalize_version(version)
            .split('_')
            .filter(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|part| part.parse().ok())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(Self(parts))
        }
    }

    /// Build a tuple from explicit components
    pub fn from_parts(parts: impl Into<Vec<u64>>) -> Self {
        Self(parts.into())
    }

    /// Return a copy padded with trailing zeros to at least `len` components
    pub fn padded(&self, len: usize) -> Self {
        let mut parts = self.0.clone();
        if parts.len() < len {
            parts.resize(len, 0);
        }
        Self(parts)
    }

    pub fn parts(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn major(&self) -> Option<u64> {
        self.0.first().copied()
    }

    pub fn minor(&self) -> Option<u64> {
        self.0.get(1).copied()
    }

    pub fn patch(&self) -> Option<u64> {
        self.0.get(2).copied()
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", part)?;
            first = false;
        }
        Ok(())
    }
}
