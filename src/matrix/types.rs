//! Core data types for the temporal matrix
//!
//! This module defines the fundamental types of the versioned key/value
//! layer:
//! - `TemporalKey`: (key, timestamp) coordinate of one version of one key
//! - `ValidityPeriod`: half-open timestamp interval
//! - `Identifier`: fully-qualified name of one version of one key
//! - `KeySetModifications`: added/removed key sets as of a timestamp

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Timestamp value standing in for "forever" in half-open intervals
pub const ETERNAL: u64 = u64::MAX;

/// Scan direction for history and index queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Ascending,
    Descending,
}

/// Coordinate of one version of one key within a matrix
///
/// Ordered by key first, timestamp second, matching the primary layout of
/// the matrix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TemporalKey {
    pub key: String,
    pub timestamp: u64,
}

impl TemporalKey {
    pub fn new(key: impl Into<String>, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }
}

impl fmt::Display for TemporalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.timestamp)
    }
}

/// Half-open validity interval `[lower_bound, upper_bound)`
///
/// `upper_bound == ETERNAL` means "still valid". Zero-width periods are
/// illegal; constructors reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidityPeriod {
    pub lower_bound: u64,
    pub upper_bound: u64,
}

impl ValidityPeriod {
    /// Create a bounded period. Panics in debug builds on zero-width input;
    /// callers validate first (see `IndexDocumentStore::terminate`).
    pub fn new(lower_bound: u64, upper_bound: u64) -> Self {
        debug_assert!(lower_bound < upper_bound, "zero-width validity period");
        Self {
            lower_bound,
            upper_bound,
        }
    }

    /// Period open towards the future: `[lower_bound, ∞)`
    pub fn open_ended(lower_bound: u64) -> Self {
        Self {
            lower_bound,
            upper_bound: ETERNAL,
        }
    }

    /// The full timestamp domain `[0, ∞)`
    pub fn eternal() -> Self {
        Self {
            lower_bound: 0,
            upper_bound: ETERNAL,
        }
    }

    /// Whether this period is open towards the future
    pub fn is_open(&self) -> bool {
        self.upper_bound == ETERNAL
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        timestamp >= self.lower_bound && timestamp < self.upper_bound
    }
}

impl fmt::Display for ValidityPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open() {
            write!(f, "[{}, ∞)", self.lower_bound)
        } else {
            write!(f, "[{}, {})", self.lower_bound, self.upper_bound)
        }
    }
}

/// Fully-qualified name of one version of one key
///
/// The indexing engine's unit of work: one write to one key on one branch at
/// one timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub branch: String,
    pub timestamp: u64,
    pub keyspace: String,
    pub key: String,
}

impl Identifier {
    pub fn new(
        branch: impl Into<String>,
        timestamp: u64,
        keyspace: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            branch: branch.into(),
            timestamp,
            keyspace: keyspace.into(),
            key: key.into(),
        }
    }
}

/// Result of replaying a matrix up to a timestamp: which keys exist and
/// which were deleted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySetModifications {
    /// Keys whose last entry at or before the timestamp holds a value
    pub added: HashSet<String>,
    /// Keys whose last entry at or before the timestamp is a tombstone
    pub removed: HashSet<String>,
}
