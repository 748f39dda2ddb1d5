//! Index document types
//!
//! Defines the shared vocabulary of the secondary-index engine:
//! - `IndexValue`: a typed indexed value with a total order
//! - `IndexDocument`: one (index, keyspace, key, value, validity) claim
//! - `SecondaryIndex`: the definition of one index on one branch

use crate::matrix::{ValidityPeriod, ETERNAL};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Value type an index accepts
///
/// One index name binds to exactly one type; mixing types is an illegal
/// state surfaced at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexValueType {
    String,
    Long,
    Double,
}

impl fmt::Display for IndexValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValueType::String => write!(f, "String"),
            IndexValueType::Long => write!(f, "Long"),
            IndexValueType::Double => write!(f, "Double"),
        }
    }
}

/// One value produced by an indexer
///
/// Doubles order and hash by their bit pattern (`total_cmp`), so NaN is a
/// legal, self-equal indexed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexValue {
    String(String),
    Long(i64),
    Double(f64),
}

impl IndexValue {
    pub fn value_type(&self) -> IndexValueType {
        match self {
            IndexValue::String(_) => IndexValueType::String,
            IndexValue::Long(_) => IndexValueType::Long,
            IndexValue::Double(_) => IndexValueType::Double,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            IndexValue::String(_) => 0,
            IndexValue::Long(_) => 1,
            IndexValue::Double(_) => 2,
        }
    }
}

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexValue::String(a), IndexValue::String(b)) => a.cmp(b),
            (IndexValue::Long(a), IndexValue::Long(b)) => a.cmp(b),
            (IndexValue::Double(a), IndexValue::Double(b)) => a.total_cmp(b),
            // cross-type comparison only occurs transiently; rank by variant
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl Hash for IndexValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            IndexValue::String(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            IndexValue::Long(n) => {
                1u8.hash(state);
                n.hash(state);
            }
            IndexValue::Double(d) => {
                2u8.hash(state);
                d.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::String(s) => write!(f, "{}", s),
            IndexValue::Long(n) => write!(f, "{}", n),
            IndexValue::Double(d) => write!(f, "{}", d),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        IndexValue::String(s.to_string())
    }
}

impl From<i64> for IndexValue {
    fn from(n: i64) -> Self {
        IndexValue::Long(n)
    }
}

impl From<f64> for IndexValue {
    fn from(d: f64) -> Self {
        IndexValue::Double(d)
    }
}

/// One secondary-index document
///
/// States that key `key` in `keyspace` on `branch` produced `indexed_value`
/// under index `index_id` during `[valid_from, valid_to)`. Owned exclusively
/// by the `IndexDocumentStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: Uuid,
    pub index_id: Uuid,
    pub branch: String,
    pub keyspace: String,
    pub key: String,
    pub indexed_value: IndexValue,
    pub valid_from: u64,
    pub valid_to: u64,
}

impl IndexDocument {
    /// Create an open document `[valid_from, ∞)`
    pub fn open(
        index_id: Uuid,
        branch: impl Into<String>,
        keyspace: impl Into<String>,
        key: impl Into<String>,
        indexed_value: IndexValue,
        valid_from: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            index_id,
            branch: branch.into(),
            keyspace: keyspace.into(),
            key: key.into(),
            indexed_value,
            valid_from,
            valid_to: ETERNAL,
        }
    }

    /// Create a document already terminated at `valid_to`
    pub fn terminated(
        index_id: Uuid,
        branch: impl Into<String>,
        keyspace: impl Into<String>,
        key: impl Into<String>,
        indexed_value: IndexValue,
        valid_from: u64,
        valid_to: u64,
    ) -> Self {
        Self {
            valid_to,
            ..Self::open(index_id, branch, keyspace, key, indexed_value, valid_from)
        }
    }

    pub fn is_open(&self) -> bool {
        self.valid_to == ETERNAL
    }

    pub fn validity(&self) -> ValidityPeriod {
        ValidityPeriod::new(self.valid_from, self.valid_to)
    }

    pub fn valid_at(&self, timestamp: u64) -> bool {
        timestamp >= self.valid_from && timestamp < self.valid_to
    }
}

/// Definition of one secondary index on one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndex {
    pub id: Uuid,
    /// Index on the parent branch this one delegates pre-fork queries to
    pub parent_index_id: Option<Uuid>,
    pub branch: String,
    /// Period during which this index applies to writes
    pub valid_period: ValidityPeriod,
    /// Property name the indexer extracts
    pub indexed_property: String,
    pub value_type: IndexValueType,
    /// Documents may not reflect current data; excluded from queries until
    /// rebuilt
    pub dirty: bool,
}

impl SecondaryIndex {
    pub fn new(
        branch: impl Into<String>,
        indexed_property: impl Into<String>,
        value_type: IndexValueType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_index_id: None,
            branch: branch.into(),
            valid_period: ValidityPeriod::eternal(),
            indexed_property: indexed_property.into(),
            value_type,
            dirty: true,
        }
    }
}
