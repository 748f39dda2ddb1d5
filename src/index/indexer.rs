//! Indexers
//!
//! An indexer derives zero or more [`IndexValue`]s from an opaque payload.
//! The indexing engine never interprets payloads itself; the indexer is the
//! only component that knows their shape.
//!
//! [`JsonPropertyIndexer`] is the built-in implementation for JSON-encoded
//! payloads: it extracts one named field as a String, Long or Double, and
//! fans an array field out into one value per element.

use crate::index::document::{IndexValue, IndexValueType};
use std::collections::HashSet;

/// Derives indexed values from an opaque payload
///
/// Implementations must be deterministic: the same payload always produces
/// the same value set, otherwise diff-based incremental maintenance breaks.
pub trait Indexer: Send + Sync {
    /// Value type every produced value has
    fn value_type(&self) -> IndexValueType;

    /// All indexed values derivable from the payload; empty when the payload
    /// contributes nothing to this index
    fn index_values(&self, payload: &[u8]) -> Vec<IndexValue>;
}

/// Extracts a named field from JSON-encoded payloads
#[derive(Debug, Clone)]
pub struct JsonPropertyIndexer {
    property: String,
    value_type: IndexValueType,
}

impl JsonPropertyIndexer {
    pub fn string(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value_type: IndexValueType::String,
        }
    }

    pub fn long(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value_type: IndexValueType::Long,
        }
    }

    pub fn double(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value_type: IndexValueType::Double,
        }
    }

    fn convert(&self, value: &serde_json::Value) -> Option<IndexValue> {
        match self.value_type {
            IndexValueType::String => value.as_str().map(|s| IndexValue::String(s.to_string())),
            IndexValueType::Long => value.as_i64().map(IndexValue::Long),
            IndexValueType::Double => value.as_f64().map(IndexValue::Double),
        }
    }
}

impl Indexer for JsonPropertyIndexer {
    fn value_type(&self) -> IndexValueType {
        self.value_type
    }

    fn index_values(&self, payload: &[u8]) -> Vec<IndexValue> {
        let parsed: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Skipping unparseable payload for '{}': {}", self.property, e);
                return Vec::new();
            }
        };

        match parsed.get(&self.property) {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(elements)) => elements
                .iter()
                .filter_map(|element| self.convert(element))
                .collect(),
            Some(value) => self.convert(value).into_iter().collect(),
        }
    }
}

/// Value diff between the old and new version of one payload
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ValueDiff {
    /// Values the new version produces that the old one did not
    pub added: HashSet<IndexValue>,
    /// Values the old version produced that the new one no longer does
    pub removed: HashSet<IndexValue>,
}

impl ValueDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Diff the indexed values of an old and new payload through one indexer
///
/// `None` payloads (key absent or tombstoned) produce no values, so a pure
/// insert diffs everything as added and a pure delete as removed.
pub fn diff_values(
    indexer: &dyn Indexer,
    old_payload: Option<&[u8]>,
    new_payload: Option<&[u8]>,
) -> ValueDiff {
    let old_values: HashSet<IndexValue> = old_payload
        .map(|payload| indexer.index_values(payload).into_iter().collect())
        .unwrap_or_default();
    let new_values: HashSet<IndexValue> = new_payload
        .map(|payload| indexer.index_values(payload).into_iter().collect())
        .unwrap_or_default();

    ValueDiff {
        added: new_values.difference(&old_values).cloned().collect(),
        removed: old_values.difference(&new_values).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(payload: &str) -> Vec<u8> {
        payload.as_bytes().to_vec()
    }

    #[test]
    fn test_string_property() {
        let indexer = JsonPropertyIndexer::string("name");
        let values = indexer.index_values(&json(r#"{"name": "John", "age": 42}"#));
        assert_eq!(values, vec![IndexValue::from("John")]);
    }

    #[test]
    fn test_missing_and_null_fields() {
        let indexer = JsonPropertyIndexer::string("name");
        assert!(indexer.index_values(&json(r#"{"age": 42}"#)).is_empty());
        assert!(indexer.index_values(&json(r#"{"name": null}"#)).is_empty());
    }

    #[test]
    fn test_array_fans_out() {
        let indexer = JsonPropertyIndexer::string("tags");
        let values = indexer.index_values(&json(r#"{"tags": ["red", "blue"]}"#));
        assert_eq!(values.len(), 2);
        assert!(values.contains(&IndexValue::from("red")));
        assert!(values.contains(&IndexValue::from("blue")));
    }

    #[test]
    fn test_type_mismatch_yields_nothing() {
        let indexer = JsonPropertyIndexer::long("name");
        assert!(indexer.index_values(&json(r#"{"name": "John"}"#)).is_empty());
    }

    #[test]
    fn test_unparseable_payload_yields_nothing() {
        let indexer = JsonPropertyIndexer::string("name");
        assert!(indexer.index_values(b"\x00\x01not json").is_empty());
    }

    #[test]
    fn test_diff_insert_update_delete() {
        let indexer = JsonPropertyIndexer::string("name");
        let john = json(r#"{"name": "John"}"#);
        let jane = json(r#"{"name": "Jane"}"#);

        let insert = diff_values(&indexer, None, Some(&john));
        assert!(insert.removed.is_empty());
        assert!(insert.added.contains(&IndexValue::from("John")));

        let update = diff_values(&indexer, Some(&john), Some(&jane));
        assert!(update.removed.contains(&IndexValue::from("John")));
        assert!(update.added.contains(&IndexValue::from("Jane")));

        let delete = diff_values(&indexer, Some(&jane), None);
        assert!(delete.added.is_empty());
        assert!(delete.removed.contains(&IndexValue::from("Jane")));
    }

    #[test]
    fn test_diff_unchanged_is_empty() {
        let indexer = JsonPropertyIndexer::string("name");
        let john = json(r#"{"name": "John"}"#);
        let diff = diff_values(&indexer, Some(&john), Some(&john));
        assert!(diff.is_empty());
    }
}
