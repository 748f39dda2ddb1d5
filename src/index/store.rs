//! Index Document Store
//!
//! Owns every index document in a single arena keyed by generated id, and
//! maintains three derived access paths of id references:
//!
//! ```text
//! by_index:  index                          → {doc ids}
//! by_key:    (index, keyspace, key)         → {doc ids}
//! by_value:  (index, keyspace, key, value)  → {doc ids}
//! ```
//!
//! The derived paths are rebuilt incrementally on insert and delete; only
//! the arena owns documents, so there are no mirrored-collection dangling
//! references to keep consistent.

use crate::error::{StoreError, StoreResult};
use crate::index::document::{IndexDocument, IndexValue};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

type KeyPath = (Uuid, String, String);
type ValuePath = (Uuid, String, String, IndexValue);

/// Arena of index documents with three derived lookup paths
#[derive(Debug, Default)]
pub struct IndexDocumentStore {
    /// Primary ownership arena
    documents: HashMap<Uuid, IndexDocument>,
    by_index: HashMap<Uuid, HashSet<Uuid>>,
    by_key: HashMap<KeyPath, HashSet<Uuid>>,
    by_value: HashMap<ValuePath, HashSet<Uuid>>,
}

impl IndexDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&IndexDocument> {
        self.documents.get(&id)
    }

    /// Insert a document into the arena and all three paths
    pub fn add_document(&mut self, doc: IndexDocument) -> StoreResult<()> {
        if doc.valid_from >= doc.valid_to {
            return Err(StoreError::IllegalState(format!(
                "document for key '{}' has zero-width validity [{}, {})",
                doc.key, doc.valid_from, doc.valid_to
            )));
        }

        let id = doc.id;
        self.by_index.entry(doc.index_id).or_default().insert(id);
        self.by_key
            .entry((doc.index_id, doc.keyspace.clone(), doc.key.clone()))
            .or_default()
            .insert(id);
        self.by_value
            .entry((
                doc.index_id,
                doc.keyspace.clone(),
                doc.key.clone(),
                doc.indexed_value.clone(),
            ))
            .or_default()
            .insert(id);
        self.documents.insert(id, doc);
        Ok(())
    }

    /// Lower a document's `valid_to` to `at_timestamp`
    ///
    /// The caller must have checked `valid_from < at_timestamp`; equality
    /// means the document has to be deleted instead, never shrunk to a
    /// zero-width interval.
    pub fn terminate(&mut self, id: Uuid, at_timestamp: u64) -> StoreResult<()> {
        let doc = self
            .documents
            .get_mut(&id)
            .ok_or_else(|| StoreError::IndexNotFound(format!("document {}", id)))?;
        if doc.valid_from >= at_timestamp {
            return Err(StoreError::IllegalState(format!(
                "terminating document for key '{}' at {} would produce a zero-width period (valid_from {})",
                doc.key, at_timestamp, doc.valid_from
            )));
        }
        doc.valid_to = at_timestamp;
        Ok(())
    }

    /// Remove a document from the arena and all paths
    pub fn delete_document(&mut self, id: Uuid) -> StoreResult<IndexDocument> {
        let doc = self
            .documents
            .remove(&id)
            .ok_or_else(|| StoreError::IndexNotFound(format!("document {}", id)))?;

        if let Some(set) = self.by_index.get_mut(&doc.index_id) {
            set.remove(&id);
            if set.is_empty() {
                self.by_index.remove(&doc.index_id);
            }
        }
        let key_path = (doc.index_id, doc.keyspace.clone(), doc.key.clone());
        if let Some(set) = self.by_key.get_mut(&key_path) {
            set.remove(&id);
            if set.is_empty() {
                self.by_key.remove(&key_path);
            }
        }
        let value_path = (
            doc.index_id,
            doc.keyspace.clone(),
            doc.key.clone(),
            doc.indexed_value.clone(),
        );
        if let Some(set) = self.by_value.get_mut(&value_path) {
            set.remove(&id);
            if set.is_empty() {
                self.by_value.remove(&value_path);
            }
        }
        Ok(doc)
    }

    /// Drop every document belonging to one index
    pub fn delete_index_contents(&mut self, index_id: Uuid) -> usize {
        let ids: Vec<Uuid> = self
            .by_index
            .get(&index_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let count = ids.len();
        for id in ids {
            // ids came from the index path, so the arena must hold them
            let _ = self.delete_document(id);
        }
        if count > 0 {
            tracing::debug!("Deleted {} documents of index {}", count, index_id);
        }
        count
    }

    pub fn delete_all(&mut self) {
        let count = self.documents.len();
        self.documents.clear();
        self.by_index.clear();
        self.by_key.clear();
        self.by_value.clear();
        if count > 0 {
            tracing::debug!("Deleted all {} index documents", count);
        }
    }

    /// The single open document for (index, keyspace, key, value), if any
    ///
    /// At most one open document may exist per tuple; closing it before
    /// opening the next is the indexing engine's responsibility.
    pub fn open_document(
        &self,
        index_id: Uuid,
        keyspace: &str,
        key: &str,
        value: &IndexValue,
    ) -> Option<&IndexDocument> {
        let path = (
            index_id,
            keyspace.to_string(),
            key.to_string(),
            value.clone(),
        );
        self.by_value
            .get(&path)?
            .iter()
            .filter_map(|id| self.documents.get(id))
            .find(|doc| doc.is_open())
    }

    /// All documents of one index for one (keyspace, key)
    pub fn documents_for_key(
        &self,
        index_id: Uuid,
        keyspace: &str,
        key: &str,
    ) -> Vec<&IndexDocument> {
        let path = (index_id, keyspace.to_string(), key.to_string());
        self.by_key
            .get(&path)
            .map(|set| set.iter().filter_map(|id| self.documents.get(id)).collect())
            .unwrap_or_default()
    }

    /// All documents of one index
    pub fn documents_in_index(&self, index_id: Uuid) -> Vec<&IndexDocument> {
        self.by_index
            .get(&index_id)
            .map(|set| set.iter().filter_map(|id| self.documents.get(id)).collect())
            .unwrap_or_default()
    }

    /// Documents of the given indices whose validity was created or modified
    /// at or after `timestamp`
    ///
    /// Candidates for branch-delta resolution: these are the documents that
    /// can override a parent's contribution.
    pub fn documents_touched_at_or_after(
        &self,
        timestamp: u64,
        indices: &HashSet<Uuid>,
    ) -> Vec<&IndexDocument> {
        let mut result = Vec::new();
        for index_id in indices {
            if let Some(ids) = self.by_index.get(index_id) {
                for id in ids {
                    if let Some(doc) = self.documents.get(id) {
                        let touched = doc.valid_from >= timestamp
                            || (!doc.is_open() && doc.valid_to >= timestamp);
                        if touched {
                            result.push(doc);
                        }
                    }
                }
            }
        }
        result
    }

    /// Documents of one index valid at `timestamp` on (branch, keyspace)
    /// whose indexed value satisfies the predicate
    pub fn matching_documents<P>(
        &self,
        timestamp: u64,
        branch: &str,
        keyspace: &str,
        index_id: Uuid,
        predicate: P,
    ) -> Vec<&IndexDocument>
    where
        P: Fn(&IndexValue) -> bool,
    {
        self.documents_in_index(index_id)
            .into_iter()
            .filter(|doc| {
                doc.branch == branch
                    && doc.keyspace == keyspace
                    && doc.valid_at(timestamp)
                    && predicate(&doc.indexed_value)
            })
            .collect()
    }

    /// Delete every document stored for one branch, across all indices
    ///
    /// Branch teardown helper; returns how many documents were removed.
    pub fn delete_branch_documents(&mut self, branch: &str) -> usize {
        let ids: Vec<Uuid> = self
            .documents
            .values()
            .filter(|doc| doc.branch == branch)
            .map(|doc| doc.id)
            .collect();
        let count = ids.len();
        for id in ids {
            let _ = self.delete_document(id);
        }
        count
    }
}
