//! Indexing Engine
//!
//! Consumes an ordered batch of (identifier, old value, new value) triples
//! and applies document creations, terminations and deletions to the
//! document store. All modifications for one timestamp are buffered and
//! flushed together when the timestamp boundary advances.
//!
//! Per entry:
//! 1. resolve the indices applicable to the entry's branch
//! 2. diff the indexed values of the old and new payload
//! 3. added values open a `[ts, ∞)` document
//! 4. removed values terminate the open document at `ts`; a document opened
//!    at `ts` itself is deleted outright, and a value inherited from a
//!    parent branch gets a synthesized terminated `[branching_timestamp, ts)`
//!    document instead

use crate::branch::BranchRegistry;
use crate::error::{StoreError, StoreResult};
use crate::index::document::{IndexDocument, IndexValue, SecondaryIndex};
use crate::index::indexer::{diff_values, Indexer};
use crate::index::store::IndexDocumentStore;
use crate::matrix::Identifier;
use std::sync::Arc;
use uuid::Uuid;

/// One unit of indexing work: one write of one key
#[derive(Debug, Clone)]
pub struct IndexingUpdate {
    pub identifier: Identifier,
    /// Payload before the write; `None` when the key did not exist or was
    /// tombstoned
    pub old_value: Option<Vec<u8>>,
    /// Payload after the write; `None` for a deletion
    pub new_value: Option<Vec<u8>>,
}

impl IndexingUpdate {
    pub fn new(
        identifier: Identifier,
        old_value: Option<Vec<u8>>,
        new_value: Option<Vec<u8>>,
    ) -> Self {
        Self {
            identifier,
            old_value,
            new_value,
        }
    }
}

/// Buffered modifications for the timestamp currently being processed
#[derive(Debug, Default)]
struct TimestampBuffer {
    timestamp: Option<u64>,
    additions: Vec<IndexDocument>,
    terminations: Vec<(Uuid, u64)>,
    deletions: Vec<Uuid>,
}

impl TimestampBuffer {
    fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.terminations.is_empty() && self.deletions.is_empty()
    }
}

/// Applies ordered indexing batches to the document store
pub struct IndexingEngine<'a> {
    documents: &'a mut IndexDocumentStore,
    registry: &'a BranchRegistry,
    /// Indices with their indexers, as resolved by the manager
    indices: Vec<(SecondaryIndex, Arc<dyn Indexer>)>,
    /// Reject batches whose timestamps go backwards
    validate_order: bool,
    buffer: TimestampBuffer,
}

impl<'a> IndexingEngine<'a> {
    pub fn new(
        documents: &'a mut IndexDocumentStore,
        registry: &'a BranchRegistry,
        indices: Vec<(SecondaryIndex, Arc<dyn Indexer>)>,
        validate_order: bool,
    ) -> Self {
        Self {
            documents,
            registry,
            indices,
            validate_order,
            buffer: TimestampBuffer::default(),
        }
    }

    /// Apply a batch ordered by (timestamp, branch); returns the number of
    /// updates processed
    ///
    /// A failure mid-batch leaves the document store in the state as of the
    /// last successfully flushed timestamp boundary.
    pub fn index_batch(&mut self, updates: &[IndexingUpdate]) -> StoreResult<usize> {
        for update in updates {
            self.process(update)?;
        }
        self.flush()?;
        Ok(updates.len())
    }

    fn process(&mut self, update: &IndexingUpdate) -> StoreResult<()> {
        let timestamp = update.identifier.timestamp;

        match self.buffer.timestamp {
            Some(current) if current == timestamp => {}
            Some(current) => {
                if self.validate_order && timestamp < current {
                    return Err(StoreError::PreconditionViolation(format!(
                        "indexing batch out of order: {} after {}",
                        timestamp, current
                    )));
                }
                self.flush()?;
                self.buffer.timestamp = Some(timestamp);
            }
            None => self.buffer.timestamp = Some(timestamp),
        }

        let identifier = &update.identifier;
        let applicable: Vec<(SecondaryIndex, Arc<dyn Indexer>)> = self
            .indices
            .iter()
            .filter(|(index, _)| {
                index.branch == identifier.branch && index.valid_period.contains(timestamp)
            })
            .cloned()
            .collect();

        for (index, indexer) in applicable {
            let diff = diff_values(
                indexer.as_ref(),
                update.old_value.as_deref(),
                update.new_value.as_deref(),
            );
            for value in diff.added {
                self.buffer.additions.push(IndexDocument::open(
                    index.id,
                    identifier.branch.clone(),
                    identifier.keyspace.clone(),
                    identifier.key.clone(),
                    value,
                    timestamp,
                ));
            }
            for value in diff.removed {
                self.remove_value(&index, identifier, &value, timestamp)?;
            }
        }
        Ok(())
    }

    /// Handle one removed value: terminate, delete, or synthesize
    fn remove_value(
        &mut self,
        index: &SecondaryIndex,
        identifier: &Identifier,
        value: &IndexValue,
        timestamp: u64,
    ) -> StoreResult<()> {
        // the value may have been opened within the same timestamp window and
        // not yet flushed; deleting it from the buffer keeps zero-width
        // documents out of the store entirely
        let buffered = self.buffer.additions.iter().position(|doc| {
            doc.is_open()
                && doc.index_id == index.id
                && doc.keyspace == identifier.keyspace
                && doc.key == identifier.key
                && doc.indexed_value == *value
        });
        if let Some(pos) = buffered {
            self.buffer.additions.swap_remove(pos);
            return Ok(());
        }

        if let Some(doc) = self.documents.open_document(
            index.id,
            &identifier.keyspace,
            &identifier.key,
            value,
        ) {
            if doc.valid_from == timestamp {
                self.buffer.deletions.push(doc.id);
            } else {
                self.buffer.terminations.push((doc.id, timestamp));
            }
            return Ok(());
        }

        // no local document: the value was inherited from a parent branch.
        // Synthesize a terminated document spanning the pre-fork-to-now
        // window so historical queries on this branch see the value end here.
        // The interval is not verified against the parent's actual history.
        let branch = self.registry.get(&identifier.branch)?;
        if branch.is_root() {
            tracing::warn!(
                "No document to terminate for key '{}' value '{}' on root branch",
                identifier.key,
                value
            );
            return Ok(());
        }
        if branch.branching_timestamp >= timestamp {
            tracing::warn!(
                "Skipping synthesized document for key '{}': fork {} not before {}",
                identifier.key,
                branch.branching_timestamp,
                timestamp
            );
            return Ok(());
        }
        self.buffer.additions.push(IndexDocument::terminated(
            index.id,
            identifier.branch.clone(),
            identifier.keyspace.clone(),
            identifier.key.clone(),
            value.clone(),
            branch.branching_timestamp,
            timestamp,
        ));
        Ok(())
    }

    /// Push the buffered modifications of the current timestamp to the store
    fn flush(&mut self) -> StoreResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let buffer = std::mem::take(&mut self.buffer);

        let modifications =
            buffer.additions.len() + buffer.terminations.len() + buffer.deletions.len();
        for id in buffer.deletions {
            self.documents.delete_document(id)?;
        }
        for (id, at) in buffer.terminations {
            self.documents.terminate(id, at)?;
        }
        for doc in buffer.additions {
            self.documents.add_document(doc)?;
        }
        tracing::debug!(
            "Flushed {} document modifications at timestamp {:?}",
            modifications,
            buffer.timestamp
        );
        Ok(())
    }
}
