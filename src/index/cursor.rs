//! Index Scan Cursors
//!
//! Produce an ordered sequence of (indexed value, key) pairs as of a
//! timestamp. On the root branch a raw cursor sorts and filters the local
//! document set. On a child branch a delta-resolving cursor merges the local
//! cursor with the parent's stream: keys the branch touched at or after its
//! fork point override the parent's contribution, everything else passes
//! through unchanged.
//!
//! Cursors are lazy, forward-only and consumed once; every query constructs
//! a fresh instance, and dropping one releases its buffered state.

use crate::index::document::IndexValue;
use crate::index::store::IndexDocumentStore;
use crate::matrix::Order;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::iter::Peekable;
use uuid::Uuid;

/// One scan result: the indexed value and the key that produced it
pub type ScanEntry = (IndexValue, String);

/// Boxed scan stream; cursor composition recurses along the branch chain
pub type ScanStream = Box<dyn Iterator<Item = ScanEntry> + Send>;

fn compare(order: Order, a: &ScanEntry, b: &ScanEntry) -> Ordering {
    match order {
        Order::Ascending => a.cmp(b),
        Order::Descending => b.cmp(a),
    }
}

/// Sorted scan over the local documents of one index
pub struct RawIndexCursor {
    entries: std::vec::IntoIter<ScanEntry>,
}

impl RawIndexCursor {
    /// Collect the documents of `index_id` on `keyspace` valid at
    /// `timestamp`, sorted by (value, key) in the requested order
    pub fn build(
        documents: &IndexDocumentStore,
        index_id: Uuid,
        keyspace: &str,
        timestamp: u64,
        order: Order,
        key_filter: Option<&HashSet<String>>,
    ) -> Self {
        let mut entries: Vec<ScanEntry> = documents
            .documents_in_index(index_id)
            .into_iter()
            .filter(|doc| doc.keyspace == keyspace && doc.valid_at(timestamp))
            .filter(|doc| key_filter.map(|keys| keys.contains(&doc.key)).unwrap_or(true))
            .map(|doc| (doc.indexed_value.clone(), doc.key.clone()))
            .collect();
        entries.sort();
        if order == Order::Descending {
            entries.reverse();
        }
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl Iterator for RawIndexCursor {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        self.entries.next()
    }
}

/// Merges a branch-local cursor with its parent's stream
///
/// Both inputs are ordered the same way; the merge emits a single ordered
/// stream, advances the parent lazily and drops parent entries for keys the
/// local branch overrides.
pub struct DeltaResolvingCursor {
    parent: Peekable<ScanStream>,
    local: Peekable<ScanStream>,
    /// Keys whose local state overrides the parent's contribution
    overridden: HashSet<String>,
    order: Order,
}

impl DeltaResolvingCursor {
    pub fn new(
        parent: ScanStream,
        local: ScanStream,
        overridden: HashSet<String>,
        order: Order,
    ) -> Self {
        Self {
            parent: parent.peekable(),
            local: local.peekable(),
            overridden,
            order,
        }
    }
}

impl Iterator for DeltaResolvingCursor {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        loop {
            // skip parent entries the local branch overrides before comparing
            if let Some((_, key)) = self.parent.peek() {
                if self.overridden.contains(key) {
                    self.parent.next();
                    continue;
                }
            }
            return match (self.parent.peek(), self.local.peek()) {
                (None, None) => None,
                (None, Some(_)) => self.local.next(),
                (Some(_), None) => self.parent.next(),
                (Some(parent_entry), Some(local_entry)) => {
                    if compare(self.order, local_entry, parent_entry) == Ordering::Greater {
                        self.parent.next()
                    } else {
                        self.local.next()
                    }
                }
            };
        }
    }
}
