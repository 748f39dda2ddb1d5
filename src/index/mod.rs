//! Secondary index engine
//!
//! Document-based secondary indexing over the temporal matrices:
//!
//! - **document**: IndexValue, IndexDocument, SecondaryIndex definitions
//! - **store**: the document arena with its three derived lookup paths
//! - **indexer**: the Indexer trait, the JSON property indexer, value diffing
//! - **engine**: diff-driven incremental maintenance with per-timestamp
//!   buffered flushing
//! - **cursor**: ordered scan cursors with branch-delta resolution
//! - **manager**: registration, dirty flags, reindexing, query dispatch
//!
//! # Architecture
//!
//! ```text
//! Write: (identifier, old, new) → diff per index → open/terminate/delete docs
//!
//! Read:  (branch, property, t) → resolve index along branch chain
//!                              → local cursor ⊕ parent cursor at min(t, fork)
//!                              → ordered (value, key) stream
//! ```

mod cursor;
mod document;
mod engine;
mod indexer;
mod manager;
mod store;

pub use cursor::{DeltaResolvingCursor, RawIndexCursor, ScanEntry, ScanStream};
pub use document::{IndexDocument, IndexValue, IndexValueType, SecondaryIndex};
pub use engine::{IndexingEngine, IndexingUpdate};
pub use indexer::{diff_values, Indexer, JsonPropertyIndexer, ValueDiff};
pub use manager::{IndexManager, IndexStats, QueryCondition};
pub use store::IndexDocumentStore;
