//! # Strata
//!
//! Embedded, branchable, time-versioned key/value store with document-based
//! secondary indexing.
//!
//! ## Features
//!
//! - **Temporal storage**: every write is timestamped; reads address any
//!   past instant and return the interval over which the answer holds
//! - **Branches**: fork the history at a timestamp; pre-fork lookups
//!   transparently delegate to ancestors
//! - **Secondary indices**: value→key documents with explicit validity
//!   intervals, maintained incrementally by old/new value diffing
//! - **Branch-delta scans**: ordered index cursors composed across the
//!   branch chain without materializing the parent's result set
//!
//! ## Modules
//!
//! - [`matrix`]: Per-keyspace versioned key/value history
//! - [`branch`]: Branch tree and effective-branch resolution
//! - [`index`]: Document store, indexing engine, cursors, manager
//! - [`store`]: The `TemporalStore` facade tying it all together
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use strata::{JsonPropertyIndexer, Order, TemporalStore};
//!
//! fn main() -> Result<(), strata::StoreError> {
//!     let store = TemporalStore::default();
//!
//!     // index the "name" field of JSON payloads
//!     store.create_index("master", "name", Arc::new(JsonPropertyIndexer::string("name")))?;
//!     store.reindex(false)?;
//!
//!     // timestamped write
//!     let mut batch = HashMap::new();
//!     batch.insert("p1".to_string(), Some(br#"{"name": "John"}"#.to_vec()));
//!     store.put("master", "people", 10, batch)?;
//!
//!     // point-in-time read with validity interval
//!     let result = store.get("master", "people", 15, "p1")?;
//!     assert!(result.value.is_some());
//!
//!     // ordered index scan as of a timestamp
//!     let entries = store.index_scan("master", "people", "name", 15, Order::Ascending, None)?;
//!     assert_eq!(entries.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod branch;
pub mod config;
pub mod error;
pub mod index;
pub mod matrix;
pub mod serializer;
pub mod store;

// Re-export top-level types for convenience
pub use branch::{Branch, BranchRegistry};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use index::{
    IndexDocument, IndexDocumentStore, IndexManager, IndexStats, IndexValue, IndexValueType,
    Indexer, IndexingUpdate, JsonPropertyIndexer, QueryCondition, ScanEntry, SecondaryIndex,
};
pub use matrix::{
    GetResult, Identifier, KeySetModifications, Order, TemporalKey, TemporalMatrix,
    ValidityPeriod, ETERNAL,
};
pub use serializer::{BincodeSerializer, Serializer};
pub use store::{StoreStats, TemporalStore};
