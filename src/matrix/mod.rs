//! Temporal storage matrix
//!
//! Per-keyspace versioned key/value history with point-in-time and range
//! queries:
//!
//! - **types**: Core data structures (TemporalKey, ValidityPeriod, Identifier)
//! - **matrix**: The ordered-map matrix with its inverse time index
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   (key, ts, value|tombstone) → primary (key, ts) → inverse (ts, key)
//!
//! Read Path:
//!   get(ts, key) → floor/ceiling search → (value, validity interval)
//! ```

mod matrix;
pub mod types;

pub use matrix::{GetResult, TemporalMatrix};
pub use types::{Identifier, KeySetModifications, Order, TemporalKey, ValidityPeriod, ETERNAL};
