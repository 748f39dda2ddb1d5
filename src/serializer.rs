//! Serialization boundary
//!
//! The store holds opaque byte payloads and never interprets them; callers
//! bring a [`Serializer`] when they want typed access. [`BincodeSerializer`]
//! is the default implementation.

use crate::error::StoreResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts typed values to and from the opaque byte payloads the store keeps.
pub trait Serializer: Send + Sync {
    fn serialize<T: Serialize>(&self, value: &T) -> StoreResult<Vec<u8>>;
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> StoreResult<T>;
}

/// Bincode-backed serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> StoreResult<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> StoreResult<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}
