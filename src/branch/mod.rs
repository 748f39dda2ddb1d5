//! Branch tree
//!
//! Branches form a tree rooted at the store's root branch. Each branch
//! records its parent by name (a lookup key into the registry arena, never an
//! owning pointer) and the timestamp at which it forked. History before the
//! fork point is answered by an ancestor, recursively.

mod registry;

pub use registry::BranchRegistry;

use serde::{Deserialize, Serialize};

/// One branch of the version history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Unique branch name
    pub name: String,
    /// Parent branch name; `None` only for the root branch
    pub parent: Option<String>,
    /// Timestamp at which this branch forked from its parent; 0 for the root
    pub branching_timestamp: u64,
    /// Latest commit timestamp seen on this branch
    pub head: u64,
}

impl Branch {
    /// The root branch of a store
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            branching_timestamp: 0,
            head: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
