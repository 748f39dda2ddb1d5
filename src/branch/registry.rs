//! Branch Registry
//!
//! Arena of branches addressed by name, with a derived children map. Deletion
//! order (children before parents) is enforced by walking the subtree
//! deepest-first; the walk is explicitly not atomic, so a failure partway
//! leaves already-deleted descendants gone.

use crate::branch::Branch;
use crate::error::{StoreError, StoreResult};
use std::collections::{HashMap, HashSet};

/// Maintains the tree of branches and resolves effective branches for
/// (branch, timestamp) pairs
#[derive(Debug)]
pub struct BranchRegistry {
    /// Branch arena, keyed by name
    branches: HashMap<String, Branch>,
    /// Derived parent → children map
    children: HashMap<String, HashSet<String>>,
    /// Name of the root branch
    root: String,
}

impl BranchRegistry {
    /// Create a registry holding only the root branch
    pub fn new(root_name: impl Into<String>) -> Self {
        let root_name = root_name.into();
        let mut branches = HashMap::new();
        branches.insert(root_name.clone(), Branch::root(root_name.clone()));
        Self {
            branches,
            children: HashMap::new(),
            root: root_name,
        }
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn exists(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    /// All branch names, root included
    pub fn names(&self) -> Vec<String> {
        self.branches.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> StoreResult<&Branch> {
        self.branches
            .get(name)
            .ok_or_else(|| StoreError::BranchNotFound(name.to_string()))
    }

    /// Fork a new branch off `parent` at `branching_ts`
    pub fn create(&mut self, parent: &str, name: &str, branching_ts: u64) -> StoreResult<&Branch> {
        let parent_branch = self
            .branches
            .get(parent)
            .ok_or_else(|| StoreError::BranchNotFound(parent.to_string()))?;
        if self.branches.contains_key(name) {
            return Err(StoreError::BranchExists(name.to_string()));
        }
        if branching_ts > parent_branch.head {
            return Err(StoreError::InvalidTimestamp {
                timestamp: branching_ts,
                parent: parent.to_string(),
                head: parent_branch.head,
            });
        }

        let branch = Branch {
            name: name.to_string(),
            parent: Some(parent.to_string()),
            branching_timestamp: branching_ts,
            head: branching_ts,
        };
        self.branches.insert(name.to_string(), branch);
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(name.to_string());

        tracing::info!("Created branch '{}' off '{}' at {}", name, parent, branching_ts);
        Ok(&self.branches[name])
    }

    /// Direct or transitive children of a branch
    pub fn children(&self, name: &str, recursive: bool) -> StoreResult<Vec<String>> {
        if !self.branches.contains_key(name) {
            return Err(StoreError::BranchNotFound(name.to_string()));
        }
        let mut result = Vec::new();
        self.collect_children(name, recursive, &mut result);
        Ok(result)
    }

    fn collect_children(&self, name: &str, recursive: bool, out: &mut Vec<String>) {
        if let Some(direct) = self.children.get(name) {
            let mut direct: Vec<&String> = direct.iter().collect();
            direct.sort();
            for child in direct {
                out.push(child.clone());
                if recursive {
                    self.collect_children(child, true, out);
                }
            }
        }
    }

    /// Delete a branch and all its descendants, deepest-first
    ///
    /// Not atomic: each step re-checks existence, so a failed walk can be
    /// retried and converges. Returns the deleted names in deletion order.
    pub fn delete_recursive(&mut self, name: &str) -> StoreResult<Vec<String>> {
        if !self.branches.contains_key(name) {
            return Err(StoreError::BranchNotFound(name.to_string()));
        }
        if name == self.root {
            return Err(StoreError::PreconditionViolation(
                "the root branch cannot be deleted".to_string(),
            ));
        }

        // subtree in deletion order: descendants reversed puts leaves first
        let mut order = self.children(name, true)?;
        order.reverse();
        order.push(name.to_string());

        let mut deleted = Vec::new();
        for victim in order {
            if let Some(branch) = self.branches.remove(&victim) {
                self.children.remove(&victim);
                if let Some(parent) = branch.parent {
                    if let Some(siblings) = self.children.get_mut(&parent) {
                        siblings.remove(&victim);
                    }
                }
                tracing::info!("Deleted branch '{}'", victim);
                deleted.push(victim);
            }
        }
        Ok(deleted)
    }

    /// Resolve which branch answers a query at `timestamp`
    ///
    /// History before a branch's fork point belongs to an ancestor: walk up
    /// the parent chain while `timestamp < branching_timestamp`.
    pub fn resolve_effective(&self, branch: &str, timestamp: u64) -> StoreResult<&Branch> {
        let mut current = self.get(branch)?;
        while timestamp < current.branching_timestamp {
            match &current.parent {
                Some(parent) => current = self.get(parent)?,
                None => break,
            }
        }
        Ok(current)
    }

    /// Advance a branch's head after a commit
    pub fn record_commit(&mut self, branch: &str, timestamp: u64) -> StoreResult<()> {
        let branch = self
            .branches
            .get_mut(branch)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
        branch.head = branch.head.max(timestamp);
        Ok(())
    }

    /// Lower a branch's head after a rollback
    pub fn truncate_head(&mut self, branch: &str, timestamp: u64) -> StoreResult<()> {
        let branch = self
            .branches
            .get_mut(branch)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
        branch.head = branch.head.min(timestamp);
        Ok(())
    }
}
