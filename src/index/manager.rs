//! Index Manager - coordinates secondary indices
//!
//! Owns the index definitions, the indexer registrations and the document
//! store, and orchestrates:
//! - index registration and dirty-flag bookkeeping
//! - incremental indexing via the engine
//! - full/partial reindexing, including baseline construction for new
//!   indices on non-root branches
//! - query dispatch: exact match and ordered range scans over composed
//!   branch-delta cursors
//!
//! ```text
//! Query: "name == 'Jane' on branch B at t"
//!        ↓
//! resolve index for (B, "name"), walking ancestors and capping t at forks
//!        ↓
//! compose cursor: local docs + parent cursor at min(t, fork)
//!        ↓
//! filter the ordered (value, key) stream by the condition
//! ```

use crate::branch::BranchRegistry;
use crate::error::{StoreError, StoreResult};
use crate::index::cursor::{DeltaResolvingCursor, RawIndexCursor, ScanEntry, ScanStream};
use crate::index::document::{IndexValue, SecondaryIndex};
use crate::index::engine::{IndexingEngine, IndexingUpdate};
use crate::index::indexer::Indexer;
use crate::index::store::IndexDocumentStore;
use crate::matrix::{Identifier, Order, ETERNAL};
use crate::store::{visible_state, MatrixMap};
use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use uuid::Uuid;

/// Search condition for index queries
#[derive(Debug, Clone)]
pub enum QueryCondition {
    /// Exact match on the indexed value
    Equals(IndexValue),
    /// Range over the indexed value's total order
    Range {
        lower: Bound<IndexValue>,
        upper: Bound<IndexValue>,
    },
}

impl QueryCondition {
    pub fn matches(&self, value: &IndexValue) -> bool {
        match self {
            QueryCondition::Equals(expected) => value == expected,
            QueryCondition::Range { lower, upper } => {
                let above_lower = match lower {
                    Bound::Included(bound) => value >= bound,
                    Bound::Excluded(bound) => value > bound,
                    Bound::Unbounded => true,
                };
                let below_upper = match upper {
                    Bound::Included(bound) => value <= bound,
                    Bound::Excluded(bound) => value < bound,
                    Bound::Unbounded => true,
                };
                above_lower && below_upper
            }
        }
    }
}

/// Statistics about the index subsystem
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub index_count: usize,
    pub dirty_count: usize,
    pub document_count: usize,
    pub open_document_count: usize,
}

/// Coordinates index definitions, indexers and the document store
pub struct IndexManager {
    indices: HashMap<Uuid, SecondaryIndex>,
    /// Indexers keyed by indexed property; one indexer serves the property
    /// across all branches
    indexers: HashMap<String, Arc<dyn Indexer>>,
    documents: IndexDocumentStore,
}

impl IndexManager {
    pub fn new() -> Self {
        Self {
            indices: HashMap::new(),
            indexers: HashMap::new(),
            documents: IndexDocumentStore::new(),
        }
    }

    /// Register a secondary index for `property` on `branch`
    ///
    /// The new index starts dirty and is excluded from queries until the
    /// next reindex. If an ancestor branch carries an index for the same
    /// property, the new index records it as its delegation parent.
    pub fn create_index(
        &mut self,
        registry: &BranchRegistry,
        branch: &str,
        property: &str,
        indexer: Arc<dyn Indexer>,
    ) -> StoreResult<Uuid> {
        registry.get(branch)?;

        if self.index_for(branch, property).is_some() {
            return Err(StoreError::IllegalState(format!(
                "index for property '{}' already exists on branch '{}'",
                property, branch
            )));
        }
        // one property binds to one value type, store-wide
        for index in self.indices.values() {
            if index.indexed_property == property && index.value_type != indexer.value_type() {
                return Err(StoreError::IllegalState(format!(
                    "property '{}' is already indexed as {}, cannot re-index as {}",
                    property,
                    index.value_type,
                    indexer.value_type()
                )));
            }
        }

        let mut index = SecondaryIndex::new(branch, property, indexer.value_type());
        index.parent_index_id = self
            .nearest_ancestor_index(registry, branch, property)?
            .map(|parent| parent.id);

        let id = index.id;
        // one instance serves the property across all branches; a second
        // registration for the same property keeps the first
        self.indexers.entry(property.to_string()).or_insert(indexer);
        self.indices.insert(id, index);
        tracing::info!("Registered index for '{}' on branch '{}'", property, branch);
        Ok(id)
    }

    /// The index an ancestor of `branch` carries for `property`, if any
    fn nearest_ancestor_index(
        &self,
        registry: &BranchRegistry,
        branch: &str,
        property: &str,
    ) -> StoreResult<Option<&SecondaryIndex>> {
        let mut current = registry.get(branch)?;
        while let Some(parent) = &current.parent {
            current = registry.get(parent)?;
            if let Some(index) = self.index_for(&current.name, property) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn index_for(&self, branch: &str, property: &str) -> Option<&SecondaryIndex> {
        self.indices
            .values()
            .find(|index| index.branch == branch && index.indexed_property == property)
    }

    pub fn indices(&self) -> impl Iterator<Item = &SecondaryIndex> {
        self.indices.values()
    }

    /// Indices whose documents may not reflect current data
    pub fn dirty_indices(&self) -> Vec<&SecondaryIndex> {
        self.indices.values().filter(|index| index.dirty).collect()
    }

    /// Flag every index of `branch` as stale (after a bulk operation such as
    /// rollback)
    pub fn mark_branch_dirty(&mut self, branch: &str) {
        for index in self.indices.values_mut() {
            if index.branch == branch {
                index.dirty = true;
            }
        }
    }

    /// Remove an index and all its documents
    ///
    /// Child-branch indices delegating to the removed one lose their parent
    /// and are flagged dirty; they need a baseline on the next reindex.
    pub fn drop_index(&mut self, branch: &str, property: &str) -> StoreResult<()> {
        let id = self
            .index_for(branch, property)
            .map(|index| index.id)
            .ok_or_else(|| {
                StoreError::IndexNotFound(format!("'{}' on branch '{}'", property, branch))
            })?;

        self.documents.delete_index_contents(id);
        self.indices.remove(&id);
        for index in self.indices.values_mut() {
            if index.parent_index_id == Some(id) {
                index.parent_index_id = None;
                index.dirty = true;
            }
        }
        self.prune_indexer(property);
        tracing::info!("Dropped index for '{}' on branch '{}'", property, branch);
        Ok(())
    }

    /// Drop the indexer registration for `property` once no index uses it
    fn prune_indexer(&mut self, property: &str) {
        if !self
            .indices
            .values()
            .any(|index| index.indexed_property == property)
        {
            self.indexers.remove(property);
        }
    }

    /// Tear down everything stored for one branch: its indices and every
    /// document on it. Returns the number of documents removed.
    pub fn remove_branch(&mut self, branch: &str) -> usize {
        let ids: Vec<Uuid> = self
            .indices
            .values()
            .filter(|index| index.branch == branch)
            .map(|index| index.id)
            .collect();
        for id in ids {
            if let Some(removed) = self.indices.remove(&id) {
                for index in self.indices.values_mut() {
                    if index.parent_index_id == Some(id) {
                        index.parent_index_id = None;
                        index.dirty = true;
                    }
                }
                self.prune_indexer(&removed.indexed_property);
            }
        }
        self.documents.delete_branch_documents(branch)
    }

    /// Apply an ordered incremental indexing batch
    pub fn index_batch(
        &mut self,
        registry: &BranchRegistry,
        updates: &[IndexingUpdate],
        validate_order: bool,
    ) -> StoreResult<usize> {
        let pairs = self.engine_pairs(None)?;
        let mut engine =
            IndexingEngine::new(&mut self.documents, registry, pairs, validate_order);
        engine.index_batch(updates)
    }

    /// (index, indexer) pairs for the engine, optionally restricted to a set
    /// of index ids
    fn engine_pairs(
        &self,
        restrict: Option<&HashSet<Uuid>>,
    ) -> StoreResult<Vec<(SecondaryIndex, Arc<dyn Indexer>)>> {
        let mut pairs = Vec::new();
        for index in self.indices.values() {
            if let Some(allowed) = restrict {
                if !allowed.contains(&index.id) {
                    continue;
                }
            }
            let indexer = self
                .indexers
                .get(&index.indexed_property)
                .ok_or_else(|| {
                    StoreError::IllegalState(format!(
                        "no indexer registered for property '{}'",
                        index.indexed_property
                    ))
                })?;
            pairs.push((index.clone(), Arc::clone(indexer)));
        }
        Ok(pairs)
    }

    /// Rebuild index documents from matrix history
    ///
    /// With `force` every index is wiped and recomputed; otherwise only the
    /// indices currently flagged dirty are rebuilt. Dirty flags clear only
    /// after the full recompute succeeds.
    pub fn reindex(
        &mut self,
        registry: &BranchRegistry,
        matrices: &MatrixMap,
        force: bool,
    ) -> StoreResult<()> {
        let targets: Vec<Uuid> = self
            .indices
            .values()
            .filter(|index| force || index.dirty)
            .map(|index| index.id)
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        if force {
            self.documents.delete_all();
        } else {
            for id in &targets {
                self.documents.delete_index_contents(*id);
            }
        }

        // group by branch so one history replay feeds all of a branch's
        // target indices
        let mut by_branch: HashMap<String, HashSet<Uuid>> = HashMap::new();
        for id in &targets {
            let branch = self.indices[id].branch.clone();
            by_branch.entry(branch).or_default().insert(*id);
        }

        for (branch_name, branch_targets) in by_branch {
            let branch = registry.get(&branch_name)?.clone();

            // baseline for indices that cannot delegate to a parent index
            for id in &branch_targets {
                let index = self.indices[id].clone();
                if !branch.is_root() && index.parent_index_id.is_none() {
                    self.build_baseline(registry, matrices, &index, &branch.name)?;
                }
            }

            let updates = collect_local_updates(registry, matrices, &branch_name)?;
            let pairs = self.engine_pairs(Some(&branch_targets))?;
            let mut engine = IndexingEngine::new(&mut self.documents, registry, pairs, false);
            engine.index_batch(&updates)?;
        }

        for id in &targets {
            if let Some(index) = self.indices.get_mut(id) {
                index.dirty = false;
            }
        }
        tracing::info!("Reindexed {} indices (force: {})", targets.len(), force);
        Ok(())
    }

    /// Synthesize initial open documents for the state inherited at the fork
    /// point of `branch`
    fn build_baseline(
        &mut self,
        registry: &BranchRegistry,
        matrices: &MatrixMap,
        index: &SecondaryIndex,
        branch: &str,
    ) -> StoreResult<()> {
        let branch = registry.get(branch)?;
        let parent = match &branch.parent {
            Some(parent) => parent.clone(),
            None => return Ok(()),
        };
        let fork = branch.branching_timestamp;
        let indexer = self
            .indexers
            .get(&index.indexed_property)
            .cloned()
            .ok_or_else(|| {
                StoreError::IllegalState(format!(
                    "no indexer registered for property '{}'",
                    index.indexed_property
                ))
            })?;

        let mut baseline_docs = 0usize;
        for keyspace in ancestor_keyspaces(registry, matrices, &parent)? {
            let state = visible_state(registry, matrices, &parent, &keyspace, fork)?;
            for (key, payload) in state {
                for value in indexer.index_values(&payload) {
                    self.documents.add_document(
                        crate::index::document::IndexDocument::open(
                            index.id,
                            branch.name.clone(),
                            keyspace.clone(),
                            key.clone(),
                            value,
                            fork,
                        ),
                    )?;
                    baseline_docs += 1;
                }
            }
        }
        tracing::debug!(
            "Baseline for '{}' on branch '{}': {} documents",
            index.indexed_property,
            branch.name,
            baseline_docs
        );
        Ok(())
    }

    /// Build a composed, lazily advanced scan cursor for `property` on
    /// `branch` as of `timestamp`
    ///
    /// Walks up the branch chain to the nearest branch carrying the index,
    /// capping the timestamp at each fork, then recurses along
    /// `parent_index_id` for the delta-resolving composition. Dirty indices
    /// anywhere in the chain refuse the query.
    pub fn create_cursor(
        &self,
        registry: &BranchRegistry,
        branch: &str,
        keyspace: &str,
        property: &str,
        timestamp: u64,
        order: Order,
        key_filter: Option<&HashSet<String>>,
    ) -> StoreResult<ScanStream> {
        let (index_id, capped_ts) =
            self.resolve_queryable_index(registry, branch, property, timestamp)?;
        self.build_cursor(registry, index_id, keyspace, capped_ts, order, key_filter)
    }

    fn resolve_queryable_index(
        &self,
        registry: &BranchRegistry,
        branch: &str,
        property: &str,
        timestamp: u64,
    ) -> StoreResult<(Uuid, u64)> {
        // history before a fork belongs to an ancestor, so a pre-fork query
        // never consults the queried branch's own index
        let mut current = registry.resolve_effective(branch, timestamp)?;
        let mut capped_ts = timestamp;
        loop {
            if let Some(index) = self.index_for(&current.name, property) {
                if index.dirty {
                    return Err(StoreError::IllegalState(format!(
                        "index for '{}' on branch '{}' is dirty; reindex before querying",
                        property, current.name
                    )));
                }
                return Ok((index.id, capped_ts));
            }
            match &current.parent {
                Some(parent) => {
                    capped_ts = capped_ts.min(current.branching_timestamp);
                    current = registry.get(parent)?;
                }
                None => {
                    return Err(StoreError::IndexNotFound(format!(
                        "'{}' on branch '{}' or its ancestors",
                        property, branch
                    )))
                }
            }
        }
    }

    fn build_cursor(
        &self,
        registry: &BranchRegistry,
        index_id: Uuid,
        keyspace: &str,
        timestamp: u64,
        order: Order,
        key_filter: Option<&HashSet<String>>,
    ) -> StoreResult<ScanStream> {
        let index = self
            .indices
            .get(&index_id)
            .ok_or_else(|| StoreError::IndexNotFound(index_id.to_string()))?;

        let parent_id = match index.parent_index_id {
            Some(parent_id) => parent_id,
            None => {
                return Ok(Box::new(RawIndexCursor::build(
                    &self.documents,
                    index_id,
                    keyspace,
                    timestamp,
                    order,
                    key_filter,
                )))
            }
        };
        let parent_index = self
            .indices
            .get(&parent_id)
            .ok_or_else(|| StoreError::IndexNotFound(parent_id.to_string()))?;
        if parent_index.dirty {
            return Err(StoreError::IllegalState(format!(
                "index for '{}' on branch '{}' is dirty; reindex before querying",
                parent_index.indexed_property, parent_index.branch
            )));
        }

        let branch = registry.get(&index.branch)?;
        let fork = branch.branching_timestamp;
        // before the fork the branch has no history of its own; the parent
        // index answers alone, without the override layer
        if timestamp < fork {
            return self.build_cursor(registry, parent_id, keyspace, timestamp, order, key_filter);
        }

        let local = RawIndexCursor::build(
            &self.documents,
            index_id,
            keyspace,
            timestamp,
            order,
            key_filter,
        );
        let parent_cursor = self.build_cursor(
            registry,
            parent_id,
            keyspace,
            timestamp.min(fork),
            order,
            key_filter,
        )?;

        // keys with local documents touched at or after the fork override
        // the parent's contribution
        let mut index_set = HashSet::new();
        index_set.insert(index_id);
        let overridden: HashSet<String> = self
            .documents
            .documents_touched_at_or_after(fork, &index_set)
            .into_iter()
            .filter(|doc| doc.keyspace == keyspace)
            .map(|doc| doc.key.clone())
            .collect();

        Ok(Box::new(DeltaResolvingCursor::new(
            parent_cursor,
            Box::new(local),
            overridden,
            order,
        )))
    }

    /// Exact-match or ordered range query over the composed cursor
    pub fn perform_index_query(
        &self,
        registry: &BranchRegistry,
        branch: &str,
        keyspace: &str,
        property: &str,
        timestamp: u64,
        order: Order,
        condition: &QueryCondition,
    ) -> StoreResult<Vec<ScanEntry>> {
        let cursor =
            self.create_cursor(registry, branch, keyspace, property, timestamp, order, None)?;
        Ok(cursor
            .filter(|(value, _)| condition.matches(value))
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        let open_document_count = self
            .indices
            .keys()
            .map(|id| {
                self.documents
                    .documents_in_index(*id)
                    .iter()
                    .filter(|doc| doc.is_open())
                    .count()
            })
            .sum();
        IndexStats {
            index_count: self.indices.len(),
            dirty_count: self.dirty_indices().len(),
            document_count: self.documents.len(),
            open_document_count,
        }
    }

    /// Direct access to the document store, for maintenance tooling
    pub fn documents(&self) -> &IndexDocumentStore {
        &self.documents
    }

    #[cfg(test)]
    pub(crate) fn documents_mut(&mut self) -> &mut IndexDocumentStore {
        &mut self.documents
    }

    #[cfg(test)]
    pub(crate) fn clear_dirty_flags(&mut self) {
        for index in self.indices.values_mut() {
            index.dirty = false;
        }
    }
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyspaces present anywhere in the ancestor chain starting at `branch`
fn ancestor_keyspaces(
    registry: &BranchRegistry,
    matrices: &MatrixMap,
    branch: &str,
) -> StoreResult<Vec<String>> {
    let mut keyspaces = HashSet::new();
    let mut current = registry.get(branch)?;
    loop {
        if let Some(branch_matrices) = matrices.get(&current.name) {
            keyspaces.extend(branch_matrices.keys().cloned());
        }
        match &current.parent {
            Some(parent) => current = registry.get(parent)?,
            None => break,
        }
    }
    let mut keyspaces: Vec<String> = keyspaces.into_iter().collect();
    keyspaces.sort();
    Ok(keyspaces)
}

/// Replay one branch's local matrix history as an ordered indexing batch
fn collect_local_updates(
    registry: &BranchRegistry,
    matrices: &MatrixMap,
    branch: &str,
) -> StoreResult<Vec<IndexingUpdate>> {
    let mut updates = Vec::new();
    if let Some(branch_matrices) = matrices.get(branch) {
        for (keyspace, matrix) in branch_matrices {
            for (timestamp, key) in matrix.get_modifications_between(0, ETERNAL)? {
                let new_value = matrix.entry_at(&key, timestamp).flatten();
                let old_value = if timestamp == 0 {
                    None
                } else {
                    crate::store::resolve_get(
                        registry,
                        matrices,
                        branch,
                        keyspace,
                        timestamp - 1,
                        &key,
                    )?
                    .value
                };
                updates.push(IndexingUpdate::new(
                    Identifier::new(branch, timestamp, keyspace.clone(), key),
                    old_value,
                    new_value,
                ));
            }
        }
    }
    updates.sort_by(|a, b| {
        (a.identifier.timestamp, &a.identifier.keyspace, &a.identifier.key).cmp(&(
            b.identifier.timestamp,
            &b.identifier.keyspace,
            &b.identifier.key,
        ))
    });
    Ok(updates)
}
