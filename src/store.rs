//! Temporal Store
//!
//! The main store facade orchestrates all components:
//! - Write path: batch → branch matrix → head tracking → indexing engine
//! - Read path: branch resolution → matrix floor/ceiling lookup
//! - Index path: registration → reindex → composed branch-delta scans
//!
//! Thread-safe via a store-wide RwLock with scoped guards: reads run
//! concurrently under the shared lock; writes, rollback, reindex, branch
//! deletion and index mutation serialize under the exclusive one.

use crate::branch::{Branch, BranchRegistry};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::index::{
    Indexer, IndexManager, IndexStats, IndexingUpdate, QueryCondition, ScanEntry,
};
use crate::matrix::{
    GetResult, Identifier, KeySetModifications, Order, TemporalKey, TemporalMatrix,
    ValidityPeriod,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Matrices addressed by branch name, then keyspace
pub(crate) type MatrixMap = HashMap<String, HashMap<String, TemporalMatrix>>;

/// Branch-relative point lookup
///
/// Resolves the effective branch for the timestamp, then walks up the
/// parent chain per key: a branch whose matrix has no floor entry for the
/// key delegates to its parent with the timestamp capped at the fork point.
pub(crate) fn resolve_get(
    registry: &BranchRegistry,
    matrices: &MatrixMap,
    branch: &str,
    keyspace: &str,
    timestamp: u64,
    key: &str,
) -> StoreResult<GetResult> {
    let effective = registry.resolve_effective(branch, timestamp)?.clone();
    let mut current = effective.clone();
    let mut capped_ts = timestamp;
    loop {
        if let Some(matrix) = matrices.get(&current.name).and_then(|m| m.get(keyspace)) {
            if matrix.last_commit_timestamp(key, capped_ts)?.is_some() {
                return matrix.get(capped_ts, key);
            }
        }
        match &current.parent {
            Some(parent) => {
                capped_ts = capped_ts.min(current.branching_timestamp);
                current = registry.get(parent)?.clone();
            }
            None => break,
        }
    }

    // never written anywhere in the chain; the effective branch's matrix
    // still bounds the validity by the key's first future entry
    match matrices.get(&effective.name).and_then(|m| m.get(keyspace)) {
        Some(matrix) => matrix.get(timestamp, key),
        None => Ok(GetResult {
            value: None,
            period: ValidityPeriod::eternal(),
        }),
    }
}

/// The live (key → payload) state visible on `branch` at `timestamp`,
/// composed across the ancestor chain with fork-capped timestamps
pub(crate) fn visible_state(
    registry: &BranchRegistry,
    matrices: &MatrixMap,
    branch: &str,
    keyspace: &str,
    timestamp: u64,
) -> StoreResult<HashMap<String, Vec<u8>>> {
    let mut chain = Vec::new();
    let mut current = registry.get(branch)?;
    let mut cap = timestamp;
    loop {
        chain.push((current.name.clone(), cap));
        match &current.parent {
            Some(parent) => {
                cap = cap.min(current.branching_timestamp);
                current = registry.get(parent)?;
            }
            None => break,
        }
    }
    chain.reverse();

    let mut state: HashMap<String, Vec<u8>> = HashMap::new();
    for (name, cap) in chain {
        if let Some(matrix) = matrices.get(&name).and_then(|m| m.get(keyspace)) {
            let modifications = matrix.key_set_modifications(cap)?;
            for key in modifications.removed {
                state.remove(&key);
            }
            for key in modifications.added {
                if let Some(value) = matrix.get(cap, &key)?.value {
                    state.insert(key, value);
                }
            }
        }
    }
    Ok(state)
}

struct StoreInner {
    registry: BranchRegistry,
    matrices: MatrixMap,
    index: IndexManager,
}

/// The temporal store: branchable, time-versioned key/value storage with
/// document-based secondary indexing
pub struct TemporalStore {
    config: StoreConfig,
    inner: RwLock<StoreInner>,
}

impl TemporalStore {
    pub fn new(config: StoreConfig) -> Self {
        let registry = BranchRegistry::new(config.root_branch.clone());
        tracing::info!("Opened store with root branch '{}'", config.root_branch);
        Self {
            config,
            inner: RwLock::new(StoreInner {
                registry,
                matrices: MatrixMap::new(),
                index: IndexManager::new(),
            }),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire shared lock: {}", e)))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire exclusive lock: {}", e)))
    }

    // ==================== Branch Operations ====================

    /// Fork a new branch off `parent` at `branching_ts`
    pub fn create_branch(&self, parent: &str, name: &str, branching_ts: u64) -> StoreResult<()> {
        let mut inner = self.write()?;
        inner.registry.create(parent, name, branching_ts)?;
        Ok(())
    }

    pub fn branch(&self, name: &str) -> StoreResult<Branch> {
        Ok(self.read()?.registry.get(name)?.clone())
    }

    pub fn branches(&self) -> StoreResult<Vec<String>> {
        Ok(self.read()?.registry.names())
    }

    pub fn children(&self, name: &str, recursive: bool) -> StoreResult<Vec<String>> {
        self.read()?.registry.children(name, recursive)
    }

    /// Which branch answers queries on `branch` at `timestamp`
    pub fn resolve_effective(&self, branch: &str, timestamp: u64) -> StoreResult<String> {
        Ok(self
            .read()?
            .registry
            .resolve_effective(branch, timestamp)?
            .name
            .clone())
    }

    /// Delete a branch and its descendants, tearing down their matrices and
    /// index contents
    ///
    /// Not atomic: on a failure mid-walk some descendants are gone while the
    /// branch itself survives; re-query branch status and retry.
    pub fn delete_branch(&self, name: &str) -> StoreResult<Vec<String>> {
        let mut inner = self.write()?;
        let deleted = inner.registry.delete_recursive(name)?;
        for branch in &deleted {
            inner.matrices.remove(branch);
            let documents = inner.index.remove_branch(branch);
            tracing::info!(
                "Tore down branch '{}' ({} index documents)",
                branch,
                documents
            );
        }
        Ok(deleted)
    }

    // ==================== Write Path ====================

    /// Apply one atomic, already-timestamped batch to a branch
    ///
    /// Each key gets exactly one entry at `timestamp`; a `None` value stores
    /// a tombstone. The branch head advances and the indexing engine
    /// receives the resolved old/new payload pairs.
    pub fn put(
        &self,
        branch: &str,
        keyspace: &str,
        timestamp: u64,
        contents: HashMap<String, Option<Vec<u8>>>,
    ) -> StoreResult<()> {
        if contents.is_empty() {
            return Ok(());
        }
        let mut guard = self.write()?;
        let inner = &mut *guard;

        let branch_info = inner.registry.get(branch)?;
        if timestamp < branch_info.branching_timestamp {
            return Err(StoreError::PreconditionViolation(format!(
                "write at {} precedes the branching timestamp {} of '{}'",
                timestamp, branch_info.branching_timestamp, branch
            )));
        }

        // resolve old payloads before touching the matrix
        let mut updates = Vec::with_capacity(contents.len());
        let mut keys: Vec<&String> = contents.keys().collect();
        keys.sort();
        for key in keys {
            let old_value = resolve_get(
                &inner.registry,
                &inner.matrices,
                branch,
                keyspace,
                timestamp,
                key,
            )?
            .value;
            updates.push(IndexingUpdate::new(
                Identifier::new(branch, timestamp, keyspace, key.clone()),
                old_value,
                contents[key].clone(),
            ));
        }

        inner
            .matrices
            .entry(branch.to_string())
            .or_default()
            .entry(keyspace.to_string())
            .or_default()
            .put(timestamp, contents)?;
        inner.registry.record_commit(branch, timestamp)?;

        inner
            .index
            .index_batch(&inner.registry, &updates, self.config.validate_batch_order)?;
        Ok(())
    }

    /// Feed an externally resolved (identifier, old, new) stream to the
    /// indexing engine, bypassing the matrices
    pub fn apply_index_updates(&self, updates: &[IndexingUpdate]) -> StoreResult<usize> {
        let mut guard = self.write()?;
        let inner = &mut *guard;
        inner
            .index
            .index_batch(&inner.registry, updates, self.config.validate_batch_order)
    }

    // ==================== Read Path ====================

    /// Branch-resolved point lookup with validity interval
    pub fn get(
        &self,
        branch: &str,
        keyspace: &str,
        timestamp: u64,
        key: &str,
    ) -> StoreResult<GetResult> {
        let inner = self.read()?;
        resolve_get(&inner.registry, &inner.matrices, branch, keyspace, timestamp, key)
    }

    /// Added/removed key sets of the effective branch's own matrix as of
    /// `timestamp`
    ///
    /// Deliberately branch-local: this is the delta one branch contributes,
    /// not the composed view. Use [`TemporalStore::key_set`] for the key set
    /// visible across the ancestor chain.
    pub fn key_set_modifications(
        &self,
        branch: &str,
        keyspace: &str,
        timestamp: u64,
    ) -> StoreResult<KeySetModifications> {
        let inner = self.read()?;
        let effective = inner.registry.resolve_effective(branch, timestamp)?;
        match inner
            .matrices
            .get(&effective.name)
            .and_then(|m| m.get(keyspace))
        {
            Some(matrix) => matrix.key_set_modifications(timestamp),
            None => Ok(KeySetModifications::default()),
        }
    }

    /// The live key set visible on `branch` at `timestamp`, composed across
    /// its ancestor chain
    pub fn key_set(
        &self,
        branch: &str,
        keyspace: &str,
        timestamp: u64,
    ) -> StoreResult<HashSet<String>> {
        let inner = self.read()?;
        Ok(
            visible_state(&inner.registry, &inner.matrices, branch, keyspace, timestamp)?
                .into_keys()
                .collect(),
        )
    }

    /// Change timestamps of `key` within `[lower, upper]`, composed across
    /// the ancestor chain with fork-capped upper bounds
    pub fn history(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        lower: u64,
        upper: u64,
        order: Order,
    ) -> StoreResult<Vec<u64>> {
        if lower > upper {
            return Err(StoreError::PreconditionViolation(format!(
                "inverted range: {} > {}",
                lower, upper
            )));
        }
        let inner = self.read()?;
        let mut current = inner.registry.resolve_effective(branch, upper)?;
        let mut capped_upper = upper;
        let mut timestamps = BTreeSet::new();
        loop {
            if let Some(matrix) = inner
                .matrices
                .get(&current.name)
                .and_then(|m| m.get(keyspace))
            {
                timestamps.extend(matrix.history(key, lower, capped_upper, Order::Ascending)?);
            }
            match &current.parent {
                Some(parent) if lower <= current.branching_timestamp => {
                    capped_upper = capped_upper.min(current.branching_timestamp);
                    current = inner.registry.get(parent)?;
                }
                _ => break,
            }
        }
        let mut result: Vec<u64> = timestamps.into_iter().collect();
        if order == Order::Descending {
            result.reverse();
        }
        Ok(result)
    }

    /// The latest change to `key` at or before `upper_bound`, walking the
    /// ancestor chain
    pub fn last_commit_timestamp(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        upper_bound: u64,
    ) -> StoreResult<Option<u64>> {
        let inner = self.read()?;
        let mut current = inner.registry.resolve_effective(branch, upper_bound)?;
        let mut capped_ts = upper_bound;
        loop {
            if let Some(matrix) = inner
                .matrices
                .get(&current.name)
                .and_then(|m| m.get(keyspace))
            {
                if let Some(found) = matrix.last_commit_timestamp(key, capped_ts)? {
                    return Ok(Some(found));
                }
            }
            match &current.parent {
                Some(parent) => {
                    capped_ts = capped_ts.min(current.branching_timestamp);
                    current = inner.registry.get(parent)?;
                }
                None => return Ok(None),
            }
        }
    }

    /// Inverse-index scan of one branch's matrix over `[t0, t1)`
    pub fn get_modifications_between(
        &self,
        branch: &str,
        keyspace: &str,
        t0: u64,
        t1: u64,
    ) -> StoreResult<Vec<(u64, String)>> {
        let inner = self.read()?;
        inner.registry.get(branch)?;
        match inner.matrices.get(branch).and_then(|m| m.get(keyspace)) {
            Some(matrix) => matrix.get_modifications_between(t0, t1),
            None => {
                // still validate the bounds at the boundary
                if t0 > t1 {
                    return Err(StoreError::PreconditionViolation(format!(
                        "inverted range: {} > {}",
                        t0, t1
                    )));
                }
                Ok(Vec::new())
            }
        }
    }

    // ==================== Maintenance ====================

    /// Physically remove every entry past `timestamp` on all of the branch's
    /// keyspaces; the branch's indices become dirty
    pub fn rollback(&self, branch: &str, timestamp: u64) -> StoreResult<()> {
        let mut inner = self.write()?;
        inner.registry.get(branch)?;
        if let Some(branch_matrices) = inner.matrices.get_mut(branch) {
            for matrix in branch_matrices.values_mut() {
                matrix.rollback(timestamp)?;
            }
        }
        inner.registry.truncate_head(branch, timestamp)?;
        inner.index.mark_branch_dirty(branch);
        tracing::info!("Rolled back branch '{}' to {}", branch, timestamp);
        Ok(())
    }

    /// Physically delete specific (key, timestamp) entries; used by
    /// out-of-band history rewrites only. Returns how many existed.
    pub fn purge_entries(
        &self,
        branch: &str,
        keyspace: &str,
        entries: &HashSet<TemporalKey>,
    ) -> StoreResult<usize> {
        let mut inner = self.write()?;
        inner.registry.get(branch)?;
        let removed = match inner.matrices.get_mut(branch).and_then(|m| m.get_mut(keyspace)) {
            Some(matrix) => matrix.purge_entries(entries),
            None => 0,
        };
        if removed > 0 {
            inner.index.mark_branch_dirty(branch);
        }
        Ok(removed)
    }

    // ==================== Index Operations ====================

    /// Register a secondary index; it starts dirty and needs a reindex
    /// before it answers queries
    pub fn create_index(
        &self,
        branch: &str,
        property: &str,
        indexer: Arc<dyn Indexer>,
    ) -> StoreResult<Uuid> {
        let mut guard = self.write()?;
        let inner = &mut *guard;
        inner.index.create_index(&inner.registry, branch, property, indexer)
    }

    pub fn drop_index(&self, branch: &str, property: &str) -> StoreResult<()> {
        self.write()?.index.drop_index(branch, property)
    }

    /// Rebuild index documents from matrix history; `force` wipes and
    /// recomputes everything, otherwise only dirty indices are rebuilt
    pub fn reindex(&self, force: bool) -> StoreResult<()> {
        let mut guard = self.write()?;
        let inner = &mut *guard;
        inner.index.reindex(&inner.registry, &inner.matrices, force)
    }

    /// (branch, property) of every index currently flagged dirty
    pub fn dirty_indices(&self) -> StoreResult<Vec<(String, String)>> {
        Ok(self
            .read()?
            .index
            .dirty_indices()
            .into_iter()
            .map(|index| (index.branch.clone(), index.indexed_property.clone()))
            .collect())
    }

    /// Materialized ordered index scan as of `timestamp`
    pub fn index_scan(
        &self,
        branch: &str,
        keyspace: &str,
        property: &str,
        timestamp: u64,
        order: Order,
        key_filter: Option<&HashSet<String>>,
    ) -> StoreResult<Vec<ScanEntry>> {
        let inner = self.read()?;
        let cursor = inner.index.create_cursor(
            &inner.registry,
            branch,
            keyspace,
            property,
            timestamp,
            order,
            key_filter,
        )?;
        Ok(cursor.collect())
    }

    /// Exact-match or ordered range query against one index
    pub fn index_query(
        &self,
        branch: &str,
        keyspace: &str,
        property: &str,
        timestamp: u64,
        order: Order,
        condition: &QueryCondition,
    ) -> StoreResult<Vec<ScanEntry>> {
        let inner = self.read()?;
        inner.index.perform_index_query(
            &inner.registry,
            branch,
            keyspace,
            property,
            timestamp,
            order,
            condition,
        )
    }

    // ==================== Statistics ====================

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let inner = self.read()?;
        let matrix_count = inner.matrices.values().map(|m| m.len()).sum();
        let entry_count = inner
            .matrices
            .values()
            .flat_map(|m| m.values())
            .map(|matrix| matrix.len())
            .sum();
        Ok(StoreStats {
            branch_count: inner.registry.names().len(),
            matrix_count,
            entry_count,
            index: inner.index.stats(),
        })
    }
}

impl Default for TemporalStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub branch_count: usize,
    pub matrix_count: usize,
    pub entry_count: usize,
    pub index: IndexStats,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Branches: {}, Matrices: {}, Entries: {}, Indices: {} ({} dirty), Documents: {}",
            self.branch_count,
            self.matrix_count,
            self.entry_count,
            self.index.index_count,
            self.index.dirty_count,
            self.index.document_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexValue, JsonPropertyIndexer};

    const KS: &str = "default";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn payload(json: &str) -> Option<Vec<u8>> {
        Some(json.as_bytes().to_vec())
    }

    fn put_one(store: &TemporalStore, branch: &str, ts: u64, key: &str, value: Option<&str>) {
        let mut contents = HashMap::new();
        contents.insert(key.to_string(), value.map(|v| v.as_bytes().to_vec()));
        store.put(branch, KS, ts, contents).unwrap();
    }

    #[test]
    fn test_put_get_round_trip() {
        init_tracing();
        let store = TemporalStore::default();
        put_one(&store, "master", 10, "a", Some("x"));

        let result = store.get("master", KS, 10, "a").unwrap();
        assert_eq!(result.value.as_deref(), Some("x".as_bytes()));
        assert!(result.period.contains(10));

        let never = store.get("master", KS, 10, "ghost").unwrap();
        assert_eq!(never.value, None);
        assert_eq!(never.period, ValidityPeriod::eternal());
    }

    #[test]
    fn test_child_branch_inherits_history() {
        let store = TemporalStore::default();
        put_one(&store, "master", 50, "a", Some("x"));
        store.create_branch("master", "feature", 50).unwrap();

        // before the fork the parent answers directly
        assert_eq!(store.resolve_effective("feature", 49).unwrap(), "master");
        assert_eq!(store.resolve_effective("feature", 50).unwrap(), "feature");

        // after the fork with no local entry, the lookup falls back per key
        let inherited = store.get("feature", KS, 100, "a").unwrap();
        assert_eq!(inherited.value.as_deref(), Some("x".as_bytes()));
    }

    #[test]
    fn test_child_branch_shadows_parent() {
        let store = TemporalStore::default();
        put_one(&store, "master", 50, "a", Some("x"));
        store.create_branch("master", "feature", 50).unwrap();
        put_one(&store, "feature", 60, "a", Some("y"));

        assert_eq!(
            store.get("feature", KS, 100, "a").unwrap().value.as_deref(),
            Some("y".as_bytes())
        );
        // the parent is untouched
        assert_eq!(
            store.get("master", KS, 100, "a").unwrap().value.as_deref(),
            Some("x".as_bytes())
        );
        // pre-write reads on the child still see the inherited value
        assert_eq!(
            store.get("feature", KS, 55, "a").unwrap().value.as_deref(),
            Some("x".as_bytes())
        );
    }

    #[test]
    fn test_parent_writes_after_fork_invisible() {
        let store = TemporalStore::default();
        put_one(&store, "master", 50, "a", Some("x"));
        store.create_branch("master", "feature", 50).unwrap();
        put_one(&store, "master", 80, "a", Some("z"));

        // the child sees the state as of its fork, not the parent's later one
        assert_eq!(
            store.get("feature", KS, 100, "a").unwrap().value.as_deref(),
            Some("x".as_bytes())
        );
    }

    #[test]
    fn test_write_before_fork_rejected() {
        let store = TemporalStore::default();
        put_one(&store, "master", 50, "a", Some("x"));
        store.create_branch("master", "feature", 50).unwrap();

        let mut contents = HashMap::new();
        contents.insert("b".to_string(), payload("{}"));
        let err = store.put("feature", KS, 10, contents).unwrap_err();
        assert!(matches!(err, StoreError::PreconditionViolation(_)));
    }

    #[test]
    fn test_key_set_composition() {
        let store = TemporalStore::default();
        put_one(&store, "master", 10, "a", Some("1"));
        put_one(&store, "master", 20, "b", Some("2"));
        store.create_branch("master", "feature", 20).unwrap();
        put_one(&store, "feature", 30, "a", None); // delete inherited key
        put_one(&store, "feature", 40, "c", Some("3"));

        let keys = store.key_set("feature", KS, 100).unwrap();
        assert_eq!(
            keys,
            ["b".to_string(), "c".to_string()].into_iter().collect()
        );

        let master_keys = store.key_set("master", KS, 100).unwrap();
        assert_eq!(
            master_keys,
            ["a".to_string(), "b".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn test_rollback_marks_indices_dirty() {
        let store = TemporalStore::default();
        store
            .create_index("master", "name", Arc::new(JsonPropertyIndexer::string("name")))
            .unwrap();
        store.reindex(false).unwrap();
        assert!(store.dirty_indices().unwrap().is_empty());

        put_one(&store, "master", 10, "p1", Some(r#"{"name": "John"}"#));
        store.rollback("master", 5).unwrap();

        assert!(store.get("master", KS, 20, "p1").unwrap().value.is_none());
        assert_eq!(store.dirty_indices().unwrap().len(), 1);
        assert_eq!(store.branch("master").unwrap().head, 5);
    }

    #[test]
    fn test_incremental_indexing_and_query() {
        let store = TemporalStore::default();
        store
            .create_index("master", "name", Arc::new(JsonPropertyIndexer::string("name")))
            .unwrap();
        store.reindex(false).unwrap();

        put_one(&store, "master", 5, "p1", Some(r#"{"name": "John"}"#));
        put_one(&store, "master", 15, "p1", Some(r#"{"name": "Jane"}"#));

        let at_10 = store
            .index_scan("master", KS, "name", 10, Order::Ascending, None)
            .unwrap();
        assert_eq!(at_10, vec![(IndexValue::from("John"), "p1".to_string())]);

        let at_20 = store
            .index_scan("master", KS, "name", 20, Order::Ascending, None)
            .unwrap();
        assert_eq!(at_20, vec![(IndexValue::from("Jane"), "p1".to_string())]);

        let exact = store
            .index_query(
                "master",
                KS,
                "name",
                20,
                Order::Ascending,
                &QueryCondition::Equals(IndexValue::from("Jane")),
            )
            .unwrap();
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn test_reindex_from_existing_history() {
        let store = TemporalStore::default();
        put_one(&store, "master", 5, "p1", Some(r#"{"name": "John"}"#));
        put_one(&store, "master", 15, "p1", Some(r#"{"name": "Jane"}"#));
        put_one(&store, "master", 20, "p2", Some(r#"{"name": "Alice"}"#));

        // the index arrives after the data; reindex replays history
        store
            .create_index("master", "name", Arc::new(JsonPropertyIndexer::string("name")))
            .unwrap();
        store.reindex(false).unwrap();

        let at_10 = store
            .index_scan("master", KS, "name", 10, Order::Ascending, None)
            .unwrap();
        assert_eq!(at_10, vec![(IndexValue::from("John"), "p1".to_string())]);

        let at_30 = store
            .index_scan("master", KS, "name", 30, Order::Ascending, None)
            .unwrap();
        assert_eq!(
            at_30,
            vec![
                (IndexValue::from("Alice"), "p2".to_string()),
                (IndexValue::from("Jane"), "p1".to_string())
            ]
        );
    }

    #[test]
    fn test_baseline_for_child_only_index() {
        let store = TemporalStore::default();
        put_one(&store, "master", 10, "p1", Some(r#"{"name": "John"}"#));
        put_one(&store, "master", 20, "p2", Some(r#"{"name": "Alice"}"#));
        store.create_branch("master", "feature", 20).unwrap();

        // index exists only on the child: it cannot delegate, so reindex
        // synthesizes a baseline from the state inherited at the fork
        store
            .create_index("feature", "name", Arc::new(JsonPropertyIndexer::string("name")))
            .unwrap();
        store.reindex(false).unwrap();

        let scan = store
            .index_scan("feature", KS, "name", 50, Order::Ascending, None)
            .unwrap();
        assert_eq!(
            scan,
            vec![
                (IndexValue::from("Alice"), "p2".to_string()),
                (IndexValue::from("John"), "p1".to_string())
            ]
        );
    }

    #[test]
    fn test_branch_delta_scan_overrides() {
        let store = TemporalStore::default();
        store
            .create_index("master", "name", Arc::new(JsonPropertyIndexer::string("name")))
            .unwrap();
        store.reindex(false).unwrap();

        put_one(&store, "master", 10, "p1", Some(r#"{"name": "John"}"#));
        put_one(&store, "master", 20, "p2", Some(r#"{"name": "Alice"}"#));
        store.create_branch("master", "feature", 20).unwrap();
        store
            .create_index("feature", "name", Arc::new(JsonPropertyIndexer::string("name")))
            .unwrap();
        store.reindex(false).unwrap();

        // the child rewrites p1 and the parent keeps writing after the fork
        put_one(&store, "feature", 30, "p1", Some(r#"{"name": "Jane"}"#));
        put_one(&store, "master", 40, "p3", Some(r#"{"name": "Bob"}"#));

        let child_scan = store
            .index_scan("feature", KS, "name", 100, Order::Ascending, None)
            .unwrap();
        assert_eq!(
            child_scan,
            vec![
                (IndexValue::from("Alice"), "p2".to_string()),
                (IndexValue::from("Jane"), "p1".to_string())
            ]
        );

        // before the child's local write, the inherited value still shows
        let child_at_25 = store
            .index_scan("feature", KS, "name", 25, Order::Ascending, None)
            .unwrap();
        assert_eq!(
            child_at_25,
            vec![
                (IndexValue::from("Alice"), "p2".to_string()),
                (IndexValue::from("John"), "p1".to_string())
            ]
        );
    }

    #[test]
    fn test_pre_fork_scan_matches_parent() {
        let store = TemporalStore::default();
        store
            .create_index("master", "name", Arc::new(JsonPropertyIndexer::string("name")))
            .unwrap();
        store.reindex(false).unwrap();

        put_one(&store, "master", 10, "p1", Some(r#"{"name": "John"}"#));
        // advance the parent's head so forking at 20 is legal
        put_one(&store, "master", 20, "pad", Some("x"));
        store.create_branch("master", "feature", 20).unwrap();
        store
            .create_index("feature", "name", Arc::new(JsonPropertyIndexer::string("name")))
            .unwrap();
        store.reindex(false).unwrap();
        put_one(&store, "feature", 30, "p1", Some(r#"{"name": "Jane"}"#));

        // before the fork the parent answers; the child's later override of
        // p1 must not suppress it
        let child = store
            .index_scan("feature", KS, "name", 15, Order::Ascending, None)
            .unwrap();
        let parent = store
            .index_scan("master", KS, "name", 15, Order::Ascending, None)
            .unwrap();
        assert_eq!(child, vec![(IndexValue::from("John"), "p1".to_string())]);
        assert_eq!(child, parent);
    }

    #[test]
    fn test_delete_branch_teardown() {
        let store = TemporalStore::default();
        put_one(&store, "master", 10, "a", Some("x"));
        store.create_branch("master", "feature", 10).unwrap();
        store.create_branch("feature", "nested", 10).unwrap();
        put_one(&store, "feature", 20, "b", Some("y"));

        let deleted = store.delete_branch("feature").unwrap();
        assert_eq!(deleted, vec!["nested", "feature"]);
        assert!(store.branch("feature").is_err());

        let stats = store.stats().unwrap();
        assert_eq!(stats.branch_count, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_history_and_last_commit() {
        let store = TemporalStore::default();
        put_one(&store, "master", 10, "a", Some("1"));
        put_one(&store, "master", 20, "a", None);

        let history = store
            .history("master", KS, "a", 0, 30, Order::Ascending)
            .unwrap();
        assert_eq!(history, vec![10, 20]);

        store.create_branch("master", "feature", 20).unwrap();
        // the child has no local entries; the ancestor's floor answers
        assert_eq!(
            store
                .last_commit_timestamp("feature", KS, "a", 100)
                .unwrap(),
            Some(20)
        );
    }

    #[test]
    fn test_history_composes_across_fork() {
        let store = TemporalStore::default();
        put_one(&store, "master", 10, "a", Some("1"));
        // advance the parent's head so forking at 20 is legal
        put_one(&store, "master", 20, "pad", Some("x"));
        store.create_branch("master", "feature", 20).unwrap();
        put_one(&store, "master", 30, "a", Some("2")); // post-fork, invisible
        put_one(&store, "feature", 40, "a", Some("3"));

        // the pre-fork change on the parent is part of the child's history
        let history = store
            .history("feature", KS, "a", 0, 100, Order::Ascending)
            .unwrap();
        assert_eq!(history, vec![10, 40]);

        let descending = store
            .history("feature", KS, "a", 0, 100, Order::Descending)
            .unwrap();
        assert_eq!(descending, vec![40, 10]);

        // a window entirely before the fork resolves to the parent
        let early = store
            .history("feature", KS, "a", 0, 15, Order::Ascending)
            .unwrap();
        assert_eq!(early, vec![10]);

        let err = store
            .history("feature", KS, "a", 50, 10, Order::Ascending)
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionViolation(_)));
    }

    #[test]
    fn test_stats_display() {
        let store = TemporalStore::default();
        put_one(&store, "master", 10, "a", Some("x"));
        let stats = store.stats().unwrap();
        assert_eq!(stats.entry_count, 1);
        assert!(stats.to_string().contains("Branches: 1"));
    }
}
