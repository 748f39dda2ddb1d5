//! Temporal Matrix
//!
//! One matrix per (branch, keyspace) stores the full version history of every
//! key as ordered (key, timestamp) → value entries. A derived inverse index
//! orders the same entries by (timestamp, key) to answer "what changed in
//! [t0, t1)" without scanning per key.
//!
//! ```text
//! Primary:  (key, ts) → Option<bytes>   floor/ceiling point lookups
//! Inverse:  (ts, key)                   change scans, rollback
//! ```
//!
//! A `None` payload is an explicit tombstone: the key was deleted at that
//! timestamp, which is distinct from the key never having existed.

use crate::error::{StoreError, StoreResult};
use crate::matrix::types::{KeySetModifications, Order, TemporalKey, ValidityPeriod, ETERNAL};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound::{Excluded, Included, Unbounded};

/// Result of a ranged point lookup: the value (if any) and the interval
/// during which that answer holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    /// The payload at the requested instant; `None` for tombstones and for
    /// keys never written
    pub value: Option<Vec<u8>>,
    /// Interval over which `value` is the answer
    pub period: ValidityPeriod,
}

impl GetResult {
    fn new(value: Option<Vec<u8>>, from: u64, to: u64) -> Self {
        Self {
            value,
            period: ValidityPeriod::new(from, to),
        }
    }
}

/// Versioned key/value history for one (branch, keyspace) pair
#[derive(Debug, Default)]
pub struct TemporalMatrix {
    /// Primary layout: (key, timestamp) → value or tombstone
    entries: BTreeMap<TemporalKey, Option<Vec<u8>>>,
    /// Inverse layout: (timestamp, key), for time-ordered scans
    inverse: BTreeSet<(u64, String)>,
    /// Earliest timestamp ever written; extends downward on out-of-order
    /// historical injection
    creation_timestamp: Option<u64>,
}

impl TemporalMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest timestamp this matrix has seen, if any write happened
    pub fn creation_timestamp(&self) -> Option<u64> {
        self.creation_timestamp
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point lookup with validity interval
    ///
    /// Binary-searches the primary layout for the floor entry of `key` at
    /// `timestamp`. A missing floor means the key did not exist at that
    /// instant; the validity interval then runs from 0 to the key's first
    /// entry (or forever if the key was never written at all).
    pub fn get(&self, timestamp: u64, key: &str) -> StoreResult<GetResult> {
        check_timestamp(timestamp)?;

        let floor = self
            .entries
            .range(TemporalKey::new(key, 0)..=TemporalKey::new(key, timestamp))
            .next_back();

        let ceiling_ts = self
            .entries
            .range((
                Excluded(TemporalKey::new(key, timestamp)),
                Included(TemporalKey::new(key, ETERNAL)),
            ))
            .next()
            .map(|(k, _)| k.timestamp);

        let result = match floor {
            None => GetResult::new(None, 0, ceiling_ts.unwrap_or(ETERNAL)),
            Some((floor_key, value)) => GetResult::new(
                value.clone(),
                floor_key.timestamp,
                ceiling_ts.unwrap_or(ETERNAL),
            ),
        };
        Ok(result)
    }

    /// Batch insert at one timestamp
    ///
    /// Each key gets exactly one entry at `timestamp`, overwriting any value
    /// or tombstone already there. A `None` value stores an explicit
    /// tombstone. The inverse index is updated symmetrically.
    pub fn put(
        &mut self,
        timestamp: u64,
        contents: HashMap<String, Option<Vec<u8>>>,
    ) -> StoreResult<()> {
        check_timestamp(timestamp)?;
        for key in contents.keys() {
            if key.is_empty() {
                return Err(StoreError::PreconditionViolation(
                    "empty key in put batch".to_string(),
                ));
            }
        }

        for (key, value) in contents {
            self.inverse.insert((timestamp, key.clone()));
            self.entries.insert(TemporalKey::new(key, timestamp), value);
        }

        match self.creation_timestamp {
            Some(existing) if existing <= timestamp => {}
            _ => self.creation_timestamp = Some(timestamp),
        }
        Ok(())
    }

    /// Replay all entries with `ts <= timestamp` in ascending order, tracking
    /// the last-seen state per key
    pub fn key_set_modifications(&self, timestamp: u64) -> StoreResult<KeySetModifications> {
        check_timestamp(timestamp)?;
        let mut modifications = KeySetModifications::default();

        let upper = (timestamp.saturating_add(1), String::new());
        for (ts, key) in self.inverse.range((Unbounded, Excluded(upper))) {
            let entry = self
                .entries
                .get(&TemporalKey::new(key.clone(), *ts))
                .ok_or_else(|| {
                    StoreError::IllegalState(format!(
                        "inverse entry ({}, {}) has no primary counterpart",
                        ts, key
                    ))
                })?;
            if entry.is_some() {
                modifications.removed.remove(key);
                modifications.added.insert(key.clone());
            } else {
                modifications.added.remove(key);
                modifications.removed.insert(key.clone());
            }
        }
        Ok(modifications)
    }

    /// All change timestamps for `key` within `[lower, upper]`
    pub fn history(
        &self,
        key: &str,
        lower: u64,
        upper: u64,
        order: Order,
    ) -> StoreResult<Vec<u64>> {
        check_range(lower, upper)?;
        let mut timestamps: Vec<u64> = self
            .entries
            .range(TemporalKey::new(key, lower)..=TemporalKey::new(key, upper))
            .map(|(k, _)| k.timestamp)
            .collect();
        if order == Order::Descending {
            timestamps.reverse();
        }
        Ok(timestamps)
    }

    /// Floor lookup: the latest change to `key` at or before `upper_bound`,
    /// or `None` if the key was never touched in that window
    pub fn last_commit_timestamp(&self, key: &str, upper_bound: u64) -> StoreResult<Option<u64>> {
        check_timestamp(upper_bound)?;
        Ok(self
            .entries
            .range(TemporalKey::new(key, 0)..=TemporalKey::new(key, upper_bound))
            .next_back()
            .map(|(k, _)| k.timestamp))
    }

    /// Unconditional physical deletion of specific (key, timestamp) entries
    ///
    /// Used only by out-of-band history-rewrite operations, never by regular
    /// writes. Returns how many of the named entries existed and were removed.
    pub fn purge_entries(&mut self, keys: &HashSet<TemporalKey>) -> usize {
        let mut removed = 0;
        for tk in keys {
            if self.entries.remove(tk).is_some() {
                self.inverse.remove(&(tk.timestamp, tk.key.clone()));
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!("Purged {} matrix entries", removed);
        }
        removed
    }

    /// Hard truncation: physically remove every entry with `ts > timestamp`
    /// from both the primary and inverse layouts
    pub fn rollback(&mut self, timestamp: u64) -> StoreResult<()> {
        check_timestamp(timestamp)?;
        if timestamp == ETERNAL - 1 {
            return Ok(());
        }

        let truncated = self.inverse.split_off(&(timestamp + 1, String::new()));
        let count = truncated.len();
        for (ts, key) in truncated {
            self.entries.remove(&TemporalKey::new(key, ts));
        }
        if count > 0 {
            tracing::info!("Rolled back {} entries past timestamp {}", count, timestamp);
        }
        Ok(())
    }

    /// Scan the inverse index over the half-open window `[t0, t1)`
    pub fn get_modifications_between(&self, t0: u64, t1: u64) -> StoreResult<Vec<(u64, String)>> {
        check_range(t0, t1)?;
        Ok(self
            .inverse
            .range((t0, String::new())..(t1, String::new()))
            .cloned()
            .collect())
    }

    /// The stored entry at exactly (key, timestamp), if one exists
    ///
    /// Outer `None` means no entry; inner `None` means a tombstone entry.
    pub fn entry_at(&self, key: &str, timestamp: u64) -> Option<Option<Vec<u8>>> {
        self.entries.get(&TemporalKey::new(key, timestamp)).cloned()
    }
}

fn check_timestamp(timestamp: u64) -> StoreResult<()> {
    if timestamp == ETERNAL {
        return Err(StoreError::PreconditionViolation(
            "timestamp must be below the eternal bound".to_string(),
        ));
    }
    Ok(())
}

fn check_range(lower: u64, upper: u64) -> StoreResult<()> {
    if lower > upper {
        return Err(StoreError::PreconditionViolation(format!(
            "inverted range: {} > {}",
            lower, upper
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_one(matrix: &mut TemporalMatrix, ts: u64, key: &str, value: Option<&str>) {
        let mut contents = HashMap::new();
        contents.insert(
            key.to_string(),
            value.map(|v| v.as_bytes().to_vec()),
        );
        matrix.put(ts, contents).unwrap();
    }

    #[test]
    fn test_get_after_put() {
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 10, "a", Some("x"));

        let result = matrix.get(10, "a").unwrap();
        assert_eq!(result.value.as_deref(), Some("x".as_bytes()));
        assert!(result.period.contains(10));
    }

    #[test]
    fn test_get_never_written() {
        let matrix = TemporalMatrix::new();
        let result = matrix.get(100, "ghost").unwrap();
        assert_eq!(result.value, None);
        assert_eq!(result.period, ValidityPeriod::eternal());
    }

    #[test]
    fn test_get_before_first_entry() {
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 50, "a", Some("x"));

        let result = matrix.get(20, "a").unwrap();
        assert_eq!(result.value, None);
        assert_eq!(result.period, ValidityPeriod::new(0, 50));
    }

    #[test]
    fn test_tombstone_scenario() {
        // write "a"="x" at t=10, tombstone at t=20
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 10, "a", Some("x"));
        put_one(&mut matrix, 20, "a", None);

        let result = matrix.get(15, "a").unwrap();
        assert_eq!(result.value.as_deref(), Some("x".as_bytes()));
        assert_eq!(result.period, ValidityPeriod::new(10, 20));

        let result = matrix.get(25, "a").unwrap();
        assert_eq!(result.value, None);
        assert_eq!(result.period, ValidityPeriod::open_ended(20));

        let history = matrix.history("a", 0, 30, Order::Ascending).unwrap();
        assert_eq!(history, vec![10, 20]);
    }

    #[test]
    fn test_put_overwrites_same_timestamp() {
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 10, "a", None);
        put_one(&mut matrix, 10, "a", Some("x"));

        assert_eq!(matrix.len(), 1);
        let result = matrix.get(10, "a").unwrap();
        assert_eq!(result.value.as_deref(), Some("x".as_bytes()));
    }

    #[test]
    fn test_creation_timestamp_extends_downward() {
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 100, "a", Some("x"));
        assert_eq!(matrix.creation_timestamp(), Some(100));

        // out-of-order historical injection
        put_one(&mut matrix, 5, "b", Some("y"));
        assert_eq!(matrix.creation_timestamp(), Some(5));

        put_one(&mut matrix, 200, "c", Some("z"));
        assert_eq!(matrix.creation_timestamp(), Some(5));
    }

    #[test]
    fn test_key_set_modifications() {
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 10, "a", Some("1"));
        put_one(&mut matrix, 20, "b", Some("2"));
        put_one(&mut matrix, 30, "a", None);

        let mods = matrix.key_set_modifications(25).unwrap();
        assert!(mods.added.contains("a"));
        assert!(mods.added.contains("b"));
        assert!(mods.removed.is_empty());

        let mods = matrix.key_set_modifications(30).unwrap();
        assert!(!mods.added.contains("a"));
        assert!(mods.removed.contains("a"));
        assert!(mods.added.contains("b"));
    }

    #[test]
    fn test_history_descending() {
        let mut matrix = TemporalMatrix::new();
        for ts in [10, 20, 30] {
            put_one(&mut matrix, ts, "a", Some("v"));
        }
        let history = matrix.history("a", 0, 100, Order::Descending).unwrap();
        assert_eq!(history, vec![30, 20, 10]);

        let bounded = matrix.history("a", 15, 30, Order::Ascending).unwrap();
        assert_eq!(bounded, vec![20, 30]);
    }

    #[test]
    fn test_history_inverted_range_fails_fast() {
        let matrix = TemporalMatrix::new();
        let err = matrix.history("a", 30, 10, Order::Ascending).unwrap_err();
        assert!(matches!(err, StoreError::PreconditionViolation(_)));
    }

    #[test]
    fn test_last_commit_timestamp() {
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 10, "a", Some("x"));
        put_one(&mut matrix, 30, "a", Some("y"));

        assert_eq!(matrix.last_commit_timestamp("a", 20).unwrap(), Some(10));
        assert_eq!(matrix.last_commit_timestamp("a", 30).unwrap(), Some(30));
        assert_eq!(matrix.last_commit_timestamp("a", 5).unwrap(), None);
        assert_eq!(matrix.last_commit_timestamp("ghost", 100).unwrap(), None);
    }

    #[test]
    fn test_rollback_replay_round_trip() {
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 10, "a", Some("1"));
        put_one(&mut matrix, 20, "b", Some("2"));
        put_one(&mut matrix, 30, "a", None);
        put_one(&mut matrix, 40, "c", Some("3"));

        let before = matrix.key_set_modifications(30).unwrap();

        matrix.rollback(30).unwrap();
        assert_eq!(matrix.len(), 3);
        assert!(matrix.get(40, "c").unwrap().value.is_none());

        // replaying everything at or below the rollback point reproduces the
        // pre-rollback key set
        let after = matrix.key_set_modifications(30).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_purge_entries() {
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 10, "a", Some("1"));
        put_one(&mut matrix, 20, "a", Some("2"));

        let mut targets = HashSet::new();
        targets.insert(TemporalKey::new("a", 10));
        targets.insert(TemporalKey::new("a", 99)); // does not exist

        assert_eq!(matrix.purge_entries(&targets), 1);
        assert_eq!(matrix.len(), 1);
        // inverse stays consistent
        let mods = matrix.get_modifications_between(0, 100).unwrap();
        assert_eq!(mods, vec![(20, "a".to_string())]);
    }

    #[test]
    fn test_modifications_between_half_open() {
        let mut matrix = TemporalMatrix::new();
        put_one(&mut matrix, 10, "a", Some("1"));
        put_one(&mut matrix, 20, "b", Some("2"));
        put_one(&mut matrix, 30, "c", Some("3"));

        let mods = matrix.get_modifications_between(10, 30).unwrap();
        assert_eq!(
            mods,
            vec![(10, "a".to_string()), (20, "b".to_string())]
        );
    }

    #[test]
    fn test_eternal_timestamp_rejected() {
        let mut matrix = TemporalMatrix::new();
        let err = matrix.put(ETERNAL, HashMap::new()).unwrap_err();
        assert!(matches!(err, StoreError::PreconditionViolation(_)));
        assert!(matrix.get(ETERNAL, "a").is_err());
    }
}
