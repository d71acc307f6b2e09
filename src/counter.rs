//! Per-key score aggregation and top-K ranking
//!
//! [`FrequencyCounter`] is the only structure shared between the ingestion
//! loop and the controlling thread. Every operation takes the internal lock
//! once, so each increment is applied whole and a snapshot always reflects a
//! prefix of the increment sequence.
//!
//! Ranking is by score (descending), with ties broken by the order in which
//! keys were first seen. The earliest key wins a tie, which keeps two
//! snapshots of the same state identical.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;

/// A key and its accumulated score at snapshot time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedKey {
    pub key: String,
    pub score: u64,
}

impl RankedKey {
    pub fn new(key: impl Into<String>, score: u64) -> Self {
        Self {
            key: key.into(),
            score,
        }
    }
}

/// Immutable ranked view of the counter, highest score first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: Vec<RankedKey>,
}

impl Snapshot {
    /// Build a snapshot from entries already in rank order
    pub fn from_ranked(entries: Vec<RankedKey>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RankedKey] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the scores in this snapshot
    pub fn total_score(&self) -> u64 {
        self.entries.iter().map(|e| e.score).sum()
    }

    /// `(key, score)` pairs in rank order
    pub fn to_pairs(&self) -> Vec<(String, u64)> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.score))
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RankedKey> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a RankedKey;
    type IntoIter = std::slice::Iter<'a, RankedKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Destination for attributed weights
///
/// Implemented by the in-process [`FrequencyCounter`] and by
/// [`crate::store::StoreCounter`], which delegates to a shared store and may
/// report [`crate::error::HotkeyError::StorageUnavailable`].
pub trait ScoreSink: Send + Sync {
    /// Add `weight` to the key's score, creating the key if absent
    fn increment(&self, key: &str, weight: u64) -> Result<()>;

    /// Top `k` keys by score
    fn snapshot(&self, k: usize) -> Result<Snapshot>;

    /// Remove every key
    fn reset(&self) -> Result<()>;

    /// Number of distinct keys tracked
    fn cardinality(&self) -> Result<usize>;
}

#[derive(Debug)]
struct Entry {
    score: u64,
    /// Position of the key's first increment, used for tie-breaking
    first_seen: u64,
}

#[derive(Debug, Default)]
struct CounterState {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

/// Exact per-key counter held in process memory
#[derive(Debug, Default)]
pub struct FrequencyCounter {
    state: Mutex<CounterState>,
}

impl FrequencyCounter {
    /// Create an empty counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state; a panic while holding the lock cannot leave a
    /// half-applied increment, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `weight` to `key`. A zero weight is ignored so that no key is
    /// ever tracked with a zero score.
    pub fn add(&self, key: &str, weight: u64) {
        if weight == 0 {
            return;
        }
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.score = entry.score.saturating_add(weight);
            return;
        }
        let first_seen = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key.to_string(),
            Entry {
                score: weight,
                first_seen,
            },
        );
    }

    /// Top `k` keys, strictly ordered by (score desc, first seen asc)
    pub fn top(&self, k: usize) -> Snapshot {
        if k == 0 {
            return Snapshot::default();
        }

        let state = self.lock();
        let mut ranked: Vec<(&String, u64, u64)> = state
            .entries
            .iter()
            .map(|(key, entry)| (key, entry.score, entry.first_seen))
            .collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.truncate(k);

        Snapshot::from_ranked(
            ranked
                .into_iter()
                .map(|(key, score, _)| RankedKey::new(key.clone(), score))
                .collect(),
        )
    }

    /// Drop every key and restart first-seen ordering
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.next_seq = 0;
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Score of a single key (0 if untracked)
    pub fn score_of(&self, key: &str) -> u64 {
        self.lock().entries.get(key).map_or(0, |e| e.score)
    }

    /// Sum of all scores
    pub fn total_score(&self) -> u64 {
        self.lock().entries.values().map(|e| e.score).sum()
    }
}

impl ScoreSink for FrequencyCounter {
    fn increment(&self, key: &str, weight: u64) -> Result<()> {
        self.add(key, weight);
        Ok(())
    }

    fn snapshot(&self, k: usize) -> Result<Snapshot> {
        Ok(self.top(k))
    }

    fn reset(&self) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn cardinality(&self) -> Result<usize> {
        Ok(self.len())
    }
}
