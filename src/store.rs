//! Scores kept in a shared sorted-set store
//!
//! A remote store may be shared by independent runs, so each
//! [`StoreCounter`] writes under its own namespace and cleans it up on
//! reset. [`MemoryStore`] implements the same boundary in process and can be
//! switched offline to exercise the storage failure path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::counter::{RankedKey, ScoreSink, Snapshot};
use crate::error::{HotkeyError, Result};

/// Default sorted-set name for accumulated scores
pub const DEFAULT_SET_NAME: &str = "hotkeys";

/// Sorted-set operations a backing store must provide
pub trait ScoreStore: Send + Sync {
    /// Add `delta` to `member`'s score in `set`, creating either if absent
    fn increment_score(&self, set: &str, member: &str, delta: u64) -> Result<u64>;

    /// Highest-scoring `n` members of `set`, best first
    fn top_n(&self, set: &str, n: usize) -> Result<Vec<(String, u64)>>;

    /// Number of members in `set`
    fn member_count(&self, set: &str) -> Result<usize>;

    /// Delete `set` entirely
    fn delete(&self, set: &str) -> Result<()>;

    /// Liveness check
    fn ping(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct SortedSet {
    /// member -> (score, insertion order)
    members: HashMap<String, (u64, u64)>,
    next_seq: u64,
}

/// In-process sorted-set store
///
/// Ties rank by insertion order, matching [`crate::counter::FrequencyCounter`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<String, SortedSet>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the connection to the store
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(HotkeyError::StorageUnavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn sets(&self) -> MutexGuard<'_, HashMap<String, SortedSet>> {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Names of sets currently holding members
    pub fn set_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sets().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ScoreStore for MemoryStore {
    fn increment_score(&self, set: &str, member: &str, delta: u64) -> Result<u64> {
        self.check_online()?;
        let mut sets = self.sets();
        let sorted = sets.entry(set.to_string()).or_default();
        let seq = sorted.next_seq;
        let entry = sorted.members.entry(member.to_string()).or_insert_with(|| (0, seq));
        if entry.1 == seq {
            sorted.next_seq += 1;
        }
        entry.0 = entry.0.saturating_add(delta);
        Ok(entry.0)
    }

    fn top_n(&self, set: &str, n: usize) -> Result<Vec<(String, u64)>> {
        self.check_online()?;
        let sets = self.sets();
        let Some(sorted) = sets.get(set) else {
            return Ok(Vec::new());
        };
        let mut members: Vec<(&String, &(u64, u64))> = sorted.members.iter().collect();
        members.sort_unstable_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        Ok(members
            .into_iter()
            .take(n)
            .map(|(member, (score, _))| (member.clone(), *score))
            .collect())
    }

    fn member_count(&self, set: &str) -> Result<usize> {
        self.check_online()?;
        Ok(self.sets().get(set).map_or(0, |s| s.members.len()))
    }

    fn delete(&self, set: &str) -> Result<()> {
        self.check_online()?;
        self.sets().remove(set);
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        self.check_online()
    }
}

/// A [`ScoreSink`] that keeps its scores in a [`ScoreStore`]
pub struct StoreCounter<S: ScoreStore> {
    store: Arc<S>,
    set_name: String,
}

impl<S: ScoreStore> StoreCounter<S> {
    /// Counter over `set_name`, after checking the store is reachable
    pub fn connect(store: Arc<S>, set_name: impl Into<String>) -> Result<Self> {
        store.ping()?;
        let set_name = set_name.into();
        debug!(set = %set_name, "connected score store");
        Ok(Self { store, set_name })
    }

    /// Counter over a fresh namespace (`hotkeys:<uuid>`) private to this run
    pub fn with_private_namespace(store: Arc<S>) -> Result<Self> {
        let name = format!("{}:{}", DEFAULT_SET_NAME, uuid::Uuid::new_v4());
        Self::connect(store, name)
    }

    pub fn set_name(&self) -> &str {
        &self.set_name
    }
}

impl<S: ScoreStore> ScoreSink for StoreCounter<S> {
    fn increment(&self, key: &str, weight: u64) -> Result<()> {
        if weight == 0 {
            return Ok(());
        }
        self.store.increment_score(&self.set_name, key, weight)?;
        Ok(())
    }

    fn snapshot(&self, k: usize) -> Result<Snapshot> {
        let top = self.store.top_n(&self.set_name, k)?;
        Ok(Snapshot::from_ranked(
            top.into_iter()
                .map(|(key, score)| RankedKey::new(key, score))
                .collect(),
        ))
    }

    fn reset(&self) -> Result<()> {
        self.store.delete(&self.set_name).inspect_err(|e| {
            warn!(set = %self.set_name, error = %e, "failed to delete score set");
        })
    }

    fn cardinality(&self) -> Result<usize> {
        self.store.member_count(&self.set_name)
    }
}
