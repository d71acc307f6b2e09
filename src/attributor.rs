//! Attribution of raw access events to `(key, weight)` contributions
//!
//! Command-tap records are tokenized on whitespace: the first token is the
//! command verb and the second is the key. Records with fewer than two
//! tokens cannot be attributed and are dropped by the caller.
//!
//! Keyspace notifications carry the key directly and always receive the
//! policy's default weight.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::{AttributedEvent, RawEvent};

/// Weight used for verbs missing from the table and for notifications
pub const DEFAULT_WEIGHT: u64 = 1;

/// Command verb to weight lookup
///
/// Verbs are stored upper-case and looked up case-insensitively, so a
/// tapped `set` matches a `SET` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct WeightTable {
    weights: BTreeMap<String, u64>,
}

impl Default for WeightTable {
    /// Reads weigh 1, writes and multi-field writes weigh 2
    fn default() -> Self {
        Self::empty()
            .with_weight("GET", 1)
            .with_weight("SET", 2)
            .with_weight("HSET", 2)
            .with_weight("HGETALL", 1)
    }
}

impl WeightTable {
    /// Table without entries: every verb gets [`DEFAULT_WEIGHT`]
    pub fn empty() -> Self {
        Self {
            weights: BTreeMap::new(),
        }
    }

    /// Add or replace a verb's weight (clamped to at least 1)
    pub fn with_weight(mut self, verb: &str, weight: u64) -> Self {
        self.weights.insert(verb.to_ascii_uppercase(), weight.max(1));
        self
    }

    /// Weight for a verb, falling back to [`DEFAULT_WEIGHT`]
    pub fn weight_of(&self, verb: &str) -> u64 {
        self.weights
            .get(&verb.to_ascii_uppercase())
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, u64)> for WeightTable {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |table, (verb, weight)| {
                table.with_weight(verb.as_ref(), weight)
            })
    }
}

impl From<BTreeMap<String, u64>> for WeightTable {
    fn from(map: BTreeMap<String, u64>) -> Self {
        map.into_iter().collect()
    }
}

impl From<WeightTable> for BTreeMap<String, u64> {
    fn from(table: WeightTable) -> Self {
        table.weights
    }
}

/// How attributed events are weighted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScoringPolicy {
    /// Every attributable event weighs 1
    #[default]
    Constant,
    /// Weight looked up by command verb
    CommandWeighted(WeightTable),
}

impl ScoringPolicy {
    /// Command-weighted policy with the default table
    pub fn command_weighted() -> Self {
        ScoringPolicy::CommandWeighted(WeightTable::default())
    }

    /// Weight for events that carry no verb
    pub fn default_weight(&self) -> u64 {
        DEFAULT_WEIGHT
    }

    fn weight_for_verb(&self, verb: &str) -> u64 {
        match self {
            ScoringPolicy::Constant => DEFAULT_WEIGHT,
            ScoringPolicy::CommandWeighted(table) => table.weight_of(verb),
        }
    }
}

/// Attribute a raw event under a scoring policy
///
/// Returns `None` when the event names no key.
pub fn attribute(raw: &RawEvent, policy: &ScoringPolicy) -> Option<AttributedEvent> {
    match raw {
        RawEvent::KeyTouch { key } => {
            if key.is_empty() {
                return None;
            }
            Some(AttributedEvent {
                key: key.clone(),
                weight: policy.default_weight(),
            })
        }
        RawEvent::Command { line } => {
            let mut tokens = line.split_whitespace();
            let verb = tokens.next()?;
            let key = tokens.next()?;
            Some(AttributedEvent {
                key: key.to_string(),
                weight: policy.weight_for_verb(verb),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_policy_weighs_one() {
        let ev = attribute(&RawEvent::command("SET user:1 x"), &ScoringPolicy::Constant).unwrap();
        assert_eq!(ev.key, "user:1");
        assert_eq!(ev.weight, 1);
    }

    #[test]
    fn test_command_weighted_uses_table() {
        let policy = ScoringPolicy::command_weighted();
        let set = attribute(&RawEvent::command("SET user:1 x"), &policy).unwrap();
        let get = attribute(&RawEvent::command("GET user:1"), &policy).unwrap();
        let hset = attribute(&RawEvent::command("HSET h f v"), &policy).unwrap();
        assert_eq!(set.weight, 2);
        assert_eq!(get.weight, 1);
        assert_eq!(hset.weight, 2);
    }

    #[test]
    fn test_verb_lookup_ignores_case() {
        let policy = ScoringPolicy::command_weighted();
        let ev = attribute(&RawEvent::command("set user:1 x"), &policy).unwrap();
        assert_eq!(ev.weight, 2);
    }

    #[test]
    fn test_unknown_verb_defaults_to_one() {
        let policy = ScoringPolicy::command_weighted();
        let ev = attribute(&RawEvent::command("ZADD board 1 alice"), &policy).unwrap();
        assert_eq!(ev.key, "board");
        assert_eq!(ev.weight, 1);
    }

    #[test]
    fn test_single_token_is_dropped() {
        let policy = ScoringPolicy::command_weighted();
        assert!(attribute(&RawEvent::command("PING"), &policy).is_none());
        assert!(attribute(&RawEvent::command("   "), &policy).is_none());
        assert!(attribute(&RawEvent::command(""), &policy).is_none());
    }

    #[test]
    fn test_extra_whitespace_is_ignored() {
        let ev = attribute(
            &RawEvent::command("  GET\t  user:7  "),
            &ScoringPolicy::Constant,
        )
        .unwrap();
        assert_eq!(ev.key, "user:7");
    }

    #[test]
    fn test_key_touch_gets_default_weight() {
        let policy = ScoringPolicy::command_weighted();
        let ev = attribute(&RawEvent::key_touch("session:9"), &policy).unwrap();
        assert_eq!(ev.key, "session:9");
        assert_eq!(ev.weight, DEFAULT_WEIGHT);
    }

    #[test]
    fn test_empty_key_touch_is_dropped() {
        assert!(attribute(&RawEvent::key_touch(""), &ScoringPolicy::Constant).is_none());
    }

    #[test]
    fn test_weight_table_clamps_zero() {
        let table = WeightTable::empty().with_weight("del", 0);
        assert_eq!(table.weight_of("DEL"), 1);
    }

    #[test]
    fn test_weight_table_from_iter() {
        let table: WeightTable = [("get", 1u64), ("set", 3)].into_iter().collect();
        assert_eq!(table.len(), 2);
        assert_eq!(table.weight_of("SET"), 3);
    }
}
