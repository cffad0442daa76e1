//! In-process sorted-map store
//!
//! Mirrors the subset of Redis semantics the rollup layer relies on:
//! sorted sets, plain sets, hashes, integer counters and lazy key expiry.
//! One `RwLock` guards the keyspace, so `max_score` is atomic.

use super::RankStore;
use crate::error::{RankError, Result};
use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// f64 ordered by `total_cmp` so it can live in a `BTreeSet`
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Sorted bucket: member lookup map plus an ordered (score, member) index
#[derive(Debug, Clone, Default)]
struct SortedBucket {
    members: AHashMap<String, f64>,
    index: BTreeSet<(Score, String)>,
}

impl SortedBucket {
    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        debug_assert_eq!(
            self.members.len(),
            self.index.len(),
            "Invariant violated: members.len() ({}) != index.len() ({})",
            self.members.len(),
            self.index.len()
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn verify_invariants(&self) {}

    fn score(&self, member: &str) -> Option<f64> {
        self.members.get(member).copied()
    }

    fn set(&mut self, member: &str, score: f64) {
        if let Some(old) = self.members.insert(member.to_string(), score) {
            self.index.remove(&(Score(old), member.to_string()));
        }
        self.index.insert((Score(score), member.to_string()));
        self.verify_invariants();
    }

    /// Highest score first; equal scores in reverse lexicographic order
    fn rev_range(&self) -> Vec<(String, f64)> {
        self.index
            .iter()
            .rev()
            .map(|(score, member)| (member.clone(), score.0))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Value {
    SortedSet(SortedBucket),
    Set(AHashSet<String>),
    Hash(AHashMap<String, String>),
    Counter(i64),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::SortedSet(_) => "zset",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::Counter(_) => "counter",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

fn wrong_type(key: &str, found: &Value) -> RankError {
    RankError::BackingStoreUnavailable(format!(
        "WRONGTYPE key '{}' holds a {}",
        key,
        found.type_name()
    ))
}

/// In-memory [`RankStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<AHashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            data: RwLock::new(AHashMap::new()),
        }
    }

    /// Drop every key
    pub fn flush_all(&self) {
        self.data.write().clear();
    }

    /// Snapshot of every live sorted bucket, keyed by bucket id
    pub fn dump(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        let now = Instant::now();
        self.data
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .filter_map(|(key, entry)| match &entry.value {
                Value::SortedSet(bucket) => Some((
                    key.clone(),
                    bucket
                        .members
                        .iter()
                        .map(|(m, s)| (m.clone(), *s))
                        .collect(),
                )),
                _ => None,
            })
            .collect()
    }

    fn read_live<T>(&self, key: &str, f: impl FnOnce(&Value) -> Result<T>) -> Result<Option<T>> {
        let data = self.data.read();
        match data.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => f(&entry.value).map(Some),
            _ => Ok(None),
        }
    }

    /// Run `f` against the live value at `key`, creating it with `init`
    /// when absent or expired.
    fn write_with<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Value) -> Result<T>,
    ) -> Result<T> {
        let mut data = self.data.write();
        let now = Instant::now();
        if data.get(key).is_some_and(|entry| !entry.is_live(now)) {
            data.remove(key);
        }
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(init()));
        f(&mut entry.value)
    }

    fn sorted_mut<'a>(key: &str, value: &'a mut Value) -> Result<&'a mut SortedBucket> {
        match value {
            Value::SortedSet(bucket) => Ok(bucket),
            other => Err(wrong_type(key, other)),
        }
    }
}

impl RankStore for MemoryStore {
    fn score(&self, bucket: &str, member: &str) -> Result<Option<f64>> {
        Ok(self
            .read_live(bucket, |value| match value {
                Value::SortedSet(b) => Ok(b.score(member)),
                other => Err(wrong_type(bucket, other)),
            })?
            .flatten())
    }

    fn set_score(&self, bucket: &str, member: &str, score: f64) -> Result<()> {
        self.write_with(
            bucket,
            || Value::SortedSet(SortedBucket::default()),
            |value| {
                Self::sorted_mut(bucket, value)?.set(member, score);
                Ok(())
            },
        )
    }

    fn max_score(&self, bucket: &str, member: &str, score: f64) -> Result<bool> {
        self.write_with(
            bucket,
            || Value::SortedSet(SortedBucket::default()),
            |value| {
                let sorted = Self::sorted_mut(bucket, value)?;
                match sorted.score(member) {
                    Some(existing) if existing >= score => Ok(false),
                    _ => {
                        sorted.set(member, score);
                        Ok(true)
                    }
                }
            },
        )
    }

    fn range_desc(&self, bucket: &str) -> Result<Vec<(String, f64)>> {
        Ok(self
            .read_live(bucket, |value| match value {
                Value::SortedSet(b) => Ok(b.rev_range()),
                other => Err(wrong_type(bucket, other)),
            })?
            .unwrap_or_default())
    }

    fn expire(&self, key: &str, seconds: u64) -> Result<()> {
        let mut data = self.data.write();
        let now = Instant::now();
        if let Some(entry) = data.get_mut(key) {
            if entry.is_live(now) {
                // past the clock's range the key simply never expires
                entry.expires_at = now.checked_add(Duration::from_secs(seconds));
            }
        }
        Ok(())
    }

    fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let data = self.data.read();
        let now = Instant::now();
        Ok(data
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| {
                let remaining = at.saturating_duration_since(now);
                // round up like Redis does for a freshly set TTL
                remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
            }))
    }

    fn incr(&self, key: &str) -> Result<i64> {
        self.write_with(
            key,
            || Value::Counter(0),
            |value| match value {
                Value::Counter(n) => {
                    *n += 1;
                    Ok(*n)
                }
                other => Err(wrong_type(key, other)),
            },
        )
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.write_with(
            key,
            || Value::Set(AHashSet::new()),
            |value| match value {
                Value::Set(set) => Ok(set.insert(member.to_string())),
                other => Err(wrong_type(key, other)),
            },
        )
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut members = self
            .read_live(key, |value| match value {
                Value::Set(set) => Ok(set.iter().cloned().collect::<Vec<_>>()),
                other => Err(wrong_type(key, other)),
            })?
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.write_with(
            key,
            || Value::Hash(AHashMap::new()),
            |stored| match stored {
                Value::Hash(hash) => {
                    hash.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                other => Err(wrong_type(key, other)),
            },
        )
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .read_live(key, |value| match value {
                Value::Hash(hash) => Ok(hash.get(field).cloned()),
                other => Err(wrong_type(key, other)),
            })?
            .flatten())
    }

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut fields = self
            .read_live(key, |value| match value {
                Value::Hash(hash) => Ok(hash
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>()),
                other => Err(wrong_type(key, other)),
            })?
            .unwrap_or_default();
        fields.sort();
        Ok(fields)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .data
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
