//! Max-merged member→score mappings
//!
//! Every aggregation in the crate (buffer accumulation, grouping injection,
//! query results) goes through [`Stats::merge_to_max`]: a score is replaced
//! only by a strictly greater one, so merging is commutative, associative
//! and idempotent.

use crate::keys::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Member → score mapping with max-merge semantics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stats(BTreeMap<String, f64>);

impl Stats {
    pub fn new() -> Self {
        Stats(BTreeMap::new())
    }

    pub fn from_pairs<S: AsRef<str>>(pairs: &[(S, f64)]) -> Self {
        pairs
            .iter()
            .map(|(member, score)| (member.as_ref().to_string(), *score))
            .collect()
    }

    /// Keep the larger of the current and the offered score.
    ///
    /// Returns true when the mapping changed. NaN is never stored.
    pub fn merge_to_max(&mut self, member: &str, score: f64) -> bool {
        if score.is_nan() {
            return false;
        }
        match self.0.get_mut(member) {
            Some(existing) if *existing >= score => false,
            Some(existing) => {
                *existing = score;
                true
            }
            None => {
                self.0.insert(member.to_string(), score);
                true
            }
        }
    }

    /// Max-merge every entry of `other` into `self`
    pub fn merge_max(&mut self, other: &Stats) {
        for (member, score) in &other.0 {
            self.merge_to_max(member, *score);
        }
    }

    pub fn get(&self, member: &str) -> Option<f64> {
        self.0.get(member).copied()
    }

    pub fn insert(&mut self, member: impl Into<String>, score: f64) {
        self.0.insert(member.into(), score);
    }

    pub fn remove(&mut self, member: &str) -> Option<f64> {
        self.0.remove(member)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, f64> {
        self.0.iter()
    }

    /// Highest `n` entries, ties broken by member name
    pub fn top(&self, n: usize) -> Vec<(String, f64)> {
        let mut entries: Vec<(String, f64)> =
            self.0.iter().map(|(m, s)| (m.clone(), *s)).collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }

    pub fn into_map(self) -> BTreeMap<String, f64> {
        self.0
    }
}

impl FromIterator<(String, f64)> for Stats {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Stats(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, f64>> for Stats {
    fn from(map: BTreeMap<String, f64>) -> Self {
        Stats(map)
    }
}

impl<'a> IntoIterator for &'a Stats {
    type Item = (&'a String, &'a f64);
    type IntoIter = btree_map::Iter<'a, String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Max-aggregated query result with the window it was computed over
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rank {
    stats: Stats,
    pub from: Option<DateTime<Utc>>,
    pub till: Option<DateTime<Utc>>,
    pub depth: Option<Resolution>,
}

impl Rank {
    pub fn new(
        from: Option<DateTime<Utc>>,
        till: Option<DateTime<Utc>>,
        depth: Option<Resolution>,
    ) -> Self {
        Rank {
            stats: Stats::new(),
            from,
            till,
            depth,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn into_stats(self) -> Stats {
        self.stats
    }

    pub fn merge_to_max(&mut self, member: &str, score: f64) -> bool {
        self.stats.merge_to_max(member, score)
    }

    pub fn merge_max(&mut self, other: &Stats) {
        self.stats.merge_max(other)
    }

    pub fn get(&self, member: &str) -> Option<f64> {
        self.stats.get(member)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn top(&self, n: usize) -> Vec<(String, f64)> {
        self.stats.top(n)
    }
}
