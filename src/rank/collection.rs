//! Query results

use super::stats::{Rank, Stats};
use crate::keys::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contents of one interval slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
    /// Start of the slot
    pub date: DateTime<Utc>,
    pub stats: Stats,
}

/// Ordered per-interval records plus the overall max-aggregated rank.
///
/// Full-range queries leave `records` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub from: DateTime<Utc>,
    pub till: DateTime<Utc>,
    pub depth: Resolution,
    pub interval: Option<Resolution>,
    records: Vec<IntervalRecord>,
    rank: Rank,
}

impl Collection {
    pub fn new(
        from: DateTime<Utc>,
        till: DateTime<Utc>,
        depth: Resolution,
        interval: Option<Resolution>,
    ) -> Self {
        Collection {
            from,
            till,
            depth,
            interval,
            records: Vec::new(),
            rank: Rank::new(Some(from), Some(till), Some(depth)),
        }
    }

    /// Append a slot and fold it into the overall rank
    pub fn push(&mut self, record: IntervalRecord) {
        self.rank.merge_max(&record.stats);
        self.records.push(record);
    }

    pub fn rank(&self) -> &Rank {
        &self.rank
    }

    pub(crate) fn rank_mut(&mut self) -> &mut Rank {
        &mut self.rank
    }

    pub fn records(&self) -> &[IntervalRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&IntervalRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IntervalRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a IntervalRecord;
    type IntoIter = std::slice::Iter<'a, IntervalRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_push_folds_into_rank() {
        let from = Utc.with_ymd_and_hms(2010, 5, 14, 12, 0, 0).unwrap();
        let till = Utc.with_ymd_and_hms(2010, 5, 14, 14, 0, 0).unwrap();
        let mut col = Collection::new(from, till, Resolution::Hour, Some(Resolution::Hour));
        assert!(col.rank().is_empty());

        col.push(IntervalRecord {
            date: from,
            stats: Stats::from_pairs(&[("user_3", 3.0), ("user_2", 2.0)]),
        });
        col.push(IntervalRecord {
            date: till,
            stats: Stats::from_pairs(&[("user_3", 6.0)]),
        });

        assert_eq!(col.len(), 2);
        assert_eq!(col.rank().get("user_3"), Some(6.0));
        assert_eq!(col.rank().get("user_2"), Some(2.0));
        assert_eq!(col.rank().from, Some(from));
        assert_eq!(col.iter().map(|r| r.date).collect::<Vec<_>>(), vec![from, till]);
    }
}
