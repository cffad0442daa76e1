//! Rollup writer
//!
//! One logical write `(key, stats)` becomes a conditional-maximum write of
//! every stat into:
//!
//! - every label ancestor of the key (when grouping is on)
//! - every resolution from year down to the depth limit
//!
//! Compound stat names are summed into their prefixes first, so
//! `visitors/eu=2, visitors/us=4` also writes `visitors=6`.

use super::{UpdateOptions, WriteBuffer};
use crate::error::Result;
use crate::keys::{Key, Resolution, GROUP_SEPARATOR};
use crate::rank::Stats;
use crate::store::{Connections, RankStore};
use ahash::AHashMap;
use std::sync::Arc;
use tracing::debug;

/// Fans writes out across labels and resolutions
pub struct Rollup {
    connections: Arc<Connections>,
    separator: String,
}

impl Rollup {
    pub fn new(connections: Arc<Connections>) -> Self {
        Rollup {
            connections,
            separator: GROUP_SEPARATOR.to_string(),
        }
    }

    /// Separator used to split compound stat names
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn connections(&self) -> &Arc<Connections> {
        &self.connections
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Public write entry.
    ///
    /// Empty stats are ignored and a missing depth limit falls back to the
    /// key depth. The write goes through `buffer` when one is given and it
    /// accepts the write; otherwise it is applied directly.
    pub fn update_all(
        &self,
        key: &Key,
        stats: &Stats,
        depth_limit: Option<Resolution>,
        opts: &UpdateOptions,
        buffer: Option<&WriteBuffer>,
    ) -> Result<()> {
        if stats.is_empty() {
            return Ok(());
        }
        let depth_limit = depth_limit.unwrap_or_else(|| key.depth());
        if let Some(buffer) = buffer {
            if buffer.store(key, stats, depth_limit, opts)? {
                return Ok(());
            }
        }
        self.update(key, stats, depth_limit, opts)
    }

    /// Apply one write to the store without buffering
    pub fn update(
        &self,
        key: &Key,
        stats: &Stats,
        depth_limit: Resolution,
        opts: &UpdateOptions,
    ) -> Result<()> {
        self.write(key, &self.prepare(stats, opts), depth_limit, opts)
    }

    /// Stats as they will be stored: group summaries injected when
    /// grouping is on
    pub fn prepare(&self, stats: &Stats, opts: &UpdateOptions) -> Stats {
        if opts.enable_grouping {
            self.inject_group_summaries(stats)
        } else {
            stats.clone()
        }
    }

    /// Write already prepared stats to every group and resolution
    pub(crate) fn write(
        &self,
        key: &Key,
        stats: &Stats,
        depth_limit: Resolution,
        opts: &UpdateOptions,
    ) -> Result<()> {
        let store = self.connections.get(opts.connection_ref.as_deref())?;
        let store = store.as_ref();

        let groups = if opts.enable_grouping {
            key.groups()
        } else {
            vec![key.clone()]
        };
        for group in &groups {
            self.update_key(store, group, stats, depth_limit, opts)?;
            if opts.enable_grouping && opts.label_indexing {
                group.update_index(store)?;
            }
            save_label_hash(store, group)?;
        }
        debug!(key = %key, groups = groups.len(), stats = stats.len(), depth_limit = %depth_limit, "rollup update");
        Ok(())
    }

    /// Sum every compound stat into each of its name prefixes, then
    /// max-merge the sums into a copy of `stats`.
    ///
    /// Names with empty segments inject nothing.
    pub fn inject_group_summaries(&self, stats: &Stats) -> Stats {
        let mut summaries: AHashMap<String, f64> = AHashMap::new();
        for (name, value) in stats {
            let parts: Vec<&str> = name.split(self.separator.as_str()).collect();
            if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
                continue;
            }
            for n in 1..parts.len() {
                let prefix = parts[..n].join(&self.separator);
                *summaries.entry(prefix).or_insert(0.0) += *value;
            }
        }

        let mut merged = stats.clone();
        for (prefix, sum) in summaries {
            merged.merge_to_max(&prefix, sum);
        }
        merged
    }

    fn update_key(
        &self,
        store: &dyn RankStore,
        key: &Key,
        stats: &Stats,
        depth_limit: Resolution,
        opts: &UpdateOptions,
    ) -> Result<()> {
        for &depth in depth_limit.up_to() {
            let bucket = key.to_string_at(depth);
            for (member, score) in stats {
                if score.is_nan() {
                    continue;
                }
                store.max_score(&bucket, member, *score)?;
            }
            if let Some(&seconds) = opts.expire.get(&depth) {
                store.expire(&bucket, seconds)?;
            }
        }
        Ok(())
    }
}

fn save_label_hash(store: &dyn RankStore, key: &Key) -> Result<()> {
    match key.label() {
        Some(label) if key.hashed_label() => label.save(store),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Label;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 5, 14, 13, 43, 0).unwrap()
    }

    fn setup() -> (Rollup, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let connections = Arc::new(Connections::new(store.clone()));
        (Rollup::new(connections), store)
    }

    #[test]
    fn test_inject_group_summaries() {
        let (rollup, _) = setup();
        let stats = Stats::from_pairs(&[("views", 3.0), ("visitors/eu", 2.0), ("visitors/us", 4.0)]);
        let injected = rollup.inject_group_summaries(&stats);
        assert_eq!(
            injected,
            Stats::from_pairs(&[
                ("views", 3.0),
                ("visitors", 6.0),
                ("visitors/eu", 2.0),
                ("visitors/us", 4.0)
            ])
        );
    }

    #[test]
    fn test_inject_nested_and_caller_max() {
        let (rollup, _) = setup();
        let stats = Stats::from_pairs(&[("a/b/c", 1.0), ("a/b/d", 2.0), ("a", 10.0)]);
        let injected = rollup.inject_group_summaries(&stats);
        assert_eq!(injected.get("a/b"), Some(3.0));
        assert_eq!(injected.get("a"), Some(10.0));

        let malformed = Stats::from_pairs(&[("/eu", 2.0), ("us/", 1.0)]);
        assert_eq!(rollup.inject_group_summaries(&malformed), malformed);
    }

    #[test]
    fn test_update_writes_every_depth() {
        let (rollup, store) = setup();
        let key = Key::new("PageViews", Some(Label::new("about_us")), time());
        let stats = Stats::from_pairs(&[("views", 3.0)]);
        rollup
            .update(&key, &stats, Resolution::Hour, &UpdateOptions::default())
            .unwrap();

        for bucket in [
            "PageViews/about_us:2010",
            "PageViews/about_us:201005",
            "PageViews/about_us:20100514",
            "PageViews/about_us:2010051413",
        ] {
            assert_eq!(store.score(bucket, "views").unwrap(), Some(3.0), "{}", bucket);
        }
        assert_eq!(store.score("PageViews/about_us:201005141343", "views").unwrap(), None);
    }

    #[test]
    fn test_update_keeps_maximum() {
        let (rollup, store) = setup();
        let key = Key::new("PageViews", Some(Label::new("about_us")), time());
        let opts = UpdateOptions::default();
        rollup
            .update(&key, &Stats::from_pairs(&[("views", 5.0)]), Resolution::Day, &opts)
            .unwrap();
        rollup
            .update(&key, &Stats::from_pairs(&[("views", 2.0)]), Resolution::Day, &opts)
            .unwrap();
        assert_eq!(store.score("PageViews/about_us:20100514", "views").unwrap(), Some(5.0));
    }

    #[test]
    fn test_grouping_disabled() {
        let (rollup, store) = setup();
        let key = Key::new("Msg", Some(Label::new("message/public")), time());
        let opts = UpdateOptions {
            enable_grouping: false,
            ..Default::default()
        };
        rollup
            .update(&key, &Stats::from_pairs(&[("a/b", 1.0)]), Resolution::Year, &opts)
            .unwrap();
        assert_eq!(store.score("Msg/message/public:2010", "a/b").unwrap(), Some(1.0));
        assert_eq!(store.score("Msg/message/public:2010", "a").unwrap(), None);
        assert_eq!(store.score("Msg/message:2010", "a/b").unwrap(), None);
        assert!(store.set_members("Msg.label_index:message").unwrap().is_empty());
    }

    #[test]
    fn test_hashed_label_saved() {
        let (rollup, store) = setup();
        let label = Label::new("message/public");
        let key = Key::new("Msg", Some(label.clone()), time()).with_hashed_label(true);
        rollup
            .update(&key, &Stats::from_pairs(&[("n", 1.0)]), Resolution::Year, &UpdateOptions::default())
            .unwrap();
        assert_eq!(
            Label::lookup(store.as_ref(), &label.hash()).unwrap().as_deref(),
            Some("message/public")
        );
        let bucket = format!("Msg/{}:2010", label.hash());
        assert_eq!(store.score(&bucket, "n").unwrap(), Some(1.0));
    }

    #[test]
    fn test_update_all_ignores_empty() {
        let (rollup, store) = setup();
        let key = Key::new("PageViews", None, time());
        rollup
            .update_all(&key, &Stats::new(), None, &UpdateOptions::default(), None)
            .unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_update_all_defaults_to_key_depth() {
        let (rollup, store) = setup();
        let key = Key::new("PageViews", None, time()).with_depth(Resolution::Day);
        rollup
            .update_all(&key, &Stats::from_pairs(&[("v", 1.0)]), None, &UpdateOptions::default(), None)
            .unwrap();
        assert_eq!(
            store.keys().unwrap(),
            vec!["PageViews:2010", "PageViews:201005", "PageViews:20100514"]
        );
    }

    #[test]
    fn test_expire_per_depth() {
        let (rollup, store) = setup();
        let key = Key::new("PageViews", None, time());
        let opts = UpdateOptions::default().with_expire(Resolution::Hour, 3600);
        rollup
            .update(&key, &Stats::from_pairs(&[("v", 1.0)]), Resolution::Hour, &opts)
            .unwrap();
        assert_eq!(store.ttl("PageViews:2010051413").unwrap(), Some(3600));
        assert_eq!(store.ttl("PageViews:20100514").unwrap(), None);
    }

    #[test]
    fn test_unknown_connection() {
        let (rollup, _) = setup();
        let key = Key::new("PageViews", None, time());
        let opts = UpdateOptions::default().with_connection("missing");
        assert!(rollup
            .update(&key, &Stats::from_pairs(&[("v", 1.0)]), Resolution::Hour, &opts)
            .is_err());
    }
}
