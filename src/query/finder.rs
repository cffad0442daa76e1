//! Query builder and executor

use super::covering::{self, BucketSet};
use crate::error::{RankError, Result};
use crate::keys::{Key, Label, Resolution, Scope, GROUP_SEPARATOR};
use crate::rank::{Collection, IntervalRecord, Rank, Stats};
use crate::store::{Connections, RankStore};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One-shot query parameters, e.g. deserialized from a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub scope: Option<String>,
    pub label: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub till: Option<DateTime<Utc>>,
    pub depth: Option<Resolution>,
    pub interval: Option<Resolution>,
    pub connection_ref: Option<String>,
    pub compact: bool,
    pub hashed_label: bool,
}

/// Immutable query description. Every setter returns a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    scope: Option<Scope>,
    label: Option<Label>,
    from: Option<DateTime<Utc>>,
    till: Option<DateTime<Utc>>,
    depth: Option<Resolution>,
    interval: Option<Resolution>,
    connection_ref: Option<String>,
    compact: bool,
    hashed_label: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from options, parsing the label with the default `/`
    /// separator. See [`Query::from_options_with_separator`].
    pub fn from_options(options: QueryOptions) -> Self {
        Self::from_options_with_separator(options, GROUP_SEPARATOR)
    }

    /// Build from options, parsing the label with `separator`
    pub fn from_options_with_separator(options: QueryOptions, separator: &str) -> Self {
        Query {
            scope: options.scope.map(Scope::new),
            label: options
                .label
                .map(|name| Label::with_separator(name, separator)),
            from: options.from,
            till: options.till,
            depth: options.depth,
            interval: options.interval,
            connection_ref: options.connection_ref,
            compact: options.compact,
            hashed_label: options.hashed_label,
        }
    }

    pub fn scope(&self, scope: impl Into<Scope>) -> Self {
        Query {
            scope: Some(scope.into()),
            ..self.clone()
        }
    }

    /// A plain string is parsed with the default `/` separator; pass a
    /// parsed [`Label`] for any other separator.
    pub fn label(&self, label: impl Into<Label>) -> Self {
        Query {
            label: Some(label.into()),
            ..self.clone()
        }
    }

    pub fn from(&self, from: DateTime<Utc>) -> Self {
        Query {
            from: Some(from),
            ..self.clone()
        }
    }

    pub fn till(&self, till: DateTime<Utc>) -> Self {
        Query {
            till: Some(till),
            ..self.clone()
        }
    }

    pub fn dates(&self, from: DateTime<Utc>, till: DateTime<Utc>) -> Self {
        self.from(from).till(till)
    }

    pub fn depth(&self, depth: Resolution) -> Self {
        Query {
            depth: Some(depth),
            ..self.clone()
        }
    }

    /// Switch to interval mode: one record per `interval` slot
    pub fn interval(&self, interval: Resolution) -> Self {
        Query {
            interval: Some(interval),
            ..self.clone()
        }
    }

    pub fn connection_ref(&self, reference: impl Into<String>) -> Self {
        Query {
            connection_ref: Some(reference.into()),
            ..self.clone()
        }
    }

    /// Cover mostly-complete parents with parent minus excess buckets
    pub fn compact(&self, compact: bool) -> Self {
        Query {
            compact,
            ..self.clone()
        }
    }

    /// Address buckets by label hash
    pub fn hashed_label(&self, hashed: bool) -> Self {
        Query {
            hashed_label: hashed,
            ..self.clone()
        }
    }

    pub fn get_scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn get_label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    pub fn get_from(&self) -> Option<DateTime<Utc>> {
        self.from
    }

    pub fn get_till(&self) -> Option<DateTime<Utc>> {
        self.till
    }

    /// Depth, hour when unset
    pub fn get_depth(&self) -> Resolution {
        self.depth.unwrap_or_default()
    }

    pub fn get_interval(&self) -> Option<Resolution> {
        self.interval
    }

    pub fn get_connection_ref(&self) -> Option<&str> {
        self.connection_ref.as_deref()
    }

    /// Same query one label level up; `None` at the root
    pub fn parent(&self) -> Option<Query> {
        let parent = self.label.as_ref()?.parent()?;
        Some(Query {
            label: Some(parent),
            ..self.clone()
        })
    }

    fn key(&self, scope: &Scope) -> Key {
        Key::new(scope.clone(), self.label.clone(), self.from.unwrap_or_default())
            .with_depth(self.get_depth())
            .with_hashed_label(self.hashed_label)
    }

    fn require(&self) -> Result<(&Scope, &Label, DateTime<Utc>, DateTime<Utc>)> {
        let scope = self.scope.as_ref().filter(|s| !s.is_empty());
        let label = self.label.as_ref().filter(|l| !l.is_empty());
        match (scope, label, self.from, self.till) {
            (Some(scope), Some(label), Some(from), Some(till)) => Ok((scope, label, from, till)),
            _ => Err(RankError::InvalidConfiguration(
                "query requires scope, label, from and till".to_string(),
            )),
        }
    }
}

/// Executes queries against the registered connections, memoizing the
/// most recent result
pub struct Finder {
    connections: Arc<Connections>,
    memo: Mutex<Option<(Query, Arc<Collection>)>>,
}

impl Finder {
    pub fn new(connections: Arc<Connections>) -> Self {
        Finder {
            connections,
            memo: Mutex::new(None),
        }
    }

    /// Run the query without touching the memo
    pub fn find(&self, query: &Query) -> Result<Collection> {
        let (scope, _, from, till) = query.require()?;
        let store = self.connections.get(query.get_connection_ref())?;
        let store = store.as_ref();
        let prefix = query.key(scope).prefix();
        let depth = query.get_depth();

        let collection = match query.interval {
            Some(interval) => {
                let mut collection = Collection::new(from, till, depth, Some(interval));
                for slot in covering::intervals(from, till, interval) {
                    let bucket = format!("{}{}", prefix, interval.token(slot));
                    let stats: Stats = store.range_desc(&bucket)?.into_iter().collect();
                    collection.push(IntervalRecord { date: slot, stats });
                }
                collection
            }
            None => {
                let mut collection = Collection::new(from, till, depth, None);
                for set in covering::full_range(from, till, depth, query.compact) {
                    let stats = fetch_set(store, &prefix, &set)?;
                    collection.rank_mut().merge_max(&stats);
                }
                collection
            }
        };
        debug!(prefix = %prefix, records = collection.len(), members = collection.rank().len(), "query executed");
        Ok(collection)
    }

    /// Memoized result for `query`. A different query, or `reload`,
    /// recomputes.
    pub fn all(&self, query: &Query, reload: bool) -> Result<Arc<Collection>> {
        if !reload {
            if let Some((cached_query, cached)) = self.memo.lock().as_ref() {
                if cached_query == query {
                    return Ok(cached.clone());
                }
            }
        }
        let collection = Arc::new(self.find(query)?);
        *self.memo.lock() = Some((query.clone(), collection.clone()));
        Ok(collection)
    }

    /// Overall rank of the memoized result
    pub fn rank(&self, query: &Query) -> Result<Rank> {
        Ok(self.all(query, false)?.rank().clone())
    }

    pub fn parent(&self, query: &Query) -> Option<Query> {
        query.parent()
    }

    /// One query per indexed child label. Without a label this lists the
    /// root labels of the scope.
    pub fn children(&self, query: &Query) -> Result<Vec<Query>> {
        let scope = query.scope.as_ref().filter(|s| !s.is_empty()).ok_or_else(|| {
            RankError::InvalidConfiguration("children requires a scope".to_string())
        })?;
        let store = self.connections.get(query.get_connection_ref())?;
        let children = query.key(scope).children(store.as_ref())?;
        Ok(children
            .into_iter()
            .filter_map(|key| key.label().cloned())
            .map(|label| query.label(label))
            .collect())
    }
}

/// Max-merge the `add` buckets, then drop members found in any `rem` bucket
fn fetch_set(store: &dyn RankStore, prefix: &str, set: &BucketSet) -> Result<Stats> {
    let mut stats = Stats::new();
    for bucket in &set.add {
        for (member, score) in store.range_desc(&format!("{}{}", prefix, bucket.token()))? {
            stats.merge_to_max(&member, score);
        }
    }
    for bucket in &set.rem {
        for member in store.members(&format!("{}{}", prefix, bucket.token()))? {
            stats.remove(&member);
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 5, 14, h, m, 0).unwrap()
    }

    #[test]
    fn test_setters_are_immutable() {
        let base = Query::new().scope("PageViews");
        let labelled = base.label("about_us");
        assert!(base.get_label().is_none());
        assert_eq!(labelled.get_label().unwrap().name(), "about_us");
        assert_eq!(labelled.get_scope().unwrap().name(), "PageViews");
        assert_eq!(labelled.get_depth(), Resolution::Hour);
        assert_ne!(base, labelled);
    }

    #[test]
    fn test_from_options() {
        let options: QueryOptions = serde_json::from_str(
            r#"{"scope":"PageViews","label":"about_us","depth":"day","from":"2010-05-14T12:00:00Z","till":"2010-05-14T16:00:00Z"}"#,
        )
        .unwrap();
        let query = Query::from_options(options);
        assert_eq!(
            query,
            Query::new()
                .scope("PageViews")
                .label("about_us")
                .depth(Resolution::Day)
                .dates(at(12, 0), at(16, 0))
        );
    }

    #[test]
    fn test_missing_parameters() {
        let finder = Finder::new(Arc::new(Connections::in_memory()));
        let query = Query::new().scope("PageViews").label("about_us").from(at(12, 0));
        assert!(matches!(finder.find(&query), Err(RankError::InvalidConfiguration(_))));
        let blank = query.till(at(13, 0)).label("");
        assert!(matches!(finder.find(&blank), Err(RankError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_parent() {
        let query = Query::new().label("message/public/offensive");
        let parent = query.parent().unwrap();
        assert_eq!(parent.get_label().unwrap().name(), "message/public");
        assert!(Query::new().label("message").parent().is_none());
        assert!(Query::new().parent().is_none());
    }

    #[test]
    fn test_rem_buckets_drop_members() {
        let store = MemoryStore::new();
        store.set_score("S/l:20100514", "a", 5.0).unwrap();
        store.set_score("S/l:20100514", "b", 2.0).unwrap();
        store.set_score("S/l:2010051400", "a", 5.0).unwrap();
        let set = BucketSet {
            add: vec![covering::Bucket::new(at(0, 0), Resolution::Day)],
            rem: vec![covering::Bucket::new(at(0, 0), Resolution::Hour)],
        };
        let stats = fetch_set(&store, "S/l:", &set).unwrap();
        assert_eq!(stats, Stats::from_pairs(&[("b", 2.0)]));
    }
}
