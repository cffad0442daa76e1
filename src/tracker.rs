//! Process entry points
//!
//! `Engine` owns the shared pieces built from a [`RankConfig`]: the
//! connection registry, the rollup writer, the write buffer and a finder.
//! `Tracker` is a per-metric-family handle on top of it.
//!
//! ```rust,ignore
//! let engine = Engine::start(RankConfig::from_env()?)?;
//! let views = engine.tracker(TrackerOptions::new("PageViews").depth(Resolution::Day));
//! views.store("about_us", &Stats::from_pairs(&[("views", 3.0)]), Utc::now())?;
//! let rank = views.fetch("about_us", from, till)?.rank().clone();
//! engine.shutdown()?;
//! ```

use crate::config::RankConfig;
use crate::error::Result;
use crate::event::{Event, EventOptions};
use crate::keys::{Label, Resolution};
use crate::query::{Finder, Query, QueryOptions};
use crate::rank::{Collection, Stats};
use crate::rollup::{Rollup, UpdateOptions, WriteBuffer};
use crate::store::Connections;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Shared write and read machinery for one process
pub struct Engine {
    config: RankConfig,
    connections: Arc<Connections>,
    rollup: Arc<Rollup>,
    buffer: Arc<WriteBuffer>,
    finder: Arc<Finder>,
}

impl Engine {
    /// Open every configured connection and build the pipeline
    pub fn start(config: RankConfig) -> Result<Self> {
        config.validate()?;
        let connections = Arc::new(Connections::from_config(&config)?);
        Self::with_connections(config, connections)
    }

    /// Build the pipeline over an existing registry
    pub fn with_connections(config: RankConfig, connections: Arc<Connections>) -> Result<Self> {
        config.validate()?;
        let rollup = Arc::new(
            Rollup::new(connections.clone()).with_separator(config.group_separator.clone()),
        );
        let buffer = Arc::new(WriteBuffer::new(rollup.clone(), config.buffer_size));
        let finder = Arc::new(Finder::new(connections.clone()));
        info!(
            buffer_size = config.buffer_size,
            separator = %config.group_separator,
            connections = connections.references().len(),
            "redisrank engine started"
        );
        Ok(Engine {
            config,
            connections,
            rollup,
            buffer,
            finder,
        })
    }

    pub fn config(&self) -> &RankConfig {
        &self.config
    }

    pub fn connections(&self) -> &Arc<Connections> {
        &self.connections
    }

    pub fn rollup(&self) -> &Arc<Rollup> {
        &self.rollup
    }

    pub fn buffer(&self) -> &Arc<WriteBuffer> {
        &self.buffer
    }

    pub fn finder(&self) -> &Arc<Finder> {
        &self.finder
    }

    /// Change the write buffer capacity at runtime
    pub fn set_buffer_size(&self, size: usize) {
        self.buffer.set_capacity(size);
    }

    /// Parse a label with the configured separator
    pub fn label(&self, name: &str) -> Label {
        Label::with_separator(name, &self.config.group_separator)
    }

    /// Build a query from options, parsing the label with the configured
    /// separator
    pub fn query(&self, options: QueryOptions) -> Query {
        Query::from_options_with_separator(options, &self.config.group_separator)
    }

    pub fn tracker(&self, options: TrackerOptions) -> Tracker {
        Tracker {
            options,
            separator: self.config.group_separator.clone(),
            rollup: self.rollup.clone(),
            buffer: self.buffer.clone(),
            finder: self.finder.clone(),
        }
    }

    /// Flush everything still buffered
    pub fn shutdown(&self) -> Result<usize> {
        let flushed = self.buffer.shutdown()?;
        info!(flushed, "redisrank engine stopped");
        Ok(flushed)
    }
}

/// Defaults applied to every write and read of one tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerOptions {
    pub scope: String,
    pub depth: Resolution,
    pub hashed_label: bool,
    pub store_event: bool,
    pub expire: BTreeMap<Resolution, u64>,
    pub connection_ref: Option<String>,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        TrackerOptions {
            scope: String::new(),
            depth: Resolution::Hour,
            hashed_label: false,
            store_event: false,
            expire: BTreeMap::new(),
            connection_ref: None,
        }
    }
}

impl TrackerOptions {
    pub fn new(scope: impl Into<String>) -> Self {
        TrackerOptions {
            scope: scope.into(),
            ..Default::default()
        }
    }

    pub fn depth(mut self, depth: Resolution) -> Self {
        self.depth = depth;
        self
    }

    pub fn hashed_label(mut self, hashed: bool) -> Self {
        self.hashed_label = hashed;
        self
    }

    pub fn store_event(mut self, store: bool) -> Self {
        self.store_event = store;
        self
    }

    pub fn expire(mut self, resolution: Resolution, seconds: u64) -> Self {
        self.expire.insert(resolution, seconds);
        self
    }

    pub fn connection_ref(mut self, reference: impl Into<String>) -> Self {
        self.connection_ref = Some(reference.into());
        self
    }
}

/// Handle for one metric family
pub struct Tracker {
    options: TrackerOptions,
    separator: String,
    rollup: Arc<Rollup>,
    buffer: Arc<WriteBuffer>,
    finder: Arc<Finder>,
}

impl Tracker {
    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    /// Record `stats` for `label` at `date` with default write options
    pub fn store(&self, label: &str, stats: &Stats, date: DateTime<Utc>) -> Result<Event> {
        self.store_with(label, stats, date, UpdateOptions::default())
    }

    /// Record with explicit write options. Tracker expiry and connection
    /// fill in whatever `opts` leaves unset.
    pub fn store_with(
        &self,
        label: &str,
        stats: &Stats,
        date: DateTime<Utc>,
        mut opts: UpdateOptions,
    ) -> Result<Event> {
        for (&res, &seconds) in &self.options.expire {
            opts.expire.entry(res).or_insert(seconds);
        }
        if opts.connection_ref.is_none() {
            opts.connection_ref = self.options.connection_ref.clone();
        }

        let mut event = Event::new(
            self.options.scope.as_str(),
            self.label(label),
            date,
            stats.clone(),
        )
        .with_options(EventOptions {
            depth: self.options.depth,
            store_event: self.options.store_event,
            hashed_label: self.options.hashed_label,
            update: opts,
        });
        event.save(&self.rollup, Some(self.buffer.as_ref()))?;
        Ok(event)
    }

    /// Full-range query for `label` over `[from, till]`
    pub fn find(&self, label: &str, from: DateTime<Utc>, till: DateTime<Utc>) -> Query {
        let query = Query::new()
            .scope(self.options.scope.as_str())
            .label(self.label(label))
            .dates(from, till)
            .depth(self.options.depth)
            .hashed_label(self.options.hashed_label);
        match &self.options.connection_ref {
            Some(reference) => query.connection_ref(reference.clone()),
            None => query,
        }
    }

    /// Run [`Tracker::find`] against the current store contents
    pub fn fetch(&self, label: &str, from: DateTime<Utc>, till: DateTime<Utc>) -> Result<Collection> {
        self.finder.find(&self.find(label, from, till))
    }

    pub fn find_event(&self, id: i64) -> Result<Option<Event>> {
        Event::find(
            self.rollup.connections(),
            self.options.connection_ref.as_deref(),
            self.options.scope.as_str(),
            id,
        )
    }

    fn label(&self, name: &str) -> Label {
        Label::with_separator(name, &self.separator)
    }
}
