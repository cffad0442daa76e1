//! Recorded events
//!
//! An event is one observation `(scope, label, date, stats)` plus free-form
//! metadata. Saving rolls the stats up and, when `store_event` is set,
//! allocates an id from the scope sequence and persists the raw event as
//! a hash.

use crate::error::{RankError, Result};
use crate::keys::{Key, Label, Resolution, Scope};
use crate::rank::Stats;
use crate::rollup::{Rollup, UpdateOptions, WriteBuffer};
use crate::store::Connections;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Infix of raw event hashes: `<scope>.event:<id>`
pub const KEY_EVENT: &str = ".event:";
/// Suffix of the per-scope event id set
pub const KEY_EVENT_IDS: &str = ".event_ids";

/// How an event is addressed and written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOptions {
    /// Finest resolution written
    pub depth: Resolution,
    /// Persist the raw event next to the rollups
    pub store_event: bool,
    /// Address buckets by label hash
    pub hashed_label: bool,
    #[serde(flatten)]
    pub update: UpdateOptions,
}

impl Default for EventOptions {
    fn default() -> Self {
        EventOptions {
            depth: Resolution::Hour,
            store_event: false,
            hashed_label: false,
            update: UpdateOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: Option<i64>,
    saved: bool,
    scope: Scope,
    label: Label,
    date: DateTime<Utc>,
    stats: Stats,
    meta: BTreeMap<String, serde_json::Value>,
    options: EventOptions,
}

impl Event {
    pub fn new(
        scope: impl Into<Scope>,
        label: impl Into<Label>,
        date: DateTime<Utc>,
        stats: Stats,
    ) -> Self {
        Event {
            id: None,
            saved: false,
            scope: scope.into(),
            label: label.into(),
            date,
            stats,
            meta: BTreeMap::new(),
            options: EventOptions::default(),
        }
    }

    pub fn with_meta(mut self, meta: BTreeMap<String, serde_json::Value>) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_options(mut self, options: EventOptions) -> Self {
        self.options = options;
        self
    }

    /// Allocated only for persisted events
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Not saved yet
    pub fn is_new(&self) -> bool {
        !self.saved
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn label_hash(&self) -> String {
        self.label.hash()
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn meta(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.meta
    }

    pub fn options(&self) -> &EventOptions {
        &self.options
    }

    pub fn key(&self) -> Key {
        Key::new(self.scope.clone(), Some(self.label.clone()), self.date)
            .with_depth(self.options.depth)
            .with_hashed_label(self.options.hashed_label)
    }

    /// Roll the stats up and persist the raw event when requested.
    /// Returns the id of a persisted event. Saving twice is a no-op.
    pub fn save(&mut self, rollup: &Rollup, buffer: Option<&WriteBuffer>) -> Result<Option<i64>> {
        if self.saved {
            return Ok(self.id);
        }
        rollup.update_all(
            &self.key(),
            &self.stats,
            Some(self.options.depth),
            &self.options.update,
            buffer,
        )?;

        if self.options.store_event {
            let store = rollup
                .connections()
                .get(self.options.update.connection_ref.as_deref())?;
            let id = self.scope.next_id(store.as_ref())?;
            let hash = format!("{}{}{}", self.scope, KEY_EVENT, id);
            for (field, value) in self.fields()? {
                store.hash_set(&hash, field, &value)?;
            }
            store.set_add(&format!("{}{}", self.scope, KEY_EVENT_IDS), &id.to_string())?;
            self.id = Some(id);
        }
        self.saved = true;
        debug!(scope = %self.scope, id = ?self.id, "event saved");
        Ok(self.id)
    }

    /// Load a persisted event; `None` when no hash exists for the id
    pub fn find(
        connections: &Connections,
        connection_ref: Option<&str>,
        scope: impl Into<Scope>,
        id: i64,
    ) -> Result<Option<Event>> {
        let scope = scope.into();
        let store = connections.get(connection_ref)?;
        let fields: BTreeMap<String, String> = store
            .hash_get_all(&format!("{}{}{}", scope, KEY_EVENT, id))?
            .into_iter()
            .collect();
        if fields.is_empty() {
            return Ok(None);
        }

        let field = |name: &str| {
            fields.get(name).ok_or_else(|| {
                RankError::Serialization(format!("event {} is missing '{}'", id, name))
            })
        };
        let date = DateTime::parse_from_rfc3339(field("date")?)
            .map_err(|e| RankError::Serialization(e.to_string()))?
            .with_timezone(&Utc);
        let separator = fields.get("separator").map(String::as_str).unwrap_or("/");

        Ok(Some(Event {
            id: Some(id),
            saved: true,
            scope: Scope::new(field("scope")?.as_str()),
            label: Label::with_separator(field("label")?.as_str(), separator),
            date,
            stats: serde_json::from_str(field("stats")?)?,
            meta: serde_json::from_str(field("meta")?)?,
            options: serde_json::from_str(field("options")?)?,
        }))
    }

    fn fields(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("scope", self.scope.to_string()),
            ("label", self.label.name().to_string()),
            ("separator", self.label.separator().to_string()),
            ("date", self.date.to_rfc3339_opts(SecondsFormat::Micros, true)),
            ("stats", serde_json::to_string(&self.stats)?),
            ("meta", serde_json::to_string(&self.meta)?),
            ("options", serde_json::to_string(&self.options)?),
        ])
    }
}
