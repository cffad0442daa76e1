//! Write path
//!
//! - `Rollup`: fans one write out across label ancestors and resolutions
//! - `WriteBuffer`: coalesces writes in memory before forwarding them
//! - `UpdateOptions`: per-write switches shared by both

mod buffer;
mod summary;

pub use buffer::WriteBuffer;
pub use summary::Rollup;

use crate::keys::Resolution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-write options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    /// Roll the write up into label ancestors and stat-name prefixes
    pub enable_grouping: bool,
    /// Record written labels in the per-scope label index
    pub label_indexing: bool,
    /// Named connection, `None` for the default one
    pub connection_ref: Option<String>,
    /// TTL in seconds refreshed on every write, per resolution
    pub expire: BTreeMap<Resolution, u64>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            enable_grouping: true,
            label_indexing: true,
            connection_ref: None,
            expire: BTreeMap::new(),
        }
    }
}

impl UpdateOptions {
    pub fn with_connection(mut self, reference: impl Into<String>) -> Self {
        self.connection_ref = Some(reference.into());
        self
    }

    pub fn with_expire(mut self, resolution: Resolution, seconds: u64) -> Self {
        self.expire.insert(resolution, seconds);
        self
    }

    /// Option pairs keyed by option name, sorted by name
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let expire = self
            .expire
            .iter()
            .map(|(res, secs)| format!("{}={}", res, secs))
            .collect::<Vec<_>>()
            .join(",");
        vec![
            ("connection_ref", self.connection_ref.clone().unwrap_or_default()),
            ("enable_grouping", self.enable_grouping.to_string()),
            ("expire", expire),
            ("label_indexing", self.label_indexing.to_string()),
        ]
    }

    /// Stable rendering: sorted option pairs flattened with `:`.
    ///
    /// `connection_ref::enable_grouping:true:expire::label_indexing:true`
    pub fn canonical(&self) -> String {
        flatten_pairs(self.pairs())
    }
}

pub(crate) fn flatten_pairs(pairs: Vec<(&'static str, String)>) -> String {
    pairs
        .into_iter()
        .flat_map(|(name, value)| [name.to_string(), value])
        .collect::<Vec<_>>()
        .join(":")
}
