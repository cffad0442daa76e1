//! Metric family namespaces

use crate::error::Result;
use crate::store::RankStore;
use std::fmt;

/// Suffix of the per-scope id sequence counter
pub const KEY_NEXT_ID: &str = ".next_id";

/// Namespace for a metric family with its own id sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    name: String,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Scope { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Next id from `<scope>.next_id`, starting at 1
    pub fn next_id(&self, store: &dyn RankStore) -> Result<i64> {
        store.incr(&format!("{}{}", self.name, KEY_NEXT_ID))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        Scope::new(name)
    }
}
