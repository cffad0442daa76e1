//! Hierarchical labels
//!
//! A label is a separator-delimited path such as `message/public/offensive`.
//! Writes against a label also roll up into every ancestor, so the label
//! knows its ancestor chain (`groups`) and its parent.

use crate::error::Result;
use crate::store::RankStore;
use sha1::{Digest, Sha1};
use std::fmt;

/// Default separator between label segments
pub const GROUP_SEPARATOR: &str = "/";

/// Hash mapping label hashes back to label paths
pub const KEY_LABELS: &str = "Redisrank.labels:";

/// A parsed hierarchical label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    name: String,
    segments: Vec<String>,
    separator: String,
}

impl Label {
    /// Parse with the default `/` separator
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_separator(name, GROUP_SEPARATOR)
    }

    /// Parse with a custom separator. Empty segments are dropped, so
    /// `/message/public/` has the segments `message` and `public`.
    pub fn with_separator(name: impl Into<String>, separator: &str) -> Self {
        let name = name.into();
        let segments = if separator.is_empty() {
            vec![name.clone()]
        } else {
            name.split(separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        Label {
            name,
            segments,
            separator: separator.to_string(),
        }
    }

    /// Build a label from parts, skipping empty ones
    pub fn join<S: AsRef<str>>(parts: &[S], separator: &str) -> Self {
        let joined = parts
            .iter()
            .map(AsRef::as_ref)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(separator);
        Self::with_separator(joined, separator)
    }

    /// The raw name as given
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segments joined with the separator, without stray separators
    pub fn path(&self) -> String {
        self.segments.join(&self.separator)
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment
    pub fn me(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// SHA-1 hex digest of the normalized path, so `/a/b/` and `a/b`
    /// share one hash
    pub fn hash(&self) -> String {
        Sha1::digest(self.path().as_bytes())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Label with the last segment removed, `None` for a root label
    pub fn parent(&self) -> Option<Label> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self::join(
            &self.segments[..self.segments.len() - 1],
            &self.separator,
        ))
    }

    /// Ancestor chain, most specific first
    pub fn groups(&self) -> Vec<Label> {
        (1..=self.segments.len())
            .rev()
            .map(|n| Self::join(&self.segments[..n], &self.separator))
            .collect()
    }

    /// Record `hash -> path` in the reverse lookup map
    pub fn save(&self, store: &dyn RankStore) -> Result<()> {
        store.hash_set(KEY_LABELS, &self.hash(), &self.path())
    }

    /// Resolve a label hash back to its path
    pub fn lookup(store: &dyn RankStore, hash: &str) -> Result<Option<String>> {
        store.hash_get(KEY_LABELS, hash)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Label::new(name)
    }
}

impl From<String> for Label {
    fn from(name: String) -> Self {
        Label::new(name)
    }
}
