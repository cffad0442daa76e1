//! Bucket addressing
//!
//! A [`Key`] renders the canonical bucket id for a (scope, label, date,
//! resolution) tuple:
//!
//! ```text
//! PageViews/about_us:2010051413    scope + label at hour depth
//! PageViews/<sha1>:2010051413      same with hashed labels
//! PageViews:20100514               label-less key at day depth
//! ```
//!
//! Identical logical identity always renders the identical string, which is
//! what lets independent writers converge on one bucket.

use super::date::{RankDate, Resolution};
use super::label::{Label, GROUP_SEPARATOR};
use super::scope::Scope;
use crate::error::Result;
use crate::store::RankStore;
use chrono::{DateTime, Utc};
use std::fmt;

/// Infix of the per-scope label index sets
pub const LABEL_INDEX: &str = ".label_index:";

/// Address of a family of buckets, one per resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    scope: Scope,
    label: Option<Label>,
    date: RankDate,
    hashed_label: bool,
}

impl Key {
    /// Key at the default (hour) depth. Empty labels count as absent.
    pub fn new(scope: impl Into<Scope>, label: Option<Label>, time: DateTime<Utc>) -> Self {
        Key {
            scope: scope.into(),
            label: label.filter(|l| !l.is_empty()),
            date: RankDate::new(time, Resolution::default()),
            hashed_label: false,
        }
    }

    pub fn with_depth(mut self, depth: Resolution) -> Self {
        self.date = RankDate::new(self.date.time(), depth);
        self
    }

    /// Render the label as its SHA-1 hash instead of the raw name
    pub fn with_hashed_label(mut self, hashed: bool) -> Self {
        self.hashed_label = hashed;
        self
    }

    /// Same key with another label
    pub fn with_label(&self, label: Option<Label>) -> Key {
        Key {
            scope: self.scope.clone(),
            label: label.filter(|l| !l.is_empty()),
            date: self.date,
            hashed_label: self.hashed_label,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    pub fn date(&self) -> &RankDate {
        &self.date
    }

    pub fn depth(&self) -> Resolution {
        self.date.depth()
    }

    pub fn hashed_label(&self) -> bool {
        self.hashed_label
    }

    /// Label hash, `None` for label-less keys
    pub fn label_hash(&self) -> Option<String> {
        self.label.as_ref().map(Label::hash)
    }

    /// Bucket id without the date token, including the trailing `:`
    pub fn prefix(&self) -> String {
        match &self.label {
            Some(label) if self.hashed_label => format!("{}/{}:", self.scope, label.hash()),
            Some(label) => format!("{}/{}:", self.scope, label.path()),
            None => format!("{}:", self.scope),
        }
    }

    /// Bucket id at an explicit resolution
    pub fn to_string_at(&self, depth: Resolution) -> String {
        format!("{}{}", self.prefix(), self.date.token_at(depth))
    }

    /// One key per label ancestor, most specific first
    pub fn groups(&self) -> Vec<Key> {
        match &self.label {
            Some(label) => label
                .groups()
                .into_iter()
                .map(|group| self.with_label(Some(group)))
                .collect(),
            None => vec![self.clone()],
        }
    }

    /// Key for the parent label, `None` at the root or without a label
    pub fn parent(&self) -> Option<Key> {
        self.label
            .as_ref()
            .and_then(Label::parent)
            .map(|parent| self.with_label(Some(parent)))
    }

    /// Name of the index set holding the children of `parent_path`
    pub fn index_key(scope: &Scope, parent_path: &str) -> String {
        format!("{}{}{}", scope, LABEL_INDEX, parent_path)
    }

    /// Child keys recorded in the label index. A label-less key lists the
    /// root labels of the scope.
    pub fn children(&self, store: &dyn RankStore) -> Result<Vec<Key>> {
        let (path, separator) = match &self.label {
            Some(label) => (label.path(), label.separator().to_string()),
            None => (String::new(), GROUP_SEPARATOR.to_string()),
        };
        let members = store.set_members(&Self::index_key(&self.scope, &path))?;
        Ok(members
            .iter()
            .map(|member| {
                let child = Label::join(&[path.as_str(), member.as_str()], &separator);
                self.with_label(Some(child))
            })
            .collect())
    }

    /// Record every segment of the label chain under its parent path.
    /// Root segments are indexed under the empty path.
    pub fn update_index(&self, store: &dyn RankStore) -> Result<()> {
        let Some(label) = &self.label else {
            return Ok(());
        };
        for group in label.groups() {
            let parent_path = group.parent().map(|p| p.path()).unwrap_or_default();
            store.set_add(&Self::index_key(&self.scope, &parent_path), group.me())?;
        }
        Ok(())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_at(self.depth()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 5, 14, 13, 43, 0).unwrap()
    }

    fn key(label: &str) -> Key {
        Key::new("PageViews", Some(Label::new(label)), time())
    }

    #[test]
    fn test_render() {
        let key = key("about_us");
        assert_eq!(key.depth(), Resolution::Hour);
        assert_eq!(key.to_string(), "PageViews/about_us:2010051413");
        assert_eq!(key.to_string_at(Resolution::Year), "PageViews/about_us:2010");
        assert_eq!(key.prefix(), "PageViews/about_us:");

        let bare = Key::new("PageViews", None, time()).with_depth(Resolution::Day);
        assert_eq!(bare.to_string(), "PageViews:20100514");
    }

    #[test]
    fn test_hashed_label() {
        let key = key("about_us").with_hashed_label(true);
        let hash = Label::new("about_us").hash();
        assert_eq!(key.to_string(), format!("PageViews/{}:2010051413", hash));
        assert_eq!(key.label_hash(), Some(hash));
    }

    #[test]
    fn test_stray_separators_share_buckets() {
        let padded = key("/message/public/");
        assert_eq!(padded.to_string(), "PageViews/message/public:2010051413");
        assert_eq!(padded.to_string(), key("message/public").to_string());
        assert_eq!(
            padded.with_hashed_label(true).to_string(),
            key("message/public").with_hashed_label(true).to_string()
        );
    }

    #[test]
    fn test_empty_label_is_absent() {
        let key = Key::new("PageViews", Some(Label::new("")), time());
        assert!(key.label().is_none());
        assert_eq!(key.to_string(), "PageViews:2010051413");
    }

    #[test]
    fn test_groups_and_parent() {
        let key = key("message/public/offensive");
        let labels: Vec<String> = key
            .groups()
            .iter()
            .map(|k| k.label().unwrap().to_string())
            .collect();
        assert_eq!(labels, vec!["message/public/offensive", "message/public", "message"]);
        assert_eq!(key.parent().unwrap().label().unwrap().name(), "message/public");
        assert!(self::key("hello").parent().is_none());
        assert_eq!(Key::new("PageViews", None, time()).groups().len(), 1);
    }

    #[test]
    fn test_update_index_and_children() {
        let store = MemoryStore::new();
        let offensive = key("message/public/offensive");
        assert!(offensive.children(&store).unwrap().is_empty());

        offensive.update_index(&store).unwrap();
        key("message/public/die").update_index(&store).unwrap();
        key("message/public/live").update_index(&store).unwrap();
        // idempotent
        key("message/public/live").update_index(&store).unwrap();

        let members = store
            .set_members("PageViews.label_index:message/public")
            .unwrap();
        assert_eq!(members, vec!["die", "live", "offensive"]);

        let public = offensive.parent().unwrap();
        let children: Vec<String> = public
            .children(&store)
            .unwrap()
            .iter()
            .map(|k| k.label().unwrap().me().to_string())
            .collect();
        assert_eq!(children, members);
        assert_eq!(
            public.children(&store).unwrap()[0].label().unwrap().name(),
            "message/public/die"
        );

        let message = public.parent().unwrap();
        assert_eq!(message.children(&store).unwrap().len(), 1);
        assert_eq!(
            store.set_members("PageViews.label_index:").unwrap(),
            vec!["message"]
        );

        let root = Key::new("PageViews", None, time());
        let roots = root.children(&store).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].label().unwrap().name(), "message");
    }
}
