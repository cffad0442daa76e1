//! In-memory write buffer
//!
//! Writes sharing a bucket identity and options are max-merged while
//! pending. Group summaries are injected per write before merging, so a
//! buffered batch stores exactly what the individual writes would have. Once `capacity` writes have been accepted the whole pending set
//! is detached under the lock and forwarded to the rollup writer outside it.
//!
//! A capacity of 0 or 1 disables buffering: `store` declines and the caller
//! writes directly.

use super::{flatten_pairs, Rollup, UpdateOptions};
use crate::error::{RankError, Result};
use crate::keys::{Key, Resolution};
use crate::rank::Stats;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// One pending write, merged from every write sharing its identity
#[derive(Debug, Clone)]
struct BufferEntry {
    key: Key,
    stats: Stats,
    depth_limit: Resolution,
    opts: UpdateOptions,
}

#[derive(Debug, Default)]
struct BufferState {
    queue: AHashMap<String, BufferEntry>,
    count: usize,
}

impl BufferState {
    /// Detach the queue when forced or when the threshold is reached
    fn take(&mut self, force: bool, capacity: usize) -> Vec<BufferEntry> {
        let due = !self.queue.is_empty() && self.count >= capacity;
        if !force && !due {
            return Vec::new();
        }
        self.count = 0;
        std::mem::take(&mut self.queue).into_values().collect()
    }
}

/// Shared coalescing buffer in front of a [`Rollup`]
pub struct WriteBuffer {
    rollup: Arc<Rollup>,
    capacity: AtomicUsize,
    state: Mutex<BufferState>,
}

impl WriteBuffer {
    pub fn new(rollup: Arc<Rollup>, capacity: usize) -> Self {
        WriteBuffer {
            rollup,
            capacity: AtomicUsize::new(capacity),
            state: Mutex::new(BufferState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Change the capacity; pending writes stay queued
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Release);
    }

    /// Writes accepted since the last flush
    pub fn pending(&self) -> usize {
        self.state.lock().count
    }

    /// Distinct merge identities currently queued
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn rollup(&self) -> &Arc<Rollup> {
        &self.rollup
    }

    /// Merge identity: the key's bucket id at `depth_limit` followed by
    /// every option pair, depth limit included, sorted by name and
    /// flattened with `:`.
    ///
    /// Writes in different finest buckets never share an entry, whatever
    /// the key's own depth.
    pub fn buffer_key(key: &Key, depth_limit: Resolution, opts: &UpdateOptions) -> String {
        let mut pairs = opts.pairs();
        pairs.push(("depth_limit", depth_limit.to_string()));
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        format!("{}:{}", key.to_string_at(depth_limit), flatten_pairs(pairs))
    }

    /// Queue a write. Returns false when buffering is disabled.
    ///
    /// The write that reaches capacity forwards the whole pending set; a
    /// forwarding failure is returned from that call.
    pub fn store(
        &self,
        key: &Key,
        stats: &Stats,
        depth_limit: Resolution,
        opts: &UpdateOptions,
    ) -> Result<bool> {
        let capacity = self.capacity();
        if capacity <= 1 {
            return Ok(false);
        }

        let identity = Self::buffer_key(key, depth_limit, opts);
        let prepared = self.rollup.prepare(stats, opts);
        let batch = {
            let mut state = self.state.lock();
            state
                .queue
                .entry(identity)
                .or_insert_with(|| BufferEntry {
                    key: key.clone(),
                    stats: Stats::new(),
                    depth_limit,
                    opts: opts.clone(),
                })
                .stats
                .merge_max(&prepared);
            state.count += 1;
            state.take(false, capacity)
        };

        self.forward(batch)?;
        Ok(true)
    }

    /// Forward pending writes. Without `force` this only happens when the
    /// threshold has been reached. Returns the number of entries forwarded.
    pub fn flush(&self, force: bool) -> Result<usize> {
        let capacity = self.capacity();
        let batch = self.state.lock().take(force, capacity);
        self.forward(batch)
    }

    /// Force out everything still pending
    pub fn shutdown(&self) -> Result<usize> {
        let flushed = self.flush(true)?;
        debug!(flushed, "write buffer shut down");
        Ok(flushed)
    }

    /// Apply a detached batch. Every entry is attempted; failed entries are
    /// logged and dropped, and the first failure is returned.
    fn forward(&self, batch: Vec<BufferEntry>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let total = batch.len();
        let mut first_error: Option<RankError> = None;
        for entry in batch {
            if let Err(e) = self
                .rollup
                .write(&entry.key, &entry.stats, entry.depth_limit, &entry.opts)
            {
                warn!(key = %entry.key, error = %e, "dropping buffered write");
                first_error.get_or_insert(e);
            }
        }
        debug!(entries = total, "write buffer flushed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }
}

impl Drop for WriteBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.flush(true) {
            warn!(error = %e, "final write buffer flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Label;
    use crate::store::{Connections, MemoryStore, RankStore};
    use chrono::{DateTime, TimeZone, Utc};

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 5, 14, 13, 43, 0).unwrap()
    }

    fn setup(capacity: usize) -> (WriteBuffer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let rollup = Rollup::new(Arc::new(Connections::new(store.clone())));
        (WriteBuffer::new(Arc::new(rollup), capacity), store)
    }

    fn key() -> Key {
        Key::new("PageViews", Some(Label::new("about_us")), time())
    }

    #[test]
    fn test_disabled_buffer_declines() {
        for capacity in [0, 1] {
            let (buffer, _) = setup(capacity);
            let accepted = buffer
                .store(&key(), &Stats::from_pairs(&[("v", 1.0)]), Resolution::Hour, &UpdateOptions::default())
                .unwrap();
            assert!(!accepted);
            assert_eq!(buffer.pending(), 0);
        }
    }

    #[test]
    fn test_buffer_key() {
        let id = WriteBuffer::buffer_key(&key(), Resolution::Hour, &UpdateOptions::default());
        assert_eq!(
            id,
            "PageViews/about_us:2010051413:connection_ref::depth_limit:hour:enable_grouping:true:expire::label_indexing:true"
        );
        let other = UpdateOptions {
            label_indexing: false,
            ..Default::default()
        };
        assert_ne!(id, WriteBuffer::buffer_key(&key(), Resolution::Hour, &other));

        let minute = WriteBuffer::buffer_key(&key(), Resolution::Min, &UpdateOptions::default());
        assert!(minute.starts_with("PageViews/about_us:201005141343:"));
    }

    #[test]
    fn test_threshold_flush() {
        let (buffer, store) = setup(3);
        let opts = UpdateOptions::default();
        for score in [2.0, 7.0] {
            assert!(buffer
                .store(&key(), &Stats::from_pairs(&[("v", score)]), Resolution::Hour, &opts)
                .unwrap());
        }
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(buffer.pending(), 2);
        assert_eq!(buffer.queued(), 1);

        buffer
            .store(&key(), &Stats::from_pairs(&[("v", 4.0), ("w", 1.0)]), Resolution::Hour, &opts)
            .unwrap();
        assert_eq!(buffer.pending(), 0);
        assert_eq!(store.score("PageViews/about_us:2010051413", "v").unwrap(), Some(7.0));
        assert_eq!(store.score("PageViews/about_us:2010", "w").unwrap(), Some(1.0));
    }

    #[test]
    fn test_flush_without_force_waits_for_threshold() {
        let (buffer, store) = setup(5);
        buffer
            .store(&key(), &Stats::from_pairs(&[("v", 1.0)]), Resolution::Hour, &UpdateOptions::default())
            .unwrap();
        assert_eq!(buffer.flush(false).unwrap(), 0);
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(buffer.flush(true).unwrap(), 1);
        assert_eq!(store.score("PageViews/about_us:2010051413", "v").unwrap(), Some(1.0));
        assert_eq!(buffer.flush(true).unwrap(), 0);
    }

    #[test]
    fn test_drop_flushes() {
        let (buffer, store) = setup(10);
        buffer
            .store(&key(), &Stats::from_pairs(&[("v", 9.0)]), Resolution::Day, &UpdateOptions::default())
            .unwrap();
        drop(buffer);
        assert_eq!(store.score("PageViews/about_us:20100514", "v").unwrap(), Some(9.0));
    }

    #[test]
    fn test_failed_forward_is_reported() {
        let (buffer, store) = setup(2);
        let bad = UpdateOptions::default().with_connection("missing");
        let good = UpdateOptions::default();
        buffer
            .store(&key(), &Stats::from_pairs(&[("v", 1.0)]), Resolution::Hour, &good)
            .unwrap();
        let result = buffer.store(&key(), &Stats::from_pairs(&[("v", 1.0)]), Resolution::Hour, &bad);
        assert!(matches!(result, Err(RankError::UnknownConnection(_))));
        // the good entry of the same batch still landed
        assert_eq!(store.score("PageViews/about_us:2010051413", "v").unwrap(), Some(1.0));
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_group_sums_match_direct_writes() {
        let (buffer, store) = setup(2);
        let opts = UpdateOptions::default();
        buffer
            .store(&key(), &Stats::from_pairs(&[("visitors/eu", 5.0)]), Resolution::Hour, &opts)
            .unwrap();
        buffer
            .store(&key(), &Stats::from_pairs(&[("visitors/us", 5.0)]), Resolution::Hour, &opts)
            .unwrap();
        assert_eq!(store.score("PageViews/about_us:2010051413", "visitors").unwrap(), Some(5.0));
        assert_eq!(store.score("PageViews/about_us:2010051413", "visitors/us").unwrap(), Some(5.0));
    }
}
