//! Backing store abstraction
//!
//! The rollup and query layers only ever talk to a keyed sorted-map
//! service through [`RankStore`]. Bucket identifiers are opaque strings;
//! no implementation interprets their structure.
//!
//! ## Implementations
//!
//! - `MemoryStore`: in-process store for tests, simulation and
//!   single-process deployments
//! - `RedisStore`: Redis over the `redis` crate (feature `redis-store`)
//!
//! Stores are shared between threads behind `Arc<dyn RankStore>` and
//! resolved by name through [`Connections`].

mod connection;
mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

pub use connection::Connections;
pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

use crate::error::Result;

/// Keyed sorted-map service consumed by the rollup writer and finder
pub trait RankStore: Send + Sync {
    /// Score of `member` in `bucket`
    fn score(&self, bucket: &str, member: &str) -> Result<Option<f64>>;

    /// Unconditionally set the score of `member`
    fn set_score(&self, bucket: &str, member: &str, score: f64) -> Result<()>;

    /// Set the score only when the member is absent or `score` is strictly
    /// greater than the stored one. Returns true when the store changed.
    ///
    /// The default is a read followed by a write; implementations with a
    /// native conditional maximum should override it.
    fn max_score(&self, bucket: &str, member: &str, score: f64) -> Result<bool> {
        match self.score(bucket, member)? {
            Some(existing) if existing >= score => Ok(false),
            _ => {
                self.set_score(bucket, member, score)?;
                Ok(true)
            }
        }
    }

    /// All members with scores, highest score first
    fn range_desc(&self, bucket: &str) -> Result<Vec<(String, f64)>>;

    /// All members of a sorted bucket, highest score first
    fn members(&self, bucket: &str) -> Result<Vec<String>> {
        Ok(self
            .range_desc(bucket)?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    /// Set a time-to-live on an existing key
    fn expire(&self, key: &str, seconds: u64) -> Result<()>;

    /// Remaining time-to-live, `None` when the key is missing or persistent
    fn ttl(&self, key: &str) -> Result<Option<u64>>;

    /// Increment an integer counter, returning the new value
    fn incr(&self, key: &str) -> Result<i64>;

    /// Add to a plain set. Returns true when the member was new.
    fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    fn set_members(&self, key: &str) -> Result<Vec<String>>;

    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;

    fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>>;

    /// All live keys, sorted
    fn keys(&self) -> Result<Vec<String>>;
}
