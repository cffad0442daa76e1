pub mod config;
pub mod dst;
pub mod error;
pub mod event;
pub mod keys;
pub mod observability;
pub mod query;
pub mod rank;
pub mod rollup;
pub mod store;
pub mod tracker;

pub use config::{ConnectionConfig, LoggingConfig, RankConfig, StoreBackend};
pub use error::{RankError, Result};
pub use event::{Event, EventOptions};
pub use keys::{Key, Label, RankDate, Resolution, Scope};
pub use query::{Finder, Query, QueryOptions};
pub use rank::{Collection, IntervalRecord, Rank, Stats};
pub use rollup::{Rollup, UpdateOptions, WriteBuffer};
pub use store::{Connections, MemoryStore, RankStore};
pub use tracker::{Engine, Tracker, TrackerOptions};

#[cfg(feature = "redis-store")]
pub use store::RedisStore;
