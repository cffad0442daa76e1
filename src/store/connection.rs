//! Named connection registry
//!
//! Every operation carries an optional connection reference; `None`
//! resolves to the default store. Multiple independent stores (e.g. one
//! per tenant) can be registered under names.

use super::{MemoryStore, RankStore};
use crate::config::{ConnectionConfig, RankConfig, StoreBackend};
use crate::error::{RankError, Result};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Registry of shared store handles
pub struct Connections {
    default: RwLock<Arc<dyn RankStore>>,
    named: RwLock<AHashMap<String, Arc<dyn RankStore>>>,
}

impl Connections {
    pub fn new(default: Arc<dyn RankStore>) -> Self {
        Connections {
            default: RwLock::new(default),
            named: RwLock::new(AHashMap::new()),
        }
    }

    /// Registry whose default connection is a fresh [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Open the default and every named connection described by `config`
    pub fn from_config(config: &RankConfig) -> Result<Self> {
        let connections = Self::new(open_store(&config.default_connection)?);
        for (name, conn) in &config.connections {
            connections.add(Some(name), open_store(conn)?);
        }
        Ok(connections)
    }

    /// Resolve a reference; `None` is the default connection
    pub fn get(&self, reference: Option<&str>) -> Result<Arc<dyn RankStore>> {
        match reference {
            None => Ok(self.default.read().clone()),
            Some(name) => self
                .named
                .read()
                .get(name)
                .cloned()
                .ok_or_else(|| RankError::UnknownConnection(name.to_string())),
        }
    }

    /// Register or replace a connection; `None` replaces the default
    pub fn add(&self, reference: Option<&str>, store: Arc<dyn RankStore>) {
        match reference {
            None => *self.default.write() = store,
            Some(name) => {
                self.named.write().insert(name.to_string(), store);
            }
        }
    }

    /// Registered names, sorted
    pub fn references(&self) -> Vec<String> {
        let mut names: Vec<String> = self.named.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Connections {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn open_store(config: &ConnectionConfig) -> Result<Arc<dyn RankStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Redis => open_redis(config),
    }
}

#[cfg(feature = "redis-store")]
fn open_redis(config: &ConnectionConfig) -> Result<Arc<dyn RankStore>> {
    let url = config.url.as_deref().ok_or_else(|| {
        RankError::InvalidConfiguration("redis backend requires a url".to_string())
    })?;
    info!(url, "opening redis connection");
    Ok(Arc::new(super::RedisStore::open(url)?))
}

#[cfg(not(feature = "redis-store"))]
fn open_redis(config: &ConnectionConfig) -> Result<Arc<dyn RankStore>> {
    info!(url = ?config.url, "redis backend requested without redis-store feature");
    Err(RankError::InvalidConfiguration(
        "redis backend requires the redis-store feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_named() {
        let connections = Connections::in_memory();
        let tenant: Arc<dyn RankStore> = Arc::new(MemoryStore::new());
        connections.add(Some("tenant"), tenant.clone());

        connections
            .get(None)
            .unwrap()
            .set_score("b", "m", 1.0)
            .unwrap();
        assert!(tenant.keys().unwrap().is_empty());
        assert_eq!(
            connections.get(Some("tenant")).unwrap().keys().unwrap().len(),
            0
        );
        assert_eq!(connections.references(), vec!["tenant"]);
    }

    #[test]
    fn test_unknown_reference() {
        let connections = Connections::in_memory();
        assert!(matches!(
            connections.get(Some("nope")),
            Err(RankError::UnknownConnection(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_replace_default() {
        let connections = Connections::in_memory();
        connections.get(None).unwrap().incr("c").unwrap();
        connections.add(None, Arc::new(MemoryStore::new()));
        assert!(connections.get(None).unwrap().keys().unwrap().is_empty());
    }

    #[test]
    fn test_from_config() {
        let mut config = RankConfig::default();
        config
            .connections
            .insert("archive".to_string(), ConnectionConfig::default());
        let connections = Connections::from_config(&config).unwrap();
        assert!(connections.get(Some("archive")).is_ok());
    }

    #[cfg(not(feature = "redis-store"))]
    #[test]
    fn test_redis_backend_requires_feature() {
        let mut config = RankConfig::default();
        config.default_connection = ConnectionConfig {
            backend: StoreBackend::Redis,
            url: Some("redis://127.0.0.1/".to_string()),
        };
        assert!(Connections::from_config(&config).is_err());
    }
}
