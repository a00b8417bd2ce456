//! Pluggable cache backend traits.
//!
//! A deployment selects a concrete backend per tier via configuration
//! (`source.*` / `cache.*` in [`isrv_config`](../isrv_config/index.html));
//! this crate ships the in-memory reference implementations used in tests
//! and single-node deployments.

use async_trait::async_trait;
use isrv_core::{Identifier, Info};
use isrv_error::ServerError;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable storage for resolved [`Info`] records, keyed by identifier.
#[async_trait]
pub trait InfoCacheBackend: Send + Sync {
    /// Fetch a cached [`Info`], if present.
    async fn get(&self, identifier: &Identifier) -> Result<Option<Info>, ServerError>;
    /// Store or overwrite a cached [`Info`].
    async fn put(&self, identifier: &Identifier, info: Info) -> Result<(), ServerError>;
    /// Remove a cached [`Info`], if present.
    async fn purge(&self, identifier: &Identifier) -> Result<(), ServerError>;
}

/// Durable storage for encoded variant bytes, keyed by operation-list
/// fingerprint.
#[async_trait]
pub trait VariantCacheBackend: Send + Sync {
    /// Fetch cached variant bytes, if present.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ServerError>;
    /// Store or overwrite cached variant bytes.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ServerError>;
    /// Remove cached variant bytes, if present.
    async fn purge(&self, key: &str) -> Result<(), ServerError>;
}

/// An in-memory [`InfoCacheBackend`], suitable for tests and single-node
/// deployments with no separately configured info cache backend.
#[derive(Default)]
pub struct InMemoryInfoCache {
    entries: RwLock<HashMap<String, Info>>,
}

#[async_trait]
impl InfoCacheBackend for InMemoryInfoCache {
    async fn get(&self, identifier: &Identifier) -> Result<Option<Info>, ServerError> {
        Ok(self.entries.read().await.get(identifier.as_str()).cloned())
    }

    async fn put(&self, identifier: &Identifier, info: Info) -> Result<(), ServerError> {
        self.entries.write().await.insert(identifier.as_str().to_string(), info);
        Ok(())
    }

    async fn purge(&self, identifier: &Identifier) -> Result<(), ServerError> {
        self.entries.write().await.remove(identifier.as_str());
        Ok(())
    }
}

/// An in-memory [`VariantCacheBackend`], suitable for tests and single-node
/// deployments with no separately configured variant cache backend.
#[derive(Default)]
pub struct InMemoryVariantCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl VariantCacheBackend for InMemoryVariantCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ServerError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ServerError> {
        self.entries.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn purge(&self, key: &str) -> Result<(), ServerError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
