//! The public cache facade composing the heap info cache, info cache
//! backend, and variant cache backend into the single interface the
//! handlers call through.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use isrv_core::{Identifier, Info};
use isrv_error::ServerError;
use tokio::sync::RwLock;

use crate::backend::{InfoCacheBackend, VariantCacheBackend};
use crate::heap::HeapInfoCache;

/// Configuration knobs that change [`CacheFacade`] behavior without
/// changing which backends it wraps.
#[derive(Debug, Clone, Copy)]
pub struct CacheFacadeOptions {
    /// Whether the source's resolver should run before checking the cache
    /// (`true`) or the cache should be checked first (`false`, the
    /// default-equivalent "resolve-first disabled" path).
    pub resolve_first: bool,
    /// Whether missing source files should cause their stale cache entries
    /// to be evicted as they're discovered.
    pub evict_missing: bool,
    /// Whether the info-cache backend tier is consulted at all. Disabling
    /// it only turns off the backend; the separate heap tier (governed by
    /// `heap_target_size` in [`CacheFacade::new`]) keeps working regardless.
    pub info_cache_enabled: bool,
}

impl Default for CacheFacadeOptions {
    fn default() -> Self {
        Self { resolve_first: false, evict_missing: true, info_cache_enabled: true }
    }
}

/// Three-tier cache: an in-process heap cache for [`Info`], backed by a
/// configured info-cache backend, plus a separate variant-cache backend for
/// encoded image bytes.
pub struct CacheFacade {
    heap_info: Option<HeapInfoCache>,
    info_backend: Arc<dyn InfoCacheBackend>,
    variant_backend: Arc<dyn VariantCacheBackend>,
    /// Which variant fingerprints were written on behalf of which source
    /// identifier, so a source-identifier purge can also evict its variants
    /// even though the variant backend itself is keyed purely by
    /// fingerprint and has no notion of identifiers.
    variant_index: RwLock<HashMap<String, HashSet<String>>>,
    options: CacheFacadeOptions,
}

impl CacheFacade {
    /// Construct a facade. `heap_target_size` of `None` disables the heap
    /// tier entirely, so every `get_info` call goes straight to
    /// `info_backend`.
    pub fn new(
        info_backend: Arc<dyn InfoCacheBackend>,
        variant_backend: Arc<dyn VariantCacheBackend>,
        heap_target_size: Option<usize>,
        options: CacheFacadeOptions,
    ) -> Self {
        Self {
            heap_info: heap_target_size.map(HeapInfoCache::new),
            info_backend,
            variant_backend,
            variant_index: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Fetch cached [`Info`] for `identifier`, checking the heap tier
    /// before falling through to the configured backend (skipped entirely
    /// if `info_cache_enabled` is false). A backend hit is promoted into
    /// the heap tier.
    pub async fn get_info(&self, identifier: &Identifier) -> Result<Option<Info>, ServerError> {
        if let Some(heap) = &self.heap_info {
            if let Some(info) = heap.get(identifier) {
                return Ok(Some(info));
            }
        }

        if !self.options.info_cache_enabled {
            return Ok(None);
        }

        let info = self.info_backend.get(identifier).await?;
        if let (Some(heap), Some(info)) = (&self.heap_info, &info) {
            heap.put(identifier, info.clone());
        }
        Ok(info)
    }

    /// Write `info` to the heap tier and, if `info_cache_enabled`, the
    /// configured backend.
    pub async fn put_info(&self, identifier: &Identifier, info: Info) -> Result<(), ServerError> {
        if let Some(heap) = &self.heap_info {
            heap.put(identifier, info.clone());
        }
        if !self.options.info_cache_enabled {
            return Ok(());
        }
        self.info_backend.put(identifier, info).await
    }

    /// Fetch cached variant bytes for a fingerprint, if present.
    pub async fn get_variant(&self, fingerprint: &str) -> Result<Option<Vec<u8>>, ServerError> {
        self.variant_backend.get(fingerprint).await
    }

    /// Open a commit-or-discard writer for a variant of `identifier`. Bytes
    /// written through the returned guard are only made visible to
    /// [`CacheFacade::get_variant`] once [`VariantWriteGuard::commit`] is
    /// called; dropping the guard without committing (e.g. because the
    /// client disconnected mid-response) silently discards whatever was
    /// buffered. A successful commit also records `fingerprint` against
    /// `identifier` in the variant index, so a later [`CacheFacade::purge`]
    /// for that identifier can find and evict it.
    pub fn new_variant_writer<'a>(&'a self, identifier: &Identifier, fingerprint: &str) -> VariantWriteGuard<'a> {
        VariantWriteGuard {
            backend: self.variant_backend.as_ref(),
            index: &self.variant_index,
            identifier: identifier.as_str().to_string(),
            key: fingerprint.to_string(),
            buffer: Vec::new(),
            committed: false,
        }
    }

    /// Remove `identifier`'s cached [`Info`] from both tiers and, if
    /// `evict_missing` is enabled, the caller is expected to have already
    /// decided eviction is warranted (this method performs it
    /// unconditionally; the option only gates *whether* callers invoke it).
    pub async fn purge_info(&self, identifier: &Identifier) -> Result<(), ServerError> {
        if let Some(heap) = &self.heap_info {
            heap.purge(identifier);
        }
        self.info_backend.purge(identifier).await
    }

    /// Remove a cached variant.
    pub async fn purge_variant(&self, fingerprint: &str) -> Result<(), ServerError> {
        self.variant_backend.purge(fingerprint).await
    }

    /// Evict all variants and the info cached for `identifier` — the
    /// combined purge the Information and Image Request Handlers invoke
    /// when a source disappears out from under a cache entry.
    pub async fn purge(&self, identifier: &Identifier) -> Result<(), ServerError> {
        self.purge_info(identifier).await?;
        let fingerprints = self.variant_index.write().await.remove(identifier.as_str());
        if let Some(fingerprints) = fingerprints {
            for fingerprint in fingerprints {
                self.variant_backend.purge(&fingerprint).await?;
            }
        }
        Ok(())
    }

    /// Currently configured behavior flags.
    pub fn options(&self) -> CacheFacadeOptions {
        self.options
    }
}

/// A write-through buffer for a single variant cache entry.
///
/// Implements the same commit-or-discard-on-drop shape as a response body
/// tee: bytes accumulate in memory as they're produced, and are only
/// persisted to the backend if the pipeline runs to completion and calls
/// [`VariantWriteGuard::commit`]. An early `Drop` (panic unwind, early
/// return, client disconnect) leaves the backend untouched.
pub struct VariantWriteGuard<'a> {
    backend: &'a dyn VariantCacheBackend,
    index: &'a RwLock<HashMap<String, HashSet<String>>>,
    identifier: String,
    key: String,
    buffer: Vec<u8>,
    committed: bool,
}

impl VariantWriteGuard<'_> {
    /// Append bytes to the in-memory buffer.
    pub fn write(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Persist the buffered bytes to the backend under this guard's key, and
    /// register the key against this guard's identifier so a later
    /// `CacheFacade::purge` can find it.
    pub async fn commit(mut self) -> Result<(), ServerError> {
        self.committed = true;
        self.backend.put(&self.key, std::mem::take(&mut self.buffer)).await?;
        self.index.write().await.entry(self.identifier.clone()).or_default().insert(self.key.clone());
        Ok(())
    }
}

impl Drop for VariantWriteGuard<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.buffer.is_empty() {
            tracing::debug!(key = %self.key, bytes = self.buffer.len(), "discarding incomplete variant cache write");
        }
    }
}
