//! Source backend abstraction.
//!
//! Decoding and encoding pixels is explicitly out of scope for this crate;
//! what lives here is the boundary a concrete decoder/encoder plugs into.
//! [`SourceBackend`] is the trait every backend (filesystem, object store,
//! ...) implements. [`FixtureSource`] is the reference implementation used
//! by tests and by small static deployments seeded at startup — it returns
//! pre-registered [`Info`] records and does not perform real pixel
//! processing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use isrv_core::{Identifier, Info, OperationList};
use isrv_error::ServerError;

/// Point-in-time metadata about a source, independent of its decoded
/// structure. Used to decide whether a cached entry is still fresh.
#[derive(Debug, Clone, Copy)]
pub struct SourceStat {
    /// Last-modified instant reported by the backend.
    pub modified: DateTime<Utc>,
}

/// Where source bytes and their structural [`Info`] come from.
#[async_trait]
pub trait SourceBackend: Send + Sync {
    /// Check whether `identifier` exists, without reading or decoding it.
    async fn stat(&self, identifier: &Identifier) -> Result<Option<SourceStat>, ServerError>;

    /// Decode structural metadata for `identifier`. Callers only reach this
    /// after a cache miss.
    async fn read_info(&self, identifier: &Identifier) -> Result<Info, ServerError>;

    /// Render `operations` against `identifier`, producing encoded bytes in
    /// the operation list's target format.
    async fn render(
        &self,
        identifier: &Identifier,
        operations: &OperationList,
    ) -> Result<Vec<u8>, ServerError>;
}

/// A single registered source: its structural [`Info`] plus raw bytes.
#[derive(Debug, Clone)]
pub struct Fixture {
    /// Structural properties a real decoder would report.
    pub info: Info,
    /// Source bytes, in `info.format`.
    pub bytes: Vec<u8>,
    /// Last-modified instant.
    pub modified: DateTime<Utc>,
}

/// An in-memory, pre-registered set of sources.
///
/// Renders by returning the stored bytes unchanged for an identity
/// operation list (no crop/scale/rotate), and a deterministic placeholder
/// buffer otherwise — this backend never decodes or re-encodes pixels.
#[derive(Default)]
pub struct FixtureSource {
    fixtures: RwLock<HashMap<String, Fixture>>,
}

impl FixtureSource {
    /// Construct an empty fixture source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a source.
    pub fn register(&self, identifier: Identifier, fixture: Fixture) {
        self.fixtures
            .write()
            .expect("fixture source lock poisoned")
            .insert(identifier.as_str().to_string(), fixture);
    }
}

#[async_trait]
impl SourceBackend for FixtureSource {
    async fn stat(&self, identifier: &Identifier) -> Result<Option<SourceStat>, ServerError> {
        Ok(self
            .fixtures
            .read()
            .expect("fixture source lock poisoned")
            .get(identifier.as_str())
            .map(|f| SourceStat { modified: f.modified }))
    }

    async fn read_info(&self, identifier: &Identifier) -> Result<Info, ServerError> {
        self.fixtures
            .read()
            .expect("fixture source lock poisoned")
            .get(identifier.as_str())
            .map(|f| f.info.clone())
            .ok_or_else(|| ServerError::not_found(format!("no such source: {identifier}")))
    }

    async fn render(
        &self,
        identifier: &Identifier,
        operations: &OperationList,
    ) -> Result<Vec<u8>, ServerError> {
        let guard = self.fixtures.read().expect("fixture source lock poisoned");
        let fixture = guard
            .get(identifier.as_str())
            .ok_or_else(|| ServerError::not_found(format!("no such source: {identifier}")))?;

        if operations.operations.len() == 1 {
            // Just the terminal Encode: an identity rendition of the whole source.
            return Ok(fixture.bytes.clone());
        }
        Ok(placeholder_bytes(operations))
    }
}

/// Deterministic stand-in for pixels this crate never actually decodes.
/// Same operation list, same bytes, every time — that's the only property
/// the request pipeline's idempotence invariant requires of this backend.
fn placeholder_bytes(operations: &OperationList) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(operations.fingerprint().as_bytes());
    hasher.finalize().to_vec()
}
