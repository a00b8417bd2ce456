//! Delegate hooks for the image and information request handlers.
//!
//! Both handlers are driven by a small set of caller-supplied callbacks
//! rather than a class hierarchy: authorization gates and
//! lifecycle-notification hooks. Default implementations authorize every
//! request and no-op every notification, matching what a handler with no
//! access-control requirements needs.

use async_trait::async_trait;
use isrv_core::{Info, RequestContext};

use crate::source::SourceStat;

/// Outcome of an authorization hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Proceed.
    Allow,
    /// The caller has no identity at all; surfaces as 401.
    Unauthenticated,
    /// The caller is known but not permitted; surfaces as 403.
    Forbidden,
}

/// Callbacks for the Image Request Handler's `AUTH_PRE → ... → END` pipeline.
#[async_trait]
pub trait ImageHandlerCallbacks: Send + Sync {
    /// Gate before any source or cache access. `Forbidden`/`Unauthenticated`
    /// short-circuits with no body written.
    async fn authorize_before_access(&self, _ctx: &RequestContext) -> AuthDecision {
        AuthDecision::Allow
    }

    /// Gate after the cache-hit/miss decision but before any bytes are
    /// written to the response.
    async fn authorize(&self, _ctx: &RequestContext) -> AuthDecision {
        AuthDecision::Allow
    }

    /// Notification that the response will stream directly from a
    /// committed variant-cache entry.
    async fn will_stream_image_from_variant_cache(&self, _ctx: &RequestContext) {}

    /// Notification that an `Info` has been obtained (from cache or
    /// decoder) and is about to drive operation-list validation.
    async fn info_available(&self, _ctx: &RequestContext, _info: &Info) {}

    /// Notification immediately before the decode/process/encode pipeline
    /// runs on a cache miss.
    async fn will_process_image(&self, _ctx: &RequestContext, _info: &Info) {}
}

/// Callbacks for the Information Request Handler's five-step sequence.
#[async_trait]
pub trait InfoHandlerCallbacks: Send + Sync {
    /// Gate before any source or cache access.
    async fn authorize_before_access(&self, _ctx: &RequestContext) -> AuthDecision {
        AuthDecision::Allow
    }

    /// Gate after `Info` has been populated into the request context but
    /// before it is returned to the caller.
    async fn authorize(&self, _ctx: &RequestContext) -> AuthDecision {
        AuthDecision::Allow
    }

    /// Notification that `Info` was obtained via a fresh source probe.
    async fn source_accessed(&self, _ctx: &RequestContext, _stat: SourceStat) {}

    /// Notification that `Info` was obtained from a cache tier without
    /// touching the source.
    async fn cache_accessed(&self, _ctx: &RequestContext) {}
}

/// The permissive, silent default used when no caller-specific delegate is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCallbacks;

impl ImageHandlerCallbacks for DefaultCallbacks {}
impl InfoHandlerCallbacks for DefaultCallbacks {}
