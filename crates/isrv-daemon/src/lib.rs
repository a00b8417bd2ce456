// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! HTTP daemon implementing the IIIF Image API (v1-v3) and Deep Zoom
//! request pipeline: the Resource Router, the Information and Image
//! Request Handlers, the pluggable source/callback/cache boundaries, and
//! the middleware stack common to every route.

/// Delegate/callback traits invoked at fixed points in the request
/// pipeline, with a permissive default implementation.
pub mod callbacks;
/// Endpoint-prefix to API-version registry.
pub mod endpoints;
/// HTTP error rendering.
pub mod errors;
/// `info.json` / `.dzi` descriptor document projection.
pub mod factory;
/// The Information Request Handler and Image Request Handler.
pub mod handlers;
/// Request-id, logging, common-headers, and CORS middleware.
pub mod middleware;
/// The Resource Router.
pub mod router;
/// Pluggable source backend trait plus the `FixtureSource` reference impl.
pub mod source;
/// Shared application state.
pub mod state;
/// `cache`/`response-content-disposition` query semantics and `Content-Disposition` encoding.
pub mod validation;

pub use state::AppState;

/// Build the daemon's Axum [`axum::Router`], fully wired with middleware
/// and the Resource Router.
pub fn build_app(state: AppState) -> axum::Router {
    router::build_router(state)
}
