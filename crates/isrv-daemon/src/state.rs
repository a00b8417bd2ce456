// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared application state threaded through every handler.

use std::sync::Arc;

use isrv_cache::CacheFacade;
use isrv_config::ServerConfig;
use isrv_core::SessionStore;
use isrv_session::Coordinator;

use crate::callbacks::{DefaultCallbacks, ImageHandlerCallbacks, InfoHandlerCallbacks};
use crate::endpoints::EndpointRegistry;
use crate::source::SourceBackend;

/// Everything a request handler needs, cloned cheaply (everything inside
/// is already an `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Active configuration.
    pub config: Arc<ServerConfig>,
    /// Endpoint-prefix → API-version lookup built from `config.endpoints`.
    pub endpoints: Arc<EndpointRegistry>,
    /// Three-tier cache facade.
    pub cache: Arc<CacheFacade>,
    /// Session store for request-context auth.
    pub sessions: Arc<SessionStore>,
    /// Single-flight coordinator for concurrent cache-miss builds.
    pub coordinator: Arc<Coordinator>,
    /// Pluggable source backend.
    pub source: Arc<dyn SourceBackend>,
    /// Image handler delegate.
    pub image_callbacks: Arc<dyn ImageHandlerCallbacks>,
    /// Information handler delegate.
    pub info_callbacks: Arc<dyn InfoHandlerCallbacks>,
}

impl AppState {
    /// Construct state with the default, permissive callback set.
    pub fn new(
        config: ServerConfig,
        cache: CacheFacade,
        sessions: SessionStore,
        source: Arc<dyn SourceBackend>,
    ) -> Self {
        let endpoints = EndpointRegistry::from_config(&config);
        Self {
            config: Arc::new(config),
            endpoints: Arc::new(endpoints),
            cache: Arc::new(cache),
            sessions: Arc::new(sessions),
            coordinator: Arc::new(Coordinator::new()),
            source,
            image_callbacks: Arc::new(DefaultCallbacks),
            info_callbacks: Arc::new(DefaultCallbacks),
        }
    }
}
