#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use isrv_cache::{CacheFacade, CacheFacadeOptions, InMemoryInfoCache, InMemoryVariantCache};
use isrv_config::ServerConfig;
use isrv_core::{Identifier, Info, SessionStore};
use isrv_daemon::source::{Fixture, FixtureSource};
use isrv_daemon::state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "isrv-daemon", version, about = "IIIF / Deep Zoom image server")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8182")]
    bind: String,

    /// Path to a TOML configuration file. Defaults apply if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session time-to-live, in seconds.
    #[arg(long, default_value_t = 3600)]
    session_ttl_secs: u64,

    /// Enable verbose request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = isrv_config::load_config(args.config.as_deref())
        .with_context(|| "load configuration")?;

    let filter = match (&config.log_level, args.debug) {
        (_, true) => EnvFilter::new("isrv=debug,isrv_daemon=debug,tower_http=debug"),
        (Some(level), false) => EnvFilter::new(format!("isrv={level}")),
        (None, false) => EnvFilter::new("isrv=info"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let warnings = isrv_config::validate_config(&config).with_context(|| "validate configuration")?;
    for warning in &warnings {
        tracing::warn!(%warning, "configuration warning");
    }

    let cache = CacheFacade::new(
        Arc::new(InMemoryInfoCache::default()),
        Arc::new(InMemoryVariantCache::default()),
        config.heap_info_cache.enabled.then_some(config.heap_info_cache.target_size),
        CacheFacadeOptions {
            resolve_first: config.cache.resolve_first,
            evict_missing: config.cache.evict_missing,
            info_cache_enabled: config.info_cache.enabled,
        },
    );
    let sessions = SessionStore::new(Duration::from_secs(args.session_ttl_secs));
    let source = Arc::new(demo_source());

    let state = AppState::new(config, cache, sessions, source);
    let app = isrv_daemon::build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, "isrv-daemon listening");

    axum::serve(listener, app).await.context("serve")
}

/// A small built-in image seeded at startup so the server answers requests
/// out of the box. Real deployments register a decoder-backed
/// [`isrv_daemon::source::SourceBackend`] instead.
fn demo_source() -> FixtureSource {
    let source = FixtureSource::new();
    source.register(
        Identifier::new("demo"),
        Fixture {
            info: Info::flat("demo", 64, 56, "jpg"),
            bytes: vec![0xFF; 64 * 56 * 3],
            modified: chrono::Utc::now(),
        },
    );
    source
}
