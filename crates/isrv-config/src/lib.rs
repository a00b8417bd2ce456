// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the image server.
//!
//! This crate provides [`ServerConfig`] — the top-level runtime settings —
//! together with helpers for loading from TOML files, merging overlays, and
//! producing advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// Two configs could not be merged because of conflicting constraints.
    #[error("merge conflict: {reason}")]
    MergeConflict {
        /// Description of the conflict.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A deprecated field was used in the configuration.
    DeprecatedField {
        /// Name of the deprecated field.
        field: String,
        /// Suggested replacement, if any.
        suggestion: Option<String>,
    },
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// `client_cache.max_age` is unusually large.
    LargeMaxAge {
        /// Value in seconds.
        secs: u64,
    },
    /// No source is configured; every request will 404.
    NoSourcesConfigured,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::DeprecatedField { field, suggestion } => {
                write!(f, "deprecated field '{field}'")?;
                if let Some(s) = suggestion {
                    write!(f, " — use '{s}' instead")?;
                }
                Ok(())
            }
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeMaxAge { secs } => {
                write!(f, "client_cache.max_age is unusually large ({secs}s)")
            }
            ConfigWarning::NoSourcesConfigured => {
                write!(f, "no [source.*] entries configured")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Which endpoint path a given API version is served from, and whether it's
/// enabled at all.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Whether this endpoint family accepts requests.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path prefix this endpoint family is mounted under, e.g. `"iiif/2"`.
    pub path: String,
}

fn default_true() -> bool {
    true
}

/// Resolve-first / evict-missing policy for the cache facade.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
pub struct CacheServerConfig {
    /// Stat the source before consulting caches.
    #[serde(default)]
    pub resolve_first: bool,
    /// Purge cache entries whose source has disappeared.
    #[serde(default)]
    pub evict_missing: bool,
}

/// Settings shared by the variant-cache and info-cache tiers.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct CacheTierConfig {
    /// Whether this tier is consulted at all.
    #[serde(default)]
    pub enabled: bool,
    /// Backend-specific settings, opaque to this crate (e.g. a directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: None,
        }
    }
}

/// In-process mirror of the info-cache.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct HeapInfoCacheConfig {
    /// Whether the heap-info-cache is active. Unlike the other two tiers
    /// this one is mandatorily in-process; disabling it only stops the
    /// population side effect on an info-cache hit.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of `Info` entries retained.
    #[serde(default = "default_heap_target_size")]
    pub target_size: usize,
}

fn default_heap_target_size() -> usize {
    1_000
}

impl Default for HeapInfoCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_size: default_heap_target_size(),
        }
    }
}

/// Client-facing `Cache-Control` behavior.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ClientCacheConfig {
    /// Whether `Cache-Control` is emitted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `max-age` value in seconds.
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

fn default_max_age() -> u64 {
    3_600
}

impl Default for ClientCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age: default_max_age(),
        }
    }
}

/// A named backend source (`source.{name}.*`). Only the `static` backend is
/// modeled structurally here; backend-specific keys live in `properties`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SourceConfig {
    /// Backend kind, e.g. `"filesystem"`, `"http"`, `"s3"`.
    pub backend: String,
    /// Backend-specific key-value settings (root path, bucket name, ...).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// IIIF-specific behavior toggles.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
pub struct IiifConfig {
    /// Require `Size` to resolve to one of the info document's advertised
    /// sizes; mismatches are rejected with 403.
    #[serde(default)]
    pub restrict_to_sizes: bool,
}

/// Top-level runtime configuration for the image server.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ServerConfig {
    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Externally visible base URI, overriding `X-Forwarded-*` reconstruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<String>,

    /// Upper bound on `width * height` for any resolved operation list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pixels: Option<u64>,

    /// Upper bound on upscaling factor when the `^` marker is present (v3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_scale: Option<f64>,

    /// String substituted for literal `/` inside an identifier on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slash_substitute: Option<String>,

    /// Per-version endpoint mount points (`v1`, `v2`, `v3`, `deepzoom`).
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,

    /// Resolve-first / evict-missing cache policy.
    #[serde(default)]
    pub cache: CacheServerConfig,

    /// Variant-byte cache tier.
    #[serde(default)]
    pub variant_cache: CacheTierConfig,

    /// Decoded-`Info` cache tier.
    #[serde(default)]
    pub info_cache: CacheTierConfig,

    /// In-process mirror of the info-cache.
    #[serde(default)]
    pub heap_info_cache: HeapInfoCacheConfig,

    /// Client-facing `Cache-Control` behavior.
    #[serde(default)]
    pub client_cache: ClientCacheConfig,

    /// IIIF-specific behavior toggles.
    #[serde(default)]
    pub iiif: IiifConfig,

    /// Named backend sources (`source.{name}`).
    #[serde(default)]
    pub source: BTreeMap<String, SourceConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(
            "v1".into(),
            EndpointConfig {
                enabled: true,
                path: "iiif/1".into(),
            },
        );
        endpoints.insert(
            "v2".into(),
            EndpointConfig {
                enabled: true,
                path: "iiif/2".into(),
            },
        );
        endpoints.insert(
            "v3".into(),
            EndpointConfig {
                enabled: true,
                path: "iiif/3".into(),
            },
        );
        endpoints.insert(
            "deepzoom".into(),
            EndpointConfig {
                enabled: true,
                path: "dzi".into(),
            },
        );
        Self {
            log_level: Some("info".into()),
            base_uri: None,
            max_pixels: None,
            max_scale: None,
            slash_substitute: None,
            endpoints,
            cache: CacheServerConfig::default(),
            variant_cache: CacheTierConfig::default(),
            info_cache: CacheTierConfig::default(),
            heap_info_cache: HeapInfoCacheConfig::default(),
            client_cache: ClientCacheConfig::default(),
            iiif: IiifConfig::default(),
            source: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Threshold above which `client_cache.max_age` generates a warning.
const LARGE_MAX_AGE_THRESHOLD: u64 = 30 * 24 * 3_600;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`ServerConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`ServerConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => ServerConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`ServerConfig`].
pub fn parse_toml(content: &str) -> Result<ServerConfig, ConfigError> {
    toml::from_str::<ServerConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `ISRV_LOG_LEVEL`
/// - `ISRV_BASE_URI`
/// - `ISRV_MAX_PIXELS`
/// - `ISRV_SLASH_SUBSTITUTE`
pub fn apply_env_overrides(config: &mut ServerConfig) {
    if let Ok(val) = std::env::var("ISRV_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Ok(val) = std::env::var("ISRV_BASE_URI") {
        config.base_uri = Some(val);
    }
    if let Ok(val) = std::env::var("ISRV_MAX_PIXELS")
        && let Ok(parsed) = val.parse::<u64>()
    {
        config.max_pixels = Some(parsed);
    }
    if let Ok(val) = std::env::var("ISRV_SLASH_SUBSTITUTE") {
        config.slash_substitute = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (invalid log level, empty source backend names) are returned
/// as a [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &ServerConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    for (name, source) in &config.source {
        if name.is_empty() {
            errors.push("source name must not be empty".into());
        }
        if source.backend.trim().is_empty() {
            errors.push(format!("source '{name}': backend must not be empty"));
        }
    }

    if let Some(max_pixels) = config.max_pixels
        && max_pixels == 0
    {
        errors.push("max_pixels must be greater than zero when set".into());
    }

    if let Some(max_scale) = config.max_scale
        && max_scale <= 0.0
    {
        errors.push("max_scale must be greater than zero when set".into());
    }

    if config.client_cache.max_age > LARGE_MAX_AGE_THRESHOLD {
        warnings.push(ConfigWarning::LargeMaxAge {
            secs: config.client_cache.max_age,
        });
    }

    if config.source.is_empty() {
        warnings.push(ConfigWarning::NoSourcesConfigured);
    }

    if config.base_uri.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "base_uri".into(),
            hint: "URIs embedded in response bodies will be derived from X-Forwarded-* headers"
                .into(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// Maps (`endpoints`, `source`) are combined; on key collisions the overlay
/// entry wins.
pub fn merge_configs(base: ServerConfig, overlay: ServerConfig) -> ServerConfig {
    let mut endpoints = base.endpoints;
    endpoints.extend(overlay.endpoints);
    let mut source = base.source;
    source.extend(overlay.source);
    ServerConfig {
        log_level: overlay.log_level.or(base.log_level),
        base_uri: overlay.base_uri.or(base.base_uri),
        max_pixels: overlay.max_pixels.or(base.max_pixels),
        max_scale: overlay.max_scale.or(base.max_scale),
        slash_substitute: overlay.slash_substitute.or(base.slash_substitute),
        endpoints,
        cache: overlay.cache,
        variant_cache: overlay.variant_cache,
        info_cache: overlay.info_cache,
        heap_info_cache: overlay.heap_info_cache,
        client_cache: overlay.client_cache,
        iiif: overlay.iiif,
        source,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let cfg = ServerConfig::default();
        let warnings = validate_config(&cfg).expect("default config should be valid");
        assert!(!warnings.is_empty(), "should have advisory warnings");
    }

    #[test]
    fn default_config_has_sensible_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
        assert!(cfg.heap_info_cache.enabled);
        assert!(!cfg.variant_cache.enabled);
        assert_eq!(cfg.endpoints.len(), 4);
        assert_eq!(cfg.endpoints["v2"].path, "iiif/2");
    }

    #[test]
    fn parse_valid_toml_string() {
        let toml = r#"
            base_uri = "https://images.example.org"
            max_pixels = 1000000

            [variant_cache]
            enabled = true
            backend = "/var/cache/variants"

            [source.demo]
            backend = "filesystem"
            properties = { root = "/data/images" }
        "#;
        let cfg = parse_toml(toml).unwrap();
        assert_eq!(cfg.base_uri.as_deref(), Some("https://images.example.org"));
        assert_eq!(cfg.max_pixels, Some(1_000_000));
        assert!(cfg.variant_cache.enabled);
        assert_eq!(cfg.source.len(), 1);
    }

    #[test]
    fn parse_invalid_toml_gives_parse_error() {
        let bad = "this is [not valid toml =";
        let err = parse_toml(bad).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn validation_catches_invalid_log_level() {
        let mut cfg = ServerConfig::default();
        cfg.log_level = Some("verbose".into());
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn validation_catches_empty_source_backend() {
        let mut cfg = ServerConfig::default();
        cfg.source.insert(
            "bad".into(),
            SourceConfig {
                backend: "  ".into(),
                properties: BTreeMap::new(),
            },
        );
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("backend must not be empty")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn validation_catches_zero_max_pixels() {
        let mut cfg = ServerConfig::default();
        cfg.max_pixels = Some(0);
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn large_max_age_produces_warning() {
        let mut cfg = ServerConfig::default();
        cfg.client_cache.max_age = 60 * 24 * 3_600;
        cfg.source.insert(
            "demo".into(),
            SourceConfig {
                backend: "filesystem".into(),
                properties: BTreeMap::new(),
            },
        );
        cfg.base_uri = Some("https://example.org".into());
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.iter().any(|w| matches!(w, ConfigWarning::LargeMaxAge { .. })));
    }

    #[test]
    fn no_sources_produces_warning() {
        let cfg = ServerConfig::default();
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.contains(&ConfigWarning::NoSourcesConfigured));
    }

    #[test]
    fn merge_overlay_overrides_base() {
        let mut base = ServerConfig::default();
        base.base_uri = Some("https://old.example.org".into());
        let mut overlay = ServerConfig::default();
        overlay.base_uri = Some("https://new.example.org".into());
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.base_uri.as_deref(), Some("https://new.example.org"));
    }

    #[test]
    fn merge_combines_source_maps() {
        let mut base = ServerConfig::default();
        base.source.insert(
            "a".into(),
            SourceConfig {
                backend: "filesystem".into(),
                properties: BTreeMap::new(),
            },
        );
        let mut overlay = ServerConfig::default();
        overlay.source.insert(
            "b".into(),
            SourceConfig {
                backend: "http".into(),
                properties: BTreeMap::new(),
            },
        );
        let merged = merge_configs(base, overlay);
        assert!(merged.source.contains_key("a"));
        assert!(merged.source.contains_key("b"));
    }

    #[test]
    fn merge_overlay_source_wins_on_collision() {
        let mut base = ServerConfig::default();
        base.source.insert(
            "demo".into(),
            SourceConfig {
                backend: "filesystem".into(),
                properties: BTreeMap::new(),
            },
        );
        let mut overlay = ServerConfig::default();
        overlay.source.insert(
            "demo".into(),
            SourceConfig {
                backend: "s3".into(),
                properties: BTreeMap::new(),
            },
        );
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.source["demo"].backend, "s3");
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = ServerConfig::default();
        let serialized = toml::to_string(&cfg).unwrap();
        let deserialized: ServerConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("isrv.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "base_uri = \"https://images.example.org\"\nlog_level = \"warn\"").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.base_uri.as_deref(), Some("https://images.example.org"));
        assert_eq!(cfg.log_level.as_deref(), Some("warn"));
    }

    #[test]
    fn load_missing_file_gives_file_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/isrv.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_none_returns_default() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::FileNotFound { path: "/foo".into() };
        assert!(e.to_string().contains("/foo"));
        let e = ConfigError::ParseError { reason: "bad toml".into() };
        assert!(e.to_string().contains("bad toml"));
    }

    #[test]
    fn config_warning_display() {
        let w = ConfigWarning::DeprecatedField {
            field: "old_field".into(),
            suggestion: Some("new_field".into()),
        };
        let s = w.to_string();
        assert!(s.contains("old_field"));
        assert!(s.contains("new_field"));
    }

    #[test]
    fn restrict_to_sizes_roundtrip() {
        let toml_str = r#"
            [iiif]
            restrict_to_sizes = true
        "#;
        let cfg = parse_toml(toml_str).unwrap();
        assert!(cfg.iiif.restrict_to_sizes);
    }
}
