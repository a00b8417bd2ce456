//! Maps configured endpoint path prefixes to API versions.
//!
//! Deployments mount each IIIF version (and Deep Zoom) under a configurable
//! path prefix (`[endpoints]` in [`isrv_config::ServerConfig`]); the
//! Resource Router consults this registry to turn an incoming request path
//! into `(ApiVersion, remainder)` before handing off to the URI grammar for
//! that version.

use isrv_config::ServerConfig;
use isrv_core::ApiVersion;

/// A single mounted endpoint family.
#[derive(Debug, Clone)]
struct MountedEndpoint {
    prefix: String,
    version: ApiVersion,
    enabled: bool,
}

/// Registry of configured endpoint mounts, built once at startup from
/// [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    entries: Vec<MountedEndpoint>,
}

fn version_for_key(key: &str) -> Option<ApiVersion> {
    match key {
        "v1" => Some(ApiVersion::V1),
        "v2" => Some(ApiVersion::V2),
        "v3" => Some(ApiVersion::V3),
        "deepzoom" => Some(ApiVersion::DeepZoom),
        _ => None,
    }
}

impl EndpointRegistry {
    /// Build a registry from the `[endpoints]` table of a [`ServerConfig`].
    /// Unrecognized configuration keys are ignored.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut entries: Vec<MountedEndpoint> = config
            .endpoints
            .iter()
            .filter_map(|(key, endpoint)| {
                version_for_key(key).map(|version| MountedEndpoint {
                    prefix: endpoint.path.trim_matches('/').to_string(),
                    version,
                    enabled: endpoint.enabled,
                })
            })
            .collect();
        // Longest prefix first, so a mount with a multi-segment path is
        // matched before a shorter one that happens to be a string prefix of it.
        entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { entries }
    }

    /// Resolve the API version mounted at the leading segment(s) of `path`,
    /// returning the version and the remainder of the path after the
    /// matched prefix (with any leading `/` stripped). Disabled mounts are
    /// treated as absent.
    pub fn resolve<'a>(&self, path: &'a str) -> Option<(ApiVersion, &'a str)> {
        let trimmed = path.trim_start_matches('/');
        self.entries.iter().filter(|e| e.enabled).find_map(|entry| {
            let rest = trimmed.strip_prefix(entry.prefix.as_str())?;
            if rest.is_empty() || rest.starts_with('/') {
                Some((entry.version, rest.trim_start_matches('/')))
            } else {
                None
            }
        })
    }

    /// Whether `version` has an enabled mount.
    pub fn is_enabled(&self, version: ApiVersion) -> bool {
        self.entries.iter().any(|e| e.version == version && e.enabled)
    }

    /// The configured path prefix for `version`, if any mount (enabled or
    /// not) exists for it.
    pub fn path_for(&self, version: ApiVersion) -> Option<&str> {
        self.entries.iter().find(|e| e.version == version).map(|e| e.prefix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_configured_prefix() {
        let registry = EndpointRegistry::from_config(&ServerConfig::default());
        let (version, rest) = registry.resolve("/iiif/2/abc123/full/full/0/color.jpg").unwrap();
        assert_eq!(version, ApiVersion::V2);
        assert_eq!(rest, "abc123/full/full/0/color.jpg");
    }

    #[test]
    fn resolves_bare_prefix_with_no_remainder() {
        let registry = EndpointRegistry::from_config(&ServerConfig::default());
        let (version, rest) = registry.resolve("/dzi").unwrap();
        assert_eq!(version, ApiVersion::DeepZoom);
        assert_eq!(rest, "");
    }

    #[test]
    fn unknown_path_resolves_to_none() {
        let registry = EndpointRegistry::from_config(&ServerConfig::default());
        assert!(registry.resolve("/not-mounted/x").is_none());
    }

    #[test]
    fn disabled_endpoint_is_not_resolved() {
        let mut config = ServerConfig::default();
        config.endpoints.get_mut("v1").unwrap().enabled = false;
        let registry = EndpointRegistry::from_config(&config);
        assert!(registry.resolve("/iiif/1/abc/info.json").is_none());
        assert!(!registry.is_enabled(ApiVersion::V1));
    }

    #[test]
    fn path_for_returns_configured_prefix() {
        let registry = EndpointRegistry::from_config(&ServerConfig::default());
        assert_eq!(registry.path_for(ApiVersion::V3), Some("iiif/3"));
    }
}
