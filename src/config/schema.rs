//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server
//! and for the manifest build step. All types derive Serde traits for
//! deserialization from config files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Header overrides keyed by route path (`/`, `/about`, ...).
pub type RouteHeaders = BTreeMap<String, BTreeMap<String, String>>;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (host, port).
    pub listener: ListenerConfig,

    /// Locations of the build output.
    pub paths: PathsConfig,

    /// Dynamic render service.
    pub render: RenderConfig,

    /// Regenerate-on-demand cache. Absent means disabled.
    pub isr: Option<IsrConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Manifest build settings.
    pub build: BuildConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host name or address to bind.
    pub host: String,

    /// TCP port.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4321,
        }
    }
}

impl ListenerConfig {
    /// Resolve the bind address, letting `HOST` and `PORT` override the file.
    pub fn resolve(&self) -> String {
        let host = std::env::var("HOST").unwrap_or_else(|_| self.host.clone());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(self.port);
        format!("{}:{}", host, port)
    }
}

/// Build output locations used at runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the static assets named by the manifest.
    pub client_dir: PathBuf,

    /// Directory holding `static-manifest.json` and `build-id`.
    pub server_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            client_dir: PathBuf::from("dist/client"),
            server_dir: PathBuf::from("dist/server"),
        }
    }
}

/// Upstream render service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Render service address (e.g., "127.0.0.1:3000").
    pub upstream: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            upstream: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Regenerate-on-demand cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IsrConfig {
    /// Upper bound on cached response bytes held in memory.
    pub max_byte_size: u64,

    /// Persistent cache location. Relative paths are resolved against
    /// `paths.server_dir`.
    pub cache_dir: PathBuf,

    /// Load the persisted generation into memory at startup.
    pub pre_fill_memory_cache: bool,
}

impl Default for IsrConfig {
    fn default() -> Self {
        Self {
            max_byte_size: 64 * 1024 * 1024,
            cache_dir: PathBuf::from("isr-cache"),
            pre_fill_memory_cache: false,
        }
    }
}

impl IsrConfig {
    /// Cache directory resolved against the server output directory.
    pub fn resolve_cache_dir(&self, server_dir: &Path) -> PathBuf {
        if self.cache_dir.is_absolute() {
            self.cache_dir.clone()
        } else {
            server_dir.join(&self.cache_dir)
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Manifest build configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory of built static output to scan.
    pub static_root: PathBuf,

    /// Directory the manifest and build id are written to.
    pub out_dir: PathBuf,

    /// Subdirectory of fingerprinted assets served as immutable.
    pub immutable_dir: Option<String>,

    /// Also refuse route overrides of `Content-Type`.
    pub protect_content_type: bool,

    /// Per-route header overrides.
    pub route_headers: RouteHeaders,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            static_root: PathBuf::from("dist/client"),
            out_dir: PathBuf::from("dist/server"),
            immutable_dir: Some("_astro".to_string()),
            protect_content_type: false,
            route_headers: RouteHeaders::new(),
        }
    }
}
