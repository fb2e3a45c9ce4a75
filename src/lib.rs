//! Hybrid static/dynamic site serving.
//!
//! A build step turns a directory of static output into a frozen manifest
//! of per-asset headers; the server answers from that manifest first and
//! falls back to on-demand rendering, optionally through a
//! regenerate-on-demand (ISR) cache.

// Build time
pub mod manifest;

// Request path
pub mod http;
pub mod isr;
pub mod render;
pub mod routing;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use manifest::{build_manifest, ManifestBuilder, ManifestEntry, StaticManifest};
