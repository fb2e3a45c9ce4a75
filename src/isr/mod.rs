//! Regenerate-on-demand cache.
//!
//! # Data Flow
//! ```text
//! GET miss on the manifest
//!     → IsrHandler::handle(request, path)
//!     → memory (cache.rs) → disk generation (store.rs) → Renderer
//!     → cacheable responses kept in memory, marked dirty
//!
//! Shutdown:
//!     IsrHandler::shutdown() → dirty pages written to the generation dir
//! ```
//!
//! # Design Decisions
//! - One disk generation per build id; other generations are dropped on open
//! - Memory bounded by bytes, oldest insert evicted first
//! - Concurrent misses on one path render once

pub mod cache;
pub mod store;

use std::path::PathBuf;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;
use thiserror::Error;

pub use cache::{IsrCache, IsrOptions};
pub use store::{CachedPage, GenerationStore};

/// Response header telling whether the page came from the cache.
pub const X_ISR_CACHE: &str = "x-isr-cache";

/// What the router needs from a regenerate-on-demand cache.
///
/// Must be safe to call concurrently from many in-flight requests.
pub trait IsrHandler: Send + Sync {
    /// Serve `request` for the decoded `path`, rendering on a miss.
    fn handle(&self, request: Request<Body>, path: String) -> BoxFuture<'_, Response>;

    /// Persist anything not yet written. Resolves once it is safe to exit.
    fn shutdown(&self) -> BoxFuture<'_, ()>;
}

/// Errors from the cache's persistent store.
#[derive(Debug, Error)]
pub enum IsrError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache entry {path:?}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid build id {0:?}")]
    InvalidBuildId(String),
}
