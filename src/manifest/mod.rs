//! Static asset manifest.
//!
//! # Data Flow
//! ```text
//! Build time:
//!     static output dir
//!     → builder.rs (walk, hash, infer content type)
//!     → headers.rs (merge route overrides, protect ETag/Content-Length)
//!     → static-manifest.json + build-id
//!
//! Runtime:
//!     static-manifest.json
//!     → entry.rs (parse, validate)
//!     → Arc<StaticManifest>, read-only for the process lifetime
//! ```

pub mod builder;
pub mod entry;
pub mod headers;
pub mod route;

use std::path::PathBuf;

use thiserror::Error;

pub use builder::{build_manifest, ManifestBuilder};
pub use entry::{ManifestEntry, StaticManifest};
pub use headers::HeaderPolicy;

/// File name of the persisted manifest.
pub const MANIFEST_FILE: &str = "static-manifest.json";

/// File name of the build identifier written next to the manifest.
pub const BUILD_ID_FILE: &str = "build-id";

/// Errors building, persisting or loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("manifest entry {path} is missing required header {header}")]
    MissingHeader { path: String, header: &'static str },

    #[error("manifest entry {path} has an invalid header {name}")]
    InvalidHeader { path: String, name: String },

    #[error("manifest entry {path} repeats header {name}")]
    DuplicateHeader { path: String, name: String },

    #[error("invalid asset path: {0}")]
    InvalidPath(String),

    #[error("asset path {0:?} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
}
