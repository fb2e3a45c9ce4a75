//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the static manifest (once, before anything is served)
//! - Read the build id and open the ISR cache when enabled
//! - Assemble the HTTP server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::ServerConfig;
use crate::http::HttpServer;
use crate::isr::{IsrCache, IsrError, IsrHandler, IsrOptions};
use crate::manifest::{ManifestError, StaticManifest, BUILD_ID_FILE, MANIFEST_FILE};
use crate::render::{Renderer, UpstreamRenderer};

/// Reasons the server refuses to start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load static manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("failed to read build id {path:?}: {source}")]
    BuildId {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid render upstream: {0}")]
    Upstream(#[from] axum::http::uri::InvalidUri),

    #[error("failed to open ISR cache: {0}")]
    Isr(#[from] IsrError),
}

/// Build the server described by `config`, rendering via the upstream service.
pub async fn prepare(config: &ServerConfig) -> Result<HttpServer, StartupError> {
    let renderer: Arc<dyn Renderer> = Arc::new(UpstreamRenderer::new(&config.render.upstream)?);
    prepare_with_renderer(config, renderer).await
}

/// Build the server described by `config` around a given renderer.
pub async fn prepare_with_renderer(
    config: &ServerConfig,
    renderer: Arc<dyn Renderer>,
) -> Result<HttpServer, StartupError> {
    let server_dir = &config.paths.server_dir;
    let manifest_path = server_dir.join(MANIFEST_FILE);
    let manifest = Arc::new(StaticManifest::load(&manifest_path)?);
    tracing::info!(
        path = %manifest_path.display(),
        assets = manifest.len(),
        "Static manifest loaded"
    );

    let isr: Option<Arc<dyn IsrHandler>> = match &config.isr {
        Some(isr_config) => {
            let build_id = read_build_id(server_dir)?;
            let options = IsrOptions {
                max_byte_size: isr_config.max_byte_size,
                cache_dir: isr_config.resolve_cache_dir(server_dir),
                build_id,
                pre_fill_memory_cache: isr_config.pre_fill_memory_cache,
            };
            Some(Arc::new(IsrCache::open(options, renderer.clone()).await?))
        }
        None => {
            tracing::info!("ISR disabled, dynamic routes render on every request");
            None
        }
    };

    Ok(HttpServer::new(
        manifest,
        config.paths.client_dir.clone(),
        renderer,
        isr,
    ))
}

/// Trimmed contents of `<server_dir>/build-id`.
pub fn read_build_id(server_dir: &Path) -> Result<String, StartupError> {
    let path = server_dir.join(BUILD_ID_FILE);
    std::fs::read_to_string(&path)
        .map(|id| id.trim().to_string())
        .map_err(|source| StartupError::BuildId { path, source })
}
