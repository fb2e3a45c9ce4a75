//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (request ID, tracing)
//! - Dispatch each request to the static, not-modified, render or ISR path
//! - Serve until the shutdown signal, then drain the ISR cache

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::request::{request_id_of, MakeRequestUuidV4};
use crate::http::response;
use crate::isr::IsrHandler;
use crate::lifecycle::shutdown::drain;
use crate::manifest::StaticManifest;
use crate::observability::metrics;
use crate::render::Renderer;
use crate::routing::{Dispatch, Route, Router as ManifestRouter};

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ManifestRouter>,
    pub client_dir: Arc<PathBuf>,
    pub renderer: Arc<dyn Renderer>,
    pub isr: Option<Arc<dyn IsrHandler>>,
}

/// HTTP server for the hybrid site.
pub struct HttpServer {
    router: Router,
    isr: Option<Arc<dyn IsrHandler>>,
}

impl HttpServer {
    /// Create a server over a loaded manifest and its collaborators.
    pub fn new(
        manifest: Arc<StaticManifest>,
        client_dir: PathBuf,
        renderer: Arc<dyn Renderer>,
        isr: Option<Arc<dyn IsrHandler>>,
    ) -> Self {
        let state = AppState {
            router: Arc::new(ManifestRouter::new(manifest, isr.is_some())),
            client_dir: Arc::new(client_dir),
            renderer,
            isr: isr.clone(),
        };

        Self {
            router: Self::build_router(state),
            isr,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(serve_request)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id_of(request),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// The Axum router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain the ISR cache.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        drain(self.isr.as_deref()).await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: route, then serve by dispatch.
async fn serve_request(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();

    let Route { path, dispatch } = match state.router.route(&request) {
        Ok(route) => route,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id_of(&request),
                error = %e,
                "Rejecting request"
            );
            metrics::record_request("rejected", 400, start);
            return response::bad_request("Malformed request path");
        }
    };

    tracing::debug!(
        request_id = %request_id_of(&request),
        method = %request.method(),
        path = %path,
        dispatch = dispatch.label(),
        "Dispatching request"
    );

    let label = dispatch.label();
    let response = match dispatch {
        Dispatch::NotModified(_) => response::not_modified(),
        Dispatch::Static(entry) => response::static_file(&state.client_dir, &path, entry).await,
        Dispatch::Render => state.renderer.render(request).await,
        Dispatch::Regenerate => match &state.isr {
            Some(isr) => isr.handle(request, path).await,
            None => state.renderer.render(request).await,
        },
    };

    metrics::record_request(label, response.status().as_u16(), start);
    response
}
