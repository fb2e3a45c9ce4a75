//! Dynamic render collaborator.
//!
//! The render engine is opaque to this crate: it takes a request and
//! eventually returns a response. The router never inspects or alters what
//! comes back.

pub mod upstream;

use std::future::Future;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;

pub use upstream::UpstreamRenderer;

/// Request-in, response-out page renderer.
///
/// Must be safe to call concurrently from many in-flight requests.
pub trait Renderer: Send + Sync {
    fn render(&self, request: Request<Body>) -> BoxFuture<'_, Response>;
}

/// Adapts an async closure into a [`Renderer`].
pub struct FnRenderer<F> {
    f: F,
}

impl<F> FnRenderer<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Renderer for FnRenderer<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn render(&self, request: Request<Body>) -> BoxFuture<'_, Response> {
        Box::pin((self.f)(request))
    }
}
