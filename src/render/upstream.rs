//! Renderer that forwards to an SSR service over HTTP.

use std::str::FromStr;

use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::render::Renderer;

/// Forwards every request to a render service and relays its response.
#[derive(Clone)]
pub struct UpstreamRenderer {
    authority: Authority,
    client: Client<HttpConnector, Body>,
}

impl UpstreamRenderer {
    /// Create a renderer for the service at `address` (e.g. "127.0.0.1:3000").
    pub fn new(address: &str) -> Result<Self, axum::http::uri::InvalidUri> {
        let authority = Authority::from_str(address)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self { authority, client })
    }

    fn upstream_uri(&self, uri: &Uri) -> Uri {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
    }
}

impl Renderer for UpstreamRenderer {
    fn render(&self, request: Request<Body>) -> BoxFuture<'_, Response> {
        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            parts.uri = self.upstream_uri(&parts.uri);
            let path = parts.uri.path().to_string();

            match self.client.request(Request::from_parts(parts, body)).await {
                Ok(response) => {
                    let (parts, body) = response.into_parts();
                    Response::from_parts(parts, Body::new(body))
                }
                Err(e) => {
                    tracing::error!(
                        upstream = %self.authority,
                        path = %path,
                        error = %e,
                        "Render upstream request failed"
                    );
                    (StatusCode::BAD_GATEWAY, "Render upstream request failed").into_response()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_uri_keeps_path_and_query() {
        let renderer = UpstreamRenderer::new("127.0.0.1:3000").unwrap();
        let uri: Uri = "/blog/post?page=2".parse().unwrap();
        assert_eq!(
            renderer.upstream_uri(&uri).to_string(),
            "http://127.0.0.1:3000/blog/post?page=2"
        );
    }

    #[test]
    fn test_invalid_address() {
        assert!(UpstreamRenderer::new("not a host").is_err());
    }
}
