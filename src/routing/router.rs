//! Manifest lookup for incoming requests.
//!
//! # Responsibilities
//! - Percent-decode the request path
//! - Exact-match it against the frozen manifest
//! - Hand the result to the dispatch chain
//!
//! # Design Decisions
//! - Immutable after construction (shared via Arc, no locks)
//! - O(1) lookup via HashMap, no prefix matching, no slash normalization

use std::sync::Arc;

use axum::http::{header, Request};
use percent_encoding::percent_decode_str;
use thiserror::Error;

use crate::manifest::StaticManifest;
use crate::routing::dispatch::{classify, Dispatch, DispatchContext};

/// Errors classifying a request.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("request path {0:?} does not decode to UTF-8")]
    MalformedPath(String),
}

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route<'m> {
    /// Decoded request path.
    pub path: String,
    pub dispatch: Dispatch<'m>,
}

/// Read-only router over one [`StaticManifest`].
#[derive(Debug, Clone)]
pub struct Router {
    manifest: Arc<StaticManifest>,
    isr_enabled: bool,
}

impl Router {
    pub fn new(manifest: Arc<StaticManifest>, isr_enabled: bool) -> Self {
        Self {
            manifest,
            isr_enabled,
        }
    }

    pub fn manifest(&self) -> &StaticManifest {
        &self.manifest
    }

    pub fn isr_enabled(&self) -> bool {
        self.isr_enabled
    }

    /// Decide how `request` is served.
    pub fn route<B>(&self, request: &Request<B>) -> Result<Route<'_>, RoutingError> {
        let path = decode_path(request.uri().path())?;
        let ctx = DispatchContext {
            method: request.method(),
            if_none_match: request.headers().get(header::IF_NONE_MATCH),
            entry: self.manifest.get(&path),
            isr_enabled: self.isr_enabled,
        };
        let dispatch = classify(&ctx);
        Ok(Route { path, dispatch })
    }
}

/// Percent-decode a URI path.
pub fn decode_path(raw: &str) -> Result<String, RoutingError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| RoutingError::MalformedPath(raw.to_string()))
}
