//! Responses for manifest hits.

use std::path::Path;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::manifest::ManifestEntry;

/// 304 with no body.
pub fn not_modified() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    response
}

/// 200 streaming the asset with every manifest header.
///
/// An open failure becomes a 500; it is not retried here.
pub async fn static_file(client_dir: &Path, path: &str, entry: &ManifestEntry) -> Response {
    let file = client_dir.join(path.trim_start_matches('/'));
    match tokio::fs::File::open(&file).await {
        Ok(handle) => {
            let mut response = Response::new(Body::from_stream(ReaderStream::new(handle)));
            *response.headers_mut() = entry.header_map();
            response
        }
        Err(e) => {
            tracing::error!(
                path = %path,
                file = %file.display(),
                error = %e,
                "Failed to open static asset"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read static asset").into_response()
        }
    }
}

/// 400 for a path that cannot be decoded.
pub fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}
