//! Request paths and route paths.
//!
//! A file is served at its literal location (`/about/index.html`), but route
//! header rules address it by the page route it renders (`/about`).

use std::path::{Component, Path};

use crate::manifest::ManifestError;

const INDEX_FILE: &str = "index.html";

/// URL-absolute request path for a file relative to the static root.
pub fn request_path(relative: &Path) -> Result<String, ManifestError> {
    let mut path = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment
                    .to_str()
                    .ok_or_else(|| ManifestError::NonUtf8Path(relative.to_path_buf()))?;
                path.push('/');
                path.push_str(segment);
            }
            Component::CurDir => {}
            _ => return Err(ManifestError::InvalidPath(relative.display().to_string())),
        }
    }
    if path.is_empty() {
        return Err(ManifestError::InvalidPath(relative.display().to_string()));
    }
    Ok(path)
}

/// Route path used to look up header rules for a request path.
///
/// `/index.html` maps to `/`, `/about/index.html` to `/about`; every other
/// path is its own route.
pub fn route_path(request_path: &str) -> String {
    let Some(dir) = request_path.strip_suffix(INDEX_FILE) else {
        return request_path.to_string();
    };
    if !dir.ends_with('/') {
        // e.g. `/notindex.html`
        return request_path.to_string();
    }
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
