//! Content-derived headers and the route override merge policy.
//!
//! `ETag` and `Content-Length` describe the bytes on disk. They are computed
//! here and nothing else is allowed to replace them; every other header is
//! fair game for a route override.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

pub const ETAG: &str = "ETag";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CACHE_CONTROL: &str = "Cache-Control";

/// Headers every manifest entry must carry.
pub const REQUIRED_HEADERS: [&str; 3] = [CONTENT_LENGTH, ETAG, CONTENT_TYPE];

/// `Cache-Control` for fingerprinted bundler output.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Strong validator for `body`: the quoted hex SHA-256 digest.
pub fn etag_of(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(body)))
}

/// MIME type for a request path, from its extension.
///
/// Textual types are labelled UTF-8; unknown extensions fall back to
/// `application/octet-stream`.
pub fn content_type_of(path: &str) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

/// The three headers derived from an asset's bytes.
pub fn content_headers(path: &str, body: &[u8]) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert(CONTENT_LENGTH.to_string(), body.len().to_string());
    headers.insert(ETAG.to_string(), etag_of(body));
    headers.insert(CONTENT_TYPE.to_string(), content_type_of(path));
    headers
}

/// Which header names a route override may not touch.
///
/// `ETag` and `Content-Length` are always protected. `Content-Type` can be
/// added with [`HeaderPolicy::protecting_content_type`].
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    protected: Vec<&'static str>,
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self {
            protected: vec![ETAG, CONTENT_LENGTH],
        }
    }
}

impl HeaderPolicy {
    /// Also refuse overrides of `Content-Type`.
    pub fn protecting_content_type(mut self) -> Self {
        if !self.protected.contains(&CONTENT_TYPE) {
            self.protected.push(CONTENT_TYPE);
        }
        self
    }

    /// Case-insensitive check against the protected set.
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.iter().any(|p| p.eq_ignore_ascii_case(name))
    }

    /// Apply `overrides` onto `headers`.
    ///
    /// Protected names are skipped. Any other name replaces an existing
    /// header of the same name regardless of case, so each name is present
    /// once, spelled the way the override spells it.
    pub fn merge(
        &self,
        headers: &mut BTreeMap<String, String>,
        overrides: &BTreeMap<String, String>,
    ) {
        for (name, value) in overrides {
            if self.is_protected(name) {
                tracing::debug!(header = %name, "Ignoring override of protected header");
                continue;
            }
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), value.clone());
        }
    }
}
