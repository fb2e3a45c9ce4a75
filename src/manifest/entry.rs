//! Manifest data model and its persisted form.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::manifest::headers::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, REQUIRED_HEADERS};
use crate::manifest::ManifestError;

/// Response metadata for one static asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Header name to value, sorted by name.
    pub headers: BTreeMap<String, String>,
}

impl ManifestEntry {
    pub fn new(headers: BTreeMap<String, String>) -> Self {
        Self { headers }
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn etag(&self) -> Option<&str> {
        self.header(ETAG)
    }

    pub fn content_length(&self) -> Option<&str> {
        self.header(CONTENT_LENGTH)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    /// Response headers for this asset.
    ///
    /// Entries are validated when the manifest is loaded, so every pair
    /// converts; anything that would not is left out rather than panicking.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        map
    }

    fn validate(&self, path: &str) -> Result<(), ManifestError> {
        for required in REQUIRED_HEADERS {
            if self.header(required).is_none() {
                return Err(ManifestError::MissingHeader {
                    path: path.to_string(),
                    header: required,
                });
            }
        }

        let mut seen = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let invalid = || ManifestError::InvalidHeader {
                path: path.to_string(),
                name: name.clone(),
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            if seen.insert(header_name, header_value).is_some() {
                return Err(ManifestError::DuplicateHeader {
                    path: path.to_string(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Request path to asset metadata. Frozen once built or loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticManifest {
    entries: HashMap<String, ManifestEntry>,
}

impl StaticManifest {
    pub fn new(entries: HashMap<String, ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Exact-match lookup by decoded request path.
    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter()
    }

    /// Serialized artifact, keys sorted so identical builds are byte-identical.
    pub fn to_json(&self) -> Result<Vec<u8>, ManifestError> {
        let sorted: BTreeMap<&String, &ManifestEntry> = self.entries.iter().collect();
        let mut json = serde_json::to_vec_pretty(&sorted).map_err(ManifestError::Serialize)?;
        json.push(b'\n');
        Ok(json)
    }

    /// Parse and validate a persisted artifact.
    pub fn from_json(bytes: &[u8], origin: &Path) -> Result<Self, ManifestError> {
        let manifest: StaticManifest =
            serde_json::from_slice(bytes).map_err(|source| ManifestError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read the artifact at `path`. Any failure here is a startup failure.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&bytes, path)
    }

    /// Write the artifact to `path` atomically.
    pub fn persist(&self, path: &Path) -> Result<(), ManifestError> {
        write_atomic(path, &self.to_json()?)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        for (path, entry) in &self.entries {
            if !path.starts_with('/') {
                return Err(ManifestError::InvalidPath(path.clone()));
            }
            entry.validate(path)?;
        }
        Ok(())
    }
}

/// Write via a temporary sibling file and rename, so readers never see a
/// partially written artifact.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ManifestError> {
    let io_err = |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::headers::content_headers;

    fn manifest_with(path: &str, body: &[u8]) -> StaticManifest {
        let mut entries = HashMap::new();
        entries.insert(path.to_string(), ManifestEntry::new(content_headers(path, body)));
        StaticManifest::new(entries)
    }

    #[test]
    fn test_persisted_shape() {
        let manifest = manifest_with("/index.html", b"page");
        let value: serde_json::Value =
            serde_json::from_slice(&manifest.to_json().unwrap()).unwrap();

        let headers = &value["/index.html"]["headers"];
        assert_eq!(headers["Content-Length"], "4");
        assert_eq!(headers["Content-Type"], "text/html; charset=utf-8");
        assert!(headers["ETag"].is_string());
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static-manifest.json");

        let manifest = manifest_with("/about/index.html", b"about page");
        manifest.persist(&path).unwrap();

        let loaded = StaticManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.get("/about/index.html").unwrap().content_length(), Some("10"));
        assert!(loaded.get("/about").is_none());
        assert!(loaded.get("/about/index.html/").is_none());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = StaticManifest::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }

    #[test]
    fn test_load_rejects_corrupt_json() {
        let err = StaticManifest::from_json(b"{\"/a\": ", Path::new("m.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn test_load_rejects_missing_required_header() {
        let json = br#"{"/a.txt": {"headers": {"Content-Length": "1", "Content-Type": "text/plain"}}}"#;
        let err = StaticManifest::from_json(json, Path::new("m.json")).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingHeader { header: "ETag", .. }
        ));
    }

    #[test]
    fn test_load_rejects_duplicate_header_names() {
        let json = br#"{"/a.txt": {"headers": {
            "Content-Length": "1", "Content-Type": "text/plain", "ETag": "\"x\"",
            "Cache-Control": "no-cache", "cache-control": "max-age=60"
        }}}"#;
        let err = StaticManifest::from_json(json, Path::new("m.json")).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateHeader { .. }));
    }

    #[test]
    fn test_load_rejects_relative_key() {
        let json = br#"{"a.txt": {"headers": {"Content-Length": "1", "Content-Type": "text/plain", "ETag": "\"x\""}}}"#;
        let err = StaticManifest::from_json(json, Path::new("m.json")).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidPath(_)));
    }

    #[test]
    fn test_header_map_copies_every_header_once() {
        let mut headers = content_headers("/index.html", b"page");
        headers.insert("Cache-Control".to_string(), "no-cache".to_string());
        let entry = ManifestEntry::new(headers);

        let map = entry.header_map();
        assert_eq!(map.len(), 4);
        assert_eq!(map.get("cache-control").unwrap(), "no-cache");
        assert_eq!(map.get("etag").unwrap(), entry.etag().unwrap());
    }
}
