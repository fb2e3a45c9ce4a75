//! Build-time manifest construction.
//!
//! # Responsibilities
//! - Walk the static output directory
//! - Compute content-derived headers per file
//! - Merge route header overrides under the [`HeaderPolicy`]
//! - Persist `static-manifest.json` and `build-id`
//!
//! # Design Decisions
//! - Any unreadable file aborts the build before anything is written
//! - Traversal is sorted so identical trees give identical artifacts

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::{BuildConfig, RouteHeaders};
use crate::manifest::entry::{write_atomic, ManifestEntry, StaticManifest};
use crate::manifest::headers::{
    content_headers, HeaderPolicy, CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL,
};
use crate::manifest::route::{request_path, route_path};
use crate::manifest::{ManifestError, BUILD_ID_FILE, MANIFEST_FILE};

/// Builds a [`StaticManifest`] from a directory of static output.
#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder {
    route_headers: RouteHeaders,
    policy: HeaderPolicy,
    immutable_dir: Option<String>,
}

impl ManifestBuilder {
    pub fn new(route_headers: RouteHeaders) -> Self {
        Self {
            route_headers,
            ..Self::default()
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        let mut policy = HeaderPolicy::default();
        if config.protect_content_type {
            policy = policy.protecting_content_type();
        }
        Self {
            route_headers: config.route_headers.clone(),
            policy,
            immutable_dir: config.immutable_dir.clone(),
        }
    }

    pub fn with_policy(mut self, policy: HeaderPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Files under `/<dir>/` get a long-lived immutable `Cache-Control`.
    pub fn with_immutable_dir(mut self, dir: impl Into<String>) -> Self {
        self.immutable_dir = Some(dir.into());
        self
    }

    /// Compute the manifest for `static_root` without writing anything.
    pub fn collect(&self, static_root: &Path) -> Result<StaticManifest, ManifestError> {
        let files = find_files(static_root)?;
        let mut entries = HashMap::with_capacity(files.len());

        for file in files {
            let body = std::fs::read(&file).map_err(|source| ManifestError::Io {
                path: file.clone(),
                source,
            })?;
            let relative = file
                .strip_prefix(static_root)
                .map_err(|_| ManifestError::InvalidPath(file.display().to_string()))?;
            let path = request_path(relative)?;
            let entry = self.entry_for(&path, &body);

            tracing::debug!(path = %path, bytes = body.len(), "Manifest entry");
            entries.insert(path, entry);
        }

        Ok(StaticManifest::new(entries))
    }

    /// Compute the manifest and persist it with its build id into `out_dir`.
    pub fn build(
        &self,
        static_root: &Path,
        out_dir: &Path,
    ) -> Result<StaticManifest, ManifestError> {
        let manifest = self.collect(static_root)?;
        let json = manifest.to_json()?;

        write_atomic(&out_dir.join(MANIFEST_FILE), &json)?;
        let build_id = hex::encode(Sha256::digest(&json));
        write_atomic(&out_dir.join(BUILD_ID_FILE), build_id.as_bytes())?;

        tracing::info!(
            files = manifest.len(),
            out_dir = %out_dir.display(),
            build_id = %build_id,
            "Static manifest written"
        );
        Ok(manifest)
    }

    fn entry_for(&self, path: &str, body: &[u8]) -> ManifestEntry {
        let mut headers = content_headers(path, body);

        if let Some(dir) = &self.immutable_dir {
            let prefix = format!("/{}/", dir.trim_matches('/'));
            if path.starts_with(&prefix) {
                headers.insert(CACHE_CONTROL.to_string(), IMMUTABLE_CACHE_CONTROL.to_string());
            }
        }

        if let Some(overrides) = self.route_headers.get(&route_path(path)) {
            self.policy.merge(&mut headers, overrides);
        }

        ManifestEntry::new(headers)
    }
}

/// Build with the default policy: `build(static_root, out_dir, rules)`.
pub fn build_manifest(
    static_root: &Path,
    out_dir: &Path,
    route_headers: &RouteHeaders,
) -> Result<StaticManifest, ManifestError> {
    ManifestBuilder::new(route_headers.clone()).build(static_root, out_dir)
}

/// Every regular file below `root`, sorted.
///
/// Symlinks are followed, but each real directory is walked once, so a
/// link back to an ancestor ends instead of recursing.
fn find_files(root: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let io_err = |source| ManifestError::Io {
            path: dir.clone(),
            source,
        };
        let real = std::fs::canonicalize(&dir).map_err(io_err)?;
        if !visited.insert(real) {
            tracing::warn!(path = %dir.display(), "Skipping already visited directory");
            continue;
        }
        for entry in std::fs::read_dir(&dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let metadata = std::fs::metadata(&path).map_err(|source| ManifestError::Io {
                path: path.clone(),
                source,
            })?;
            if metadata.is_dir() {
                pending.push(path);
            } else if metadata.is_file() {
                files.push(path);
            } else {
                tracing::warn!(path = %path.display(), "Skipping non-regular file");
            }
        }
    }

    files.sort_unstable();
    Ok(files)
}
