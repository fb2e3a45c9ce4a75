//! On-disk cache generation.
//!
//! Layout: `<cache_dir>/<build_id>/<sha256(path)>.json` holds status,
//! headers and the cache key; the body sits next to it in `.body`.
//! The body is written before the metadata, so a page without its `.json`
//! is simply absent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::isr::IsrError;

/// A rendered page as kept in memory and on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    /// Decoded path, plus `?query` when the request had one.
    pub path: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedPage {
    /// Approximate memory footprint used for the byte budget.
    pub fn size(&self) -> u64 {
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len()).sum();
        (self.path.len() + headers + self.body.len()) as u64
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PageMeta {
    path: String,
    status: u16,
    headers: Vec<(String, String)>,
}

/// Directory holding one build's cached pages.
#[derive(Debug, Clone)]
pub struct GenerationStore {
    dir: PathBuf,
}

impl GenerationStore {
    /// Open the generation for `build_id`, removing any other generation.
    pub async fn open(cache_dir: &Path, build_id: &str) -> Result<Self, IsrError> {
        if build_id.is_empty()
            || build_id == "."
            || build_id == ".."
            || build_id.contains(['/', '\\'])
        {
            return Err(IsrError::InvalidBuildId(build_id.to_string()));
        }

        let dir = cache_dir.join(build_id);
        tokio::fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;

        let mut entries = tokio::fs::read_dir(cache_dir).await.map_err(io_err(cache_dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err(cache_dir))? {
            let path = entry.path();
            if path == dir || !entry.file_type().await.map_err(io_err(&path))?.is_dir() {
                continue;
            }
            tracing::info!(generation = %path.display(), "Removing stale cache generation");
            tokio::fs::remove_dir_all(&path).await.map_err(io_err(&path))?;
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load one page, `None` if it was never persisted.
    pub async fn load(&self, path: &str) -> Result<Option<CachedPage>, IsrError> {
        let stem = file_stem(path);
        self.load_stem(&stem).await
    }

    /// Load every persisted page of this generation.
    pub async fn load_all(&self) -> Result<Vec<CachedPage>, IsrError> {
        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err(&self.dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&self.dir))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(page) = self.load_stem(stem).await? {
                pages.push(page);
            }
        }
        Ok(pages)
    }

    /// Persist `page`, replacing any previous copy.
    pub async fn save(&self, page: &CachedPage) -> Result<(), IsrError> {
        let stem = file_stem(&page.path);
        let meta = PageMeta {
            path: page.path.clone(),
            status: page.status,
            headers: page.headers.clone(),
        };
        let meta_path = self.dir.join(format!("{stem}.json"));
        let meta_json = serde_json::to_vec(&meta).map_err(|source| IsrError::Corrupt {
            path: meta_path.clone(),
            source,
        })?;

        write_replace(&self.dir.join(format!("{stem}.body")), &page.body).await?;
        write_replace(&meta_path, &meta_json).await?;
        Ok(())
    }

    async fn load_stem(&self, stem: &str) -> Result<Option<CachedPage>, IsrError> {
        let meta_path = self.dir.join(format!("{stem}.json"));
        let meta_bytes = match tokio::fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&meta_path)(e)),
        };
        let meta: PageMeta =
            serde_json::from_slice(&meta_bytes).map_err(|source| IsrError::Corrupt {
                path: meta_path.clone(),
                source,
            })?;

        let body_path = self.dir.join(format!("{stem}.body"));
        let body = match tokio::fs::read(&body_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&body_path)(e)),
        };

        Ok(Some(CachedPage {
            path: meta.path,
            status: meta.status,
            headers: meta.headers,
            body: Bytes::from(body),
        }))
    }
}

fn file_stem(path: &str) -> String {
    hex::encode(Sha256::digest(path.as_bytes()))
}

async fn write_replace(path: &Path, contents: &[u8]) -> Result<(), IsrError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await.map_err(io_err(&tmp))?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err(path))?;
    Ok(())
}

fn io_err(path: &Path) -> impl Fn(std::io::Error) -> IsrError + '_ {
    move |source| IsrError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(path: &str, body: &str) -> CachedPage {
        CachedPage {
            path: path.to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: Bytes::from(body.to_string()),
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = GenerationStore::open(dir.path(), "build-1").await.unwrap();

        assert!(store.load("/blog/a").await.unwrap().is_none());

        let original = page("/blog/a", "<h1>a</h1>");
        store.save(&original).await.unwrap();
        assert_eq!(store.load("/blog/a").await.unwrap(), Some(original.clone()));

        let all = store.load_all().await.unwrap();
        assert_eq!(all, vec![original]);
    }

    #[tokio::test]
    async fn test_open_drops_other_generations() {
        let dir = tempfile::tempdir().unwrap();
        let old = GenerationStore::open(dir.path(), "old").await.unwrap();
        old.save(&page("/x", "old")).await.unwrap();

        let new = GenerationStore::open(dir.path(), "new").await.unwrap();
        assert!(!dir.path().join("old").exists());
        assert!(new.load("/x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_build_ids() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["", "..", "a/b"] {
            assert!(matches!(
                GenerationStore::open(dir.path(), id).await,
                Err(IsrError::InvalidBuildId(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = GenerationStore::open(dir.path(), "b").await.unwrap();
        let stem = file_stem("/broken");
        std::fs::write(store.dir().join(format!("{stem}.json")), b"{not json").unwrap();

        assert!(matches!(
            store.load("/broken").await,
            Err(IsrError::Corrupt { .. })
        ));
    }
}
