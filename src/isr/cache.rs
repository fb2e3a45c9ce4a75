//! In-memory page cache with a byte budget and single-flight rendering.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use futures_util::future::BoxFuture;

use crate::isr::store::{CachedPage, GenerationStore};
use crate::isr::{IsrError, IsrHandler, X_ISR_CACHE};
use crate::observability::metrics;
use crate::render::Renderer;

/// Construction parameters for [`IsrCache`].
#[derive(Debug, Clone)]
pub struct IsrOptions {
    /// Upper bound on bytes held in memory.
    pub max_byte_size: u64,
    /// Root of the persistent cache.
    pub cache_dir: PathBuf,
    /// Current build; older generations are discarded.
    pub build_id: String,
    /// Load the persisted generation into memory on open.
    pub pre_fill_memory_cache: bool,
}

#[derive(Default)]
struct MemoryState {
    pages: HashMap<String, Arc<CachedPage>>,
    order: VecDeque<String>,
    bytes: u64,
    dirty: HashSet<String>,
}

impl MemoryState {
    /// Insert `page`, returning dirty pages pushed out to make room.
    /// A page larger than `max_bytes` is not kept.
    fn insert(
        &mut self,
        page: Arc<CachedPage>,
        dirty: bool,
        max_bytes: u64,
    ) -> Vec<Arc<CachedPage>> {
        let size = page.size();
        if size > max_bytes {
            return Vec::new();
        }

        self.remove(&page.path);

        let mut evicted = Vec::new();
        while self.bytes + size > max_bytes {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            let was_dirty = self.dirty.remove(&oldest);
            if let Some(old) = self.pages.remove(&oldest) {
                self.bytes -= old.size();
                if was_dirty {
                    evicted.push(old);
                }
            }
        }

        if dirty {
            self.dirty.insert(page.path.clone());
        }
        self.bytes += size;
        self.order.push_back(page.path.clone());
        self.pages.insert(page.path.clone(), page);
        evicted
    }

    fn remove(&mut self, path: &str) {
        if let Some(old) = self.pages.remove(path) {
            self.bytes -= old.size();
            self.order.retain(|p| p != path);
            self.dirty.remove(path);
        }
    }

    fn take_dirty(&mut self) -> Vec<Arc<CachedPage>> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|path| self.pages.get(&path).cloned())
            .collect()
    }
}

/// Regenerate-on-demand cache in front of a [`Renderer`].
pub struct IsrCache {
    renderer: Arc<dyn Renderer>,
    store: GenerationStore,
    max_byte_size: u64,
    memory: Mutex<MemoryState>,
    inflight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl IsrCache {
    /// Open the cache for the current build.
    pub async fn open(options: IsrOptions, renderer: Arc<dyn Renderer>) -> Result<Self, IsrError> {
        let store = GenerationStore::open(&options.cache_dir, &options.build_id).await?;
        let cache = Self {
            renderer,
            store,
            max_byte_size: options.max_byte_size,
            memory: Mutex::new(MemoryState::default()),
            inflight: DashMap::new(),
        };

        if options.pre_fill_memory_cache {
            let pages = cache.store.load_all().await?;
            let count = pages.len();
            for page in pages {
                cache.insert(Arc::new(page), false);
            }
            tracing::info!(pages = count, "Pre-filled ISR memory cache");
        }

        tracing::info!(
            generation = %cache.store.dir().display(),
            max_byte_size = cache.max_byte_size,
            "ISR cache ready"
        );
        Ok(cache)
    }

    /// Number of pages currently held in memory.
    pub fn len(&self) -> usize {
        self.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held in memory.
    pub fn bytes(&self) -> u64 {
        self.lock().bytes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another request panicked mid-update;
        // the bookkeeping is still consistent enough to keep serving.
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, path: &str) -> Option<Arc<CachedPage>> {
        self.lock().pages.get(path).cloned()
    }

    /// Returns dirty pages evicted to make room.
    fn insert(&self, page: Arc<CachedPage>, dirty: bool) -> Vec<Arc<CachedPage>> {
        let mut memory = self.lock();
        let evicted = memory.insert(page, dirty, self.max_byte_size);
        metrics::record_isr_bytes(memory.bytes);
        evicted
    }

    async fn persist(&self, pages: Vec<Arc<CachedPage>>) {
        for page in pages {
            if let Err(e) = self.store.save(&page).await {
                tracing::error!(path = %page.path, error = %e, "Failed to persist cached page");
            }
        }
    }

    async fn serve(&self, request: Request<Body>, path: String) -> Response {
        let key = cache_key(&path, request.uri().query());
        if let Some(page) = self.lookup(&key) {
            metrics::record_isr("hit");
            return page_response(&page, "HIT");
        }

        let flight = Flight::join(&self.inflight, key);
        let _guard = flight.lock.lock().await;
        let response = self.fill(request, &flight.key).await;
        response
    }

    /// Called with the key's single-flight lock held.
    async fn fill(&self, request: Request<Body>, key: &str) -> Response {
        if let Some(page) = self.lookup(key) {
            metrics::record_isr("hit");
            return page_response(&page, "HIT");
        }

        match self.store.load(key).await {
            Ok(Some(page)) => {
                let page = Arc::new(page);
                let evicted = self.insert(page.clone(), false);
                self.persist(evicted).await;
                metrics::record_isr("disk");
                return page_response(&page, "HIT");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ignoring unreadable cached page");
            }
        }

        let response = self.renderer.render(request).await;
        if !is_cacheable(&response) {
            metrics::record_isr("bypass");
            return response;
        }

        let (parts, body) = response.into_parts();
        let body = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to read rendered body");
                return (StatusCode::BAD_GATEWAY, "Render response failed").into_response();
            }
        };

        let Some(page) = to_page(key, parts.status, &parts.headers, body.clone()) else {
            metrics::record_isr("bypass");
            return Response::from_parts(parts, Body::from(body));
        };
        let page = Arc::new(page);
        let evicted = self.insert(page.clone(), true);
        self.persist(evicted).await;

        metrics::record_isr("miss");
        tracing::debug!(key = %key, bytes = page.body.len(), "Cached rendered page");
        page_response(&page, "MISS")
    }

    async fn flush(&self) {
        let dirty = self.lock().take_dirty();
        let count = dirty.len();
        self.persist(dirty).await;
        tracing::info!(pages = count, "ISR cache flushed");
    }
}

/// One request's membership in the single-flight group for a key.
///
/// Leaves the group on drop, including when the request future is
/// cancelled mid-render.
struct Flight<'a> {
    inflight: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> Flight<'a> {
    fn join(inflight: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>, key: String) -> Self {
        let lock = inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        Self {
            inflight,
            key,
            lock,
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        // Ours plus the map's: nobody else is queued on this key.
        self.inflight
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

/// Pages are cached per decoded path and raw query string.
fn cache_key(path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}

impl IsrHandler for IsrCache {
    fn handle(&self, request: Request<Body>, path: String) -> BoxFuture<'_, Response> {
        Box::pin(self.serve(request, path))
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.flush())
    }
}

/// Only plain 200s that the origin allows shared caches to keep.
/// Anything setting a cookie belongs to one visitor.
fn is_cacheable(response: &Response) -> bool {
    if response.status() != StatusCode::OK
        || response.headers().contains_key(header::SET_COOKIE)
    {
        return false;
    }
    let Some(cache_control) = response.headers().get(header::CACHE_CONTROL) else {
        return true;
    };
    let Ok(cache_control) = cache_control.to_str() else {
        return false;
    };
    !cache_control.split(',').any(|directive| {
        let directive = directive.trim();
        directive.eq_ignore_ascii_case("no-store") || directive.eq_ignore_ascii_case("private")
    })
}

fn to_page(
    key: &str,
    status: StatusCode,
    headers: &axum::http::HeaderMap,
    body: Bytes,
) -> Option<CachedPage> {
    let mut stored = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        if name == header::CONNECTION || name == header::TRANSFER_ENCODING {
            continue;
        }
        stored.push((name.as_str().to_string(), value.to_str().ok()?.to_string()));
    }
    Some(CachedPage {
        path: key.to_string(),
        status: status.as_u16(),
        headers: stored,
        body,
    })
}

fn page_response(page: &CachedPage, result: &'static str) -> Response {
    let mut response = Response::new(Body::from(page.body.clone()));
    *response.status_mut() = StatusCode::from_u16(page.status).unwrap_or(StatusCode::OK);

    let headers = response.headers_mut();
    for (name, value) in &page.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(X_ISR_CACHE, HeaderValue::from_static(result));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FnRenderer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_renderer(calls: Arc<AtomicUsize>) -> Arc<dyn Renderer> {
        Arc::new(FnRenderer::new(move |request: Request<Body>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                let path = request.uri().path().to_string();
                match path.as_str() {
                    "/private" => (
                        [(header::CACHE_CONTROL, "private, max-age=0")],
                        "secret",
                    )
                        .into_response(),
                    "/missing" => (StatusCode::NOT_FOUND, "nope").into_response(),
                    _ => format!("rendered {path}").into_response(),
                }
            }
        }))
    }

    fn options(dir: &std::path::Path, max_byte_size: u64, pre_fill: bool) -> IsrOptions {
        IsrOptions {
            max_byte_size,
            cache_dir: dir.to_path_buf(),
            build_id: "build".to_string(),
            pre_fill_memory_cache: pre_fill,
        }
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn cache_header(response: &Response) -> Option<&str> {
        response.headers().get(X_ISR_CACHE).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = IsrCache::open(
            options(dir.path(), 1 << 20, false),
            counting_renderer(calls.clone()),
        )
        .await
        .unwrap();

        let first = cache.handle(get("/blog/a"), "/blog/a".to_string()).await;
        assert_eq!(cache_header(&first), Some("MISS"));
        assert_eq!(body_of(first).await, "rendered /blog/a");

        let second = cache.handle(get("/blog/a"), "/blog/a".to_string()).await;
        assert_eq!(cache_header(&second), Some("HIT"));
        assert_eq!(body_of(second).await, "rendered /blog/a");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_render_once() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(
            IsrCache::open(options(dir.path(), 1 << 20, false), counting_renderer(calls.clone()))
                .await
                .unwrap(),
        );

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let response = cache.handle(get("/hot"), "/hot".to_string()).await;
                body_of(response).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), "rendered /hot");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_uncacheable_responses_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = IsrCache::open(
            options(dir.path(), 1 << 20, false),
            counting_renderer(calls.clone()),
        )
        .await
        .unwrap();

        for path in ["/private", "/missing"] {
            let first = cache.handle(get(path), path.to_string()).await;
            assert!(cache_header(&first).is_none());
            cache.handle(get(path), path.to_string()).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_byte_budget_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = CachedPage {
            path: "/p1".to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
            body: Bytes::from("rendered /p1"),
        };
        // Room for two pages, not three.
        let budget = probe.size() * 2 + 1;
        let cache = IsrCache::open(
            options(dir.path(), budget, false),
            counting_renderer(calls.clone()),
        )
        .await
        .unwrap();

        for path in ["/p1", "/p2", "/p3"] {
            cache.handle(get(path), path.to_string()).await;
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.bytes() <= budget);
        assert!(cache.lookup("/p1").is_none());

        // Evicted dirty page was persisted, so it comes back without a render.
        let again = cache.handle(get("/p1"), "/p1".to_string()).await;
        assert_eq!(cache_header(&again), Some("HIT"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_prefill_restores() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let cache = IsrCache::open(
                options(dir.path(), 1 << 20, false),
                counting_renderer(calls.clone()),
            )
            .await
            .unwrap();
            cache.handle(get("/a"), "/a".to_string()).await;
            cache.handle(get("/b"), "/b".to_string()).await;
            cache.shutdown().await;
        }

        let cache = IsrCache::open(
            options(dir.path(), 1 << 20, true),
            counting_renderer(calls.clone()),
        )
        .await
        .unwrap();
        assert_eq!(cache.len(), 2);

        let response = cache.handle(get("/a"), "/a".to_string()).await;
        assert_eq!(body_of(response).await, "rendered /a");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_new_build_starts_cold() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let cache = IsrCache::open(
                options(dir.path(), 1 << 20, false),
                counting_renderer(calls.clone()),
            )
            .await
            .unwrap();
            cache.handle(get("/a"), "/a".to_string()).await;
            cache.shutdown().await;
        }

        let mut next = options(dir.path(), 1 << 20, true);
        next.build_id = "next-build".to_string();
        let cache = IsrCache::open(next, counting_renderer(calls.clone())).await.unwrap();
        assert!(cache.is_empty());

        let response = cache.handle(get("/a"), "/a".to_string()).await;
        assert_eq!(cache_header(&response), Some("MISS"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    fn query_renderer(calls: Arc<AtomicUsize>) -> Arc<dyn Renderer> {
        Arc::new(FnRenderer::new(move |request: Request<Body>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let query = request.uri().query().unwrap_or_default().to_string();
                if request.uri().path() == "/account" {
                    return (
                        [(header::SET_COOKIE, format!("session={query}"))],
                        format!("welcome {query}"),
                    )
                        .into_response();
                }
                format!("results for {query}").into_response()
            }
        }))
    }

    #[tokio::test]
    async fn test_query_strings_are_cached_separately() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = IsrCache::open(
            options(dir.path(), 1 << 20, false),
            query_renderer(calls.clone()),
        )
        .await
        .unwrap();

        let alice = cache.handle(get("/search?q=alice"), "/search".to_string()).await;
        assert_eq!(cache_header(&alice), Some("MISS"));
        assert_eq!(body_of(alice).await, "results for q=alice");

        let bob = cache.handle(get("/search?q=bob"), "/search".to_string()).await;
        assert_eq!(cache_header(&bob), Some("MISS"));
        assert_eq!(body_of(bob).await, "results for q=bob");

        let again = cache.handle(get("/search?q=alice"), "/search".to_string()).await;
        assert_eq!(cache_header(&again), Some("HIT"));
        assert_eq!(body_of(again).await, "results for q=alice");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_cookie_responses_are_not_shared() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = IsrCache::open(
            options(dir.path(), 1 << 20, false),
            query_renderer(calls.clone()),
        )
        .await
        .unwrap();

        let first = cache.handle(get("/account"), "/account".to_string()).await;
        assert!(cache_header(&first).is_none());
        assert_eq!(first.headers()[header::SET_COOKIE], "session=");

        let second = cache.handle(get("/account"), "/account".to_string()).await;
        assert!(cache_header(&second).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_render_leaves_no_inflight_entry() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(
            IsrCache::open(options(dir.path(), 1 << 20, false), counting_renderer(calls.clone()))
                .await
                .unwrap(),
        );

        let task = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.handle(get("/slow"), "/slow".to_string()).await })
        };
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(cache.inflight.len(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(cache.inflight.is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_key_includes_query() {
        assert_eq!(cache_key("/a", None), "/a");
        assert_eq!(cache_key("/a", Some("")), "/a");
        assert_eq!(cache_key("/a b", Some("x=1")), "/a b?x=1");
    }

    #[test]
    fn test_oversized_page_is_not_kept() {
        let mut memory = MemoryState::default();
        let page = Arc::new(CachedPage {
            path: "/big".to_string(),
            status: 200,
            headers: Vec::new(),
            body: Bytes::from(vec![0u8; 100]),
        });
        assert!(memory.insert(page, true, 10).is_empty());
        assert!(memory.pages.is_empty());
        assert_eq!(memory.bytes, 0);
    }
}
