//! Page cache: one entry per page index, created lazily, never evicted.
//!
//! Each index moves `NotRequested -> Pending -> Ready | Failed` exactly once.
//! At most one fetch is ever in flight per index: the first request creates
//! a shared, detached load task and every later request for the same index
//! either joins that task or sees the settled entry. Failed entries are
//! terminal; nothing retries them.
//!
//! Two primitives sit on top of `ensure`:
//! - `await_fetch(i)` suspends the caller until page `i` has settled
//! - `schedule_fetch(i)` starts the load and returns immediately

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tracing::{debug, warn};

use crate::classify::is_double_spread;
use crate::decode::{decode_page, PageImage};
use crate::error::PageError;
use crate::page_source::PageSource;
use crate::transform::Rotation;

/// Handle to an in-flight page load. Cloneable; resolves when the entry settles.
pub type FetchHandle = Shared<BoxFuture<'static, ()>>;

// ═══════════════════════════════════════════════════════════
// PageEntry
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    NotRequested,
    Pending,
    Ready,
    Failed,
}

/// Why a page failed. Only diagnostic: neither kind is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFailure {
    Fetch(PageError),
    Decode(PageError),
}

impl PageFailure {
    pub fn error(&self) -> &PageError {
        match self {
            Self::Fetch(e) | Self::Decode(e) => e,
        }
    }
}

impl std::fmt::Display for PageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch failed: {e}"),
            Self::Decode(e) => write!(f, "decode failed: {e}"),
        }
    }
}

/// Cached state of one page.
///
/// A `Ready` entry always carries an image (and therefore dimensions);
/// a `Failed` entry never does.
#[derive(Debug, Clone)]
pub struct PageEntry {
    pub index: usize,
    pub status: PageStatus,
    pub source_url: String,
    pub mime_type: Option<String>,
    image: Option<PageImage>,
    failure: Option<PageFailure>,
}

impl PageEntry {
    fn pending(index: usize, source_url: String) -> Self {
        Self {
            index,
            status: PageStatus::Pending,
            source_url,
            mime_type: None,
            image: None,
            failure: None,
        }
    }

    fn resolve(&mut self, mime_type: String, image: PageImage) {
        self.status = PageStatus::Ready;
        self.mime_type = Some(mime_type);
        self.image = Some(image);
        self.failure = None;
    }

    fn fail(&mut self, failure: PageFailure) {
        self.status = PageStatus::Failed;
        self.image = None;
        self.failure = Some(failure);
    }

    pub fn is_ready(&self) -> bool {
        self.status == PageStatus::Ready
    }

    pub fn image(&self) -> Option<&PageImage> {
        self.image.as_ref()
    }

    pub fn failure(&self) -> Option<&PageFailure> {
        self.failure.as_ref()
    }

    /// Natural (pre-transform) pixel dimensions.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image.as_ref().map(PageImage::dimensions)
    }

    pub fn natural_width(&self) -> Option<u32> {
        self.dimensions().map(|(w, _)| w)
    }

    pub fn natural_height(&self) -> Option<u32> {
        self.dimensions().map(|(_, h)| h)
    }

    /// Spread classification under `rotation`. Computed from the stored
    /// dimensions on every call so rotation changes never see a stale value.
    /// Pages without dimensions are never spreads.
    pub fn is_double_page_spread(&self, rotation: Rotation) -> bool {
        self.dimensions()
            .map(|(w, h)| is_double_spread(w, h, rotation))
            .unwrap_or(false)
    }
}

// ═══════════════════════════════════════════════════════════
// PageCache
// ═══════════════════════════════════════════════════════════

struct CacheInner {
    source: Arc<dyn PageSource>,
    url_template: String,
    /// Lock order: `entries` before `in_flight`.
    entries: Mutex<BTreeMap<usize, PageEntry>>,
    in_flight: Mutex<HashMap<usize, FetchHandle>>,
}

/// Shared page cache. Clones refer to the same entries.
#[derive(Clone)]
pub struct PageCache {
    inner: Arc<CacheInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Entries are plain data; a panic elsewhere cannot leave them half-written.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PageCache {
    /// `url_template` is the page-fetch prefix; page `i` lives at `template + i`.
    pub fn new(source: Arc<dyn PageSource>, url_template: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                source,
                url_template: url_template.into(),
                entries: Mutex::new(BTreeMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn page_url(&self, index: usize) -> String {
        format!("{}{}", self.inner.url_template, index)
    }

    /// Start loading `index` if it has never been requested.
    ///
    /// Returns the in-flight handle when the page is pending (new or
    /// already loading) and `None` once it has settled. The load runs
    /// detached on the tokio runtime whether or not the handle is awaited.
    pub fn ensure(&self, index: usize) -> Option<FetchHandle> {
        let mut entries = lock(&self.inner.entries);
        let mut in_flight = lock(&self.inner.in_flight);

        if let Some(entry) = entries.get(&index) {
            return match entry.status {
                PageStatus::Pending => in_flight.get(&index).cloned(),
                _ => None,
            };
        }

        let url = self.page_url(index);
        entries.insert(index, PageEntry::pending(index, url.clone()));

        let inner = Arc::clone(&self.inner);
        let handle = async move { inner.load(index, url).await }.boxed().shared();
        in_flight.insert(index, handle.clone());
        drop(in_flight);
        drop(entries);

        debug!(page = index, "Page fetch issued");
        tokio::spawn(handle.clone());
        Some(handle)
    }

    /// Ensure `index` and wait until it has settled.
    pub async fn await_fetch(&self, index: usize) -> PageStatus {
        if let Some(handle) = self.ensure(index) {
            handle.await;
        }
        self.status(index)
    }

    /// Ensure `index` without waiting.
    pub fn schedule_fetch(&self, index: usize) {
        // Dropping the handle is fine: the load task is already spawned.
        let _ = self.ensure(index);
    }

    pub fn get(&self, index: usize) -> Option<PageEntry> {
        lock(&self.inner.entries).get(&index).cloned()
    }

    /// `Ready` entry for `index`, if any.
    pub fn ready(&self, index: usize) -> Option<PageEntry> {
        self.get(index).filter(PageEntry::is_ready)
    }

    pub fn status(&self, index: usize) -> PageStatus {
        lock(&self.inner.entries)
            .get(&index)
            .map(|e| e.status)
            .unwrap_or(PageStatus::NotRequested)
    }

    /// Ready page indices in ascending order (thumbnail list).
    pub fn ready_indices(&self) -> Vec<usize> {
        lock(&self.inner.entries)
            .values()
            .filter(|e| e.is_ready())
            .map(|e| e.index)
            .collect()
    }

    /// Number of pages the cache proves exist: highest ready index + 1.
    pub fn known_page_count(&self) -> usize {
        lock(&self.inner.entries)
            .values()
            .rev()
            .find(|e| e.is_ready())
            .map(|e| e.index + 1)
            .unwrap_or(0)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }
}

impl CacheInner {
    async fn load(self: Arc<Self>, index: usize, url: String) {
        let outcome = match self.source.fetch(&url).await {
            Err(e) => Err(PageFailure::Fetch(e)),
            Ok(page) => {
                let mime = page.mime_type.clone();
                let decoded =
                    tokio::task::spawn_blocking(move || decode_page(&page.bytes, &page.mime_type))
                        .await;
                match decoded {
                    Ok(Ok(image)) => Ok((mime, image)),
                    Ok(Err(e)) => Err(PageFailure::Decode(e)),
                    Err(join) => Err(PageFailure::Decode(PageError::Join(join.to_string()))),
                }
            }
        };

        let mut entries = lock(&self.entries);
        if let Some(entry) = entries.get_mut(&index) {
            match outcome {
                Ok((mime, image)) => {
                    let (w, h) = image.dimensions();
                    debug!(page = index, width = w, height = h, "Page ready");
                    entry.resolve(mime, image);
                }
                Err(failure) => {
                    warn!(page = index, url = %url, error = %failure, "Page unavailable");
                    entry.fail(failure);
                }
            }
        }
        lock(&self.in_flight).remove(&index);
    }
}
