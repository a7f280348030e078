//! Reader session and pagination state machine.
//!
//! The reader owns the position and the preferences. Every transition runs
//! the same sequence: update the position, load the prefetch window (which
//! awaits the pages the view depends on), compose the view, then fire the
//! bookmark sync. Preferences are written back once at startup with their
//! defaults filled in. Later changes persist immediately and re-render
//! without moving or syncing.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::book::{fetch_book_info, BookError, BookInfo};
use crate::bookmark::{BookmarkSync, HttpBookmarkSync};
use crate::compose::{self, select_pages, DisplayedPages, Progress, View};
use crate::config::DEFAULT_HTTP_TIMEOUT_SECS;
use crate::page_cache::PageCache;
use crate::page_source::{HttpPageSource, PageSource};
use crate::preferences::{
    load_or_default, FitMode, LayoutMode, PreferenceStore, Preferences, PreferencesError,
    ReadingDirection, Theme,
};
use crate::prefetch::PrefetchScheduler;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Book error: {0}")]
    Book(#[from] BookError),

    #[error("Preferences error: {0}")]
    Preferences(#[from] PreferencesError),

    #[error("Book has no pages")]
    NoPages,

    #[error("Render task failed: {0}")]
    Render(String),
}

/// Per-session settings supplied by the host.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub book_info_url: String,
    /// Page to resume at when bookmarks are enabled.
    pub bookmark_page: usize,
    pub use_bookmarks: bool,
    pub credential_token: Option<String>,
    pub timeout: Duration,
}

impl SessionOptions {
    pub fn new(book_info_url: impl Into<String>) -> Self {
        Self {
            book_info_url: book_info_url.into(),
            bookmark_page: 0,
            use_bookmarks: false,
            credential_token: None,
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// Resolve a possibly relative server endpoint against the info URL.
fn resolve_endpoint(base: &str, endpoint: &str) -> String {
    reqwest::Url::parse(base)
        .and_then(|b| b.join(endpoint))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| endpoint.to_string())
}

pub struct Reader {
    book: BookInfo,
    preferences: Preferences,
    store: Arc<dyn PreferenceStore>,
    cache: PageCache,
    scheduler: PrefetchScheduler,
    bookmarks: Option<Arc<dyn BookmarkSync>>,
    current: usize,
}

impl Reader {
    /// Open a session with a fresh HTTP client built from `options.timeout`.
    pub async fn open(
        options: &SessionOptions,
        store: Arc<dyn PreferenceStore>,
    ) -> Result<Self, ReaderError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| BookError::Network(format!("HTTP client init failed: {e}")))?;
        Self::open_with_client(options, client, store).await
    }

    /// Load book info, wire the HTTP page source and bookmark sync, and load
    /// the first window.
    pub async fn open_with_client(
        options: &SessionOptions,
        client: reqwest::Client,
        store: Arc<dyn PreferenceStore>,
    ) -> Result<Self, ReaderError> {
        let mut book = fetch_book_info(&client, &options.book_info_url).await?;
        book.page_url = Some(resolve_endpoint(
            &options.book_info_url,
            book.page_url_template(),
        ));

        let bookmarks: Option<Arc<dyn BookmarkSync>> = match book.bookmark_endpoint() {
            Some(endpoint) if options.use_bookmarks => Some(Arc::new(HttpBookmarkSync::new(
                client.clone(),
                resolve_endpoint(&options.book_info_url, endpoint),
                options.credential_token.clone(),
            ))),
            _ => None,
        };
        let start = if bookmarks.is_some() {
            options.bookmark_page
        } else {
            0
        };

        let source = Arc::new(HttpPageSource::with_client(client));
        Self::start(book, source, store, bookmarks, start).await
    }

    /// Build a reader over any page source and load the window at `start_page`.
    pub async fn start(
        book: BookInfo,
        source: Arc<dyn PageSource>,
        store: Arc<dyn PreferenceStore>,
        bookmarks: Option<Arc<dyn BookmarkSync>>,
        start_page: usize,
    ) -> Result<Self, ReaderError> {
        if book.page_url_template().trim().is_empty() {
            return Err(BookError::MissingPageUrl.into());
        }
        let preferences = load_or_default(store.as_ref());
        // Write back the filled-in defaults so the stored form is canonical.
        if let Err(e) = store.save(&preferences) {
            warn!(error = %e, "Failed to store preferences");
        }
        let cache = PageCache::new(source, book.page_url_template());
        let scheduler = PrefetchScheduler::new(cache.clone());

        let mut reader = Self {
            book,
            preferences,
            store,
            cache,
            scheduler,
            bookmarks,
            current: 0,
        };
        reader.current = reader.clamp(start_page);
        reader.prefetch().await;

        if reader.total_pages() == 0 {
            return Err(ReaderError::NoPages);
        }
        info!(
            title = %reader.book.title,
            pages = reader.total_pages(),
            start = reader.current,
            bookmarks = reader.bookmarks.is_some(),
            "Reader opened"
        );
        Ok(reader)
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn book(&self) -> &BookInfo {
        &self.book
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    /// `max(book page count, pages discovered in the cache)`.
    pub fn total_pages(&self) -> usize {
        self.book.page_count.max(self.cache.known_page_count())
    }

    /// Ready pages for the thumbnail list.
    pub fn thumbnails(&self) -> Vec<usize> {
        self.cache.ready_indices()
    }

    fn displayed(&self) -> DisplayedPages {
        select_pages(
            &self.cache,
            self.current,
            self.preferences.layout,
            self.preferences.classification_rotation(),
        )
    }

    pub fn progress_text(&self) -> String {
        Progress::new(self.displayed(), self.total_pages()).text
    }

    pub fn progress_percent(&self) -> u32 {
        compose::progress_percent(self.current, self.total_pages())
    }

    // ── Navigation ─────────────────────────────────────────

    fn clamp(&self, page: usize) -> usize {
        page.min(self.total_pages().saturating_sub(1))
    }

    /// Ready page shown on its own: a spread or a vector page.
    fn stands_alone(&self, page: usize) -> bool {
        let rotation = self.preferences.classification_rotation();
        self.cache
            .ready(page)
            .map(|e| {
                e.is_double_page_spread(rotation)
                    || e.image().map(|i| i.is_vector()).unwrap_or(false)
            })
            .unwrap_or(false)
    }

    fn forward_step(&self) -> usize {
        if self.preferences.layout == LayoutMode::Single {
            return 1;
        }
        if self.displayed().is_pair() && !self.stands_alone(self.current + 2) {
            2
        } else {
            1
        }
    }

    fn backward_step(&self) -> usize {
        if self.preferences.layout == LayoutMode::Single {
            return 1;
        }
        let near = self.current.checked_sub(1).is_some_and(|p| self.stands_alone(p));
        let far = self.current.checked_sub(2).is_some_and(|p| self.stands_alone(p));
        if near || far {
            1
        } else {
            2
        }
    }

    pub async fn advance(&mut self) -> Result<View, ReaderError> {
        let target = self.current + self.forward_step();
        self.transition(target).await
    }

    pub async fn retreat(&mut self) -> Result<View, ReaderError> {
        let target = self.current.saturating_sub(self.backward_step());
        self.transition(target).await
    }

    /// Turn toward the left edge: back in forward reading, ahead in reversed.
    pub async fn left(&mut self) -> Result<View, ReaderError> {
        match self.preferences.direction {
            ReadingDirection::Forward => self.retreat().await,
            ReadingDirection::Reversed => self.advance().await,
        }
    }

    pub async fn right(&mut self) -> Result<View, ReaderError> {
        match self.preferences.direction {
            ReadingDirection::Forward => self.advance().await,
            ReadingDirection::Reversed => self.retreat().await,
        }
    }

    /// Jump to `page`, clamped into the book.
    pub async fn jump_to(&mut self, page: usize) -> Result<View, ReaderError> {
        self.transition(page).await
    }

    /// Jump from a progress-bar click at `rate` (0.0 = start of the bar).
    /// The bar runs right-to-left in reversed direction.
    pub async fn jump_to_fraction(&mut self, rate: f64) -> Result<View, ReaderError> {
        let page = self.page_at_fraction(rate);
        self.transition(page).await
    }

    fn page_at_fraction(&self, rate: f64) -> usize {
        let rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
        let rate = match self.preferences.direction {
            ReadingDirection::Forward => rate,
            ReadingDirection::Reversed => 1.0 - rate,
        };
        let page = (rate * self.total_pages() as f64).ceil() as usize;
        page.max(1) - 1
    }

    async fn transition(&mut self, target: usize) -> Result<View, ReaderError> {
        let from = self.current;
        self.current = self.clamp(target);
        debug!(from, to = self.current, requested = target, "Page transition");

        self.prefetch().await;
        let view = self.render().await;
        self.sync_bookmark();
        view
    }

    async fn prefetch(&self) {
        self.scheduler
            .load_window(
                self.current,
                self.preferences.layout,
                self.preferences.preload_radius,
                self.total_pages(),
            )
            .await;
    }

    fn sync_bookmark(&self) {
        if let Some(sync) = &self.bookmarks {
            sync.sync(self.current);
        }
    }

    /// Compose the view for the current position.
    pub async fn render(&self) -> Result<View, ReaderError> {
        let cache = self.cache.clone();
        let prefs = self.preferences.clone();
        let (current, total) = (self.current, self.total_pages());

        tokio::task::spawn_blocking(move || compose::render(&cache, current, total, &prefs))
            .await
            .map_err(|e| ReaderError::Render(e.to_string()))
    }

    // ── Preferences ────────────────────────────────────────

    /// Apply `change`, persist, reload the window and re-render.
    pub async fn update_preferences(
        &mut self,
        change: impl FnOnce(&mut Preferences),
    ) -> Result<View, ReaderError> {
        change(&mut self.preferences);
        if let Err(e) = self.store.save(&self.preferences) {
            warn!(error = %e, "Failed to save preferences");
            return Err(e.into());
        }
        self.current = self.clamp(self.current);
        self.prefetch().await;
        self.render().await
    }

    pub async fn rotate_clockwise(&mut self) -> Result<View, ReaderError> {
        self.update_preferences(|p| p.rotation = p.rotation.clockwise()).await
    }

    pub async fn rotate_counter_clockwise(&mut self) -> Result<View, ReaderError> {
        self.update_preferences(|p| p.rotation = p.rotation.counter_clockwise())
            .await
    }

    pub async fn cycle_flip(&mut self) -> Result<View, ReaderError> {
        self.update_preferences(Preferences::cycle_flip).await
    }

    pub async fn toggle_direction(&mut self) -> Result<View, ReaderError> {
        self.update_preferences(|p| p.direction = p.direction.toggled()).await
    }

    pub async fn set_layout_mode(&mut self, layout: LayoutMode) -> Result<View, ReaderError> {
        self.update_preferences(|p| p.layout = layout).await
    }

    pub async fn set_fit_mode(&mut self, fit_mode: FitMode) -> Result<View, ReaderError> {
        self.update_preferences(|p| p.fit_mode = fit_mode).await
    }

    pub async fn set_theme(&mut self, theme: Theme) -> Result<View, ReaderError> {
        self.update_preferences(|p| p.theme = theme).await
    }
}
