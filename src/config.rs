use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "ComicPager";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the persisted reader preferences.
pub const PREFERENCES_FILE: &str = "preferences.json";

/// Default HTTP timeout for page, book-info and bookmark requests.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Get the application data directory.
/// Falls back to the current directory when no home directory is known
/// (headless containers, service accounts).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the default preferences file path.
pub fn preferences_path() -> PathBuf {
    app_data_dir().join(PREFERENCES_FILE)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "comic_pager=info"
}
