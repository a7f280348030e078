//! Bookmark sync: fire-and-forget POST of the current page.
//!
//! Failures are logged and dropped. Navigation never waits on a sync.

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Header carrying the session's credential token.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Receives the reader's page after every transition.
pub trait BookmarkSync: Send + Sync {
    fn sync(&self, page: usize);
}

#[derive(Debug, Serialize)]
struct BookmarkBody {
    bookmark: usize,
}

/// POSTs `{"bookmark": page}` to the book's bookmark endpoint.
#[derive(Clone)]
pub struct HttpBookmarkSync {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpBookmarkSync {
    pub fn new(client: reqwest::Client, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token,
        }
    }

    /// Spawn the POST and hand back its task. Callers normally drop the handle.
    pub fn submit(&self, page: usize) -> JoinHandle<()> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&BookmarkBody { bookmark: page });
        if let Some(token) = &self.token {
            request = request.header(CSRF_HEADER, token);
        }
        let url = self.url.clone();

        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(page, url = %url, "Bookmark synced");
                }
                Ok(resp) => {
                    warn!(page, url = %url, status = resp.status().as_u16(), "Bookmark sync rejected");
                }
                Err(e) => {
                    warn!(page, url = %url, error = %e, "Bookmark sync failed");
                }
            }
        })
    }
}

impl BookmarkSync for HttpBookmarkSync {
    fn sync(&self, page: usize) {
        let _ = self.submit(page);
    }
}
