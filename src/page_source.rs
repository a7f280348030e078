//! Remote page byte source.
//!
//! `PageSource` is the seam between the page cache and the network. The
//! production implementation issues one HTTP GET per page URL; any non-2xx
//! status is a failure. Tests substitute an in-memory source.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::PageError;

/// MIME type assumed when the server sends no `Content-Type`.
const FALLBACK_MIME: &str = "application/octet-stream";

/// Raw page payload as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Fetches page bytes by URL.
///
/// Returned futures are `'static` so the cache can run them detached.
pub trait PageSource: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<FetchedPage, PageError>>;
}

// ═══════════════════════════════════════════════════════════
// HttpPageSource
// ═══════════════════════════════════════════════════════════

/// reqwest-backed page source.
#[derive(Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(timeout: Duration) -> Result<Self, PageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PageError::Network(format!("HTTP client init failed: {e}")))?;
        Ok(Self { client })
    }

    /// Reuse an existing client (shares its connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl PageSource for HttpPageSource {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<FetchedPage, PageError>> {
        let client = self.client.clone();
        let url = url.to_string();

        async move {
            let response = client.get(&url).send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(PageError::Http {
                    status: status.as_u16(),
                });
            }

            let mime_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(FALLBACK_MIME)
                .to_string();
            let bytes = response.bytes().await?.to_vec();

            debug!(url = %url, size = bytes.len(), mime = %mime_type, "Page bytes received");
            Ok(FetchedPage { bytes, mime_type })
        }
        .boxed()
    }
}
