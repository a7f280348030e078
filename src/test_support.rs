//! Shared test fixtures: PNG payloads, in-memory page source, local HTTP server.

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};

use crate::error::PageError;
use crate::page_source::{FetchedPage, PageSource};

pub const TEMPLATE: &str = "mem://book/page/";

/// Encode a solid-color PNG of the given size.
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    encode_png(&img)
}

pub fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .unwrap();
    cursor.into_inner()
}

/// reqwest client that never routes loopback traffic through a proxy.
pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Serve `app` on an ephemeral loopback port.
pub async fn spawn_server(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ═══════════════════════════════════════════════════════════
// MemoryPageSource
// ═══════════════════════════════════════════════════════════

/// In-memory page source keyed by page index under [`TEMPLATE`].
/// Records every request so tests can assert fetch counts and order.
#[derive(Clone, Default)]
pub struct MemoryPageSource {
    pages: Arc<Mutex<HashMap<usize, Result<FetchedPage, PageError>>>>,
    requests: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl MemoryPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book of `count` portrait pages (600x900).
    pub fn portrait_book(count: usize) -> Self {
        let source = Self::new();
        for i in 0..count {
            source.insert_page(i, 600, 900, [255, 255, 255, 255]);
        }
        source
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_page(self, index: usize, width: u32, height: u32) -> Self {
        self.insert_page(index, width, height, [255, 255, 255, 255]);
        self
    }

    pub fn with_svg(self, index: usize, svg: &str) -> Self {
        self.insert(index, Ok(FetchedPage {
            bytes: svg.as_bytes().to_vec(),
            mime_type: "image/svg+xml".into(),
        }));
        self
    }

    pub fn with_failure(self, index: usize, error: PageError) -> Self {
        self.insert(index, Err(error));
        self
    }

    pub fn with_garbage(self, index: usize) -> Self {
        self.insert(index, Ok(FetchedPage {
            bytes: b"definitely not an image".to_vec(),
            mime_type: "image/jpeg".into(),
        }));
        self
    }

    pub fn insert_page(&self, index: usize, width: u32, height: u32, color: [u8; 4]) {
        self.insert(index, Ok(FetchedPage {
            bytes: png_bytes(width, height, color),
            mime_type: "image/png".into(),
        }));
    }

    fn insert(&self, index: usize, page: Result<FetchedPage, PageError>) {
        self.pages.lock().unwrap().insert(index, page);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Requested page indices in request order.
    pub fn requested_indices(&self) -> Vec<usize> {
        self.requests()
            .iter()
            .filter_map(|url| url.strip_prefix(TEMPLATE)?.parse().ok())
            .collect()
    }

    pub fn request_count(&self, index: usize) -> usize {
        self.requested_indices().iter().filter(|i| **i == index).count()
    }
}

impl PageSource for MemoryPageSource {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<FetchedPage, PageError>> {
        self.requests.lock().unwrap().push(url.to_string());
        let page = url
            .strip_prefix(TEMPLATE)
            .and_then(|i| i.parse::<usize>().ok())
            .and_then(|i| self.pages.lock().unwrap().get(&i).cloned())
            .unwrap_or(Err(PageError::Http { status: 404 }));
        let delay = self.delay;

        async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            page
        }
        .boxed()
    }
}
