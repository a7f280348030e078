//! Book metadata loaded once from the info endpoint.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BookError {
    #[error("Book info request failed with HTTP {status}")]
    Http { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid book info: {0}")]
    Parse(String),

    #[error("Book info has no page URL")]
    MissingPageUrl,
}

impl From<reqwest::Error> for BookError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => BookError::Http {
                status: status.as_u16(),
            },
            None => BookError::Network(e.to_string()),
        }
    }
}

/// Immutable book description. `page_url` is guaranteed non-empty once
/// returned from [`BookInfo::from_json`] or [`fetch_book_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInfo {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub page_count: usize,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub uncompressed_size: u64,
    #[serde(default)]
    pub publisher_list: Vec<String>,
    #[serde(default)]
    pub author_list: Vec<String>,
    #[serde(default)]
    pub has_cover: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bookmark_url: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
}

impl BookInfo {
    /// Parse and validate the info payload.
    pub fn from_json(bytes: &[u8]) -> Result<Self, BookError> {
        let info: BookInfo =
            serde_json::from_slice(bytes).map_err(|e| BookError::Parse(e.to_string()))?;
        info.validate()?;
        Ok(info)
    }

    fn validate(&self) -> Result<(), BookError> {
        match self.page_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(()),
            _ => Err(BookError::MissingPageUrl),
        }
    }

    /// Page-fetch prefix; page `i` is at `page_url_template() + i`.
    pub fn page_url_template(&self) -> &str {
        self.page_url.as_deref().unwrap_or_default()
    }

    /// Bookmark endpoint, if the server accepts bookmarks for this book.
    pub fn bookmark_endpoint(&self) -> Option<&str> {
        self.bookmark_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// GET the info endpoint and validate the result. Missing page URL is fatal.
pub async fn fetch_book_info(client: &reqwest::Client, url: &str) -> Result<BookInfo, BookError> {
    debug!(url = %url, "Fetching book info");
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(BookError::Http {
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().await?;
    let info = BookInfo::from_json(&bytes)?;
    info!(
        id = %info.id,
        title = %info.title,
        pages = info.page_count,
        format = %info.format,
        "Book info loaded"
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{local_client, spawn_server};

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": 42,
            "title": "Night Harbor",
            "page_count": 24,
            "format": "CBZ",
            "uncompressed_size": 123456,
            "publisher_list": ["Tidewater"],
            "author_list": ["R. Okafor", "L. Brandt"],
            "has_cover": true,
            "description": "Issue one.",
            "bookmark_url": "/bookmark/42",
            "page_url": "/comic/42/page/"
        })
    }

    #[test]
    fn parses_full_payload() {
        let info = BookInfo::from_json(sample().to_string().as_bytes()).unwrap();
        assert_eq!(info.id, "42");
        assert_eq!(info.page_count, 24);
        assert_eq!(info.author_list.len(), 2);
        assert_eq!(info.page_url_template(), "/comic/42/page/");
        assert_eq!(info.bookmark_endpoint(), Some("/bookmark/42"));
    }

    #[test]
    fn missing_page_url_is_fatal() {
        let mut payload = sample();
        payload.as_object_mut().unwrap().remove("page_url");
        assert!(matches!(
            BookInfo::from_json(payload.to_string().as_bytes()),
            Err(BookError::MissingPageUrl)
        ));

        payload["page_url"] = json!("  ");
        assert!(matches!(
            BookInfo::from_json(payload.to_string().as_bytes()),
            Err(BookError::MissingPageUrl)
        ));
    }

    #[test]
    fn optional_fields_default() {
        let info = BookInfo::from_json(br#"{"page_url": "/p/"}"#).unwrap();
        assert_eq!(info.page_count, 0);
        assert!(info.author_list.is_empty());
        assert_eq!(info.bookmark_endpoint(), None);
    }

    #[test]
    fn empty_bookmark_url_means_no_bookmarks() {
        let info = BookInfo::from_json(br#"{"page_url": "/p/", "bookmark_url": ""}"#).unwrap();
        assert_eq!(info.bookmark_endpoint(), None);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(BookInfo::from_json(b"{"), Err(BookError::Parse(_))));
    }

    #[tokio::test]
    async fn fetches_from_endpoint() {
        let body = sample();
        let app = Router::new()
            .route("/info", get(move || async move { Json(body) }))
            .route("/gone", get(|| async { StatusCode::GONE }));
        let addr = spawn_server(app).await;
        let client = local_client();

        let info = fetch_book_info(&client, &format!("http://{addr}/info"))
            .await
            .unwrap();
        assert_eq!(info.title, "Night Harbor");

        let err = fetch_book_info(&client, &format!("http://{addr}/gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookError::Http { status: 410 }));
    }
}
