//! Errors shared by the page fetch / decode path.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("Page request failed with HTTP {status}")]
    Http { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Page payload rejected: {0}")]
    InvalidPayload(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Decode task aborted: {0}")]
    Join(String),
}

impl PageError {
    /// Whether the failure happened before any bytes reached the decoder.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Network(_))
    }
}

impl From<reqwest::Error> for PageError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => PageError::Http {
                status: status.as_u16(),
            },
            None => PageError::Network(e.to_string()),
        }
    }
}
