pub mod book; // Book info endpoint
pub mod bookmark; // Bookmark sync
pub mod classify; // Spread classifier
pub mod compose; // Composite renderer
pub mod config;
pub mod decode;
pub mod error;
pub mod page_cache;
pub mod page_source;
pub mod preferences;
pub mod prefetch; // Prefetch window scheduler
pub mod reader; // Pagination state machine + session
pub mod transform; // Orientation pipeline

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::compose::Surface;
use crate::preferences::JsonFileStore;
use crate::reader::{Reader, ReaderError, SessionOptions};

const USAGE: &str = "usage: comic-pager <book-info-url> [page] [out.png]";
const DEFAULT_OUTPUT: &str = "page.png";

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error("Failed to write view: {0}")]
    Image(#[from] image::ImageError),

    #[error("Page {page} has no raster view: {reason}")]
    NoRaster { page: usize, reason: String },
}

/// Install the global tracing subscriber (`RUST_LOG` overrides the default filter).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

struct CliArgs {
    url: String,
    page: usize,
    output: PathBuf,
}

fn usage(message: impl std::fmt::Display) -> CliError {
    CliError::Usage(format!("{message}\n{USAGE}"))
}

fn parse_args(args: &[String]) -> Result<CliArgs, CliError> {
    let url = args
        .first()
        .cloned()
        .ok_or_else(|| usage("missing book info URL"))?;
    let page = match args.get(1) {
        Some(raw) => raw
            .parse()
            .map_err(|_| usage(format!("invalid page number: {raw}")))?,
        None => 0,
    };
    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    Ok(CliArgs { url, page, output })
}

/// Headless entry: open the book, jump to the page, write the composed view.
pub async fn run(args: Vec<String>) -> Result<(), CliError> {
    init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let args = parse_args(&args)?;
    let options = SessionOptions::new(args.url);
    let store = Arc::new(JsonFileStore::default_location());

    let mut reader = Reader::open(&options, store).await?;
    let view = reader.jump_to(args.page).await?;

    let image = match view.flatten() {
        Some(image) => image,
        None => {
            let reason = match &view.surface {
                Surface::Vector { .. } => "vector page".to_string(),
                Surface::Placeholder { reason, .. } => format!("{reason:?}"),
                Surface::Raster(_) => "raster".to_string(),
            };
            return Err(CliError::NoRaster {
                page: view.current,
                reason,
            });
        }
    };
    image.save(&args.output)?;

    tracing::info!(
        page = view.current,
        progress = %view.progress.text,
        output = %args.output.display(),
        "View written"
    );
    Ok(())
}
