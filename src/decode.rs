//! Page payload decoding.
//!
//! Raster payloads (JPEG, PNG, GIF, WebP, TIFF, BMP) are decoded to RGBA and
//! measured. Vector markup (SVG) is not rasterized: the text is wrapped into
//! a `data:` URI and its intrinsic size read from the root element, leaving
//! drawing to the display layer.

use std::sync::{Arc, LazyLock};

use base64::Engine as _;
use image::{GenericImageView, RgbaImage};
use regex::Regex;
use tracing::debug;

use crate::error::PageError;

/// Maximum page payload size before rejecting.
/// Guards the decoder against corrupt or adversarial responses.
const MAX_PAGE_BYTES: usize = 64 * 1024 * 1024; // 64 MB

/// Browser default size for SVG without intrinsic dimensions.
const SVG_DEFAULT_SIZE: (u32, u32) = (300, 150);

static SVG_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<svg\b[^>]*>").expect("valid regex"));
static SVG_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\swidth\s*=\s*["']\s*([0-9.]+)\s*(px)?\s*["']"#).expect("valid regex"));
static SVG_HEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\sheight\s*=\s*["']\s*([0-9.]+)\s*(px)?\s*["']"#).expect("valid regex"));
static SVG_VIEWBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\sviewbox\s*=\s*["']\s*[-0-9.]+[\s,]+[-0-9.]+[\s,]+([0-9.]+)[\s,]+([0-9.]+)\s*["']"#)
        .expect("valid regex")
});

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Vector page handed through to the display layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorImage {
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

/// Decoded page bitmap. Shared by reference so views never copy the raw page.
#[derive(Debug, Clone)]
pub enum PageImage {
    Raster(Arc<RgbaImage>),
    Vector(Arc<VectorImage>),
}

impl PageImage {
    /// Natural (untransformed) dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Raster(img) => img.dimensions(),
            Self::Vector(svg) => (svg.width, svg.height),
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }

    pub fn as_raster(&self) -> Option<&Arc<RgbaImage>> {
        match self {
            Self::Raster(img) => Some(img),
            Self::Vector(_) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Decoding
// ═══════════════════════════════════════════════════════════

/// Lowercased MIME essence without parameters (`image/png; q=1` -> `image/png`).
pub fn mime_essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// SVG under its registered name and the misspelling some servers emit.
pub fn is_vector_mime(mime: &str) -> bool {
    matches!(mime_essence(mime).as_str(), "image/svg+xml" | "image/xml+svg")
}

/// Decode a fetched page payload.
pub fn decode_page(bytes: &[u8], mime: &str) -> Result<PageImage, PageError> {
    if bytes.is_empty() {
        return Err(PageError::InvalidPayload("empty response body".into()));
    }
    if bytes.len() > MAX_PAGE_BYTES {
        return Err(PageError::InvalidPayload(format!(
            "page is {} bytes, limit is {MAX_PAGE_BYTES}",
            bytes.len()
        )));
    }

    if is_vector_mime(mime) {
        return decode_vector(bytes).map(|svg| PageImage::Vector(Arc::new(svg)));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| PageError::Decode(format!("{} ({e})", mime_essence(mime))))?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(PageError::Decode(format!("degenerate image {w}x{h}")));
    }
    debug!(width = w, height = h, mime = %mime_essence(mime), "Raster page decoded");

    Ok(PageImage::Raster(Arc::new(img.to_rgba8())))
}

fn decode_vector(bytes: &[u8]) -> Result<VectorImage, PageError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PageError::Decode(format!("SVG is not UTF-8: {e}")))?;
    let root = SVG_ROOT
        .find(text)
        .ok_or_else(|| PageError::Decode("no <svg> root element".into()))?
        .as_str();

    let (width, height) = svg_dimensions(root);
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    debug!(width, height, "Vector page wrapped as data URI");

    Ok(VectorImage {
        data_uri: format!("data:image/svg+xml;base64,{encoded}"),
        width,
        height,
    })
}

/// Intrinsic size of an SVG root tag: explicit width/height, then viewBox.
fn svg_dimensions(root: &str) -> (u32, u32) {
    let attr = |re: &Regex| {
        re.captures(root)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|v| v.round() as u32)
            .filter(|v| *v > 0)
    };

    if let (Some(w), Some(h)) = (attr(&SVG_WIDTH), attr(&SVG_HEIGHT)) {
        return (w, h);
    }

    SVG_VIEWBOX
        .captures(root)
        .and_then(|c| {
            let w = c.get(1)?.as_str().parse::<f64>().ok()?;
            let h = c.get(2)?.as_str().parse::<f64>().ok()?;
            Some((w.round() as u32, h.round() as u32))
        })
        .filter(|(w, h)| *w > 0 && *h > 0)
        .unwrap_or(SVG_DEFAULT_SIZE)
}
