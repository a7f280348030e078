//! Composite renderer: builds the view for the current reader position.
//!
//! Pairing, in double mode only: the current page is shown next to its
//! successor unless either one is a spread, a vector page, or not ready.
//! Anything that cannot be paired is shown alone. Two raster pages are
//! oriented individually and mounted on one canvas, side by side for even
//! rotations and stacked for odd ones, in an order set by the rotation:
//!
//! | rotation | axis       | order  |
//! |----------|------------|--------|
//! | 0        | horizontal | A \| B |
//! | 1        | vertical   | A / B  |
//! | 2        | horizontal | B \| A |
//! | 3        | vertical   | B / A  |
//!
//! Pages are centered on the cross axis; the uncovered area is transparent
//! so the backdrop shows through.

use std::sync::Arc;

use image::{imageops, Rgb, Rgba, RgbaImage};
use tracing::debug;

use crate::decode::{PageImage, VectorImage};
use crate::page_cache::{PageCache, PageEntry, PageStatus};
use crate::preferences::{FitMode, LayoutMode, Preferences, ScrollPolicy, Theme};
use crate::transform::{orient, Orientation, Rotation};

/// Width of the edge strip sampled for the backdrop color.
const EDGE_STRIP_PX: u32 = 5;

/// Channel threshold above which a pixel counts as white.
const WHITE_THRESHOLD: u8 = 240;

/// Channel threshold below which a pixel counts as black.
const BLACK_THRESHOLD: u8 = 15;

/// Fraction of each page's width covered by the seam shadow.
const SEAM_SPAN: f32 = 0.06;

/// Shadow opacity by normalized distance from the seam (1.0 = span edge).
/// Transparent at the edge, two soft bands, darkest at the seam itself.
const SEAM_STOPS: [(f32, f32); 4] = [(1.0, 0.0), (0.6, 0.08), (0.3, 0.22), (0.0, 0.5)];

/// Backdrop used when nothing can be sampled.
const DEFAULT_BACKDROP: Rgb<u8> = Rgb([255, 255, 255]);

// ═══════════════════════════════════════════════════════════
// View types
// ═══════════════════════════════════════════════════════════

/// Which page indices the view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayedPages {
    Single(usize),
    /// Reading order: `(current, current + 1)`.
    Pair(usize, usize),
}

impl DisplayedPages {
    pub fn first(self) -> usize {
        match self {
            Self::Single(p) | Self::Pair(p, _) => p,
        }
    }

    pub fn last(self) -> usize {
        match self {
            Self::Single(p) | Self::Pair(_, p) => p,
        }
    }

    pub fn count(self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Pair(..) => 2,
        }
    }

    pub fn is_pair(self) -> bool {
        matches!(self, Self::Pair(..))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderReason {
    /// Still loading; the next render after it settles will show it.
    Loading,
    /// Fetch or decode failed. Never retried.
    Unavailable(String),
}

/// What the display layer draws.
#[derive(Debug, Clone)]
pub enum Surface {
    /// Oriented (and possibly composed) bitmap.
    Raster(Arc<RgbaImage>),
    /// Vector page; the display layer applies the orientation itself.
    Vector {
        image: Arc<VectorImage>,
        orientation: Orientation,
    },
    Placeholder {
        page: usize,
        reason: PlaceholderReason,
    },
}

impl Surface {
    pub fn as_raster(&self) -> Option<&RgbaImage> {
        match self {
            Self::Raster(img) => Some(&**img),
            _ => None,
        }
    }

    /// Displayed size after orientation, if known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Raster(img) => Some(img.dimensions()),
            Self::Vector { image, orientation } => Some(
                orientation
                    .rotation
                    .oriented_dimensions(image.width, image.height),
            ),
            Self::Placeholder { .. } => None,
        }
    }
}

/// Color painted behind the page(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backdrop {
    None,
    Solid(Rgb<u8>),
    /// 50/50 linear split, left half then right half.
    Split { left: Rgb<u8>, right: Rgb<u8> },
}

/// Presentation settings the display layer applies around the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayHints {
    pub fit_mode: FitMode,
    pub scroll_policy: ScrollPolicy,
    pub show_scrollbar: bool,
    pub theme: Theme,
}

impl DisplayHints {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        Self {
            fit_mode: prefs.fit_mode,
            scroll_policy: prefs.scroll_policy,
            show_scrollbar: prefs.show_scrollbar,
            theme: prefs.theme,
        }
    }

    pub fn reset_scroll(&self) -> bool {
        self.scroll_policy == ScrollPolicy::ResetToTop
    }
}

/// `"{page}/{total}"` or `"{a}-{b}/{total}"`, plus the read-bar percentage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub text: String,
    pub percent: u32,
}

impl Progress {
    pub fn new(pages: DisplayedPages, total: usize) -> Self {
        let text = match pages {
            DisplayedPages::Single(p) => format!("{}/{}", p + 1, total),
            DisplayedPages::Pair(a, b) => format!("{}-{}/{}", a + 1, b + 1, total),
        };
        Self {
            text,
            percent: progress_percent(pages.first(), total),
        }
    }
}

/// `round((page + 1) / total * 100)`; 0 for an empty book.
pub fn progress_percent(page: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((page + 1) as f64 / total as f64 * 100.0).round() as u32
}

/// Everything the display layer needs for one position.
#[derive(Debug, Clone)]
pub struct View {
    pub current: usize,
    pub pages: DisplayedPages,
    /// The single displayed page is a spread and should take the full width.
    pub is_spread: bool,
    pub surface: Surface,
    pub backdrop: Backdrop,
    pub hints: DisplayHints,
    pub progress: Progress,
}

impl View {
    /// Raster surface painted over its backdrop. `None` for vector and
    /// placeholder surfaces.
    pub fn flatten(&self) -> Option<RgbaImage> {
        let surface = self.surface.as_raster()?;
        let (w, h) = surface.dimensions();
        let mut out = match self.backdrop {
            Backdrop::None => RgbaImage::new(w, h),
            Backdrop::Solid(c) => RgbaImage::from_pixel(w, h, opaque(c)),
            Backdrop::Split { left, right } => {
                RgbaImage::from_fn(w, h, |x, _| opaque(if x < w / 2 { left } else { right }))
            }
        };
        imageops::overlay(&mut out, surface, 0, 0);
        Some(out)
    }
}

fn opaque(c: Rgb<u8>) -> Rgba<u8> {
    Rgba([c.0[0], c.0[1], c.0[2], 255])
}

// ═══════════════════════════════════════════════════════════
// Pairing
// ═══════════════════════════════════════════════════════════

/// Ready raster page that is not a spread under `rotation`.
fn pairable(entry: Option<&PageEntry>, rotation: Rotation) -> bool {
    match entry {
        Some(e) => {
            e.is_ready()
                && !e.image().map(PageImage::is_vector).unwrap_or(true)
                && !e.is_double_page_spread(rotation)
        }
        None => false,
    }
}

/// Decide which pages the view at `current` shows.
///
/// `class_rotation` is the rotation used for spread classification, which
/// differs from the display rotation when rotation-aware classification is
/// disabled.
pub fn select_pages(
    cache: &PageCache,
    current: usize,
    layout: LayoutMode,
    class_rotation: Rotation,
) -> DisplayedPages {
    if layout == LayoutMode::Single {
        return DisplayedPages::Single(current);
    }
    let here = cache.get(current);
    let next = cache.get(current + 1);
    if pairable(here.as_ref(), class_rotation) && pairable(next.as_ref(), class_rotation) {
        DisplayedPages::Pair(current, current + 1)
    } else {
        DisplayedPages::Single(current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Stacking axis and whether the second page in reading order goes first.
pub fn pair_arrangement(rotation: Rotation) -> (Axis, bool) {
    let axis = if rotation.is_odd() {
        Axis::Vertical
    } else {
        Axis::Horizontal
    };
    (axis, rotation.quarter_turns() >= 2)
}

/// Canvas size and the offsets of the first and second placed images.
fn placement(
    first: (u32, u32),
    second: (u32, u32),
    axis: Axis,
) -> ((u32, u32), (u32, u32), (u32, u32)) {
    match axis {
        Axis::Horizontal => {
            let w = first.0 + second.0;
            let h = first.1.max(second.1);
            ((w, h), (0, (h - first.1) / 2), (first.0, (h - second.1) / 2))
        }
        Axis::Vertical => {
            let w = first.0.max(second.0);
            let h = first.1 + second.1;
            ((w, h), ((w - first.0) / 2, 0), ((w - second.0) / 2, first.1))
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Seam shadow
// ═══════════════════════════════════════════════════════════

/// Shadow opacity at normalized distance `d` (0 at the seam, 1 at the span edge).
pub fn seam_alpha(d: f32) -> f32 {
    let d = d.clamp(0.0, 1.0);
    for pair in SEAM_STOPS.windows(2) {
        let (d0, a0) = pair[0];
        let (d1, a1) = pair[1];
        if d <= d0 && d >= d1 {
            let t = if d0 == d1 { 0.0 } else { (d0 - d) / (d0 - d1) };
            return a0 + (a1 - a0) * t;
        }
    }
    0.0
}

/// Darken a band around the vertical seam at `seam_x`.
fn draw_seam_shadow(canvas: &mut RgbaImage, seam_x: u32, left_width: u32, right_width: u32) {
    let left_span = (left_width as f32 * SEAM_SPAN).round().max(1.0) as u32;
    let right_span = (right_width as f32 * SEAM_SPAN).round().max(1.0) as u32;
    let start = seam_x.saturating_sub(left_span);
    let end = (seam_x + right_span).min(canvas.width());

    for x in start..end {
        let alpha = if x < seam_x {
            seam_alpha((seam_x - x) as f32 / left_span as f32)
        } else {
            seam_alpha((x - seam_x) as f32 / right_span as f32)
        };
        if alpha <= 0.0 {
            continue;
        }
        for y in 0..canvas.height() {
            let px = canvas.get_pixel_mut(x, y);
            let [r, g, b, a] = px.0;
            let keep = 1.0 - alpha;
            let out_a = alpha + (a as f32 / 255.0) * keep;
            *px = Rgba([
                (r as f32 * keep).round() as u8,
                (g as f32 * keep).round() as u8,
                (b as f32 * keep).round() as u8,
                (out_a * 255.0).round() as u8,
            ]);
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Backdrop sampling
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Right,
}

/// Pixels of the `EDGE_STRIP_PX`-wide column strip at one edge.
fn edge_pixels(img: &RgbaImage, edge: Edge) -> impl Iterator<Item = &Rgba<u8>> {
    let (w, h) = img.dimensions();
    let strip = EDGE_STRIP_PX.min(w);
    let x0 = match edge {
        Edge::Left => 0,
        Edge::Right => w - strip,
    };
    (0..h).flat_map(move |y| (x0..x0 + strip).map(move |x| img.get_pixel(x, y)))
}

/// Classify sampled pixels as mostly black, mostly white, or their average.
///
/// A class wins when it covers more than a third of the samples and
/// outnumbers the other class.
pub fn classify_edge<'a>(pixels: impl IntoIterator<Item = &'a Rgba<u8>>) -> Rgb<u8> {
    let (mut black, mut white, mut total) = (0usize, 0usize, 0usize);
    let mut sum = [0u64; 3];

    for px in pixels {
        let [r, g, b, _] = px.0;
        total += 1;
        sum[0] += r as u64;
        sum[1] += g as u64;
        sum[2] += b as u64;
        if r < BLACK_THRESHOLD && g < BLACK_THRESHOLD && b < BLACK_THRESHOLD {
            black += 1;
        } else if r > WHITE_THRESHOLD && g > WHITE_THRESHOLD && b > WHITE_THRESHOLD {
            white += 1;
        }
    }

    if total == 0 {
        return DEFAULT_BACKDROP;
    }
    if black * 3 > total && black > white {
        return Rgb([0, 0, 0]);
    }
    if white * 3 > total && white > black {
        return Rgb([255, 255, 255]);
    }
    let n = total as u64;
    Rgb([(sum[0] / n) as u8, (sum[1] / n) as u8, (sum[2] / n) as u8])
}

fn outer_edges(img: &RgbaImage) -> Rgb<u8> {
    classify_edge(edge_pixels(img, Edge::Left).chain(edge_pixels(img, Edge::Right)))
}

// ═══════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════

fn placeholder(entry: Option<&PageEntry>, page: usize) -> Surface {
    let reason = match entry {
        Some(e) if e.status == PageStatus::Failed => PlaceholderReason::Unavailable(
            e.failure()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "unavailable".to_string()),
        ),
        _ => PlaceholderReason::Loading,
    };
    Surface::Placeholder { page, reason }
}

fn render_single(
    entry: Option<&PageEntry>,
    page: usize,
    prefs: &Preferences,
) -> (Surface, Backdrop) {
    let orientation = prefs.orientation();
    let sample = prefs.auto_background && prefs.theme != Theme::Dark;

    match entry.and_then(PageEntry::image) {
        Some(PageImage::Raster(img)) => {
            let oriented = orient(img, orientation);
            let backdrop = if sample {
                Backdrop::Solid(outer_edges(&oriented))
            } else {
                Backdrop::None
            };
            (Surface::Raster(Arc::new(oriented)), backdrop)
        }
        Some(PageImage::Vector(svg)) => (
            Surface::Vector {
                image: Arc::clone(svg),
                orientation,
            },
            Backdrop::None,
        ),
        None => (placeholder(entry, page), Backdrop::None),
    }
}

fn render_pair(a: &RgbaImage, b: &RgbaImage, prefs: &Preferences) -> (Surface, Backdrop) {
    let orientation = prefs.orientation();
    let rotation = orientation.rotation;
    let (axis, reversed) = pair_arrangement(rotation);

    let a = orient(a, orientation);
    let b = orient(b, orientation);
    let (first, second) = if reversed { (&b, &a) } else { (&a, &b) };

    let ((w, h), p1, p2) = placement(first.dimensions(), second.dimensions(), axis);
    let mut canvas = RgbaImage::new(w, h);
    imageops::overlay(&mut canvas, first, p1.0, p1.1);
    imageops::overlay(&mut canvas, second, p2.0, p2.1);

    if prefs.page_shadow && rotation == Rotation::NONE {
        draw_seam_shadow(&mut canvas, first.width(), first.width(), second.width());
    }

    let backdrop = if !prefs.auto_background || prefs.theme == Theme::Dark {
        Backdrop::None
    } else {
        match axis {
            Axis::Horizontal => {
                let left = classify_edge(edge_pixels(first, Edge::Left));
                let right = classify_edge(edge_pixels(second, Edge::Right));
                if left == right {
                    Backdrop::Solid(left)
                } else {
                    Backdrop::Split { left, right }
                }
            }
            Axis::Vertical => Backdrop::Solid(classify_edge(
                edge_pixels(first, Edge::Left)
                    .chain(edge_pixels(first, Edge::Right))
                    .chain(edge_pixels(second, Edge::Left))
                    .chain(edge_pixels(second, Edge::Right)),
            )),
        }
    };

    (Surface::Raster(Arc::new(canvas)), backdrop)
}

/// Build the view for `current` from whatever the cache holds right now.
///
/// Never fails: pages that are missing, pending or failed become
/// placeholders, and an unready neighbor simply prevents pairing.
pub fn render(cache: &PageCache, current: usize, total: usize, prefs: &Preferences) -> View {
    let class_rotation = prefs.classification_rotation();
    let mut pages = select_pages(cache, current, prefs.layout, class_rotation);

    let (surface, backdrop) = match pages {
        DisplayedPages::Pair(a, b) => {
            let ea = cache.get(a);
            let eb = cache.get(b);
            let ra = ea.as_ref().and_then(PageEntry::image).and_then(PageImage::as_raster);
            let rb = eb.as_ref().and_then(PageEntry::image).and_then(PageImage::as_raster);
            match (ra, rb) {
                (Some(ra), Some(rb)) => render_pair(ra, rb, prefs),
                _ => {
                    pages = DisplayedPages::Single(current);
                    render_single(ea.as_ref(), current, prefs)
                }
            }
        }
        DisplayedPages::Single(p) => render_single(cache.get(p).as_ref(), p, prefs),
    };

    let is_spread = !pages.is_pair()
        && cache
            .ready(current)
            .map(|e| e.is_double_page_spread(class_rotation))
            .unwrap_or(false);

    debug!(
        page = current,
        shown = pages.count(),
        spread = is_spread,
        size = ?surface.dimensions(),
        "View composed"
    );

    View {
        current,
        pages,
        is_spread,
        surface,
        backdrop,
        hints: DisplayHints::from_preferences(prefs),
        progress: Progress::new(pages, total),
    }
}
