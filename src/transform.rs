//! Transform pipeline: raw page bitmap -> oriented bitmap.
//!
//! Flips are applied in the source's own coordinate space and the
//! quarter-turn rotation is applied last, so a horizontally flipped page
//! rotated by 90° is the mirror image of the page *before* it was turned.
//! Output dimensions are swapped for odd rotations.
//!
//! Pure and deterministic: the same source and parameters always produce a
//! pixel-identical surface.

use image::imageops;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Rotation
// ═══════════════════════════════════════════════════════════

/// Clockwise quarter turns, always in `0..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rotation(u8);

impl Rotation {
    pub const NONE: Rotation = Rotation(0);
    pub const QUARTER: Rotation = Rotation(1);
    pub const HALF: Rotation = Rotation(2);
    pub const THREE_QUARTERS: Rotation = Rotation(3);

    /// Normalize any number of quarter turns (negative allowed) into `0..=3`.
    pub fn from_quarter_turns(turns: i64) -> Self {
        Rotation(turns.rem_euclid(4) as u8)
    }

    pub fn quarter_turns(self) -> u8 {
        self.0
    }

    /// Odd rotations swap the width and height axes.
    pub fn is_odd(self) -> bool {
        self.0 % 2 == 1
    }

    pub fn clockwise(self) -> Self {
        Rotation((self.0 + 1) % 4)
    }

    pub fn counter_clockwise(self) -> Self {
        Rotation((self.0 + 3) % 4)
    }

    /// The rotation that undoes this one.
    pub fn inverse(self) -> Self {
        Rotation((4 - self.0) % 4)
    }

    /// Dimensions of a `width x height` source after this rotation.
    pub fn oriented_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.is_odd() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

impl TryFrom<u8> for Rotation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < 4 {
            Ok(Rotation(value))
        } else {
            Err(format!("rotation must be 0..=3 quarter turns, got {value}"))
        }
    }
}

impl From<Rotation> for u8 {
    fn from(rotation: Rotation) -> Self {
        rotation.0
    }
}

// ═══════════════════════════════════════════════════════════
// Orientation
// ═══════════════════════════════════════════════════════════

/// Orientation parameters applied to every page of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Orientation {
    pub rotation: Rotation,
    pub hflip: bool,
    pub vflip: bool,
}

impl Orientation {
    pub fn new(rotation: Rotation, hflip: bool, vflip: bool) -> Self {
        Self {
            rotation,
            hflip,
            vflip,
        }
    }
}

/// Produce a new oriented surface from `source`.
pub fn orient(source: &RgbaImage, orientation: Orientation) -> RgbaImage {
    let mut working = match (orientation.hflip, orientation.vflip) {
        (false, false) => source.clone(),
        (true, false) => imageops::flip_horizontal(source),
        (false, true) => imageops::flip_vertical(source),
        // Both flips together are a half turn.
        (true, true) => imageops::rotate180(source),
    };

    working = match orientation.rotation.quarter_turns() {
        1 => imageops::rotate90(&working),
        2 => imageops::rotate180(&working),
        3 => imageops::rotate270(&working),
        _ => working,
    };

    working
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// 3x2 image, red top-left pixel, everything else blue.
    fn marked_image() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(3, 2, BLUE);
        img.put_pixel(0, 0, RED);
        img
    }

    fn red_position(img: &RgbaImage) -> (u32, u32) {
        img.enumerate_pixels()
            .find(|(_, _, p)| **p == RED)
            .map(|(x, y, _)| (x, y))
            .unwrap()
    }

    #[test]
    fn rotation_normalizes_turns() {
        assert_eq!(Rotation::from_quarter_turns(5), Rotation::QUARTER);
        assert_eq!(Rotation::from_quarter_turns(-1), Rotation::THREE_QUARTERS);
        assert_eq!(Rotation::from_quarter_turns(8), Rotation::NONE);
    }

    #[test]
    fn clockwise_and_counter_clockwise_wrap() {
        assert_eq!(Rotation::THREE_QUARTERS.clockwise(), Rotation::NONE);
        assert_eq!(Rotation::NONE.counter_clockwise(), Rotation::THREE_QUARTERS);
    }

    #[test]
    fn rotation_rejects_out_of_range() {
        assert!(Rotation::try_from(4).is_err());
        assert!(serde_json::from_str::<Rotation>("7").is_err());
        assert_eq!(serde_json::from_str::<Rotation>("2").unwrap(), Rotation::HALF);
    }

    #[test]
    fn identity_is_a_copy() {
        let img = marked_image();
        let out = orient(&img, Orientation::default());
        assert_eq!(out, img);
    }

    #[test]
    fn odd_rotation_swaps_dimensions() {
        let img = marked_image();
        for turns in 0..4 {
            let rotation = Rotation::from_quarter_turns(turns);
            let out = orient(&img, Orientation::new(rotation, false, false));
            assert_eq!(out.dimensions(), rotation.oriented_dimensions(3, 2));
        }
    }

    #[test]
    fn quarter_turn_is_clockwise() {
        let out = orient(&marked_image(), Orientation::new(Rotation::QUARTER, false, false));
        // Top-left goes to top-right on a clockwise turn.
        assert_eq!(red_position(&out), (1, 0));
    }

    #[test]
    fn flips_move_marker() {
        let h = orient(&marked_image(), Orientation::new(Rotation::NONE, true, false));
        assert_eq!(red_position(&h), (2, 0));

        let v = orient(&marked_image(), Orientation::new(Rotation::NONE, false, true));
        assert_eq!(red_position(&v), (0, 1));

        let both = orient(&marked_image(), Orientation::new(Rotation::NONE, true, true));
        assert_eq!(red_position(&both), (2, 1));
    }

    #[test]
    fn flip_applies_before_rotation() {
        // hflip moves the marker to (2,0); a clockwise turn of the 3x2 image
        // sends (2,0) to (1,2).
        let out = orient(&marked_image(), Orientation::new(Rotation::QUARTER, true, false));
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(red_position(&out), (1, 2));
    }

    #[test]
    fn rotation_then_inverse_restores_image() {
        let img = marked_image();
        for turns in 0..4 {
            let rotation = Rotation::from_quarter_turns(turns);
            let once = orient(&img, Orientation::new(rotation, false, false));
            let back = orient(&once, Orientation::new(rotation.inverse(), false, false));
            assert_eq!(back.dimensions(), img.dimensions());
            assert_eq!(back, img);
        }
    }

    #[test]
    fn orient_is_deterministic() {
        let img = marked_image();
        let o = Orientation::new(Rotation::THREE_QUARTERS, true, true);
        assert_eq!(orient(&img, o), orient(&img, o));
    }
}
