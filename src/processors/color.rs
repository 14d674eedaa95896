//! Color space conversion and range masking.
//!
//! HSV values follow the 8-bit convention used by common vision libraries:
//! hue is stored as degrees / 2 in `[0, 180)`, saturation and value in
//! `[0, 255]`. Pure blue is therefore `(120, 255, 255)`.

use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

/// Mask value for pixels inside the range.
pub const MASK_ON: u8 = 255;

/// An 8-bit HSV triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

/// Converts one RGB pixel to HSV.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 {
        (delta * 255.0 / max).round()
    } else {
        0.0
    };

    let h = if delta == 0.0 {
        0.0
    } else {
        let degrees = if max == rf {
            60.0 * (gf - bf) / delta
        } else if max == gf {
            120.0 + 60.0 * (bf - rf) / delta
        } else {
            240.0 + 60.0 * (rf - gf) / delta
        };
        let degrees = if degrees < 0.0 {
            degrees + 360.0
        } else {
            degrees
        };
        let half = (degrees / 2.0).round();
        if half >= 180.0 { 0.0 } else { half }
    };

    Hsv {
        h: h as u8,
        s: s as u8,
        v: max as u8,
    }
}

/// Inclusive bounds on each HSV channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub hue: (u8, u8),
    pub saturation: (u8, u8),
    pub value: (u8, u8),
}

impl HsvRange {
    /// Whether a pixel lies inside all three bounds.
    #[inline]
    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.hue.0..=self.hue.1).contains(&hsv.h)
            && (self.saturation.0..=self.saturation.1).contains(&hsv.s)
            && (self.value.0..=self.value.1).contains(&hsv.v)
    }
}

impl Default for HsvRange {
    /// The blue ink band.
    fn default() -> Self {
        Self {
            hue: (90, 140),
            saturation: (50, 255),
            value: (50, 255),
        }
    }
}

/// Builds a binary mask (`0` / [`MASK_ON`]) of the pixels inside `range`.
pub fn hsv_range_mask(image: &RgbImage, range: &HsvRange) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        if range.contains(rgb_to_hsv(r, g, b)) {
            mask.put_pixel(x, y, Luma([MASK_ON]));
        }
    }
    mask
}
