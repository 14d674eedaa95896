//! Binary morphology with square structuring elements.

use crate::core::errors::{StampError, StampResult};
use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// Chebyshev radius of an odd square kernel (`5` -> `2`).
pub fn kernel_radius(kernel_size: u32) -> StampResult<u8> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(StampError::config_error(format!(
            "kernel size must be a positive odd number, got {kernel_size}"
        )));
    }
    u8::try_from(kernel_size / 2).map_err(|_| {
        StampError::config_error(format!("kernel size {kernel_size} is too large"))
    })
}

/// Dilates `iterations` times, then erodes `iterations` times.
pub fn close(mask: &GrayImage, radius: u8, iterations: u32) -> GrayImage {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = morphology::dilate(&out, Norm::LInf, radius);
    }
    for _ in 0..iterations {
        out = morphology::erode(&out, Norm::LInf, radius);
    }
    out
}

/// Erodes `iterations` times, then dilates `iterations` times.
pub fn open(mask: &GrayImage, radius: u8, iterations: u32) -> GrayImage {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = morphology::erode(&out, Norm::LInf, radius);
    }
    for _ in 0..iterations {
        out = morphology::dilate(&out, Norm::LInf, radius);
    }
    out
}
