//! Input validation shared by the engine and the strategies.

use crate::core::errors::{StampError, StampResult};
use image::RgbImage;

/// Rejects pages that cannot be analyzed.
///
/// A page is unusable when it has zero width or height, or when its pixel
/// buffer is shorter than its declared dimensions.
pub fn validate_page(page: &RgbImage) -> StampResult<()> {
    let (width, height) = page.dimensions();
    if width == 0 || height == 0 {
        return Err(StampError::invalid_input(format!(
            "page has zero area ({width}x{height})"
        )));
    }
    let expected = width as usize * height as usize * 3;
    if page.as_raw().len() < expected {
        return Err(StampError::invalid_input(format!(
            "page buffer holds {} bytes, expected {expected}",
            page.as_raw().len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sized_page_rejected() {
        assert!(validate_page(&RgbImage::new(0, 10)).is_err());
        assert!(validate_page(&RgbImage::new(10, 0)).is_err());
    }

    #[test]
    fn test_regular_page_accepted() {
        assert!(validate_page(&RgbImage::new(4, 4)).is_ok());
    }
}
