//! Bounding box based image cropping utilities.

use crate::core::errors::{StampError, StampResult};
use crate::domain::BoundingBox;
use image::{RgbImage, imageops};

/// A crop together with the box it was actually taken from.
#[derive(Debug, Clone)]
pub struct CropOutcome {
    /// The cropped pixels.
    pub image: RgbImage,
    /// The box after clamping to the source image.
    pub bbox: BoundingBox,
    /// Whether clamping changed the requested box.
    pub clamped: bool,
}

/// Bounding box based image cropping utilities.
pub struct BBoxCrop;

impl BBoxCrop {
    /// Crops an image to a bounding box.
    ///
    /// The box is clamped to the image first, so the crop never reads out of
    /// range. The crop measures exactly `(x_max - x_min, y_max - y_min)` of the
    /// clamped box. A box lying entirely outside the image is an error.
    pub fn crop_bounding_box(image: &RgbImage, bbox: &BoundingBox) -> StampResult<CropOutcome> {
        let (width, height) = image.dimensions();
        let (clamped_box, clamped) = bbox.clamp_to(width, height).ok_or_else(|| {
            StampError::invalid_input(format!(
                "crop region {bbox} lies outside the {width}x{height} image"
            ))
        })?;
        if clamped {
            tracing::debug!(requested = %bbox, clamped = %clamped_box, "crop region clamped to image");
        }
        Ok(CropOutcome {
            image: Self::slice_rgb_image(image, &clamped_box),
            bbox: clamped_box,
            clamped,
        })
    }

    fn slice_rgb_image(img: &RgbImage, bbox: &BoundingBox) -> RgbImage {
        imageops::crop_imm(img, bbox.x_min(), bbox.y_min(), bbox.width(), bbox.height()).to_image()
    }

    /// Crops several boxes from the same image, preserving their order.
    pub fn batch_crop_bounding_boxes(
        image: &RgbImage,
        bboxes: &[BoundingBox],
    ) -> Vec<StampResult<CropOutcome>> {
        bboxes
            .iter()
            .map(|bbox| Self::crop_bounding_box(image, bbox))
            .collect()
    }
}
