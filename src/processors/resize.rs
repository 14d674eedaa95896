//! Model input preparation: resizing pages to the network size and mapping
//! model coordinates back to page pixels.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Gray used to pad letterboxed inputs.
const LETTERBOX_FILL: u8 = 114;

/// How a page is fitted into the square model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Scale each axis independently to the input size.
    Stretch,
    /// Keep the aspect ratio and pad the rest with gray.
    #[default]
    Letterbox,
}

/// Maps model input coordinates back to page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl InputTransform {
    /// Page x for a model-space x.
    #[inline]
    pub fn page_x(&self, x: f32) -> f32 {
        (x - self.pad_x) / self.scale_x
    }

    /// Page y for a model-space y.
    #[inline]
    pub fn page_y(&self, y: f32) -> f32 {
        (y - self.pad_y) / self.scale_y
    }
}

/// Resizes `image` into an `input_size` x `input_size` canvas.
pub fn fit_to_input(
    image: &RgbImage,
    input_size: u32,
    mode: ResizeMode,
) -> (RgbImage, InputTransform) {
    let (width, height) = image.dimensions();
    match mode {
        ResizeMode::Stretch => {
            let resized = imageops::resize(image, input_size, input_size, FilterType::Triangle);
            let transform = InputTransform {
                scale_x: input_size as f32 / width as f32,
                scale_y: input_size as f32 / height as f32,
                pad_x: 0.0,
                pad_y: 0.0,
            };
            (resized, transform)
        }
        ResizeMode::Letterbox => {
            let scale = (input_size as f32 / width as f32).min(input_size as f32 / height as f32);
            let new_w = ((width as f32 * scale).round() as u32).clamp(1, input_size);
            let new_h = ((height as f32 * scale).round() as u32).clamp(1, input_size);
            let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

            let pad_x = (input_size - new_w) / 2;
            let pad_y = (input_size - new_h) / 2;
            let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([LETTERBOX_FILL; 3]));
            imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

            let transform = InputTransform {
                scale_x: new_w as f32 / width as f32,
                scale_y: new_h as f32 / height as f32,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            };
            (canvas, transform)
        }
    }
}

/// Converts an RGB image to a `[1, 3, H, W]` tensor scaled to `[0, 1]`.
pub fn to_nchw_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel.0[c] as f32 / 255.0;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        let page = RgbImage::new(200, 100);
        let (canvas, transform) = fit_to_input(&page, 64, ResizeMode::Letterbox);
        assert_eq!(canvas.dimensions(), (64, 64));
        assert_eq!(transform.pad_x, 0.0);
        assert_eq!(transform.pad_y, 16.0);
        assert!((transform.page_x(64.0) - 200.0).abs() < 1e-3);
        assert!((transform.page_y(48.0) - 100.0).abs() < 1e-3);
        assert_eq!(canvas.get_pixel(0, 0).0, [LETTERBOX_FILL; 3]);
    }

    #[test]
    fn test_stretch_maps_corners() {
        let page = RgbImage::new(300, 150);
        let (canvas, transform) = fit_to_input(&page, 30, ResizeMode::Stretch);
        assert_eq!(canvas.dimensions(), (30, 30));
        assert!((transform.page_x(30.0) - 300.0).abs() < 1e-3);
        assert!((transform.page_y(15.0) - 75.0).abs() < 1e-3);
    }

    #[test]
    fn test_nchw_layout() {
        let mut page = RgbImage::new(2, 1);
        page.put_pixel(1, 0, Rgb([255, 0, 51]));
        let tensor = to_nchw_tensor(&page);
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert_eq!(tensor[[0, 0, 0, 1]], 1.0);
        assert!((tensor[[0, 2, 0, 1]] - 0.2).abs() < 1e-6);
    }
}
