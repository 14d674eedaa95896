//! Image processing building blocks used by the detection strategies.
//!
//! - [`color`]: RGB to HSV conversion and range masks
//! - [`morphology`]: closing and opening with square kernels
//! - [`geometry`]: external contours, polygon areas, tight rectangles
//! - [`nms`]: non-maximum suppression for model outputs
//! - [`resize`]: model input preparation

pub mod color;
pub mod geometry;
pub mod morphology;
pub mod nms;
pub mod resize;

pub use color::{Hsv, HsvRange, hsv_range_mask, rgb_to_hsv};
pub use geometry::{ContourRegion, external_contour_regions, mask_bounding_box, polygon_area};
pub use morphology::{close, kernel_radius, open};
pub use nms::{ScoredBox, non_max_suppression};
pub use resize::{InputTransform, ResizeMode, fit_to_input, to_nchw_tensor};
