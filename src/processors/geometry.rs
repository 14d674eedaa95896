//! Contour and region geometry.
//!
//! Contours come from `imageproc`'s border following. A contour's polygon
//! runs through the centers of its border pixels, so the shoelace area of an
//! `n` x `n` solid square is `(n - 1)^2`, while its bounding rectangle spans
//! the full `n` x `n` pixels.

use crate::domain::BoundingBox;
use image::GrayImage;
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::point::Point;

/// An outermost connected region of a binary mask.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourRegion {
    /// Tight pixel rectangle around the contour.
    pub bbox: BoundingBox,
    /// Polygon area of the contour.
    pub area: f32,
}

/// Polygon area via the shoelace formula; `0.0` for fewer than three points.
pub fn polygon_area(points: &[Point<u32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut twice_area = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        twice_area += points[i].x as f64 * points[j].y as f64;
        twice_area -= points[j].x as f64 * points[i].y as f64;
    }
    (twice_area.abs() / 2.0) as f32
}

/// Tight rectangle around a set of pixel coordinates.
pub fn bounding_rect(points: &[Point<u32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut x_min, mut y_min, mut x_max, mut y_max) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        x_min = x_min.min(p.x);
        y_min = y_min.min(p.y);
        x_max = x_max.max(p.x);
        y_max = y_max.max(p.y);
    }
    BoundingBox::new(x_min, y_min, x_max + 1, y_max + 1).ok()
}

fn is_external(contour: &Contour<u32>) -> bool {
    contour.border_type == BorderType::Outer && contour.parent.is_none()
}

/// Finds the outermost contours of a binary mask in discovery order
/// (raster order of their first pixel). Holes and regions nested inside
/// holes are ignored.
pub fn external_contour_regions(mask: &GrayImage) -> Vec<ContourRegion> {
    find_contours::<u32>(mask)
        .iter()
        .filter(|contour| is_external(contour))
        .filter_map(|contour| {
            let bbox = bounding_rect(&contour.points)?;
            Some(ContourRegion {
                bbox,
                area: polygon_area(&contour.points),
            })
        })
        .collect()
}

/// Tight rectangle around the set pixels of a row-major `width` x `height`
/// boolean grid, or `None` when nothing is set.
pub fn mask_bounding_box(data: &[bool], width: u32, height: u32) -> Option<BoundingBox> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for y in 0..height {
        let row_start = (y * width) as usize;
        let Some(row) = data.get(row_start..row_start + width as usize) else {
            break;
        };
        for (x, _) in row.iter().enumerate().filter(|(_, set)| **set) {
            let x = x as u32;
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    let (x0, y0, x1, y1) = bounds?;
    BoundingBox::new(x0, y0, x1 + 1, y1 + 1).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn test_polygon_area_square() {
        let points = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert_eq!(polygon_area(&points), 100.0);
        assert_eq!(polygon_area(&points[..2]), 0.0);
    }

    #[test]
    fn test_bounding_rect_is_exclusive() {
        let points = vec![Point::new(3, 4), Point::new(7, 9)];
        assert_eq!(bounding_rect(&points).unwrap().to_tuple(), (3, 4, 8, 10));
        assert!(bounding_rect(&[]).is_none());
    }

    #[test]
    fn test_external_regions_of_two_squares() {
        let mut mask = GrayImage::new(60, 60);
        fill(&mut mask, 5, 5, 15, 15);
        fill(&mut mask, 30, 20, 50, 40);

        let regions = external_contour_regions(&mask);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bbox.to_tuple(), (5, 5, 15, 15));
        assert_eq!(regions[0].area, 81.0);
        assert_eq!(regions[1].bbox.to_tuple(), (30, 20, 50, 40));
        assert_eq!(regions[1].area, 361.0);
    }

    #[test]
    fn test_ring_yields_one_external_region() {
        let mut mask = GrayImage::new(40, 40);
        fill(&mut mask, 5, 5, 35, 35);
        for y in 10..30 {
            for x in 10..30 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        fill(&mut mask, 18, 18, 22, 22);

        let regions = external_contour_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox.to_tuple(), (5, 5, 35, 35));
    }

    #[test]
    fn test_empty_mask_has_no_regions() {
        assert!(external_contour_regions(&GrayImage::new(10, 10)).is_empty());
    }

    #[test]
    fn test_mask_bounding_box() {
        let mut data = vec![false; 5 * 4];
        data[6] = true;
        data[13] = true;
        assert_eq!(
            mask_bounding_box(&data, 5, 4).unwrap().to_tuple(),
            (1, 1, 4, 3)
        );
        assert!(mask_bounding_box(&[false; 4], 2, 2).is_none());
    }
}
