//! Greedy non-maximum suppression over float boxes.

use std::cmp::Ordering;

/// A model-space detection `[x1, y1, x2, y2]` with its confidence and class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

impl ScoredBox {
    /// Builds a box from center coordinates and size.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32, score: f32, class_id: usize) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            score,
            class_id,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &ScoredBox) -> f32 {
        let iw = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let ih = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = iw * ih;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// Greedy NMS. Returns the indices of the kept boxes in descending score
/// order; a box is dropped when its IoU with an already kept box of the same
/// class exceeds `iou_threshold`. Equal scores keep their input order.
pub fn non_max_suppression(boxes: &[ScoredBox], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .score
            .partial_cmp(&boxes[a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<usize> = Vec::with_capacity(boxes.len());
    for idx in order {
        let candidate = &boxes[idx];
        let suppressed = kept.iter().any(|&k| {
            boxes[k].class_id == candidate.class_id && boxes[k].iou(candidate) > iou_threshold
        });
        if !suppressed {
            kept.push(idx);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> ScoredBox {
        ScoredBox {
            x1,
            y1,
            x2,
            y2,
            score,
            class_id,
        }
    }

    #[test]
    fn test_overlapping_boxes_are_suppressed() {
        let boxes = vec![
            b(0.0, 0.0, 10.0, 10.0, 0.8, 0),
            b(1.0, 1.0, 11.0, 11.0, 0.9, 0),
            b(50.0, 50.0, 60.0, 60.0, 0.5, 0),
        ];
        let kept = non_max_suppression(&boxes, 0.45);
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn test_other_classes_are_not_suppressed() {
        let boxes = vec![
            b(0.0, 0.0, 10.0, 10.0, 0.9, 0),
            b(0.0, 0.0, 10.0, 10.0, 0.8, 1),
        ];
        assert_eq!(non_max_suppression(&boxes, 0.45), vec![0, 1]);
    }

    #[test]
    fn test_from_center() {
        let sb = ScoredBox::from_center(10.0, 20.0, 4.0, 6.0, 1.0, 0);
        assert_eq!((sb.x1, sb.y1, sb.x2, sb.y2), (8.0, 17.0, 12.0, 23.0));
        assert_eq!(sb.area(), 24.0);
    }
}
