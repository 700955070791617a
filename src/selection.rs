//! Click-to-detection resolution.

use crate::model::{Bounds, Detection, DetectionId, Point};

/// Find the detection nearest to `point`, if it lies strictly within `tolerance`.
///
/// Linear scan over the view; detections without coordinates are skipped. On equal
/// distances the candidate that appears first in `view` wins.
pub fn nearest(
    view: &[(DetectionId, &Detection)],
    point: Point,
    tolerance: f64,
) -> Option<DetectionId> {
    let mut best: Option<(DetectionId, f64)> = None;
    for (id, detection) in view {
        let Some(position) = detection.position else {
            continue;
        };
        let dist = position.distance_to(&point);
        if best.is_none_or(|(_, best_dist)| dist < best_dist) {
            best = Some((*id, dist));
        }
    }
    best.filter(|(_, dist)| *dist < tolerance).map(|(id, _)| id)
}

/// Nearest-candidate selector bound to one tile's extent.
#[derive(Debug, Clone, Copy)]
pub struct SpatialSelector {
    tolerance: f64,
    bounds: Option<Bounds>,
}

impl SpatialSelector {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            bounds: None,
        }
    }

    /// Reject points outside these bounds.
    pub fn with_bounds(mut self, bounds: Option<Bounds>) -> Self {
        self.bounds = bounds;
        self
    }

    /// Resolve a point against a tile view.
    pub fn select(&self, view: &[(DetectionId, &Detection)], point: Point) -> Option<DetectionId> {
        if let Some(bounds) = self.bounds {
            if !bounds.contains(&point) {
                log::trace!("Point ({}, {}) outside tile bounds", point.x, point.y);
                return None;
            }
        }
        nearest(view, point, self.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f64, y: f64) -> Detection {
        Detection::at("T1", x, y, "boat")
    }

    #[test]
    fn test_within_tolerance() {
        let d = det(10.0, 10.0);
        let view = vec![(7, &d)];
        assert_eq!(nearest(&view, Point::new(13.0, 10.0), 5.0), Some(7));
    }

    #[test]
    fn test_outside_tolerance() {
        let d = det(10.0, 10.0);
        let view = vec![(7, &d)];
        assert_eq!(nearest(&view, Point::new(16.0, 10.0), 5.0), None);
        // Exactly at the tolerance is not a match
        assert_eq!(nearest(&view, Point::new(15.0, 10.0), 5.0), None);
    }

    #[test]
    fn test_empty_view() {
        assert_eq!(nearest(&[], Point::new(0.0, 0.0), 5.0), None);
    }

    #[test]
    fn test_exact_hit() {
        let d = det(3.0, 4.0);
        let view = vec![(1, &d)];
        assert_eq!(nearest(&view, Point::new(3.0, 4.0), 1.0), Some(1));
        assert_eq!(nearest(&view, Point::new(3.0, 4.0), 0.0), None);
    }

    #[test]
    fn test_picks_closest() {
        let far = det(0.0, 0.0);
        let near = det(9.0, 9.0);
        let view = vec![(1, &far), (2, &near)];
        assert_eq!(nearest(&view, Point::new(10.0, 10.0), 100.0), Some(2));
    }

    #[test]
    fn test_tie_goes_to_first_in_view() {
        let left = det(0.0, 0.0);
        let right = det(10.0, 0.0);
        let view = vec![(4, &left), (2, &right)];
        for _ in 0..3 {
            assert_eq!(nearest(&view, Point::new(5.0, 0.0), 10.0), Some(4));
        }
        let reversed = vec![(2, &right), (4, &left)];
        assert_eq!(nearest(&reversed, Point::new(5.0, 0.0), 10.0), Some(2));
    }

    #[test]
    fn test_skips_rows_without_coordinates() {
        let placeholder = Detection::new("T1", None, "none");
        let d = det(1.0, 1.0);
        let view = vec![(1, &placeholder), (2, &d)];
        assert_eq!(nearest(&view, Point::new(0.0, 0.0), 5.0), Some(2));
    }

    #[test]
    fn test_selector_rejects_out_of_bounds() {
        let d = det(0.0, 0.0);
        let view = vec![(1, &d)];
        let selector =
            SpatialSelector::new(5.0).with_bounds(Some(Bounds::new(0.0, 0.0, 100.0, 100.0)));
        assert_eq!(selector.select(&view, Point::new(-1.0, 0.0)), None);
        assert_eq!(selector.select(&view, Point::new(1.0, 0.0)), Some(1));
    }
}
