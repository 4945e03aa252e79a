//! Geometric primitives shared by the COCO and Labelme models.

use serde::{Deserialize, Serialize};

/// A point in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn within_bbox(&self, bbox: &BBox) -> bool {
        bbox.contains_point(self)
    }

    pub fn within_polygon(&self, polygon: &Polygon) -> bool {
        polygon.contains_point(self)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<Point2D> for (f64, f64) {
    fn from(p: Point2D) -> Self {
        (p.x, p.y)
    }
}

/// Axis-aligned bounding box stored as corner coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Build from COCO's `[x, y, width, height]`
    pub fn from_xywh(xywh: [f64; 4]) -> Self {
        let [x, y, w, h] = xywh;
        Self::new(x, y, x + w, y + h)
    }

    pub fn to_xywh(&self) -> [f64; 4] {
        [self.xmin, self.ymin, self.width(), self.height()]
    }

    /// Envelope of a point list. Returns `None` for an empty list.
    pub fn from_points(points: &[Point2D]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let (xmin, ymin, xmax, ymax) = points.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(x_min, y_min, x_max, y_max), p| {
                (x_min.min(p.x), y_min.min(p.y), x_max.max(p.x), y_max.max(p.y))
            },
        );
        Some(Self::new(xmin, ymin, xmax, ymax))
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Edges are inclusive.
    pub fn contains_point(&self, p: &Point2D) -> bool {
        p.x >= self.xmin && p.x <= self.xmax && p.y >= self.ymin && p.y <= self.ymax
    }

    pub fn contains_bbox(&self, other: &BBox) -> bool {
        other.corners().iter().all(|c| self.contains_point(c))
    }

    pub fn contains_polygon(&self, polygon: &Polygon) -> bool {
        !polygon.points.is_empty() && polygon.points.iter().all(|p| self.contains_point(p))
    }

    /// The two-corner form Labelme uses for rectangles
    pub fn to_points(&self) -> Vec<Point2D> {
        vec![
            Point2D::new(self.xmin, self.ymin),
            Point2D::new(self.xmax, self.ymax),
        ]
    }

    /// Corners in clockwise order starting at the top-left
    pub fn corners(&self) -> [Point2D; 4] {
        [
            Point2D::new(self.xmin, self.ymin),
            Point2D::new(self.xmax, self.ymin),
            Point2D::new(self.xmax, self.ymax),
            Point2D::new(self.xmin, self.ymax),
        ]
    }
}

/// A simple polygon. The closing edge from the last to the first point is implicit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub points: Vec<Point2D>,
}

impl Polygon {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    /// Build from COCO's flat `[x1, y1, x2, y2, ...]` form. A trailing odd value is ignored.
    pub fn from_flat(flat: &[f64]) -> Self {
        Self {
            points: flat
                .chunks_exact(2)
                .map(|xy| Point2D::new(xy[0], xy[1]))
                .collect(),
        }
    }

    pub fn to_flat(&self) -> Vec<f64> {
        self.points.iter().flat_map(|p| [p.x, p.y]).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.points)
    }

    /// Shoelace formula. Degenerate polygons have zero area.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() / 2.0
    }

    /// Even-odd ray casting. Points on a vertex or an edge count as inside.
    pub fn contains_point(&self, p: &Point2D) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + n - 1) % n];
            if on_segment(p, &a, &b) {
                return true;
            }
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    pub fn contains_bbox(&self, bbox: &BBox) -> bool {
        bbox.corners().iter().all(|c| self.contains_point(c))
    }

    pub fn contains_polygon(&self, other: &Polygon) -> bool {
        !other.points.is_empty() && other.points.iter().all(|p| self.contains_point(p))
    }

    pub fn within_bbox(&self, bbox: &BBox) -> bool {
        bbox.contains_polygon(self)
    }
}

fn on_segment(p: &Point2D, a: &Point2D, b: &Point2D) -> bool {
    const EPS: f64 = 1e-9;
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EPS * (1.0 + (b.x - a.x).abs() + (b.y - a.y).abs()) {
        return false;
    }
    p.x >= a.x.min(b.x) - EPS
        && p.x <= a.x.max(b.x) + EPS
        && p.y >= a.y.min(b.y) - EPS
        && p.y <= a.y.max(b.y) + EPS
}

/// A keypoint with COCO visibility: 0 unlabeled, 1 occluded, 2 visible
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint2D {
    pub point: Point2D,
    pub visibility: u8,
}

impl Keypoint2D {
    pub fn new(point: Point2D, visibility: u8) -> Self {
        Self { point, visibility }
    }

    pub fn unlabeled() -> Self {
        Self::new(Point2D::new(0.0, 0.0), 0)
    }

    pub fn is_labeled(&self) -> bool {
        self.visibility > 0
    }

    pub fn to_triplet(&self) -> [f64; 3] {
        [self.point.x, self.point.y, self.visibility as f64]
    }

    /// Decode COCO's flat `[x, y, v, ...]` list
    pub fn list_from_flat(flat: &[f64]) -> Vec<Self> {
        flat.chunks_exact(3)
            .map(|c| Self::new(Point2D::new(c[0], c[1]), c[2].max(0.0) as u8))
            .collect()
    }

    pub fn list_to_flat(keypoints: &[Self]) -> Vec<f64> {
        keypoints.iter().flat_map(|k| k.to_triplet()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon {
        Polygon::new(vec![
            Point2D::new(x0, y0),
            Point2D::new(x0 + size, y0),
            Point2D::new(x0 + size, y0 + size),
            Point2D::new(x0, y0 + size),
        ])
    }

    #[test]
    fn test_polygon_area() {
        assert_eq!(square(0.0, 0.0, 10.0).area(), 100.0);
        let triangle = Polygon::from_flat(&[0.0, 0.0, 4.0, 0.0, 0.0, 3.0]);
        assert_eq!(triangle.area(), 6.0);
        assert_eq!(Polygon::from_flat(&[0.0, 0.0, 1.0, 1.0]).area(), 0.0);
    }

    #[test]
    fn test_bbox_envelope_and_xywh() {
        let poly = Polygon::from_flat(&[10.0, 20.0, 30.0, 5.0, 15.0, 40.0]);
        let bbox = poly.to_bbox().unwrap();
        assert_eq!(bbox, BBox::new(10.0, 5.0, 30.0, 40.0));
        assert_eq!(bbox.to_xywh(), [10.0, 5.0, 20.0, 35.0]);
        assert_eq!(BBox::from_xywh([10.0, 5.0, 20.0, 35.0]), bbox);
        assert_eq!(bbox.area(), 700.0);
        assert!(BBox::from_points(&[]).is_none());
    }

    #[test]
    fn test_bbox_containment_is_inclusive() {
        let bbox = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(bbox.contains_point(&Point2D::new(10.0, 0.0)));
        assert!(!bbox.contains_point(&Point2D::new(10.1, 5.0)));
        assert!(bbox.contains_polygon(&square(0.0, 0.0, 10.0)));
        assert!(!bbox.contains_polygon(&square(5.0, 5.0, 10.0)));
        assert!(bbox.contains_bbox(&BBox::new(2.0, 2.0, 8.0, 8.0)));
    }

    #[test]
    fn test_point_in_concave_polygon() {
        // U shape open at the top
        let u = Polygon::from_flat(&[
            0.0, 0.0, 3.0, 0.0, 3.0, 3.0, 2.0, 3.0, 2.0, 1.0, 1.0, 1.0, 1.0, 3.0, 0.0, 3.0,
        ]);
        assert!(u.contains_point(&Point2D::new(0.5, 2.0)));
        assert!(u.contains_point(&Point2D::new(2.5, 2.0)));
        assert!(!u.contains_point(&Point2D::new(1.5, 2.0)));
        assert!(u.contains_point(&Point2D::new(1.5, 1.0)));
        assert!(!u.contains_point(&Point2D::new(4.0, 1.0)));
    }

    #[test]
    fn test_polygon_contains_bbox() {
        let poly = square(0.0, 0.0, 10.0);
        assert!(poly.contains_bbox(&BBox::new(0.0, 0.0, 10.0, 10.0)));
        assert!(!poly.contains_bbox(&BBox::new(5.0, 5.0, 11.0, 9.0)));
    }

    #[test]
    fn test_keypoint_flat_conversion() {
        let flat = [1.0, 2.0, 2.0, 0.0, 0.0, 0.0, 5.0, 6.0, 1.0];
        let kpts = Keypoint2D::list_from_flat(&flat);
        assert_eq!(kpts.len(), 3);
        assert!(kpts[0].is_labeled());
        assert!(!kpts[1].is_labeled());
        assert_eq!(kpts[2].visibility, 1);
        assert_eq!(Keypoint2D::list_to_flat(&kpts), flat.to_vec());
    }
}
