// ============================================================================
// Geometry - Normalized frame coordinates
// ============================================================================
//
// All positions live in normalized frame units: (0, 0) is the top-left corner,
// (1, 1) the bottom-right. Velocities are in frame units per second.

use serde::{Deserialize, Serialize};

/// A point (or 2D vector) in normalized frame units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Frame center
    pub const fn center() -> Self {
        Self { x: 0.5, y: 0.5 }
    }

    pub fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(self, factor: f32) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Point) -> f32 {
        self.sub(other).length()
    }

    /// Clamp both coordinates into the frame
    pub fn clamp_to_frame(self) -> Point {
        Point::new(self.x.clamp(0.0, 1.0), self.y.clamp(0.0, 1.0))
    }
}

/// Normalized bounding box (x, y, width, height), each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    /// Create a bounding box, clamped so that it stays inside the frame
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        let x = x.clamp(0.0, 1.0);
        let y = y.clamp(0.0, 1.0);
        Self {
            x,
            y,
            width: width.clamp(0.0, 1.0 - x),
            height: height.clamp(0.0, 1.0 - y),
        }
    }

    /// Build from corner coordinates (x_min, y_min, x_max, y_max)
    pub fn from_corners(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        let (x0, x1) = if x_min <= x_max { (x_min, x_max) } else { (x_max, x_min) };
        let (y0, y1) = if y_min <= y_max { (y_min, y_max) } else { (y_max, y_min) };
        let x0 = x0.clamp(0.0, 1.0);
        let y0 = y0.clamp(0.0, 1.0);
        Self::new(x0, y0, x1.clamp(0.0, 1.0) - x0, y1.clamp(0.0, 1.0) - y0)
    }

    /// Clamp an externally built box into the frame; `None` when a
    /// coordinate is not finite or nothing of it remains inside the frame
    pub fn sanitized(&self) -> Option<BBox> {
        if ![self.x, self.y, self.width, self.height].iter().all(|v| v.is_finite()) {
            return None;
        }
        let (x0, y0) = (self.x.max(0.0), self.y.max(0.0));
        let bbox = BBox::from_corners(x0, y0, self.x + self.width, self.y + self.height);
        (bbox.area() > 0.0).then_some(bbox)
    }

    /// Box of the same size centered on `center`, shifted to stay in frame
    pub fn centered_at(center: Point, width: f32, height: f32) -> Self {
        let width = width.clamp(0.0, 1.0);
        let height = height.clamp(0.0, 1.0);
        let x = (center.x - width / 2.0).clamp(0.0, 1.0 - width);
        let y = (center.y - height / 2.0).clamp(0.0, 1.0 - height);
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// True when every coordinate is a finite value inside [0, 1]
    pub fn is_within_frame(&self) -> bool {
        let values = [self.x, self.y, self.width, self.height];
        values.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v))
            && self.x + self.width <= 1.0 + f32::EPSILON
            && self.y + self.height <= 1.0 + f32::EPSILON
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BBox) -> f32 {
        let x_a = self.x.max(other.x);
        let y_a = self.y.max(other.y);
        let x_b = (self.x + self.width).min(other.x + other.width);
        let y_b = (self.y + self.height).min(other.y + other.height);

        let inter = (x_b - x_a).max(0.0) * (y_b - y_a).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}
