//! Page-local rectangles

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page coordinates: origin plus size
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Coordinate-for-coordinate equality
    pub fn same_as(&self, other: &Bounds) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
    }

    /// Whether `query` lands inside these bounds.
    ///
    /// The query's origin must fall within this rectangle and its size must
    /// not exceed ours. The query's far edge is not checked, so a query that
    /// starts near our right edge can extend past it and still match. A
    /// single-line tap resolves to its multi-line parent this way.
    pub fn encloses(&self, query: &Bounds) -> bool {
        self.x <= query.x
            && self.right() >= query.x
            && self.y <= query.y
            && self.bottom() >= query.y
            && self.width >= query.width
            && self.height >= query.height
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}
