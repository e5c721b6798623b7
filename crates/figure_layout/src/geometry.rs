//! Rendered element geometry as reported by the layout probe.

use serde::{Deserialize, Serialize};

/// A point in canvas coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Axis-aligned box in canvas coordinates (y grows downwards).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    /// Construct a box from its four edges.
    #[inline]
    #[must_use]
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Point {
        Point {
            x: (self.left + self.right) / 2.0,
            y: (self.top + self.bottom) / 2.0,
        }
    }

    /// Top-left corner, used as the reported position of a label.
    #[inline]
    #[must_use]
    pub const fn origin(&self) -> Point {
        Point {
            x: self.left,
            y: self.top,
        }
    }

    /// Inclusive containment test.
    #[inline]
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.top && point.y <= self.bottom
    }

    /// Signed overlap along each axis: `min(right) - max(left)` and
    /// `min(bottom) - max(top)`. Negative values are gaps.
    #[inline]
    #[must_use]
    pub fn overlap_extent(&self, other: &Self) -> (f64, f64) {
        let ox = self.right.min(other.right) - self.left.max(other.left);
        let oy = self.bottom.min(other.bottom) - self.top.max(other.top);
        (ox, oy)
    }
}

/// A text-bearing element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementGeometry {
    pub label: String,
    #[serde(rename = "box")]
    pub bounds: BoundingBox,
    /// Author-declared intentional overlap; excluded from pairwise checks.
    #[serde(default)]
    pub opt_out: bool,
}

/// A shape that may visually contain text (rects, filled paths).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerGeometry {
    pub label: String,
    #[serde(rename = "box")]
    pub bounds: BoundingBox,
    #[serde(default)]
    pub opt_out: bool,
    /// Whether the shape paints a visible fill.
    #[serde(default)]
    pub filled: bool,
}

/// Declared drawing surface size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
}

/// Everything a single analyzer pass looks at.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub canvas: Canvas,
    #[serde(default)]
    pub texts: Vec<ElementGeometry>,
    #[serde(default)]
    pub containers: Vec<ContainerGeometry>,
}
