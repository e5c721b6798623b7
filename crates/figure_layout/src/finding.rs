//! Classified layout defects.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Canvas or container edge a violation was measured against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }

    /// Pick the edge with the largest violation. Ties keep the earlier edge
    /// in left, right, top, bottom order.
    #[must_use]
    pub fn worst(left: f64, right: f64, top: f64, bottom: f64) -> (Self, f64) {
        let mut worst = (Self::Left, left);
        for candidate in [(Self::Right, right), (Self::Top, top), (Self::Bottom, bottom)] {
            if candidate.1 > worst.1 {
                worst = candidate;
            }
        }
        worst
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Two labels whose boxes intersect on both axes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlap {
    pub a: String,
    pub b: String,
    pub overlap_width: f64,
    pub overlap_height: f64,
    pub positions: [Point; 2],
}

impl Overlap {
    /// Severity used for ordering: the intersected area.
    #[inline]
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        self.overlap_width * self.overlap_height
    }
}

/// Two labels that do not overlap but sit closer than the minimum gap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TooClose {
    pub a: String,
    pub b: String,
    pub gap_width: f64,
    pub gap_height: f64,
    pub positions: [Point; 2],
}

impl TooClose {
    /// The larger of the two axis gaps.
    #[inline]
    #[must_use]
    pub fn gap(&self) -> f64 {
        self.gap_width.max(self.gap_height)
    }
}

/// A label extending past the canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clipped {
    pub label: String,
    pub edge: Edge,
    pub overflow_amount: f64,
}

/// A label spilling out of the container shape it sits in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxOverflow {
    pub label: String,
    pub edge: Edge,
    pub overflow_amount: f64,
    pub position: Point,
}

/// Tagged view over every finding category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Finding {
    Overlap(Overlap),
    TooClose(TooClose),
    Clipped(Clipped),
    BoxOverflow(BoxOverflow),
}

impl Finding {
    /// Labels involved in this finding.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        match self {
            Self::Overlap(found) => vec![found.a.as_str(), found.b.as_str()],
            Self::TooClose(found) => vec![found.a.as_str(), found.b.as_str()],
            Self::Clipped(found) => vec![found.label.as_str()],
            Self::BoxOverflow(found) => vec![found.label.as_str()],
        }
    }
}
