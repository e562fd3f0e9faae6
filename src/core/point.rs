//! Coordinate types for the overlay grid and the floor-plan plane.

use serde::{Deserialize, Serialize};

/// Grid coordinates (cell indices into an overlay or mask grid).
///
/// `row` counts down from the top edge of the floor plan, `col` counts
/// right from the left edge. Cell (row, col) covers one cell-size square
/// whose center sits at `(row + 0.5, col + 0.5)` cell units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridCoord {
    /// Row index (top-down)
    pub row: usize,
    /// Column index (left-right)
    pub col: usize,
}

impl GridCoord {
    /// Create a new grid coordinate
    #[inline]
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Center of this cell in cell units, top-down frame
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (self.row as f64 + 0.5, self.col as f64 + 0.5)
    }
}

/// Planar floor-plan coordinates in meters.
///
/// `x` is measured from the left edge, `y` from the bottom edge, matching
/// the coordinate frame the scanning fixes arrive in.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanPoint {
    /// Meters from the left edge
    pub x: f64,
    /// Meters from the bottom edge
    pub y: f64,
}

impl PlanPoint {
    /// Create a new plan point
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another plan point
    #[inline]
    pub fn distance(&self, other: &PlanPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Both components are finite numbers
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}
