//! Floor-plan metadata and per-floor grid geometry.
//!
//! A [`FloorPlan`] is the immutable record pulled from the dashboard
//! collaborator: physical size, geodetic center and rotation, raster
//! dimensions. A [`Floor`] wraps one floor plan with the mutable model
//! state layered on top: overlay grid shape, the leftover margins between
//! grid and plan extents, and the boundary mask.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::boundary::{downsample_mask, BlindSpot, BoundaryDetector, BoundaryError, Raster};
use crate::core::{meters_per_degree_lat, meters_per_degree_lng, DenseGrid, GeoPoint, PlanPoint};

/// Fixed overlay cell size in meters. One cell covers 1 m².
pub const CELL_SIZE_M: f64 = 1.0;

/// Shortest acceptable floor-plan side in meters.
pub const MIN_SIDE_M: f64 = 0.5;

/// Floor-plan construction and transform errors.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("floor plan {name}: sides h={height:.2}m w={width:.2}m below minimum {MIN_SIDE_M}m")]
    SideTooShort {
        name: String,
        height: f64,
        width: f64,
    },

    #[error("floor plan {0}: non-finite geodetic coordinate")]
    NonFiniteCoordinate(String),
}

/// Immutable floor-plan record.
///
/// Rotation is derived from the two reference corner points the dashboard
/// supplies; the raster image is attached lazily once the collaborator has
/// fetched and checksummed it.
#[derive(Clone, Debug)]
pub struct FloorPlan {
    /// Dashboard floor-plan id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Geodetic center of the plan
    pub center: GeoPoint,
    /// Physical height in meters (vertical extent of the raster)
    pub height_m: f64,
    /// Physical width in meters
    pub width_m: f64,
    /// Rotation of the plan against true north, degrees in [0, 360)
    pub rotation_deg: f64,
    /// Raster height in pixels
    pub image_height_px: usize,
    /// Raster width in pixels
    pub image_width_px: usize,
    /// Content checksum of the raster, for the image cache collaborator
    pub image_checksum: String,
    image: Option<Raster>,
}

impl FloorPlan {
    /// Build a floor plan from dashboard metadata.
    ///
    /// Fails when either side is shorter than [`MIN_SIDE_M`] or a corner
    /// coordinate is not a finite number.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        center: GeoPoint,
        height_m: f64,
        width_m: f64,
        top_left: GeoPoint,
        top_right: GeoPoint,
        image_height_px: usize,
        image_width_px: usize,
        image_checksum: impl Into<String>,
    ) -> Result<Self, PlanError> {
        let name = name.into();
        if height_m < MIN_SIDE_M || width_m < MIN_SIDE_M {
            return Err(PlanError::SideTooShort {
                name,
                height: height_m,
                width: width_m,
            });
        }
        if !center.is_finite() || !top_left.is_finite() || !top_right.is_finite() {
            return Err(PlanError::NonFiniteCoordinate(name));
        }

        let rotation_deg = rotation_from_corners(top_left, top_right);
        // Dashboard reports sides with centimeter precision
        let height_m = (height_m * 100.0).round() / 100.0;
        let width_m = (width_m * 100.0).round() / 100.0;

        Ok(Self {
            id: id.into(),
            name,
            center,
            height_m,
            width_m,
            rotation_deg,
            image_height_px,
            image_width_px,
            image_checksum: image_checksum.into(),
            image: None,
        })
    }

    /// Raster pixels per meter along the width axis
    #[inline]
    pub fn px_per_m_w(&self) -> f64 {
        self.image_width_px as f64 / self.width_m
    }

    /// Raster pixels per meter along the height axis
    #[inline]
    pub fn px_per_m_h(&self) -> f64 {
        self.image_height_px as f64 / self.height_m
    }

    /// Attach the fetched raster image
    pub fn attach_image(&mut self, raster: Raster) {
        self.image = Some(raster);
    }

    /// The attached raster, if fetched
    #[inline]
    pub fn image(&self) -> Option<&Raster> {
        self.image.as_ref()
    }

    /// Convert a geodetic fix to planar floor-plan meters.
    ///
    /// Degree deltas from the plan center are scaled by the local
    /// meters-per-degree series, rotated by the plan rotation, then
    /// re-origined to the lower-left corner: `x` from the left edge,
    /// `y` from the bottom edge.
    pub fn plan_point_from_geo(&self, point: GeoPoint) -> Result<PlanPoint, PlanError> {
        if !point.is_finite() {
            return Err(PlanError::NonFiniteCoordinate(self.name.clone()));
        }

        let x0 = (point.lng - self.center.lng) * meters_per_degree_lng(self.center.lat);
        let y0 = (point.lat - self.center.lat) * meters_per_degree_lat(self.center.lat);

        let rot = self.rotation_deg.to_radians();
        let (sin, cos) = rot.sin_cos();
        let xc = x0 * cos - y0 * sin;
        let yc = x0 * sin + y0 * cos;

        Ok(PlanPoint::new(
            xc + 0.5 * self.width_m,
            yc + 0.5 * self.height_m,
        ))
    }
}

/// Rotation in degrees from the top-left and top-right corner geodetic
/// points. A vertical top edge degenerates to 90 or 270 depending on which
/// corner sits further north.
pub fn rotation_from_corners(top_left: GeoPoint, top_right: GeoPoint) -> f64 {
    if top_right.lng == top_left.lng {
        if top_left.lat < top_right.lat {
            90.0
        } else {
            270.0
        }
    } else {
        let slope = (top_right.lat - top_left.lat) / (top_right.lng - top_left.lng);
        slope.atan().to_degrees().rem_euclid(360.0)
    }
}

/// One floor of the model: a floor plan plus overlay geometry and the
/// boundary mask layered on top of it.
#[derive(Clone, Debug)]
pub struct Floor {
    /// The underlying floor plan
    pub plan: FloorPlan,
    grid_rows: usize,
    grid_cols: usize,
    margin_m: (f64, f64),
    /// Pixel-level outside mask from the last boundary run, for preview
    /// rendering. `None` until boundary detection has run.
    pixel_mask: Option<DenseGrid<bool>>,
    /// Grid-level outside mask; all-indoor until detection runs
    mask: DenseGrid<bool>,
    /// Whether boundary masking is enabled for this floor
    pub mask_enabled: bool,
    /// Blind-spot boxes last applied, kept for config round-trip
    pub blind_spots: Vec<BlindSpot>,
}

impl Floor {
    /// Wrap a floor plan with blank overlay geometry.
    pub fn new(plan: FloorPlan) -> Self {
        let grid_rows = (plan.height_m / CELL_SIZE_M).floor() as usize + 1;
        let grid_cols = (plan.width_m / CELL_SIZE_M).floor() as usize + 1;
        let margin_m = (
            CELL_SIZE_M - plan.height_m.rem_euclid(CELL_SIZE_M),
            CELL_SIZE_M - plan.width_m.rem_euclid(CELL_SIZE_M),
        );
        let mask = DenseGrid::filled(grid_rows, grid_cols, false);
        Self {
            plan,
            grid_rows,
            grid_cols,
            margin_m,
            pixel_mask: None,
            mask,
            mask_enabled: false,
            blind_spots: Vec::new(),
        }
    }

    /// Overlay grid shape as (rows, cols)
    #[inline]
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.grid_rows, self.grid_cols)
    }

    /// Physical shape as (height, width) meters
    #[inline]
    pub fn physical_shape(&self) -> (f64, f64) {
        (self.plan.height_m, self.plan.width_m)
    }

    /// Leftover meters between the grid's nominal coverage and the plan
    /// extent, per (row axis, col axis)
    #[inline]
    pub fn margin_m(&self) -> (f64, f64) {
        self.margin_m
    }

    /// Margin in raster pixels, per (row axis, col axis)
    #[inline]
    pub fn margin_px(&self) -> (f64, f64) {
        (
            self.margin_m.0 * self.plan.px_per_m_h(),
            self.margin_m.1 * self.plan.px_per_m_w(),
        )
    }

    /// Grid-level outside mask (true = excluded from occupancy)
    #[inline]
    pub fn mask(&self) -> &DenseGrid<bool> {
        &self.mask
    }

    /// Pixel-level outside mask from the last boundary run
    #[inline]
    pub fn pixel_mask(&self) -> Option<&DenseGrid<bool>> {
        self.pixel_mask.as_ref()
    }

    /// Run boundary detection over `raster` and install the downsampled
    /// grid mask. Blind spots force regions outside regardless of
    /// brightness; `wall_threshold` overrides the default brightness ratio.
    ///
    /// This is the slow path (on the order of a second for large rasters);
    /// callers must not run it inline with latency-sensitive handling.
    pub fn set_bounds_mask(
        &mut self,
        raster: &Raster,
        blind_spots: &[BlindSpot],
        wall_threshold: Option<f64>,
    ) -> Result<(), BoundaryError> {
        let mut detector = match wall_threshold {
            Some(t) => BoundaryDetector::with_threshold(raster, t),
            None => BoundaryDetector::new(raster),
        };
        for spot in blind_spots {
            detector.add_blind_spot(*spot)?;
        }
        detector.run();

        let pixel_mask = detector.boundary_mask();
        self.mask = downsample_mask(&pixel_mask, self.grid_rows, self.grid_cols, self.margin_px());
        self.pixel_mask = Some(pixel_mask);
        self.blind_spots = blind_spots.to_vec();
        self.mask_enabled = true;
        Ok(())
    }

    /// Disable boundary masking: every cell becomes indoor again. The
    /// blind-spot list is retained so re-enabling reuses it.
    pub fn clear_bounds_mask(&mut self, blind_spots: &[BlindSpot]) {
        self.mask.fill(false);
        self.blind_spots = blind_spots.to_vec();
        self.mask_enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(height: f64, width: f64) -> FloorPlan {
        FloorPlan::new(
            "fp_1",
            "Ground",
            GeoPoint::new(51.5, -0.1),
            height,
            width,
            GeoPoint::new(51.5005, -0.1005),
            GeoPoint::new(51.5005, -0.0995),
            1000,
            1600,
            "d41d8cd9",
        )
        .unwrap()
    }

    #[test]
    fn rejects_tiny_plans() {
        let err = FloorPlan::new(
            "fp_2",
            "Closet",
            GeoPoint::new(0.0, 0.0),
            0.3,
            5.0,
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.1),
            10,
            10,
            "",
        );
        assert!(matches!(err, Err(PlanError::SideTooShort { .. })));
    }

    #[test]
    fn grid_shape_adds_partial_cell() {
        let floor = Floor::new(plan(10.5, 20.0));
        assert_eq!(floor.grid_shape(), (11, 21));
        let (mh, mw) = floor.margin_m();
        assert!((mh - 0.5).abs() < 1e-9);
        assert!((mw - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rotation_vertical_edge_special_cases() {
        let south = GeoPoint::new(10.0, 5.0);
        let north = GeoPoint::new(11.0, 5.0);
        assert_eq!(rotation_from_corners(south, north), 90.0);
        assert_eq!(rotation_from_corners(north, south), 270.0);
    }

    #[test]
    fn center_maps_to_plan_middle() {
        let p = plan(10.0, 20.0);
        let center = p.plan_point_from_geo(p.center).unwrap();
        assert!((center.x - 10.0).abs() < 1e-9);
        assert!((center.y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn transform_rejects_nan() {
        let p = plan(10.0, 20.0);
        assert!(p
            .plan_point_from_geo(GeoPoint::new(f64::NAN, 0.0))
            .is_err());
    }
}
