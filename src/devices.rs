//! Access points and cameras placed on floor plans.

use thiserror::Error;

use crate::core::{DenseGrid, GeoPoint, GridCoord, PlanPoint};
use crate::plan::{FloorPlan, PlanError};

/// Device configuration errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("camera {mac}: FOV cell ({row},{col}) outside {rows}x{cols} grid")]
    FovOutOfRange {
        mac: String,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
}

/// A Wi-Fi/Bluetooth access point anchored to one floor.
///
/// Clients that scanning never manages to locate are attributed to the
/// floor of the access point that last heard them.
#[derive(Clone, Debug)]
pub struct AccessPoint {
    pub name: String,
    pub mac: String,
    pub geo: GeoPoint,
    pub floor_id: String,
    /// Geodetic position projected to plan meters at construction
    pub position: PlanPoint,
}

impl AccessPoint {
    pub fn new(
        name: impl Into<String>,
        mac: impl Into<String>,
        geo: GeoPoint,
        plan: &FloorPlan,
    ) -> Result<Self, PlanError> {
        Ok(Self {
            name: name.into(),
            mac: mac.into(),
            geo,
            floor_id: plan.id.clone(),
            position: plan.plan_point_from_geo(geo)?,
        })
    }
}

/// A camera anchored to one floor, optionally with a field-of-view mask
/// over the overlay grid and a live person count.
#[derive(Clone, Debug)]
pub struct Camera {
    pub mac: String,
    pub serial: String,
    pub geo: GeoPoint,
    pub floor_id: String,
    /// Geodetic position projected to plan meters at construction
    pub position: PlanPoint,
    fov: Option<DenseGrid<bool>>,
    fov_coords: Vec<GridCoord>,
    person_count: Option<u32>,
}

impl Camera {
    pub fn new(
        mac: impl Into<String>,
        serial: impl Into<String>,
        geo: GeoPoint,
        plan: &FloorPlan,
    ) -> Result<Self, PlanError> {
        Ok(Self {
            mac: mac.into(),
            serial: serial.into(),
            geo,
            floor_id: plan.id.clone(),
            position: plan.plan_point_from_geo(geo)?,
            fov: None,
            fov_coords: Vec::new(),
            person_count: None,
        })
    }

    /// Install a field-of-view mask covering `coords` on a grid of
    /// `shape`. An empty coordinate list unsets the mask.
    pub fn set_fov(
        &mut self,
        shape: (usize, usize),
        coords: &[GridCoord],
    ) -> Result<(), DeviceError> {
        if coords.is_empty() {
            self.fov = None;
            self.fov_coords.clear();
            return Ok(());
        }
        let (rows, cols) = shape;
        let mut mask = DenseGrid::<bool>::new(rows, cols);
        for coord in coords {
            if coord.row >= rows || coord.col >= cols {
                return Err(DeviceError::FovOutOfRange {
                    mac: self.mac.clone(),
                    row: coord.row,
                    col: coord.col,
                    rows,
                    cols,
                });
            }
            mask.set(coord.row, coord.col, true);
        }
        self.fov = Some(mask);
        self.fov_coords = coords.to_vec();
        Ok(())
    }

    /// Whether a field-of-view mask is installed
    #[inline]
    pub fn has_fov(&self) -> bool {
        self.fov.is_some()
    }

    /// The field-of-view mask, if installed
    #[inline]
    pub fn fov(&self) -> Option<&DenseGrid<bool>> {
        self.fov.as_ref()
    }

    /// Cells the mask was built from, for config round-trip
    #[inline]
    pub fn fov_coords(&self) -> &[GridCoord] {
        &self.fov_coords
    }

    /// Record the latest whole-frame person count
    pub fn set_person_count(&mut self, count: u32) {
        self.person_count = Some(count);
    }

    /// Latest person count, if any report arrived
    #[inline]
    pub fn person_count(&self) -> Option<u32> {
        self.person_count
    }
}
