//! Density overlays: exposure ring buffers and per-floor routing.
//!
//! An [`Overlay`] accumulates one floor's observation density over a short
//! window of frames (the exposure), keeping three channels per frame:
//! mask-filtered density, unfiltered density and a scalar count of
//! observations that carried no usable position. A [`Layer`] owns one
//! overlay per floor and routes an observation batch from a single source
//! kind into them.

mod layer;
mod observation;
#[allow(clippy::module_inception)]
mod overlay;

pub use layer::{Layer, LayerKind};
pub use observation::{Observation, ObservationKind};
pub use overlay::{Overlay, VARIANCE_THRESHOLD_M};

use thiserror::Error;

/// Overlay structural and placement errors.
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("overlay for floor {floor_id}: expected {expected_rows}x{expected_cols} cells, got {rows}x{cols}")]
    DimensionMismatch {
        floor_id: String,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("observation on floor {floor_id} at ({x:.2},{y:.2})m r={variance:.2}m selects no cells")]
    NoCandidateCells {
        floor_id: String,
        x: f64,
        y: f64,
        variance: f64,
    },

    #[error("overlay for floor {0}: exposure must be at least 1")]
    ZeroExposure(String),

    #[error("overlay for floor {floor_id}: frame set has wrong exposure or shape")]
    FrameShape { floor_id: String },
}
