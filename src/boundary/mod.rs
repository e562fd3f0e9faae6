//! Floor-plan boundary detection.
//!
//! Converts a raster floor-plan image into an indoor/outdoor mask:
//!
//! - [`Raster`]: normalized brightness buffer with image-crate adapters
//! - [`BoundaryDetector`]: wall classification + contour-tracing wall
//!   follower that floods the unbounded outer region
//! - [`downsample_mask`]: majority-vote reduction of the pixel mask to the
//!   overlay grid, spreading the grid margin across the mapping
//!
//! Tracing plus downsampling is the slow path of the whole crate (around a
//! second for large rasters); callers are expected to run it off any
//! latency-sensitive path and cache the result.

mod detector;
mod downsample;
mod raster;

pub use detector::{BlindSpot, BoundaryDetector, Region, DEFAULT_WALL_THRESHOLD};
pub use downsample::{downsample_mask, DOWNSAMPLE_THRESHOLD};
pub use raster::Raster;

use thiserror::Error;

/// Boundary-detection input errors.
#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("raster data length {got} does not match {rows}x{cols}x{channels}")]
    RasterShape {
        rows: usize,
        cols: usize,
        channels: usize,
        got: usize,
    },

    #[error(
        "blind spot ({r1:.2},{c1:.2})->({r2:.2},{c2:.2}) not within [0,1] or (0,0)->({rows},{cols})"
    )]
    BlindSpotOutOfRange {
        r1: f64,
        c1: f64,
        r2: f64,
        c2: f64,
        rows: usize,
        cols: usize,
    },
}
