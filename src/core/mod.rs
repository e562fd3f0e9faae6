//! Foundation types shared across the crate.
//!
//! - [`GridCoord`] / [`PlanPoint`]: cell indices and planar floor-plan meters
//! - [`DenseGrid`]: row-major 2D storage used for density buffers and masks
//! - [`geo`]: geodetic point type and degree→meter conversion series

pub mod geo;
pub mod grid;
pub mod point;

pub use geo::{meters_per_degree_lat, meters_per_degree_lng, GeoPoint};
pub use grid::DenseGrid;
pub use point::{GridCoord, PlanPoint};
