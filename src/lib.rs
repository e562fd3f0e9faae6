//! # Sabha-Map: Crowd-Density Mapping over Building Floor Plans
//!
//! Turns noisy, intermittent location observations (Wi-Fi/Bluetooth
//! scanning fixes, camera person counts) into spatially and temporally
//! smoothed occupancy density per floor, compares it against a learned
//! per-weekday-and-hour baseline, and picks the best cameras to verify
//! anomalous crowding.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use chrono::Utc;
//! use sabha_map::config::ModelConfig;
//! use sabha_map::core::GeoPoint;
//! use sabha_map::model::Model;
//! use sabha_map::plan::{Floor, FloorPlan};
//!
//! let plan = FloorPlan::new(
//!     "fp_1", "Ground", GeoPoint::new(51.5, -0.1),
//!     24.0, 40.0,
//!     GeoPoint::new(51.5005, -0.1005), GeoPoint::new(51.5005, -0.0995),
//!     600, 1000, "checksum",
//! ).unwrap();
//! let floors = HashMap::from([("fp_1".to_string(), Floor::new(plan))]);
//!
//! let config = ModelConfig::load("model.yaml".as_ref()).unwrap();
//! let mut model = Model::new(&config, floors, Utc::now()).unwrap();
//!
//! // Feed scanning packets as they arrive, run the cycle periodically
//! // model.provide_scanning(&body)?;
//! let events = model.update(Utc::now()).unwrap();
//! for event in events {
//!     println!("spike on {} at {:?}", event.floor_id, event.location);
//! }
//! ```
//!
//! ## Coordinate Frames
//!
//! - Geodetic fixes arrive as WGS84 degrees ([`core::GeoPoint`]).
//! - Floor-plan meters ([`core::PlanPoint`]): `x` from the left edge, `y`
//!   from the bottom edge.
//! - Grid cells ([`core::GridCoord`]): row 0 at the top, one cell per
//!   square meter.
//!
//! ## Architecture
//!
//! - [`core`]: grid storage, coordinate types, geodetic math
//! - [`plan`]: floor-plan metadata and per-floor grid geometry
//! - [`boundary`]: raster wall tracing and indoor/outdoor masking
//! - [`overlay`]: observation density buffers and per-floor routing
//! - [`historical`]: weekday/hour baseline averaging and persistence
//! - [`devices`]: access points and cameras
//! - [`detect`]: spike detection and camera ranking
//! - [`ingest`]: scanning-payload validation and extraction
//! - [`config`]: YAML model configuration
//! - [`model`]: the assembled update cycle

pub mod boundary;
pub mod config;
pub mod core;
pub mod detect;
pub mod devices;
pub mod historical;
pub mod ingest;
pub mod model;
pub mod overlay;
pub mod plan;

pub use config::ModelConfig;
pub use model::{Model, ModelError, SpikeEvent};
