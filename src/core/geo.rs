//! Geodetic point type and degree→meter conversion series.
//!
//! Floor-plan fixes arrive as WGS84 latitude/longitude. Conversion to local
//! planar meters uses the standard ellipsoidal series for the length of one
//! degree of latitude/longitude at a given latitude, evaluated in radians.
//! The error over a building-sized extent is far below cell resolution.

use serde::{Deserialize, Serialize};

/// A WGS84 geodetic coordinate in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

impl GeoPoint {
    /// Create a new geodetic point
    #[inline]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite numbers
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Meters spanned by one degree of latitude at `lat_deg` degrees latitude.
///
/// # Example
/// ```
/// use sabha_map::core::meters_per_degree_lat;
///
/// // One degree of latitude is roughly 111 km everywhere
/// let m = meters_per_degree_lat(52.0);
/// assert!(m > 110_000.0 && m < 112_000.0);
/// ```
#[inline]
pub fn meters_per_degree_lat(lat_deg: f64) -> f64 {
    let phi = lat_deg.to_radians();
    111_132.92 - 559.82 * (2.0 * phi).cos() + 1.175 * (4.0 * phi).cos()
        - 0.0023 * (6.0 * phi).cos()
}

/// Meters spanned by one degree of longitude at `lat_deg` degrees latitude.
///
/// Shrinks towards the poles with cos(latitude).
#[inline]
pub fn meters_per_degree_lng(lat_deg: f64) -> f64 {
    let phi = lat_deg.to_radians();
    111_412.84 * phi.cos() - 93.5 * (3.0 * phi).cos() + 0.118 * (5.0 * phi).cos()
}
