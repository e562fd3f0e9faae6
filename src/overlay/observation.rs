//! A single located (or unlocatable) detection of a client or person.

use crate::core::{DenseGrid, PlanPoint};

/// What kind of entity an observation represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservationKind {
    /// A scanning client (Wi-Fi or Bluetooth device)
    Client,
    /// A camera-detected person
    Person,
}

/// One observation routed into an overlay.
///
/// Placement precedence: an override mask wins over a planar fix; an
/// observation with neither is *unfixed* and only bumps the floor's scalar
/// count. The uncertainty radius decides single-cell versus smeared
/// placement for planar fixes.
#[derive(Clone, Debug)]
pub struct Observation {
    pub kind: ObservationKind,
    /// Floor the observation belongs to
    pub floor_id: String,
    /// Planar fix in floor-plan meters, if the source produced one
    pub position: Option<PlanPoint>,
    /// Uncertainty radius in meters around the fix
    pub variance: Option<f64>,
    /// Candidate-cell mask taking precedence over any planar fix
    pub override_mask: Option<DenseGrid<bool>>,
    /// Client MAC, when the source reports one
    pub mac: Option<String>,
    /// MAC of the access point the unfixed client was last heard by
    pub nearest_ap_mac: Option<String>,
}

impl Observation {
    /// A client with a usable planar fix.
    pub fn client_fix(
        floor_id: impl Into<String>,
        position: PlanPoint,
        variance: f64,
        mac: impl Into<String>,
    ) -> Self {
        Self {
            kind: ObservationKind::Client,
            floor_id: floor_id.into(),
            position: Some(position),
            variance: Some(variance),
            override_mask: None,
            mac: Some(mac.into()),
            nearest_ap_mac: None,
        }
    }

    /// A client heard by an access point but never located.
    pub fn client_unfixed(
        floor_id: impl Into<String>,
        mac: impl Into<String>,
        nearest_ap_mac: impl Into<String>,
    ) -> Self {
        Self {
            kind: ObservationKind::Client,
            floor_id: floor_id.into(),
            position: None,
            variance: None,
            override_mask: None,
            mac: Some(mac.into()),
            nearest_ap_mac: Some(nearest_ap_mac.into()),
        }
    }

    /// A camera-detected person, optionally confined to the camera's FOV.
    pub fn person(floor_id: impl Into<String>, fov: Option<DenseGrid<bool>>) -> Self {
        Self {
            kind: ObservationKind::Person,
            floor_id: floor_id.into(),
            position: None,
            variance: None,
            override_mask: fov,
            mac: None,
            nearest_ap_mac: None,
        }
    }

    /// Whether the observation can be placed on the grid at all.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.position.is_some() || self.override_mask.is_some()
    }
}
