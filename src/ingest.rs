//! Scanning-payload validation and observation extraction.
//!
//! Scanning receivers POST JSON packets containing batches of client
//! records, each with a history of location fixes. A packet is validated
//! (secret, network id) before any model state is touched; extraction then
//! walks each client's fixes newest-first and takes the first one with a
//! full set of finite fields, falling back to an unfixed observation on
//! the floor of the access point that last heard the client.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::PlanPoint;
use crate::devices::{AccessPoint, Camera};
use crate::overlay::{LayerKind, Observation};

/// Scanning ingest errors. Everything here rejects the whole packet
/// without touching overlay state.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("scanning packet is missing {0}")]
    MissingField(&'static str),

    #[error("scanning packet has bad authentication secret")]
    BadSecret,

    #[error("scanning packet is for network {got}, expected {expected}")]
    WrongNetwork { expected: String, got: String },

    #[error("unknown scanning source {0:?}")]
    UnknownSource(Option<String>),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A parsed scanning packet. Fields the protocol marks mandatory are kept
/// optional here so validation can name what is missing instead of failing
/// at parse time.
#[derive(Debug, Deserialize)]
pub struct ScanningPacket {
    #[serde(rename = "type")]
    pub source: Option<String>,
    pub secret: Option<String>,
    pub data: Option<ScanningData>,
}

#[derive(Debug, Deserialize)]
pub struct ScanningData {
    #[serde(rename = "networkId")]
    pub network_id: Option<String>,
    #[serde(default)]
    pub observations: Vec<ClientRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ClientRecord {
    #[serde(rename = "clientMac")]
    pub client_mac: String,
    #[serde(rename = "latestRecord")]
    pub latest_record: Option<LatestRecord>,
    /// Location fixes, oldest first; fields vary by source so they stay
    /// untyped until extraction
    #[serde(default)]
    pub locations: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LatestRecord {
    #[serde(rename = "nearestApMac")]
    pub nearest_ap_mac: Option<String>,
}

impl ScanningPacket {
    /// Parse a raw packet body.
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Check the packet's credentials before anything else uses it.
    pub fn validate(&self, secret: &str, network_id: &str) -> Result<(), IngestError> {
        let data = self.data.as_ref().ok_or(IngestError::MissingField("data"))?;
        let source_net = data
            .network_id
            .as_deref()
            .ok_or(IngestError::MissingField("data.networkId"))?;
        if self.secret.as_deref() != Some(secret) {
            return Err(IngestError::BadSecret);
        }
        if source_net != network_id {
            return Err(IngestError::WrongNetwork {
                expected: network_id.to_string(),
                got: source_net.to_string(),
            });
        }
        Ok(())
    }

    /// Which layer this packet feeds.
    pub fn source_kind(&self) -> Result<LayerKind, IngestError> {
        match self.source.as_deref() {
            Some("WiFi") => Ok(LayerKind::Wifi),
            Some("Bluetooth") => Ok(LayerKind::Bluetooth),
            _ => Err(IngestError::UnknownSource(self.source.clone())),
        }
    }

    /// Extract one observation per client, newest usable fix first.
    ///
    /// Clients with no usable fix become unfixed observations on the floor
    /// of the access point that last heard them; clients whose nearest AP
    /// is unknown are dropped with a warning. A client appearing more than
    /// once keeps only its last record.
    pub fn extract_observations(
        &self,
        access_points: &HashMap<String, AccessPoint>,
    ) -> Result<Vec<Observation>, IngestError> {
        let data = self.data.as_ref().ok_or(IngestError::MissingField("data"))?;
        let bluetooth = matches!(self.source_kind(), Ok(LayerKind::Bluetooth));

        let mut found: HashMap<String, Observation> = HashMap::new();
        for client in &data.observations {
            let nearest_ap = client
                .latest_record
                .as_ref()
                .and_then(|rec| rec.nearest_ap_mac.as_deref())
                .and_then(|mac| access_points.get(mac));
            let Some(ap) = nearest_ap else {
                log::warn!(
                    "dropping client {}: nearest AP unknown",
                    client.client_mac
                );
                continue;
            };

            let fix = client
                .locations
                .iter()
                .rev()
                .find_map(|loc| usable_fix(loc, bluetooth));
            let obs = match fix {
                Some((floor_id, position, variance)) => {
                    Observation::client_fix(floor_id, position, variance, &client.client_mac)
                }
                None => Observation::client_unfixed(&ap.floor_id, &client.client_mac, &ap.mac),
            };
            found.insert(client.client_mac.clone(), obs);
        }
        Ok(found.into_values().collect())
    }
}

/// Pull (floor id, position, variance) out of one location entry, if every
/// field is present and finite. The receiver encodes unusable values as
/// the string `"NaN"`.
fn usable_fix(location: &Value, bluetooth: bool) -> Option<(String, PlanPoint, f64)> {
    let _lat = finite_field(location, "lat")?;
    let _lng = finite_field(location, "lng")?;
    let variance = finite_field(location, "variance")?;
    let (x, y, floor_id) = if bluetooth {
        let fp = location.get("floorPlan")?;
        (
            finite_field(fp, "x")?,
            finite_field(fp, "y")?,
            fp.get("id")?.as_str()?.to_string(),
        )
    } else {
        (
            finite_field(location, "x")?,
            finite_field(location, "y")?,
            location.get("floorPlanId")?.as_str()?.to_string(),
        )
    };
    Some((floor_id, PlanPoint::new(x, y), variance))
}

fn finite_field(value: &Value, key: &str) -> Option<f64> {
    value.get(key)?.as_f64().filter(|v| v.is_finite())
}

/// Turn each camera's latest whole-frame person count into that many
/// Person observations, confined to the camera's FOV when one is set.
pub fn camera_observations<'a, I>(cameras: I) -> Vec<Observation>
where
    I: IntoIterator<Item = &'a Camera>,
{
    let mut observations = Vec::new();
    for cam in cameras {
        let Some(count) = cam.person_count() else {
            continue;
        };
        for _ in 0..count {
            observations.push(Observation::person(&cam.floor_id, cam.fov().cloned()));
        }
    }
    observations
}
