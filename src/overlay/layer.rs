//! A layer: one overlay per floor, fed by a single observation source.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::DenseGrid;
use crate::plan::Floor;

use super::{Observation, Overlay, OverlayError};

/// The observation source a layer aggregates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Wi-Fi scanning fixes
    Wifi,
    /// Bluetooth scanning fixes
    Bluetooth,
    /// Camera person detections
    CameraSense,
}

impl LayerKind {
    /// Every layer kind, in wire-tag order
    pub const ALL: [LayerKind; 3] = [LayerKind::Wifi, LayerKind::Bluetooth, LayerKind::CameraSense];

    /// Stable numeric tag for persistence
    pub fn as_u8(self) -> u8 {
        match self {
            LayerKind::Wifi => 1,
            LayerKind::Bluetooth => 2,
            LayerKind::CameraSense => 3,
        }
    }

    /// Inverse of [`LayerKind::as_u8`]
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(LayerKind::Wifi),
            2 => Some(LayerKind::Bluetooth),
            3 => Some(LayerKind::CameraSense),
            _ => None,
        }
    }
}

/// Overlays for every floor, all fed from one source kind.
#[derive(Clone, Debug)]
pub struct Layer {
    exposure: usize,
    overlays: HashMap<String, Overlay>,
}

impl Layer {
    /// Create a layer with a zeroed overlay per floor.
    pub fn new(floors: &HashMap<String, Floor>, exposure: usize) -> Result<Self, OverlayError> {
        let mut overlays = HashMap::with_capacity(floors.len());
        for (id, floor) in floors {
            overlays.insert(id.clone(), Overlay::new(floor, exposure)?);
        }
        Ok(Self { exposure, overlays })
    }

    /// Exposure depth shared by every member overlay
    #[inline]
    pub fn exposure(&self) -> usize {
        self.exposure
    }

    /// The overlay for one floor, if that floor is represented
    #[inline]
    pub fn overlay(&self, floor_id: &str) -> Option<&Overlay> {
        self.overlays.get(floor_id)
    }

    /// Floor ids with an overlay in this layer
    pub fn floor_ids(&self) -> impl Iterator<Item = &str> {
        self.overlays.keys().map(String::as_str)
    }

    /// Open a new frame on every overlay and route `observations` into it.
    ///
    /// Observations naming a floor with no overlay are dropped; the caller
    /// reconciles floors separately via [`Layer::verify_and_update`].
    pub fn set_observations(&mut self, observations: &[Observation]) -> Result<(), OverlayError> {
        for overlay in self.overlays.values_mut() {
            overlay.roll();
        }
        for obs in observations {
            match self.overlays.get_mut(&obs.floor_id) {
                Some(overlay) => overlay.add(obs)?,
                None => {
                    log::debug!("dropping observation for unknown floor {}", obs.floor_id);
                }
            }
        }
        Ok(())
    }

    /// Per-floor boxcar density means; see [`Overlay::get_delta`].
    pub fn get_deltas(
        &self,
        masked: bool,
        window: Option<usize>,
    ) -> HashMap<String, DenseGrid<f32>> {
        self.overlays
            .iter()
            .map(|(id, over)| (id.clone(), over.get_delta(masked, window)))
            .collect()
    }

    /// Deep copy with every overlay's exposure squashed into one frame.
    pub fn flattened(&self) -> Layer {
        Layer {
            exposure: 1,
            overlays: self
                .overlays
                .iter()
                .map(|(id, over)| (id.clone(), over.flattened()))
                .collect(),
        }
    }

    /// Zero every overlay's frames.
    pub fn clear(&mut self) {
        for overlay in self.overlays.values_mut() {
            overlay.clear();
        }
    }

    /// Reconcile the layer against the current floor set: create overlays
    /// for new floors, verify geometry and refresh masks on existing ones.
    /// Overlays for floors that no longer exist are left alone.
    pub fn verify_and_update(
        &mut self,
        floors: &HashMap<String, Floor>,
    ) -> Result<(), OverlayError> {
        for (id, floor) in floors {
            if !self.overlays.contains_key(id) {
                log::info!("creating overlay for new floor {id}");
                self.overlays
                    .insert(id.clone(), Overlay::new(floor, self.exposure)?);
            }
        }
        for (id, floor) in floors {
            if let Some(overlay) = self.overlays.get_mut(id) {
                overlay.verify_and_update(floor)?;
            }
        }
        Ok(())
    }

    pub(crate) fn from_overlays(exposure: usize, overlays: HashMap<String, Overlay>) -> Self {
        Self { exposure, overlays }
    }

    pub(crate) fn overlay_mut(&mut self, floor_id: &str) -> Option<&mut Overlay> {
        self.overlays.get_mut(floor_id)
    }
}
