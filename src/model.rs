//! The occupancy model: floors, layers, devices and history glued into one
//! update cycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::boundary::{BlindSpot, BoundaryError};
use crate::config::{ConfigLoadError, ModelConfig};
use crate::core::{DenseGrid, GridCoord};
use crate::detect::{nearest_cameras, spike, Coverage};
use crate::devices::{AccessPoint, Camera, DeviceError};
use crate::historical::{HistoryError, HistoryStore, StoreError, TimeKey, TimeSlotAverage};
use crate::ingest::{camera_observations, IngestError, ScanningPacket};
use crate::overlay::{Layer, LayerKind, OverlayError};
use crate::plan::{Floor, PlanError};

/// Cameras asked to verify a spike.
const SNAPSHOT_CAMERAS: usize = 2;

/// Model-level errors, aggregating every component's failure modes.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("no floor with id {0}")]
    FloorNotFound(String),

    #[error("no camera with mac {0}")]
    CameraNotFound(String),

    #[error("layer {0:?} is not configured")]
    LayerNotConfigured(LayerKind),

    #[error("floor {0} has no raster image attached")]
    ImageNotAttached(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigLoadError),
}

/// A detected crowding spike, ready for the webhook collaborator.
#[derive(Clone, Debug)]
pub struct SpikeEvent {
    pub floor_id: String,
    /// Spike location in top-down meters (row, col)
    pub location: (f64, f64),
    pub coverage: Coverage,
    /// Macs of the cameras picked to verify the spike
    pub camera_macs: Vec<String>,
}

/// The full occupancy model for one network.
pub struct Model {
    network_id: String,
    secret: String,
    validator_token: String,
    webhook_addresses: Vec<String>,
    spike_threshold: f32,
    exposure: usize,
    floors: HashMap<String, Floor>,
    layers: HashMap<LayerKind, Layer>,
    access_points: HashMap<String, AccessPoint>,
    cameras: HashMap<String, Camera>,
    store: HistoryStore,
    timeslot: TimeSlotAverage,
}

impl Model {
    /// Assemble a model from configuration and the floor set the dashboard
    /// collaborator fetched. Loads (or creates) the historical bucket for
    /// the current time slot.
    pub fn new(
        config: &ModelConfig,
        floors: HashMap<String, Floor>,
        now: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        let mut layers = HashMap::with_capacity(config.layers.len());
        for kind in &config.layers {
            layers.insert(*kind, Layer::new(&floors, config.exposure)?);
        }
        let store = HistoryStore::open(&config.history_dir)?;
        let timeslot =
            TimeSlotAverage::load(&store, &layers, &floors, TimeKey::from_datetime(now))?;

        Ok(Self {
            network_id: config.network_id.clone(),
            secret: config.secret.clone(),
            validator_token: config.validator_token.clone(),
            webhook_addresses: config.webhook_addresses.clone(),
            spike_threshold: config.spike_threshold,
            exposure: config.exposure,
            floors,
            layers,
            access_points: HashMap::new(),
            cameras: HashMap::new(),
            store,
            timeslot,
        })
    }

    /// Network the model is bound to
    #[inline]
    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    /// Token for the scanning receiver's validator probe
    #[inline]
    pub fn validator_token(&self) -> &str {
        &self.validator_token
    }

    /// Webhook endpoints spike events should be delivered to
    #[inline]
    pub fn webhook_addresses(&self) -> &[String] {
        &self.webhook_addresses
    }

    /// One floor by id
    #[inline]
    pub fn floor(&self, floor_id: &str) -> Option<&Floor> {
        self.floors.get(floor_id)
    }

    /// One layer by kind
    #[inline]
    pub fn layer(&self, kind: LayerKind) -> Option<&Layer> {
        self.layers.get(&kind)
    }

    /// Register an access point for unfixed-client attribution.
    pub fn register_access_point(&mut self, ap: AccessPoint) {
        self.access_points.insert(ap.mac.clone(), ap);
    }

    /// Register a camera for person counting and spike verification.
    pub fn register_camera(&mut self, camera: Camera) {
        self.cameras.insert(camera.mac.clone(), camera);
    }

    /// Enable or disable boundary masking on one floor.
    ///
    /// Enabling runs the full detection pass over the floor's raster (slow
    /// path) and pushes the refreshed mask into every layer. Disabling
    /// reopens every cell.
    pub fn set_bounds_mask(
        &mut self,
        floor_id: &str,
        enabled: bool,
        blind_spots: &[BlindSpot],
    ) -> Result<(), ModelError> {
        let floor = self
            .floors
            .get_mut(floor_id)
            .ok_or_else(|| ModelError::FloorNotFound(floor_id.to_string()))?;

        if enabled {
            let raster = floor
                .plan
                .image()
                .cloned()
                .ok_or_else(|| ModelError::ImageNotAttached(floor_id.to_string()))?;
            floor.set_bounds_mask(&raster, blind_spots, None)?;
        } else {
            floor.clear_bounds_mask(blind_spots);
        }

        for layer in self.layers.values_mut() {
            layer.verify_and_update(&self.floors)?;
        }
        Ok(())
    }

    /// Absorb one scanning packet into the Wi-Fi or Bluetooth layer.
    ///
    /// Validation failures reject the packet before any overlay rolls.
    pub fn provide_scanning(&mut self, raw: &str) -> Result<(), ModelError> {
        let packet = ScanningPacket::parse(raw)?;
        packet.validate(&self.secret, &self.network_id)?;
        let kind = packet.source_kind()?;
        let observations = packet.extract_observations(&self.access_points)?;

        let layer = self
            .layers
            .get_mut(&kind)
            .ok_or(ModelError::LayerNotConfigured(kind))?;
        layer.set_observations(&observations)?;
        Ok(())
    }

    /// Install (or unset, with empty `coords`) a camera's FOV mask on its
    /// floor's grid.
    pub fn set_fov(&mut self, mac: &str, coords: &[GridCoord]) -> Result<(), ModelError> {
        let camera = self
            .cameras
            .get_mut(mac)
            .ok_or_else(|| ModelError::CameraNotFound(mac.to_string()))?;
        let floor = self
            .floors
            .get(&camera.floor_id)
            .ok_or_else(|| ModelError::FloorNotFound(camera.floor_id.clone()))?;
        camera.set_fov(floor.grid_shape(), coords)?;
        Ok(())
    }

    /// Record the latest whole-frame person counts, keyed by camera mac.
    /// Counts for unknown cameras are dropped with a warning.
    pub fn ingest_camera_counts(&mut self, counts: &HashMap<String, u32>) {
        for (mac, count) in counts {
            match self.cameras.get_mut(mac) {
                Some(cam) => cam.set_person_count(*count),
                None => log::warn!("person count for unknown camera {mac}"),
            }
        }
    }

    /// Push the cameras' person counts into the camera layer as a new
    /// frame.
    pub fn update_camera_layer(&mut self) -> Result<(), ModelError> {
        let observations = camera_observations(self.cameras.values());
        let layer = self
            .layers
            .get_mut(&LayerKind::CameraSense)
            .ok_or(ModelError::LayerNotConfigured(LayerKind::CameraSense))?;
        layer.set_observations(&observations)?;
        Ok(())
    }

    /// Absorb the live layers into the historical bucket for `now`,
    /// rolling the bucket over first when the slot has changed.
    pub fn put_historical(&mut self, now: DateTime<Utc>) -> Result<(), ModelError> {
        let key = TimeKey::from_datetime(now);
        self.roll_timeslot(key)?;
        self.timeslot.update(&self.layers, key)?;
        Ok(())
    }

    /// Persist the stale bucket and load the one for `key`, when needed.
    fn roll_timeslot(&mut self, key: TimeKey) -> Result<(), ModelError> {
        if !self.timeslot.is_current(key) {
            self.store.save(&self.timeslot)?;
            self.timeslot = TimeSlotAverage::load(&self.store, &self.layers, &self.floors, key)?;
        }
        Ok(())
    }

    /// Density relative to the historical baseline for one floor: the mean
    /// over all layers of (current delta − stored average), masked per the
    /// floor's boundary enablement.
    pub fn comp_historical(&self, floor_id: &str) -> Result<DenseGrid<f32>, ModelError> {
        let floor = self
            .floors
            .get(floor_id)
            .ok_or_else(|| ModelError::FloorNotFound(floor_id.to_string()))?;
        let masked = floor.mask_enabled;
        let averages = self.timeslot.floor_averages(floor_id);

        let (rows, cols) = floor.grid_shape();
        let mut collective = DenseGrid::<f32>::new(rows, cols);
        for (kind, layer) in &self.layers {
            let current = layer
                .overlay(floor_id)
                .ok_or_else(|| ModelError::FloorNotFound(floor_id.to_string()))?
                .get_delta(masked, None);
            let historical = averages
                .get(kind)
                .ok_or(ModelError::LayerNotConfigured(*kind))?
                .get_delta(masked, Some(1));

            for ((slot, cur), hist) in collective
                .as_mut_slice()
                .iter_mut()
                .zip(current.iter())
                .zip(historical.iter())
            {
                *slot += cur - hist;
            }
        }
        collective.scale(1.0 / self.layers.len() as f32);
        Ok(collective)
    }

    /// One full update cycle: refresh the camera layer, absorb history and
    /// scan every floor for spikes. Returns the spike events for the
    /// webhook collaborator.
    pub fn update(&mut self, now: DateTime<Utc>) -> Result<Vec<SpikeEvent>, ModelError> {
        if self.layers.contains_key(&LayerKind::CameraSense) {
            self.update_camera_layer()?;
        }
        self.put_historical(now)?;

        let mut events = Vec::new();
        for (floor_id, floor) in &self.floors {
            let delta = self.comp_historical(floor_id)?;
            let result = spike(&delta, self.spike_threshold);
            let (true, Some(location)) = (result.triggered, result.location) else {
                continue;
            };

            let (coverage, picked) =
                nearest_cameras(SNAPSHOT_CAMERAS, floor, self.cameras.values(), location);
            events.push(SpikeEvent {
                floor_id: floor_id.clone(),
                location,
                coverage,
                camera_macs: picked.iter().map(|cam| cam.mac.clone()).collect(),
            });
        }
        Ok(events)
    }

    /// Re-apply persisted per-device and per-floor settings. FOV entries
    /// for cameras that no longer exist are dropped with a warning; blind
    /// spots on enabled floors require the raster to be attached.
    pub fn apply_config(&mut self, config: &ModelConfig) -> Result<(), ModelError> {
        self.secret = config.secret.clone();
        self.validator_token = config.validator_token.clone();
        self.webhook_addresses = config.webhook_addresses.clone();
        self.spike_threshold = config.spike_threshold;

        for (mac, coords) in &config.fov_coords {
            if !self.cameras.contains_key(mac) {
                log::warn!("configured FOV for unknown camera {mac}");
                continue;
            }
            self.set_fov(mac, coords)?;
        }

        for (floor_id, spots) in &config.blind_spots {
            if !self.floors.contains_key(floor_id) {
                log::warn!("configured blind spots for unknown floor {floor_id}");
                continue;
            }
            let enabled = config.boundary_enabled.get(floor_id).copied().unwrap_or(false);
            self.set_bounds_mask(floor_id, enabled, spots)?;
        }
        Ok(())
    }

    /// Snapshot the model's persistable state.
    pub fn to_config(&self) -> ModelConfig {
        ModelConfig {
            network_id: self.network_id.clone(),
            layers: {
                let mut kinds: Vec<LayerKind> = self.layers.keys().copied().collect();
                kinds.sort_by_key(|k| k.as_u8());
                kinds
            },
            secret: self.secret.clone(),
            validator_token: self.validator_token.clone(),
            webhook_addresses: self.webhook_addresses.clone(),
            spike_threshold: self.spike_threshold,
            exposure: self.exposure,
            history_dir: self.store.dir().to_path_buf(),
            fov_coords: self
                .cameras
                .values()
                .map(|cam| (cam.mac.clone(), cam.fov_coords().to_vec()))
                .collect(),
            blind_spots: self
                .floors
                .iter()
                .map(|(id, floor)| (id.clone(), floor.blind_spots.clone()))
                .collect(),
            boundary_enabled: self
                .floors
                .iter()
                .map(|(id, floor)| (id.clone(), floor.mask_enabled))
                .collect(),
        }
    }
}
