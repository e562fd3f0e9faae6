//! On-disk model configuration.
//!
//! YAML file carrying everything the model cannot re-derive from the
//! dashboard after a restart: credentials, selected layers, per-camera FOV
//! cells, per-floor blind spots and boundary enablement, tuning knobs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::boundary::BlindSpot;
use crate::core::GridCoord;
use crate::detect::DEFAULT_SPIKE_THRESHOLD;
use crate::overlay::LayerKind;

/// Default exposure depth for live layers.
pub const DEFAULT_EXPOSURE: usize = 3;

/// Configuration load/save errors.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Dashboard network the model is bound to
    pub network_id: String,

    /// Layers the model maintains
    pub layers: Vec<LayerKind>,

    /// Shared secret scanning packets must present
    pub secret: String,

    /// Token echoed back to the scanning receiver's validator probe
    pub validator_token: String,

    /// Webhook endpoints spike events are delivered to
    pub webhook_addresses: Vec<String>,

    /// Density-above-baseline level that fires a spike
    pub spike_threshold: f32,

    /// Frames of exposure smoothing on live layers
    pub exposure: usize,

    /// Directory historical buckets are persisted under
    pub history_dir: PathBuf,

    /// FOV cells per camera mac
    pub fov_coords: HashMap<String, Vec<GridCoord>>,

    /// Blind-spot boxes per floor id
    pub blind_spots: HashMap<String, Vec<BlindSpot>>,

    /// Boundary masking enablement per floor id
    pub boundary_enabled: HashMap<String, bool>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            network_id: String::new(),
            layers: LayerKind::ALL.to_vec(),
            secret: String::new(),
            validator_token: String::new(),
            webhook_addresses: Vec::new(),
            spike_threshold: DEFAULT_SPIKE_THRESHOLD,
            exposure: DEFAULT_EXPOSURE,
            history_dir: PathBuf::from("historical_data"),
            fov_coords: HashMap::new(),
            blind_spots: HashMap::new(),
            boundary_enabled: HashMap::new(),
        }
    }
}

impl ModelConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load from a YAML file; an absent file yields defaults with a
    /// warning so a fresh deployment starts cleanly.
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            log::warn!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Write to a YAML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigLoadError> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_all_layers() {
        let config = ModelConfig::default();
        assert_eq!(config.layers, LayerKind::ALL.to_vec());
        assert_eq!(config.spike_threshold, DEFAULT_SPIKE_THRESHOLD);
        assert_eq!(config.exposure, DEFAULT_EXPOSURE);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = ModelConfig::from_yaml(
            "network_id: N_1\nsecret: s3cret\nspike_threshold: 0.5\n",
        )
        .unwrap();
        assert_eq!(config.network_id, "N_1");
        assert_eq!(config.spike_threshold, 0.5);
        assert_eq!(config.exposure, DEFAULT_EXPOSURE);
    }

    #[test]
    fn round_trips_through_yaml() {
        let mut config = ModelConfig::default();
        config.network_id = "N_1".to_string();
        config
            .fov_coords
            .insert("aa:bb".to_string(), vec![GridCoord::new(2, 3)]);
        config
            .blind_spots
            .insert("fp_1".to_string(), vec![BlindSpot::new(0.0, 0.0, 0.2, 0.2)]);
        config.boundary_enabled.insert("fp_1".to_string(), true);

        let yaml = serde_yaml::to_string(&config).unwrap();
        let back = ModelConfig::from_yaml(&yaml).unwrap();
        assert_eq!(back.network_id, "N_1");
        assert_eq!(back.fov_coords["aa:bb"], vec![GridCoord::new(2, 3)]);
        assert_eq!(back.blind_spots["fp_1"].len(), 1);
        assert!(back.boundary_enabled["fp_1"]);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ModelConfig::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config.network_id, "");
    }
}
