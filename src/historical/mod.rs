//! Historical occupancy baselines bucketed by weekday and hour.
//!
//! A [`TimeSlotAverage`] holds the running mean of every layer's density
//! for one `(day, hour)` bucket, flattened to a single frame per floor,
//! with per-floor sample counts. Buckets are loaded (or created) lazily
//! when the clock enters their slot, updated incrementally while the slot
//! is current, and persisted by the [`HistoryStore`] when the clock moves
//! on.

mod store;

pub use store::{HistoryStore, StoreError, FORMAT_VERSION};

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use thiserror::Error;

use crate::overlay::{Layer, LayerKind, Overlay, OverlayError};
use crate::plan::Floor;

/// Historical-averaging errors.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("bucket {bucket} cannot absorb data for slot {now}")]
    StaleBucket { bucket: TimeKey, now: TimeKey },

    #[error("invalid time slot day={day} hour={hour}")]
    InvalidKey { day: u8, hour: u8 },

    #[error("historical bucket has no layer {0:?}")]
    UnknownLayer(LayerKind),

    #[error("historical bucket has no overlay for floor {0}")]
    UnknownFloor(String),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A weekday/hour bucket key. Day 0 is Monday; hour is 0..=23 UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeKey {
    pub day: u8,
    pub hour: u8,
}

impl TimeKey {
    /// Validated construction from raw day/hour values.
    pub fn new(day: u8, hour: u8) -> Result<Self, HistoryError> {
        if day > 6 || hour > 23 {
            return Err(HistoryError::InvalidKey { day, hour });
        }
        Ok(Self { day, hour })
    }

    /// The bucket a UTC timestamp falls into.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            day: at.weekday().num_days_from_monday() as u8,
            hour: at.hour() as u8,
        }
    }
}

impl std::fmt::Display for TimeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "day {} hour {:02}", self.day, self.hour)
    }
}

/// Running density means for one weekday/hour bucket.
pub struct TimeSlotAverage {
    key: TimeKey,
    /// Flattened (exposure 1) layer per source kind
    layers: HashMap<LayerKind, Layer>,
    /// Samples absorbed so far, per (layer, floor)
    counts: HashMap<LayerKind, HashMap<String, u32>>,
}

impl TimeSlotAverage {
    /// Create an empty bucket mirroring the structure of `live_layers`.
    pub fn new(live_layers: &HashMap<LayerKind, Layer>, key: TimeKey) -> Self {
        let mut layers = HashMap::with_capacity(live_layers.len());
        let mut counts = HashMap::with_capacity(live_layers.len());
        for (kind, layer) in live_layers {
            let mut flat = layer.flattened();
            flat.clear();
            counts.insert(
                *kind,
                flat.floor_ids().map(|id| (id.to_string(), 0)).collect(),
            );
            layers.insert(*kind, flat);
        }
        Self { key, layers, counts }
    }

    /// Load the bucket for `key` from `store`, or create and persist a new
    /// one. Either way the structure is reconciled against the current
    /// layers and floors before returning.
    pub fn load(
        store: &HistoryStore,
        live_layers: &HashMap<LayerKind, Layer>,
        floors: &HashMap<String, Floor>,
        key: TimeKey,
    ) -> Result<Self, HistoryError> {
        match store.load(key)? {
            Some(mut bucket) => {
                bucket.verify_and_update_struct(live_layers, floors)?;
                Ok(bucket)
            }
            None => {
                let mut bucket = Self::new(live_layers, key);
                bucket.verify_and_update_struct(live_layers, floors)?;
                store.save(&bucket)?;
                Ok(bucket)
            }
        }
    }

    /// Bucket key
    #[inline]
    pub fn key(&self) -> TimeKey {
        self.key
    }

    /// Whether this bucket covers the slot `now` falls into.
    #[inline]
    pub fn is_current(&self, now: TimeKey) -> bool {
        self.key == now
    }

    /// Samples absorbed for one (layer, floor) pair.
    pub fn sample_count(&self, kind: LayerKind, floor_id: &str) -> u32 {
        self.counts
            .get(&kind)
            .and_then(|per_floor| per_floor.get(floor_id))
            .copied()
            .unwrap_or(0)
    }

    /// Absorb the live layers into the running means.
    ///
    /// Legal only while the bucket is current; a stale bucket must be
    /// persisted and replaced instead. Each (layer, floor) mean moves by
    /// `(old * count + live) / (count + 1)` across all three channels,
    /// reading the bucket's own stored values as `old`.
    pub fn update(
        &mut self,
        live_layers: &HashMap<LayerKind, Layer>,
        now: TimeKey,
    ) -> Result<(), HistoryError> {
        if !self.is_current(now) {
            return Err(HistoryError::StaleBucket {
                bucket: self.key,
                now,
            });
        }

        for (kind, live_layer) in live_layers {
            let avg_layer = self
                .layers
                .get_mut(kind)
                .ok_or(HistoryError::UnknownLayer(*kind))?;
            let layer_counts = self.counts.entry(*kind).or_default();

            let floor_ids: Vec<String> = live_layer.floor_ids().map(str::to_string).collect();
            for floor_id in floor_ids {
                let live = live_layer
                    .overlay(&floor_id)
                    .ok_or_else(|| HistoryError::UnknownFloor(floor_id.clone()))?;
                let avg = avg_layer
                    .overlay_mut(&floor_id)
                    .ok_or_else(|| HistoryError::UnknownFloor(floor_id.clone()))?;

                let count = layer_counts.entry(floor_id.clone()).or_insert(0);
                let c = *count as f32;
                let blend = 1.0 / (c + 1.0);

                let mut masked = avg.get_delta(true, Some(1));
                masked.scale(c);
                masked.add_assign(&live.get_delta(true, None));
                masked.scale(blend);

                let mut unmasked = avg.get_delta(false, Some(1));
                unmasked.scale(c);
                unmasked.add_assign(&live.get_delta(false, None));
                unmasked.scale(blend);

                let unfixed = (avg.get_unfixed_observations(Some(1)) * c
                    + live.get_unfixed_observations(None))
                    * blend;

                avg.set_frames(vec![masked], vec![unmasked], vec![unfixed])?;
                *count += 1;
            }
        }
        Ok(())
    }

    /// The stored flat average overlay per layer kind for one floor.
    pub fn floor_averages(&self, floor_id: &str) -> HashMap<LayerKind, &Overlay> {
        self.layers
            .iter()
            .filter_map(|(kind, layer)| layer.overlay(floor_id).map(|over| (*kind, over)))
            .collect()
    }

    /// Reconcile the bucket's structure with the current model.
    ///
    /// Layer kinds the bucket has never seen are adopted as flattened
    /// copies of the live data (counted as one sample); missing floors get
    /// zeroed overlays; geometry conflicts on existing overlays are fatal.
    pub fn verify_and_update_struct(
        &mut self,
        live_layers: &HashMap<LayerKind, Layer>,
        floors: &HashMap<String, Floor>,
    ) -> Result<(), HistoryError> {
        for (kind, layer) in live_layers {
            if !self.layers.contains_key(kind) {
                log::info!("adopting new historical layer {kind:?}");
                let flat = layer.flattened();
                self.counts.insert(
                    *kind,
                    flat.floor_ids().map(|id| (id.to_string(), 1)).collect(),
                );
                self.layers.insert(*kind, flat);
            }
        }

        for (kind, layer) in &mut self.layers {
            layer.verify_and_update(floors)?;
            let layer_counts = self.counts.entry(*kind).or_default();
            for id in layer.floor_ids() {
                if !layer_counts.contains_key(id) {
                    layer_counts.insert(id.to_string(), 0);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn from_parts(
        key: TimeKey,
        layers: HashMap<LayerKind, Layer>,
        counts: HashMap<LayerKind, HashMap<String, u32>>,
    ) -> Self {
        Self { key, layers, counts }
    }

    pub(crate) fn layers(&self) -> &HashMap<LayerKind, Layer> {
        &self.layers
    }

    pub(crate) fn counts(&self) -> &HashMap<LayerKind, HashMap<String, u32>> {
        &self.counts
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    use super::*;
    use crate::core::{GeoPoint, PlanPoint};
    use crate::overlay::Observation;
    use crate::plan::FloorPlan;

    fn floors() -> HashMap<String, Floor> {
        let plan = FloorPlan::new(
            "fp_1",
            "Ground",
            GeoPoint::new(51.5, -0.1),
            10.0,
            10.0,
            GeoPoint::new(51.5005, -0.1005),
            GeoPoint::new(51.5005, -0.0995),
            400,
            400,
            "",
        )
        .unwrap();
        HashMap::from([("fp_1".to_string(), Floor::new(plan))])
    }

    fn live_layers(floors: &HashMap<String, Floor>) -> HashMap<LayerKind, Layer> {
        HashMap::from([(LayerKind::Wifi, Layer::new(floors, 1).unwrap())])
    }

    #[test]
    fn key_from_utc_datetime() {
        // 2026-08-27 is a Thursday
        let at = Utc.with_ymd_and_hms(2026, 8, 27, 14, 30, 0).unwrap();
        let key = TimeKey::from_datetime(at);
        assert_eq!(key, TimeKey::new(3, 14).unwrap());
    }

    #[test]
    fn key_rejects_out_of_range() {
        assert!(TimeKey::new(7, 0).is_err());
        assert!(TimeKey::new(0, 24).is_err());
    }

    #[test]
    fn first_update_copies_live_frame() {
        let floors = floors();
        let mut layers = live_layers(&floors);
        let key = TimeKey::new(0, 9).unwrap();
        let mut bucket = TimeSlotAverage::new(&layers, key);

        let obs = vec![Observation::client_fix(
            "fp_1",
            PlanPoint::new(2.5, 2.5),
            0.1,
            "aa",
        )];
        layers
            .get_mut(&LayerKind::Wifi)
            .unwrap()
            .set_observations(&obs)
            .unwrap();
        bucket.update(&layers, key).unwrap();

        let avg = &bucket.floor_averages("fp_1")[&LayerKind::Wifi];
        assert_relative_eq!(avg.get_delta(false, Some(1)).sum(), 1.0);
        assert_eq!(bucket.sample_count(LayerKind::Wifi, "fp_1"), 1);
    }

    #[test]
    fn second_update_stores_arithmetic_mean() {
        let floors = floors();
        let mut layers = live_layers(&floors);
        let key = TimeKey::new(0, 9).unwrap();
        let mut bucket = TimeSlotAverage::new(&layers, key);

        let one = vec![Observation::client_fix(
            "fp_1",
            PlanPoint::new(2.5, 2.5),
            0.1,
            "aa",
        )];
        layers
            .get_mut(&LayerKind::Wifi)
            .unwrap()
            .set_observations(&one)
            .unwrap();
        bucket.update(&layers, key).unwrap();

        // Second frame: zero observations; mean falls to 0.5
        layers
            .get_mut(&LayerKind::Wifi)
            .unwrap()
            .set_observations(&[])
            .unwrap();
        bucket.update(&layers, key).unwrap();

        let avg = &bucket.floor_averages("fp_1")[&LayerKind::Wifi];
        assert_relative_eq!(avg.get_delta(false, Some(1)).sum(), 0.5, epsilon = 1e-6);
        assert_eq!(bucket.sample_count(LayerKind::Wifi, "fp_1"), 2);
    }

    #[test]
    fn stale_bucket_rejects_updates() {
        let floors = floors();
        let layers = live_layers(&floors);
        let key = TimeKey::new(0, 9).unwrap();
        let mut bucket = TimeSlotAverage::new(&layers, key);

        let later = TimeKey::new(0, 10).unwrap();
        assert!(matches!(
            bucket.update(&layers, later),
            Err(HistoryError::StaleBucket { .. })
        ));
    }

    #[test]
    fn struct_verification_adopts_new_layers() {
        let floors = floors();
        let wifi_only = live_layers(&floors);
        let key = TimeKey::new(2, 3).unwrap();
        let mut bucket = TimeSlotAverage::new(&wifi_only, key);

        let mut both = wifi_only.clone();
        both.insert(LayerKind::Bluetooth, Layer::new(&floors, 2).unwrap());
        bucket.verify_and_update_struct(&both, &floors).unwrap();

        assert!(bucket.floor_averages("fp_1").contains_key(&LayerKind::Bluetooth));
        // Adopted layers carry the live data as their first sample
        assert_eq!(bucket.sample_count(LayerKind::Bluetooth, "fp_1"), 1);
    }
}
