//! Historical averaging integration tests.
//!
//! These exercise the bucket lifecycle end to end: lazy creation through
//! the store, incremental mean updates, stale rejection and rollover with
//! persistence across a reload.

use std::collections::HashMap;

use approx::assert_relative_eq;
use sabha_map::core::{GeoPoint, PlanPoint};
use sabha_map::historical::{HistoryError, HistoryStore, TimeKey, TimeSlotAverage};
use sabha_map::overlay::{Layer, LayerKind, Observation};
use sabha_map::plan::{Floor, FloorPlan};

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
        "abc123",
    )
    .unwrap();
    HashMap::from([("fp_1".to_string(), Floor::new(plan))])
}

fn wifi_layers(floors: &HashMap<String, Floor>) -> HashMap<LayerKind, Layer> {
    HashMap::from([(LayerKind::Wifi, Layer::new(floors, 1).unwrap())])
}

/// Push one located client into the Wi-Fi layer as a fresh frame.
fn observe_one(layers: &mut HashMap<LayerKind, Layer>) {
    let obs = vec![Observation::client_fix(
        "fp_1",
        PlanPoint::new(3.5, 3.5),
        0.1,
        "aa:bb",
    )];
    layers
        .get_mut(&LayerKind::Wifi)
        .unwrap()
        .set_observations(&obs)
        .unwrap();
}

#[test]
fn test_lazy_creation_persists_empty_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path()).unwrap();
    let floors = floors();
    let layers = wifi_layers(&floors);
    let key = TimeKey::new(2, 8).unwrap();

    assert!(store.load(key).unwrap().is_none());
    let bucket = TimeSlotAverage::load(&store, &layers, &floors, key).unwrap();
    assert_eq!(bucket.key(), key);
    assert_eq!(bucket.sample_count(LayerKind::Wifi, "fp_1"), 0);

    // Creation writes the file so the next load round-trips
    assert!(store.load(key).unwrap().is_some());
}

#[test]
fn test_incremental_mean_over_samples() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path()).unwrap();
    let floors = floors();
    let mut layers = wifi_layers(&floors);
    let key = TimeKey::new(0, 12).unwrap();
    let mut bucket = TimeSlotAverage::load(&store, &layers, &floors, key).unwrap();

    observe_one(&mut layers);
    bucket.update(&layers, key).unwrap();
    let first = bucket.floor_averages("fp_1")[&LayerKind::Wifi].get_delta(false, None);
    assert_relative_eq!(first.sum(), 1.0, epsilon = 1e-6);

    // An empty frame halves the mean, a third empty frame gives 1/3
    layers
        .get_mut(&LayerKind::Wifi)
        .unwrap()
        .set_observations(&[])
        .unwrap();
    bucket.update(&layers, key).unwrap();
    bucket.update(&layers, key).unwrap();
    let third = bucket.floor_averages("fp_1")[&LayerKind::Wifi].get_delta(false, None);
    assert_relative_eq!(third.sum(), 1.0 / 3.0, epsilon = 1e-6);
    assert_eq!(bucket.sample_count(LayerKind::Wifi, "fp_1"), 3);
}

#[test]
fn test_stale_bucket_refuses_other_slots() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path()).unwrap();
    let floors = floors();
    let layers = wifi_layers(&floors);
    let key = TimeKey::new(5, 22).unwrap();
    let mut bucket = TimeSlotAverage::load(&store, &layers, &floors, key).unwrap();

    let next_hour = TimeKey::new(5, 23).unwrap();
    assert!(matches!(
        bucket.update(&layers, next_hour),
        Err(HistoryError::StaleBucket { .. })
    ));
}

#[test]
fn test_rollover_persists_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let floors = floors();
    let mut layers = wifi_layers(&floors);
    let morning = TimeKey::new(1, 9).unwrap();
    let afternoon = TimeKey::new(1, 15).unwrap();

    {
        let store = HistoryStore::open(dir.path()).unwrap();
        let mut bucket = TimeSlotAverage::load(&store, &layers, &floors, morning).unwrap();
        observe_one(&mut layers);
        bucket.update(&layers, morning).unwrap();

        // Clock moved on: persist the stale bucket, open the new slot
        store.save(&bucket).unwrap();
        let mut next = TimeSlotAverage::load(&store, &layers, &floors, afternoon).unwrap();
        next.update(&layers, afternoon).unwrap();
        store.save(&next).unwrap();
    }

    // A fresh store (fresh process) sees both buckets with their data
    let store = HistoryStore::open(dir.path()).unwrap();
    let restored = store.load(morning).unwrap().expect("morning bucket");
    assert_eq!(restored.sample_count(LayerKind::Wifi, "fp_1"), 1);
    let avg = restored.floor_averages("fp_1")[&LayerKind::Wifi].get_delta(false, None);
    assert_relative_eq!(avg.sum(), 1.0, epsilon = 1e-6);

    assert!(store.load(afternoon).unwrap().is_some());
}

#[test]
fn test_structure_repair_on_new_floor() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path()).unwrap();

    let mut one_floor = floors();
    let layers = wifi_layers(&one_floor);
    let key = TimeKey::new(3, 3).unwrap();
    let bucket = TimeSlotAverage::load(&store, &layers, &one_floor, key).unwrap();
    store.save(&bucket).unwrap();

    // A floor appears between runs; reload reconciles the bucket
    let plan = FloorPlan::new(
        "fp_2",
        "First",
        GeoPoint::new(51.5, -0.1),
        8.0,
        8.0,
        GeoPoint::new(51.5005, -0.1005),
        GeoPoint::new(51.5005, -0.0995),
        320,
        320,
        "def456",
    )
    .unwrap();
    one_floor.insert("fp_2".to_string(), Floor::new(plan));
    let layers = HashMap::from([(LayerKind::Wifi, Layer::new(&one_floor, 1).unwrap())]);

    let reloaded = TimeSlotAverage::load(&store, &layers, &one_floor, key).unwrap();
    assert!(reloaded.floor_averages("fp_2").contains_key(&LayerKind::Wifi));
    assert_eq!(reloaded.sample_count(LayerKind::Wifi, "fp_2"), 0);
}
