//! Overlay density integration tests.
//!
//! These exercise observation placement, exposure rolling and the masked
//! channel against a floor whose boundary mask was produced by the real
//! detection pipeline.

use std::collections::HashMap;

use approx::assert_relative_eq;
use sabha_map::boundary::Raster;
use sabha_map::core::{GeoPoint, PlanPoint};
use sabha_map::overlay::{Layer, Observation, Overlay, OverlayError};
use sabha_map::plan::{Floor, FloorPlan};

/// 10m x 10m floor backed by a 100px raster.
fn open_floor() -> Floor {
    let plan = FloorPlan::new(
        "fp_1",
        "Ground",
        GeoPoint::new(51.5, -0.1),
        10.0,
        10.0,
        GeoPoint::new(51.5005, -0.1005),
        GeoPoint::new(51.5005, -0.0995),
        100,
        100,
        "abc123",
    )
    .unwrap();
    Floor::new(plan)
}

/// Same floor with a traced boundary mask: a wall ring 10px in from each
/// edge leaves the central cells indoor and the rim excluded.
fn masked_floor() -> Floor {
    let mut floor = open_floor();
    let size = 100usize;
    let far = size - 1 - 10;
    let mut data = vec![255u8; size * size];
    for i in 10..=far {
        data[10 * size + i] = 0;
        data[far * size + i] = 0;
        data[i * size + 10] = 0;
        data[i * size + far] = 0;
    }
    let raster = Raster::from_luma(size, size, &data).unwrap();
    floor.set_bounds_mask(&raster, &[], None).unwrap();
    floor
}

#[test]
fn test_fixed_observations_conserve_mass() {
    let floor = open_floor();
    let mut overlay = Overlay::new(&floor, 1).unwrap();
    for i in 0..5 {
        let obs = Observation::client_fix(
            "fp_1",
            PlanPoint::new(1.0 + i as f64, 2.0),
            0.1,
            format!("{i:02x}:aa"),
        );
        overlay.add(&obs).unwrap();
    }
    assert_relative_eq!(overlay.get_delta(false, None).sum(), 5.0, epsilon = 1e-5);
}

#[test]
fn test_smear_renormalizes_on_masked_channel() {
    let floor = masked_floor();
    let mut overlay = Overlay::new(&floor, 1).unwrap();

    // Wide smear near the rim: some candidate cells are excluded, so the
    // masked channel spreads the same unit mass over fewer cells
    let obs = Observation::client_fix("fp_1", PlanPoint::new(2.0, 8.0), 2.0, "aa:bb");
    overlay.add(&obs).unwrap();

    let unmasked = overlay.get_delta(false, None);
    let masked = overlay.get_delta(true, None);
    assert_relative_eq!(unmasked.sum(), 1.0, epsilon = 1e-5);
    assert_relative_eq!(masked.sum(), 1.0, epsilon = 1e-5);

    let unmasked_support = unmasked.iter().filter(|v| **v > 0.0).count();
    let masked_support = masked.iter().filter(|v| **v > 0.0).count();
    assert!(masked_support < unmasked_support);

    // No masked mass may sit on an excluded cell
    for (cell, value) in masked.indexed_iter() {
        if *value > 0.0 {
            assert!(!*floor.mask().at(cell.row, cell.col));
        }
    }
}

#[test]
fn test_single_cell_and_smear_agree_on_row() {
    let floor = open_floor();

    // The same point placed through both paths: a tight fix and a smear
    // just wide enough to cover one cell must land in the same row
    let mut tight = Overlay::new(&floor, 1).unwrap();
    tight
        .add(&Observation::client_fix("fp_1", PlanPoint::new(5.0, 0.5), 0.2, "aa"))
        .unwrap();
    let mut wide = Overlay::new(&floor, 1).unwrap();
    wide.add(&Observation::client_fix("fp_1", PlanPoint::new(5.0, 0.5), 0.75, "aa"))
        .unwrap();

    let rows = |grid: &sabha_map::core::DenseGrid<f32>| -> Vec<usize> {
        let mut hit: Vec<usize> = grid
            .indexed_iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(cell, _)| cell.row)
            .collect();
        hit.dedup();
        hit
    };
    // Top-down row of y=0.5 on a 10 m floor: floor(10 - 0.5) = 9, the
    // last on-floor row, not the margin row beyond it
    assert_eq!(rows(&tight.get_delta(false, None)), vec![9]);
    assert_eq!(rows(&wide.get_delta(false, None)), vec![9]);
}

#[test]
fn test_fix_beyond_grid_is_rejected() {
    let floor = open_floor();
    let mut overlay = Overlay::new(&floor, 1).unwrap();
    let obs = Observation::client_fix("fp_1", PlanPoint::new(-3.0, 2.0), 0.1, "aa:bb");
    assert!(matches!(
        overlay.add(&obs),
        Err(OverlayError::NoCandidateCells { .. })
    ));
    // The failed add left no mass behind
    assert_relative_eq!(overlay.get_delta(false, None).sum(), 0.0);
}

#[test]
fn test_exposure_window_means() {
    let floor = open_floor();
    let mut overlay = Overlay::new(&floor, 3).unwrap();

    // One fixed observation per frame for three frames
    for _ in 0..3 {
        overlay.roll();
        let obs = Observation::client_fix("fp_1", PlanPoint::new(5.0, 5.0), 0.1, "aa:bb");
        overlay.add(&obs).unwrap();
    }

    assert_relative_eq!(overlay.get_delta(false, Some(1)).sum(), 1.0, epsilon = 1e-5);
    assert_relative_eq!(overlay.get_delta(false, None).sum(), 1.0, epsilon = 1e-5);

    // Two empty frames dilute the mean to a third
    overlay.roll();
    overlay.roll();
    assert_relative_eq!(overlay.get_delta(false, None).sum(), 1.0 / 3.0, epsilon = 1e-5);
    assert_relative_eq!(overlay.get_delta(false, Some(1)).sum(), 0.0);
}

#[test]
fn test_layer_set_observations_replaces_frame() {
    let mut floors = HashMap::new();
    floors.insert("fp_1".to_string(), open_floor());
    let mut layer = Layer::new(&floors, 2).unwrap();

    let first = vec![
        Observation::client_fix("fp_1", PlanPoint::new(2.5, 2.5), 0.1, "aa"),
        Observation::client_unfixed("fp_1", "bb", "ap:01"),
    ];
    layer.set_observations(&first).unwrap();

    let overlay = layer.overlay("fp_1").unwrap();
    assert_relative_eq!(overlay.get_delta(false, Some(1)).sum(), 1.0);
    assert_relative_eq!(overlay.get_unfixed_observations(Some(1)), 1.0);

    // A new batch opens a new frame; the old one moves back in the window
    layer.set_observations(&[]).unwrap();
    let overlay = layer.overlay("fp_1").unwrap();
    assert_relative_eq!(overlay.get_delta(false, Some(1)).sum(), 0.0);
    assert_relative_eq!(overlay.get_delta(false, None).sum(), 0.5);
}

#[test]
fn test_full_view_spreads_unfixed_indoors() {
    let floor = masked_floor();
    let mut overlay = Overlay::new(&floor, 1).unwrap();
    overlay
        .add(&Observation::client_unfixed("fp_1", "aa", "ap:01"))
        .unwrap();

    let full = overlay.get_full(true, None);
    assert_relative_eq!(full.sum(), 1.0, epsilon = 1e-5);
    for (cell, value) in full.indexed_iter() {
        if *value > 0.0 {
            assert!(!*floor.mask().at(cell.row, cell.col));
        }
    }
}
