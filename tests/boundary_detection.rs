//! Boundary detection integration tests.
//!
//! These run the full pipeline on synthetic floor-plan rasters: wall
//! classification, contour tracing, outside flooding and downsampling to
//! the overlay grid.

use sabha_map::boundary::{downsample_mask, BlindSpot, BoundaryDetector, Raster};
use sabha_map::core::GeoPoint;
use sabha_map::plan::{Floor, FloorPlan};

/// White square image with a 1-px black rectangle ring inset from every
/// edge by `inset` pixels.
fn ringed_image(size: usize, inset: usize) -> Raster {
    let far = size - 1 - inset;
    let mut data = vec![255u8; size * size];
    for i in inset..=far {
        data[inset * size + i] = 0;
        data[far * size + i] = 0;
        data[i * size + inset] = 0;
        data[i * size + far] = 0;
    }
    Raster::from_luma(size, size, &data).unwrap()
}

fn traced_mask(raster: &Raster) -> sabha_map::core::DenseGrid<bool> {
    let mut detector = BoundaryDetector::new(raster);
    detector.run();
    detector.boundary_mask()
}

#[test]
fn test_ring_plan_excludes_band_keeps_interior() {
    // 100x100 image, wall ring at pixel 10 from each edge: everything up
    // to and including the ring is excluded, the 78x78 interior survives
    let raster = ringed_image(100, 10);
    let mask = traced_mask(&raster);

    for r in 0..100 {
        for c in 0..100 {
            let interior = (11..=88).contains(&r) && (11..=88).contains(&c);
            assert_eq!(
                *mask.at(r, c),
                !interior,
                "pixel ({r},{c}) expected {}",
                !interior
            );
        }
    }
}

#[test]
fn test_tracing_is_deterministic() {
    let raster = ringed_image(60, 6);
    let first = traced_mask(&raster);
    let second = traced_mask(&raster);
    assert_eq!(first.as_slice(), second.as_slice());
}

#[test]
fn test_blind_spot_suppresses_dark_artwork() {
    // A solid dark logo floats inside the ring; the blind spot forces it
    // out of the indoor region instead of leaving a phantom wall block
    let mut raster_data = vec![255u8; 60 * 60];
    let far = 60 - 1 - 6;
    for i in 6..=far {
        raster_data[6 * 60 + i] = 0;
        raster_data[far * 60 + i] = 0;
        raster_data[i * 60 + 6] = 0;
        raster_data[i * 60 + far] = 0;
    }
    for r in 20..24 {
        for c in 20..24 {
            raster_data[r * 60 + c] = 0;
        }
    }
    let raster = Raster::from_luma(60, 60, &raster_data).unwrap();

    let mut detector = BoundaryDetector::new(&raster);
    detector
        .add_blind_spot(BlindSpot::new(19.0, 19.0, 25.0, 25.0))
        .unwrap();
    detector.run();
    let mask = detector.boundary_mask();

    // The wall ring still traces and deep interior cells away from the
    // blind spot stay indoor
    assert!(*mask.at(0, 0));
    assert!(!*mask.at(40, 40));
    // The blind-spot box itself reads excluded
    assert!(*mask.at(21, 21));
}

#[test]
fn test_downsample_majority_vote_with_margin() {
    let raster = ringed_image(100, 10);
    let pixel_mask = traced_mask(&raster);

    // 10m x 10m plan over the 100px raster: 11x11 grid, 1m margin per axis
    let mask = downsample_mask(&pixel_mask, 11, 11, (10.0, 10.0));
    assert!(*mask.at(0, 0));
    assert!(!*mask.at(5, 5));
    // Margin-heavy last row and column read outside
    assert!(*mask.at(10, 5));
    assert!(*mask.at(5, 10));
}

#[test]
fn test_floor_masking_end_to_end() {
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
    let mut floor = Floor::new(plan);
    assert_eq!(floor.mask().count_true(), 0);

    let raster = ringed_image(100, 10);
    floor.set_bounds_mask(&raster, &[], None).unwrap();
    assert!(floor.mask_enabled);
    assert!(*floor.mask().at(0, 0));
    assert!(!*floor.mask().at(5, 5));
    assert!(floor.pixel_mask().is_some());

    floor.clear_bounds_mask(&[]);
    assert!(!floor.mask_enabled);
    assert_eq!(floor.mask().count_true(), 0);
}
