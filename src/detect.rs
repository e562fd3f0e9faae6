//! Spike detection and camera ranking.
//!
//! A spike is an anomalously busy 3x3-cell block of a density-difference
//! grid. When one fires, cameras on the floor are ranked for a snapshot:
//! any camera whose FOV covers the spike cell wins outright; otherwise the
//! closest cameras are offered on a best-effort basis.

use crate::core::DenseGrid;
use crate::devices::Camera;
use crate::plan::{Floor, CELL_SIZE_M};

/// Default density-above-baseline threshold for spike detection.
pub const DEFAULT_SPIKE_THRESHOLD: f32 = 0.35;

/// Side of the square blocks density is pooled over, in cells.
const BLOCK_CELLS: usize = 3;

/// Result of scanning a difference grid for a spike.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spike {
    /// Whether the busiest block exceeded the threshold
    pub triggered: bool,
    /// Center of the busiest block in top-down meters (row, col);
    /// `None` when no block had positive density
    pub location: Option<(f64, f64)>,
}

/// Pool `delta` over non-overlapping 3x3 blocks (partial blocks at the
/// edges included) and report the busiest block.
pub fn spike(delta: &DenseGrid<f32>, threshold: f32) -> Spike {
    let block_rows = delta.rows() / BLOCK_CELLS + 1;
    let block_cols = delta.cols() / BLOCK_CELLS + 1;

    let mut busiest = 0.0f32;
    let mut location = None;
    for br in 0..block_rows {
        for bc in 0..block_cols {
            let sum = delta.rect_sum(
                BLOCK_CELLS * br,
                BLOCK_CELLS * (br + 1),
                BLOCK_CELLS * bc,
                BLOCK_CELLS * (bc + 1),
            );
            if sum > busiest {
                busiest = sum;
                location = Some((
                    BLOCK_CELLS as f64 * (br as f64 + 0.5) * CELL_SIZE_M,
                    BLOCK_CELLS as f64 * (bc as f64 + 0.5) * CELL_SIZE_M,
                ));
            }
        }
    }
    Spike {
        triggered: busiest > threshold,
        location,
    }
}

/// How a camera selection relates to the spike.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coverage {
    /// At least one camera's FOV covers the spike cell; all such cameras
    /// are returned and distance plays no part
    Covered,
    /// No FOV covers the spike; the nearest cameras are returned instead
    BestEffort,
}

/// Pick cameras on `floor` to verify a spike at `location` (top-down
/// meters).
///
/// FOV cameras covering the spike cell win outright. Failing that, FOV
/// cameras are ranked by the distance from the spike to their nearest
/// covered cell center, cameras without an FOV by the distance to the
/// camera itself, and the closest `n` are returned.
pub fn nearest_cameras<'a, I>(
    n: usize,
    floor: &Floor,
    cameras: I,
    location: (f64, f64),
) -> (Coverage, Vec<&'a Camera>)
where
    I: IntoIterator<Item = &'a Camera>,
{
    let on_floor: Vec<&Camera> = cameras
        .into_iter()
        .filter(|cam| cam.floor_id == floor.plan.id)
        .collect();

    let spike_cell = (location.0 as usize, location.1 as usize);
    let covering: Vec<&Camera> = on_floor
        .iter()
        .filter(|cam| {
            cam.fov()
                .and_then(|fov| fov.get(spike_cell.0, spike_cell.1))
                .copied()
                .unwrap_or(false)
        })
        .copied()
        .collect();
    if !covering.is_empty() {
        return (Coverage::Covered, covering);
    }

    let (height_m, _) = floor.physical_shape();
    let mut ranked: Vec<(f64, &Camera)> = on_floor
        .into_iter()
        .map(|cam| {
            let dist = match cam.fov() {
                Some(fov) => fov
                    .indexed_iter()
                    .filter(|(_, on)| **on)
                    .map(|(coord, _)| {
                        let (cr, cc) = coord.center();
                        (cr * CELL_SIZE_M - location.0).hypot(cc * CELL_SIZE_M - location.1)
                    })
                    .fold(f64::INFINITY, f64::min),
                // Camera position flipped into the same top-down frame
                None => {
                    (height_m - cam.position.y - location.0).hypot(cam.position.x - location.1)
                }
            };
            (dist, cam)
        })
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked.truncate(n);
    (
        Coverage::BestEffort,
        ranked.into_iter().map(|(_, cam)| cam).collect(),
    )
}
