//! Contour-tracing boundary detector.
//!
//! Classifies floor-plan pixels into wall/indoor regions by brightness,
//! then walks the outermost wall contour with an 8-direction wall follower,
//! flooding everything reachable outward from the trace as OUTSIDE. The
//! result is a pixel mask of the unbounded outer region.
//!
//! The trace keeps the wall on one side by scanning the 8 compass
//! directions clockwise, starting one position past the reverse of the
//! incoming step. Directions scanned before the first wall hit are open
//! space and get a straight OUTSIDE flood line; diagonal steps additionally
//! draw one short perpendicular line so the outside region cannot leak
//! through a concave corner.
//!
//! Self-touching wall topologies can close the loop early and leave
//! interior regions unvisited; this matches the behavior the rest of the
//! pipeline was tuned against and is deliberately not defended.

use serde::{Deserialize, Serialize};

use super::{BoundaryError, Raster};
use crate::core::DenseGrid;

/// Default wall brightness ratio: a pixel darker than 97% of the maximum
/// possible brightness is a wall.
pub const DEFAULT_WALL_THRESHOLD: f64 = 0.97;

/// Pixel classification used during tracing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Region {
    /// Flooded outer region
    Outside = 0,

    /// Not (yet) reached by the outside flood
    #[default]
    Indoor = 1,

    /// Brightness below the wall threshold
    Wall = 2,

    /// Wall pixel visited by the contour trace
    Considered = 3,
}

impl Region {
    /// Wall follower treats these as barriers
    #[inline]
    fn is_barrier(self) -> bool {
        matches!(self, Region::Wall | Region::Considered)
    }
}

/// A rectangular region forced OUTSIDE regardless of brightness.
///
/// Coordinates are row/col pairs, either both normalized to [0,1] per axis
/// or raw pixel values; anything outside both ranges is rejected. Used to
/// mask out dark non-wall artwork (logos, legends) that would derail the
/// wall follower.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlindSpot {
    /// Top edge (row)
    pub r1: f64,
    /// Left edge (col)
    pub c1: f64,
    /// Bottom edge (row, exclusive)
    pub r2: f64,
    /// Right edge (col, exclusive)
    pub c2: f64,
}

impl BlindSpot {
    /// Create a new blind-spot box
    pub fn new(r1: f64, c1: f64, r2: f64, c2: f64) -> Self {
        Self { r1, c1, r2, c2 }
    }
}

/// The 8 compass steps (row, col) in the cyclic order the wall follower
/// scans them: N, NW, W, SW, S, SE, E, NE.
const COMPASS: [(i32, i32); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

/// Scan order for one trace step: the compass rotated so scanning starts
/// one position past the reverse of the incoming direction.
fn scan_order(incoming: (i32, i32)) -> [(i32, i32); 8] {
    let reverse = (-incoming.0, -incoming.1);
    let idx = COMPASS
        .iter()
        .position(|d| *d == reverse)
        .expect("incoming step is always a compass direction");
    let mut order = [(0i32, 0i32); 8];
    for (i, slot) in order.iter_mut().enumerate() {
        *slot = COMPASS[(idx + 1 + i) % 8];
    }
    order
}

/// Pixel-level boundary detector over a classified symbol map.
pub struct BoundaryDetector {
    map: DenseGrid<Region>,
}

impl BoundaryDetector {
    /// Classify `raster` with the default wall threshold.
    pub fn new(raster: &Raster) -> Self {
        Self::with_threshold(raster, DEFAULT_WALL_THRESHOLD)
    }

    /// Classify `raster` with a custom wall brightness ratio.
    pub fn with_threshold(raster: &Raster, threshold: f64) -> Self {
        let cutoff = threshold * raster.max_brightness() as f64;
        let mut map = DenseGrid::<Region>::filled(raster.rows(), raster.cols(), Region::Indoor);
        for r in 0..raster.rows() {
            for c in 0..raster.cols() {
                if (raster.brightness(r, c) as f64) < cutoff {
                    map.set(r, c, Region::Wall);
                }
            }
        }
        Self { map }
    }

    /// Force a rectangular region OUTSIDE before tracing.
    ///
    /// Accepts homogeneous coordinates: all four values in [0,1] are
    /// scaled to the pixel shape, otherwise all four must already be valid
    /// pixel coordinates.
    pub fn add_blind_spot(&mut self, spot: BlindSpot) -> Result<(), BoundaryError> {
        let (rows, cols) = self.map.shape();
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        let BlindSpot { r1, c1, r2, c2 } = spot;

        let (r1, c1, r2, c2) = if unit(r1) && unit(r2) && unit(c1) && unit(c2) {
            (
                r1 * rows as f64,
                c1 * cols as f64,
                r2 * rows as f64,
                c2 * cols as f64,
            )
        } else if (0.0..=rows as f64).contains(&r1)
            && (0.0..=rows as f64).contains(&r2)
            && (0.0..=cols as f64).contains(&c1)
            && (0.0..=cols as f64).contains(&c2)
        {
            (r1, c1, r2, c2)
        } else {
            return Err(BoundaryError::BlindSpotOutOfRange {
                r1,
                c1,
                r2,
                c2,
                rows,
                cols,
            });
        };

        for r in (r1 as usize)..(r2 as usize).min(rows) {
            for c in (c1 as usize)..(c2 as usize).min(cols) {
                self.map.set(r, c, Region::Outside);
            }
        }
        Ok(())
    }

    /// Region at signed coordinates; `None` when off the image.
    #[inline]
    fn region_at(&self, r: i64, c: i64) -> Option<Region> {
        if r < 0 || c < 0 {
            return None;
        }
        self.map.get(r as usize, c as usize).copied()
    }

    /// Seek a wall to walk along, scanning expanding square rings from the
    /// image origin. Returns the start cell and the initial probe
    /// direction implied by which ring edge matched.
    fn find_wall_from_root(&self) -> Option<(usize, usize, (i32, i32))> {
        let limit = self.map.rows().min(self.map.cols());
        for r in 0..limit {
            for q in 0..r {
                if *self.map.at(r, q) == Region::Wall {
                    // Southern ring edge: probe southward
                    return Some((r, q, (1, 0)));
                }
                if *self.map.at(q, r) == Region::Wall {
                    // Eastern ring edge: probe westward along the wall
                    return Some((q, r, (0, -1)));
                }
            }
        }
        None
    }

    /// Draw a straight OUTSIDE line from (r, c) exclusive in direction
    /// (dr, dc) until the image bound or a wall/considered cell. Only
    /// not-yet-barrier cells are converted; re-runs are idempotent.
    fn run_line(&mut self, r: usize, c: usize, dr: i32, dc: i32) {
        let mut rr = r as i64 + dr as i64;
        let mut cc = c as i64 + dc as i64;
        while let Some(region) = self.region_at(rr, cc) {
            if region.is_barrier() {
                break;
            }
            self.map.set(rr as usize, cc as usize, Region::Outside);
            rr += dr as i64;
            cc += dc as i64;
        }
    }

    /// Run the contour trace. Safe to call on wall-less images (no-op).
    pub fn run(&mut self) {
        let Some((mut r, mut c, mut step)) = self.find_wall_from_root() else {
            log::warn!("boundary trace found no wall pixels; mask stays all-indoor");
            return;
        };

        // Until the trace wraps around onto a visited wall cell
        while *self.map.at(r, c) != Region::Considered {
            self.map.set(r, c, Region::Considered);

            let mut chosen = step;
            for d in scan_order(step) {
                let neighbor = self.region_at(r as i64 + d.0 as i64, c as i64 + d.1 as i64);
                chosen = d;
                if neighbor.is_some_and(|n| n.is_barrier()) {
                    if d.0 != 0 && d.1 != 0 {
                        // Diagonal step: seal the concave corner with one
                        // perpendicular line from the adjacent orthogonal cell
                        let root = if d.0 == d.1 { (0, d.1) } else { (d.0, 0) };
                        let rr = r as i64 + root.0 as i64;
                        let cc = c as i64 + root.1 as i64;
                        if self.region_at(rr, cc).is_some() {
                            self.run_line(rr as usize, cc as usize, d.1, -d.0);
                        }
                    }
                    break;
                }
                // Open direction: flood it outside up to the next barrier
                self.run_line(r, c, d.0, d.1);
            }

            step = chosen;
            let nr = r as i64 + step.0 as i64;
            let nc = c as i64 + step.1 as i64;
            if self.region_at(nr, nc).is_none() {
                log::warn!("boundary trace stepped off the image at ({r},{c})");
                break;
            }
            r = nr as usize;
            c = nc as usize;
        }
    }

    /// Boolean pixel mask of the excluded region: true for OUTSIDE and
    /// CONSIDERED cells, false for untouched indoor cells and raw walls.
    pub fn boundary_mask(&self) -> DenseGrid<bool> {
        let (rows, cols) = self.map.shape();
        let mut mask = DenseGrid::<bool>::new(rows, cols);
        for (slot, region) in mask
            .as_mut_slice()
            .iter_mut()
            .zip(self.map.as_slice().iter())
        {
            *slot = matches!(region, Region::Outside | Region::Considered);
        }
        mask
    }

    /// RGB preview of the symbol map for debug rendering: outside green,
    /// walls black, trace red, indoor gray. Encoding to PNG is left to the
    /// rendering collaborator.
    pub fn symbol_graphic(&self) -> (Vec<u8>, usize, usize) {
        let (rows, cols) = self.map.shape();
        let mut rgb = Vec::with_capacity(rows * cols * 3);
        for region in self.map.iter() {
            let px: [u8; 3] = match region {
                Region::Outside => [0, 255, 0],
                Region::Wall => [0, 0, 0],
                Region::Considered => [255, 0, 0],
                Region::Indoor => [192, 192, 192],
            };
            rgb.extend_from_slice(&px);
        }
        (rgb, rows, cols)
    }

    /// Shape of the underlying symbol map as (rows, cols)
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.map.shape()
    }

    /// Region at pixel (row, col), for tests and previews
    #[inline]
    pub fn region(&self, row: usize, col: usize) -> Region {
        *self.map.at(row, col)
    }
}
