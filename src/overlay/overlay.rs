//! Per-floor density accumulation over an exposure window.

use crate::core::DenseGrid;
use crate::plan::{Floor, CELL_SIZE_M};

use super::{Observation, OverlayError};

/// Uncertainty radius below which a fix lands in a single cell: half the
/// cell diagonal, so the radius cannot reach any neighboring cell center.
pub const VARIANCE_THRESHOLD_M: f64 = std::f64::consts::SQRT_2 * 0.5;

/// Density buffers for one floor.
///
/// Three channels ride the same exposure ring: `masked` (density restricted
/// to indoor cells), `unmasked` (density over the whole grid) and `unfixed`
/// (scalar count of observations with no usable position). Frame 0 is the
/// current frame; [`Overlay::roll`] pushes history back and opens a zeroed
/// frame.
#[derive(Clone, Debug)]
pub struct Overlay {
    floor_id: String,
    grid_rows: usize,
    grid_cols: usize,
    height_m: f64,
    width_m: f64,
    /// Cells usable for masked accumulation (inverse of the outside mask)
    indoor: DenseGrid<bool>,
    exposure: usize,
    masked: Vec<DenseGrid<f32>>,
    unmasked: Vec<DenseGrid<f32>>,
    unfixed: Vec<f32>,
}

/// Indoor cells are the complement of the floor's outside mask.
fn indoor_from_outside(outside: &DenseGrid<bool>) -> DenseGrid<bool> {
    let mut indoor = DenseGrid::<bool>::new(outside.rows(), outside.cols());
    for (slot, out) in indoor.as_mut_slice().iter_mut().zip(outside.iter()) {
        *slot = !out;
    }
    indoor
}

impl Overlay {
    /// Create a zeroed overlay matching `floor`'s geometry.
    pub fn new(floor: &Floor, exposure: usize) -> Result<Self, OverlayError> {
        let (grid_rows, grid_cols) = floor.grid_shape();
        let (height_m, width_m) = floor.physical_shape();
        Self::from_geometry(
            floor.plan.id.clone(),
            grid_rows,
            grid_cols,
            height_m,
            width_m,
            indoor_from_outside(floor.mask()),
            exposure,
        )
    }

    pub(crate) fn from_geometry(
        floor_id: String,
        grid_rows: usize,
        grid_cols: usize,
        height_m: f64,
        width_m: f64,
        indoor: DenseGrid<bool>,
        exposure: usize,
    ) -> Result<Self, OverlayError> {
        if exposure == 0 {
            return Err(OverlayError::ZeroExposure(floor_id));
        }
        Ok(Self {
            floor_id,
            grid_rows,
            grid_cols,
            height_m,
            width_m,
            indoor,
            exposure,
            masked: vec![DenseGrid::new(grid_rows, grid_cols); exposure],
            unmasked: vec![DenseGrid::new(grid_rows, grid_cols); exposure],
            unfixed: vec![0.0; exposure],
        })
    }

    /// Floor this overlay belongs to
    #[inline]
    pub fn floor_id(&self) -> &str {
        &self.floor_id
    }

    /// Exposure depth (number of frames)
    #[inline]
    pub fn exposure(&self) -> usize {
        self.exposure
    }

    /// Grid shape as (rows, cols)
    #[inline]
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.grid_rows, self.grid_cols)
    }

    /// Physical shape as (height, width) meters
    #[inline]
    pub fn physical_shape(&self) -> (f64, f64) {
        (self.height_m, self.width_m)
    }

    /// Cells usable for masked accumulation
    #[inline]
    pub fn indoor_mask(&self) -> &DenseGrid<bool> {
        &self.indoor
    }

    /// Push history back one frame and open a zeroed current frame.
    pub fn roll(&mut self) {
        self.masked.rotate_right(1);
        self.unmasked.rotate_right(1);
        self.unfixed.rotate_right(1);
        self.masked[0].fill(0.0);
        self.unmasked[0].fill(0.0);
        self.unfixed[0] = 0.0;
    }

    /// Zero every frame of every channel.
    pub fn clear(&mut self) {
        for frame in &mut self.masked {
            frame.fill(0.0);
        }
        for frame in &mut self.unmasked {
            frame.fill(0.0);
        }
        self.unfixed.fill(0.0);
    }

    /// Accumulate one observation into the current frame.
    ///
    /// An override mask places the observation's unit mass uniformly over
    /// the mask's cells on both channels, ignoring the floor mask. A planar
    /// fix lands in a single cell when its uncertainty radius is below
    /// [`VARIANCE_THRESHOLD_M`], otherwise it is smeared uniformly over
    /// every cell whose center lies within the radius; the masked channel
    /// re-normalizes over the indoor subset and silently skips the
    /// observation when that subset is empty. Observations with no
    /// placement input only bump the unfixed count.
    pub fn add(&mut self, obs: &Observation) -> Result<(), OverlayError> {
        let candidates = match (&obs.override_mask, obs.position) {
            (Some(mask), _) => {
                if mask.shape() != (self.grid_rows, self.grid_cols) {
                    return Err(self.dimension_mismatch(mask.rows(), mask.cols()));
                }
                let n = mask.count_true();
                if n == 0 {
                    return Err(OverlayError::NoCandidateCells {
                        floor_id: self.floor_id.clone(),
                        x: 0.0,
                        y: 0.0,
                        variance: 0.0,
                    });
                }
                // Override wins over the floor mask on both channels
                let weight = 1.0 / n as f32;
                deposit(&mut self.unmasked[0], mask, weight);
                deposit(&mut self.masked[0], mask, weight);
                return Ok(());
            }
            (None, Some(p)) => {
                let variance = obs.variance.unwrap_or(0.0);
                if variance < VARIANCE_THRESHOLD_M {
                    self.single_cell(p.x, p.y, variance)?
                } else {
                    self.smear_cells(p.x, p.y, variance)
                }
            }
            (None, None) => {
                self.unfixed[0] += 1.0;
                return Ok(());
            }
        };

        let p = obs.position.unwrap_or_default();
        let n = candidates.count_true();
        if n == 0 {
            return Err(OverlayError::NoCandidateCells {
                floor_id: self.floor_id.clone(),
                x: p.x,
                y: p.y,
                variance: obs.variance.unwrap_or(0.0),
            });
        }
        deposit(&mut self.unmasked[0], &candidates, 1.0 / n as f32);

        let mut indoor_candidates = candidates;
        for (slot, indoor) in indoor_candidates
            .as_mut_slice()
            .iter_mut()
            .zip(self.indoor.iter())
        {
            *slot = *slot && *indoor;
        }
        let m = indoor_candidates.count_true();
        if m > 0 {
            deposit(&mut self.masked[0], &indoor_candidates, 1.0 / m as f32);
        }
        Ok(())
    }

    /// Candidate mask holding exactly the cell containing (x, y). The row
    /// is taken in the top-down frame, flipped about the physical height
    /// like the smear path.
    fn single_cell(&self, x: f64, y: f64, variance: f64) -> Result<DenseGrid<bool>, OverlayError> {
        let row = ((self.height_m - y) / CELL_SIZE_M).floor();
        let col = (x / CELL_SIZE_M).floor();
        if row < 0.0
            || col < 0.0
            || row as usize >= self.grid_rows
            || col as usize >= self.grid_cols
        {
            return Err(OverlayError::NoCandidateCells {
                floor_id: self.floor_id.clone(),
                x,
                y,
                variance,
            });
        }
        let mut mask = DenseGrid::<bool>::new(self.grid_rows, self.grid_cols);
        mask.set(row as usize, col as usize, true);
        Ok(mask)
    }

    /// Candidate mask of every cell whose center lies within `variance`
    /// meters of the fix, in the top-down meter frame.
    fn smear_cells(&self, x: f64, y: f64, variance: f64) -> DenseGrid<bool> {
        let loc = (self.height_m - y, x);
        let mut mask = DenseGrid::<bool>::new(self.grid_rows, self.grid_cols);
        for r in 0..self.grid_rows {
            for c in 0..self.grid_cols {
                let center_r = (r as f64 + 0.5) * CELL_SIZE_M;
                let center_c = (c as f64 + 0.5) * CELL_SIZE_M;
                let d = (center_r - loc.0).hypot(center_c - loc.1);
                mask.set(r, c, d <= variance);
            }
        }
        mask
    }

    /// Boxcar mean of the fixed-observation density over the first `window`
    /// frames. `None` or 0 means the full exposure; larger windows clamp to
    /// the frames that exist.
    pub fn get_delta(&self, masked: bool, window: Option<usize>) -> DenseGrid<f32> {
        let w = self.effective_window(window);
        let frames = if masked { &self.masked } else { &self.unmasked };
        let mut mean = DenseGrid::<f32>::new(self.grid_rows, self.grid_cols);
        for frame in &frames[..w] {
            mean.add_assign(frame);
        }
        mean.scale(1.0 / w as f32);
        mean
    }

    /// Boxcar mean of the unfixed-observation count over the first `window`
    /// frames.
    pub fn get_unfixed_observations(&self, window: Option<usize>) -> f32 {
        let w = self.effective_window(window);
        self.unfixed[..w].iter().sum::<f32>() / w as f32
    }

    /// Fixed density plus the unfixed mass spread uniformly, over the
    /// indoor cells when `masked`, over every cell otherwise.
    pub fn get_full(&self, masked: bool, window: Option<usize>) -> DenseGrid<f32> {
        let mut data = self.get_delta(masked, window);
        let share = self.get_unfixed_observations(window);
        if masked {
            let n = self.indoor.count_true();
            if n > 0 {
                let per_cell = share / n as f32;
                for (slot, indoor) in data.as_mut_slice().iter_mut().zip(self.indoor.iter()) {
                    if *indoor {
                        *slot += per_cell;
                    }
                }
            }
        } else if !data.is_empty() {
            let per_cell = share / data.len() as f32;
            for slot in data.as_mut_slice() {
                *slot += per_cell;
            }
        }
        data
    }

    fn effective_window(&self, window: Option<usize>) -> usize {
        match window {
            Some(w) if w > 0 => w.min(self.exposure),
            _ => self.exposure,
        }
    }

    /// Deep copy with the exposure window squashed (mean) into one frame.
    pub fn flattened(&self) -> Overlay {
        let mut flat = Self::from_geometry(
            self.floor_id.clone(),
            self.grid_rows,
            self.grid_cols,
            self.height_m,
            self.width_m,
            self.indoor.clone(),
            1,
        )
        .expect("exposure 1 is valid");
        flat.masked[0] = self.get_delta(true, None);
        flat.unmasked[0] = self.get_delta(false, None);
        flat.unfixed[0] = self.get_unfixed_observations(None);
        flat
    }

    /// Check this overlay still matches `floor`'s geometry and refresh the
    /// cached mask. Accumulated frames are left untouched; the new mask
    /// only affects future observations.
    pub fn verify_and_update(&mut self, floor: &Floor) -> Result<(), OverlayError> {
        let (rows, cols) = floor.grid_shape();
        if (self.grid_rows, self.grid_cols) != (rows, cols)
            || (self.height_m, self.width_m) != floor.physical_shape()
        {
            return Err(self.dimension_mismatch(rows, cols));
        }
        self.indoor = indoor_from_outside(floor.mask());
        Ok(())
    }

    fn dimension_mismatch(&self, rows: usize, cols: usize) -> OverlayError {
        OverlayError::DimensionMismatch {
            floor_id: self.floor_id.clone(),
            expected_rows: self.grid_rows,
            expected_cols: self.grid_cols,
            rows,
            cols,
        }
    }

    pub(crate) fn frames(&self) -> (&[DenseGrid<f32>], &[DenseGrid<f32>], &[f32]) {
        (&self.masked, &self.unmasked, &self.unfixed)
    }

    pub(crate) fn set_frames(
        &mut self,
        masked: Vec<DenseGrid<f32>>,
        unmasked: Vec<DenseGrid<f32>>,
        unfixed: Vec<f32>,
    ) -> Result<(), OverlayError> {
        let shape_ok = |frames: &[DenseGrid<f32>]| {
            frames.len() == self.exposure
                && frames
                    .iter()
                    .all(|f| f.shape() == (self.grid_rows, self.grid_cols))
        };
        if !shape_ok(&masked) || !shape_ok(&unmasked) || unfixed.len() != self.exposure {
            return Err(OverlayError::FrameShape {
                floor_id: self.floor_id.clone(),
            });
        }
        self.masked = masked;
        self.unmasked = unmasked;
        self.unfixed = unfixed;
        Ok(())
    }
}

/// Add `weight` to `frame` at each true cell of `cells`.
fn deposit(frame: &mut DenseGrid<f32>, cells: &DenseGrid<bool>, weight: f32) {
    for (slot, on) in frame.as_mut_slice().iter_mut().zip(cells.iter()) {
        if *on {
            *slot += weight;
        }
    }
}
