//! Majority-vote reduction of the pixel mask to the overlay grid.

use crate::core::DenseGrid;

/// Fraction of outside pixels at which a grid cell is considered outside.
pub const DOWNSAMPLE_THRESHOLD: f64 = 0.5;

/// Reduce a pixel-level outside mask to the overlay grid shape.
///
/// The grid nominally covers one extra partial cell per axis, so the pixel
/// extent is padded by `margin_px` before being split into `grid_rows` x
/// `grid_cols` rectangles. Each grid cell votes on the pixels its rectangle
/// actually covers; a cell whose rectangle falls entirely inside the margin
/// padding covers no pixels and is treated as outside.
pub fn downsample_mask(
    pixel_mask: &DenseGrid<bool>,
    grid_rows: usize,
    grid_cols: usize,
    margin_px: (f64, f64),
) -> DenseGrid<bool> {
    let row_breaks = axis_breaks(pixel_mask.rows(), margin_px.0, grid_rows);
    let col_breaks = axis_breaks(pixel_mask.cols(), margin_px.1, grid_cols);

    let mut mask = DenseGrid::<bool>::new(grid_rows, grid_cols);
    for r in 0..grid_rows {
        for c in 0..grid_cols {
            let (r0, r1) = (row_breaks[r], row_breaks[r + 1]);
            let (c0, c1) = (col_breaks[c], col_breaks[c + 1]);
            let r1 = r1.min(pixel_mask.rows());
            let c1 = c1.min(pixel_mask.cols());
            let outside = if r0 >= r1 || c0 >= c1 {
                true
            } else {
                pixel_mask.rect_true_ratio(r0, r1, c0, c1) >= DOWNSAMPLE_THRESHOLD
            };
            mask.set(r, c, outside);
        }
    }
    mask
}

/// Evenly spaced break points over the margin-padded pixel extent,
/// truncated to whole pixels. Returns `cells + 1` monotone values.
fn axis_breaks(pixels: usize, margin_px: f64, cells: usize) -> Vec<usize> {
    let hi = pixels as f64 + margin_px;
    (0..=cells)
        .map(|i| (i as f64 * hi / cells as f64).floor() as usize)
        .collect()
}
