//! Dense row-major 2D storage.
//!
//! All density buffers, masks and symbol maps in this crate share one
//! backing layout: a flat `Vec` indexed as `row * cols + col`. Keeping the
//! layout in one place lets the overlay, boundary and historical modules
//! exchange frames without conversion.

use serde::{Deserialize, Serialize};

use super::point::GridCoord;

/// A dense 2D grid of `T`, row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseGrid<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> DenseGrid<T> {
    /// Create a grid filled with `T::default()`
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }
}

impl<T: Clone> DenseGrid<T> {
    /// Create a grid filled with copies of `value`
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Overwrite every cell with `value`
    pub fn fill(&mut self, value: T) {
        for slot in &mut self.data {
            *slot = value.clone();
        }
    }
}

impl<T> DenseGrid<T> {
    /// Number of rows
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// (rows, cols) pair
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total cell count
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the grid has no cells
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bounds-checked read
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            Some(&self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Unchecked-by-index read; panics when out of bounds
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> &T {
        debug_assert!(row < self.rows && col < self.cols);
        &self.data[row * self.cols + col]
    }

    /// Write a cell; panics when out of bounds
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col] = value;
    }

    /// Iterate cells in row-major order
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Iterate `(GridCoord, &T)` pairs in row-major order
    pub fn indexed_iter(&self) -> impl Iterator<Item = (GridCoord, &T)> {
        let cols = self.cols;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, v)| (GridCoord::new(i / cols, i % cols), v))
    }

    /// Raw backing slice, row-major
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable raw backing slice, row-major
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl DenseGrid<f32> {
    /// Sum of all cells
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Sum over the half-open rectangle `[r0, r1) x [c0, c1)`, clamped to
    /// the grid bounds.
    pub fn rect_sum(&self, r0: usize, r1: usize, c0: usize, c1: usize) -> f32 {
        let r1 = r1.min(self.rows);
        let c1 = c1.min(self.cols);
        let mut total = 0.0;
        for r in r0..r1 {
            for c in c0..c1 {
                total += self.data[r * self.cols + c];
            }
        }
        total
    }

    /// Add `other` into `self` cell-wise. Shapes must match.
    pub fn add_assign(&mut self, other: &DenseGrid<f32>) {
        debug_assert_eq!(self.shape(), other.shape());
        for (slot, v) in self.data.iter_mut().zip(other.data.iter()) {
            *slot += v;
        }
    }

    /// Multiply every cell by `factor`
    pub fn scale(&mut self, factor: f32) {
        for slot in &mut self.data {
            *slot *= factor;
        }
    }
}

impl DenseGrid<bool> {
    /// Number of `true` cells
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// Fraction of `true` cells over the half-open rectangle
    /// `[r0, r1) x [c0, c1)`, clamped to bounds. Empty rectangles read 0.
    pub fn rect_true_ratio(&self, r0: usize, r1: usize, c0: usize, c1: usize) -> f64 {
        let r1 = r1.min(self.rows);
        let c1 = c1.min(self.cols);
        if r0 >= r1 || c0 >= c1 {
            return 0.0;
        }
        let mut hits = 0usize;
        for r in r0..r1 {
            for c in c0..c1 {
                if self.data[r * self.cols + c] {
                    hits += 1;
                }
            }
        }
        hits as f64 / ((r1 - r0) * (c1 - c0)) as f64
    }
}
