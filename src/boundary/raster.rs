//! Brightness raster input for boundary detection.
//!
//! The detector only needs per-pixel brightness relative to the maximum
//! possible value, so all supported inputs (grayscale bytes, interleaved
//! multi-channel bytes, decoded images) normalize to one representation:
//! a grid of channel sums plus the ceiling those sums can reach.

use image::DynamicImage;

use super::BoundaryError;
use crate::core::DenseGrid;

/// A floor-plan raster reduced to per-pixel brightness.
#[derive(Clone, Debug)]
pub struct Raster {
    brightness: DenseGrid<u32>,
    max_brightness: u32,
}

impl Raster {
    /// Build from single-channel (grayscale) bytes, row-major.
    pub fn from_luma(rows: usize, cols: usize, data: &[u8]) -> Result<Self, BoundaryError> {
        Self::from_channels(rows, cols, 1, data)
    }

    /// Build from interleaved multi-channel bytes, row-major.
    ///
    /// Brightness is the channel sum, so the maximum possible value is
    /// `255 * channels`. An alpha channel, if present, participates the
    /// same as any color channel.
    pub fn from_channels(
        rows: usize,
        cols: usize,
        channels: usize,
        data: &[u8],
    ) -> Result<Self, BoundaryError> {
        if channels == 0 || data.len() != rows * cols * channels {
            return Err(BoundaryError::RasterShape {
                rows,
                cols,
                channels,
                got: data.len(),
            });
        }
        let mut brightness = DenseGrid::<u32>::new(rows, cols);
        for (i, pixel) in data.chunks_exact(channels).enumerate() {
            let sum: u32 = pixel.iter().map(|b| *b as u32).sum();
            brightness.as_mut_slice()[i] = sum;
        }
        Ok(Self {
            brightness,
            max_brightness: 255 * channels as u32,
        })
    }

    /// Build from a decoded image, normalizing to RGB.
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (w, h) = rgb.dimensions();
        // Shape is known-good here, construction cannot fail
        Self::from_channels(h as usize, w as usize, 3, rgb.as_raw())
            .expect("rgb8 buffer matches its own dimensions")
    }

    /// Pixel rows
    #[inline]
    pub fn rows(&self) -> usize {
        self.brightness.rows()
    }

    /// Pixel columns
    #[inline]
    pub fn cols(&self) -> usize {
        self.brightness.cols()
    }

    /// Brightness of the pixel at (row, col)
    #[inline]
    pub fn brightness(&self, row: usize, col: usize) -> u32 {
        *self.brightness.at(row, col)
    }

    /// Maximum brightness a pixel can reach (255 × channels)
    #[inline]
    pub fn max_brightness(&self) -> u32 {
        self.max_brightness
    }
}
