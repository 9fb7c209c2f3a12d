//! Per-object segmentation masks

use crate::error::{Error, Result};

/// Pixel membership map for one detected crown.
///
/// The mask covers a `width` x `height` image but only stores the crop
/// rectangle that can hold membership; everything outside it is `0.0`.
/// Stored values are row-major within the crop and lie in `[0, 1]`; binary
/// masks use exactly `0.0` and `1.0`, soft masks anything in between.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    crop: MaskCrop,
    values: Vec<f32>,
}

/// Rectangle of a mask that carries stored values, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskCrop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl MaskCrop {
    fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }
}

impl SegmentationMask {
    /// Build a mask from row-major membership values covering the whole image.
    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let crop = MaskCrop { x: 0, y: 0, width, height };
        Self::from_crop(width, height, crop, values)
    }

    /// Build a mask for a `width` x `height` image from the values inside `crop`.
    ///
    /// The crop may be empty; it must lie within the image.
    pub fn from_crop(width: u32, height: u32, crop: MaskCrop, values: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Validation(format!(
                "mask dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        let fits = |origin: u32, extent: u32, limit: u32| {
            origin.checked_add(extent).is_some_and(|end| end <= limit)
        };
        if !fits(crop.x, crop.width, width) || !fits(crop.y, crop.height, height) {
            return Err(Error::Validation(format!(
                "mask crop {}x{} at ({}, {}) exceeds {}x{} image",
                crop.width, crop.height, crop.x, crop.y, width, height
            )));
        }
        let expected = (crop.width as usize)
            .checked_mul(crop.height as usize)
            .ok_or_else(|| Error::Validation("mask dimensions overflow".to_string()))?;
        if values.len() != expected {
            return Err(Error::Validation(format!(
                "mask crop of {}x{} needs {} values, got {}",
                crop.width,
                crop.height,
                expected,
                values.len()
            )));
        }
        if let Some((idx, v)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(Error::Validation(format!(
                "mask value {} at index {} is outside [0, 1]",
                v, idx
            )));
        }
        Ok(Self { width, height, crop, values })
    }

    /// Build a mask from rows of soft membership values.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let (width, height) = grid_dims(rows)?;
        Self::from_values(width, height, rows.concat())
    }

    /// Build a binary mask from rows of booleans.
    pub fn from_bool_rows(rows: &[Vec<bool>]) -> Result<Self> {
        let (width, height) = grid_dims(rows)?;
        let values = rows
            .iter()
            .flat_map(|row| row.iter().map(|&on| if on { 1.0 } else { 0.0 }))
            .collect();
        Self::from_values(width, height, values)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn crop(&self) -> MaskCrop {
        self.crop
    }

    /// Number of values held in memory.
    pub fn stored_len(&self) -> usize {
        debug_assert_eq!(self.values.len(), self.crop.len());
        self.values.len()
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        if !self.crop.contains(x, y) {
            return Some(0.0);
        }
        let idx = (y - self.crop.y) as usize * self.crop.width as usize + (x - self.crop.x) as usize;
        self.values.get(idx).copied()
    }

    /// Sum of membership values, i.e. the crown footprint in pixels.
    pub fn pixel_area(&self) -> f64 {
        self.values.iter().map(|&v| v as f64).sum()
    }
}

fn grid_dims<T>(rows: &[Vec<T>]) -> Result<(u32, u32)> {
    let height = rows.len();
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.iter().any(|r| r.len() != width) {
        return Err(Error::Validation("mask rows have differing lengths".to_string()));
    }
    let width = u32::try_from(width)
        .map_err(|_| Error::Validation("mask is too wide".to_string()))?;
    let height = u32::try_from(height)
        .map_err(|_| Error::Validation("mask is too tall".to_string()))?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_pixel_area() {
        let mask = SegmentationMask::from_bool_rows(&[
            vec![true, true, false],
            vec![false, true, false],
        ])
        .unwrap();
        assert_eq!(mask.width(), 3);
        assert_eq!(mask.height(), 2);
        assert_eq!(mask.pixel_area(), 3.0);
    }

    #[test]
    fn test_soft_values_contribute_fractionally() {
        let mask = SegmentationMask::from_rows(&[vec![0.5, 0.25], vec![0.25, 0.0]]).unwrap();
        assert_eq!(mask.pixel_area(), 1.0);
    }

    #[test]
    fn test_get() {
        let mask = SegmentationMask::from_values(2, 2, vec![0.0, 1.0, 0.5, 0.0]).unwrap();
        assert_eq!(mask.get(1, 0), Some(1.0));
        assert_eq!(mask.get(0, 1), Some(0.5));
        assert_eq!(mask.get(2, 0), None);
        assert_eq!(mask.get(0, 2), None);
    }

    #[test]
    fn test_rejects_length_mismatch() {
        assert!(SegmentationMask::from_values(2, 2, vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        assert!(SegmentationMask::from_values(0, 4, vec![]).is_err());
        assert!(SegmentationMask::from_rows(&[]).is_err());
        assert!(SegmentationMask::from_bool_rows(&[vec![]]).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(SegmentationMask::from_values(1, 1, vec![1.5]).is_err());
        assert!(SegmentationMask::from_values(1, 1, vec![-0.1]).is_err());
        assert!(SegmentationMask::from_values(1, 1, vec![f32::NAN]).is_err());
        assert!(SegmentationMask::from_values(1, 1, vec![f32::INFINITY]).is_err());
    }

    #[test]
    fn test_crop_reads_zero_outside() {
        let crop = MaskCrop { x: 2, y: 1, width: 2, height: 2 };
        let mask = SegmentationMask::from_crop(6, 4, crop, vec![1.0, 0.5, 0.0, 1.0]).unwrap();
        assert_eq!(mask.width(), 6);
        assert_eq!(mask.height(), 4);
        assert_eq!(mask.pixel_area(), 2.5);
        assert_eq!(mask.get(2, 1), Some(1.0));
        assert_eq!(mask.get(3, 1), Some(0.5));
        assert_eq!(mask.get(3, 2), Some(1.0));
        assert_eq!(mask.get(0, 0), Some(0.0));
        assert_eq!(mask.get(4, 1), Some(0.0));
        assert_eq!(mask.get(6, 1), None);
    }

    #[test]
    fn test_crop_stores_only_the_box() {
        let crop = MaskCrop { x: 5000, y: 3000, width: 40, height: 30 };
        let mask = SegmentationMask::from_crop(6000, 4000, crop, vec![1.0; 1200]).unwrap();
        assert_eq!(mask.stored_len(), 1200);
        assert_eq!(mask.pixel_area(), 1200.0);
    }

    #[test]
    fn test_empty_crop() {
        let crop = MaskCrop { x: 3, y: 3, width: 0, height: 0 };
        let mask = SegmentationMask::from_crop(8, 8, crop, Vec::new()).unwrap();
        assert_eq!(mask.pixel_area(), 0.0);
        assert_eq!(mask.get(3, 3), Some(0.0));
    }

    #[test]
    fn test_crop_must_fit_image() {
        let crop = MaskCrop { x: 4, y: 0, width: 5, height: 1 };
        assert!(SegmentationMask::from_crop(8, 8, crop, vec![1.0; 5]).is_err());
        let crop = MaskCrop { x: u32::MAX, y: 0, width: 2, height: 1 };
        assert!(SegmentationMask::from_crop(8, 8, crop, vec![1.0; 2]).is_err());
        let crop = MaskCrop { x: 0, y: 0, width: 2, height: 2 };
        assert!(SegmentationMask::from_crop(8, 8, crop, vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let err = SegmentationMask::from_rows(&[vec![1.0, 1.0], vec![1.0]]).unwrap_err();
        assert!(err.is_validation());
    }
}
