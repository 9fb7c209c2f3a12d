//! Mask-to-measurement conversion
//!
//! Each crown footprint is treated as a circle of equal area, so a single
//! pixel count yields area, diameter and circumference. All figures are kept
//! unrounded until the output record is built; totals are summed from the
//! unrounded values and rounded once.

use crate::error::Result;
use crate::gsd::Gsd;
use crate::mask::SegmentationMask;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const NO_DETECTIONS_MESSAGE: &str = "No trees detected";

/// Unrounded figures for a single crown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrownMetrics {
    pub area_px: f64,
    pub area_m2: f64,
    pub diameter_m: f64,
    pub circumference_m: f64,
}

impl CrownMetrics {
    pub fn from_pixel_area(area_px: f64, gsd: Gsd) -> Self {
        let area_m2 = area_px * gsd.pixel_area_m2();
        let diameter_m = 2.0 * (area_m2 / PI).sqrt();
        Self {
            area_px,
            area_m2,
            diameter_m,
            circumference_m: PI * diameter_m,
        }
    }
}

/// Output record for one detected crown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeMeasurement {
    pub tree_id: usize,
    pub area_m2: f64,
    pub area_px: u64,
    pub diameter_m: f64,
    pub circumference_m: f64,
}

impl TreeMeasurement {
    pub fn from_metrics(tree_id: usize, metrics: &CrownMetrics) -> Self {
        Self {
            tree_id,
            area_m2: round2(metrics.area_m2),
            // truncation, not rounding
            area_px: metrics.area_px as u64,
            diameter_m: round2(metrics.diameter_m),
            circumference_m: round2(metrics.circumference_m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Aggregate result for one analyzed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub total_trees: usize,
    pub total_area_m2: f64,
    pub total_circumference_m: f64,
    pub average_area_m2: f64,
    pub gsd: f64,
    pub image_dimensions: ImageDimensions,
    pub trees: Vec<TreeMeasurement>,
}

impl AnalysisResult {
    /// The zero-result outcome reported when the model finds nothing.
    pub fn no_detections(gsd: Gsd, image: ImageDimensions) -> Self {
        Self {
            success: false,
            message: Some(NO_DETECTIONS_MESSAGE.to_string()),
            total_trees: 0,
            total_area_m2: 0.0,
            total_circumference_m: 0.0,
            average_area_m2: 0.0,
            gsd: gsd.meters_per_pixel(),
            image_dimensions: image,
            trees: Vec::new(),
        }
    }
}

pub fn measure_mask(mask: &SegmentationMask, gsd: Gsd) -> CrownMetrics {
    CrownMetrics::from_pixel_area(mask.pixel_area(), gsd)
}

/// Measure every mask and aggregate the results.
///
/// Masks are numbered from 1 in the order given.
pub fn compute(masks: &[SegmentationMask], gsd: Gsd, image: ImageDimensions) -> AnalysisResult {
    if masks.is_empty() {
        return AnalysisResult::no_detections(gsd, image);
    }

    let mut total_area = 0.0f64;
    let mut total_circumference = 0.0f64;
    let mut trees = Vec::with_capacity(masks.len());

    for (i, mask) in masks.iter().enumerate() {
        let metrics = measure_mask(mask, gsd);
        total_area += metrics.area_m2;
        total_circumference += metrics.circumference_m;
        trees.push(TreeMeasurement::from_metrics(i + 1, &metrics));
    }

    let count = trees.len();
    AnalysisResult {
        success: true,
        message: None,
        total_trees: count,
        total_area_m2: round2(total_area),
        total_circumference_m: round2(total_circumference),
        average_area_m2: round2(total_area / count as f64),
        gsd: gsd.meters_per_pixel(),
        image_dimensions: image,
        trees,
    }
}

/// Same as [`compute`] for callers holding an unchecked scale factor.
pub fn compute_raw(
    masks: &[SegmentationMask],
    gsd: f64,
    image: ImageDimensions,
) -> Result<AnalysisResult> {
    let gsd = Gsd::new(gsd)?;
    Ok(compute(masks, gsd, image))
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
