//! crownscope-core: tree crown measurement from segmentation masks
//!
//! Converts per-crown pixel masks into physical area, circular-equivalent
//! diameter and circumference using a ground sample distance, and holds the
//! configuration shared by the vision and server crates.

pub mod config;
pub mod error;
pub mod gsd;
pub mod mask;
pub mod measurement;

pub use config::{AnalyzerConfig, ConfigError, ModelConfig, ServerConfig};
pub use error::{Error, Result};
pub use gsd::{Gsd, DEFAULT_GSD};
pub use mask::{MaskCrop, SegmentationMask};
pub use measurement::{
    compute, compute_raw, measure_mask, AnalysisResult, CrownMetrics, ImageDimensions,
    TreeMeasurement,
};
