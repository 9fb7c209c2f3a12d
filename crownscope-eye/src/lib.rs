//! crownscope-eye: crown segmentation for aerial imagery
//!
//! Wraps a YOLO instance-segmentation network exported to ONNX. Images are
//! letterboxed to the model input, masks are decoded back onto the source
//! pixel grid and handed to crownscope-core for measurement.

pub mod analyzer;
pub mod error;
pub mod models;
pub mod postprocess;
pub mod preprocess;

pub use analyzer::{decode_image, CrownAnalyzer};
pub use error::VisionError;
pub use models::{ModelManager, SegmentationModel, YoloSegModel};
