//! Segmentation model management and inference

pub mod manager;
pub mod yolo_seg;

pub use manager::ModelManager;
pub use yolo_seg::YoloSegModel;

use crate::error::VisionError;
use crownscope_core::SegmentationMask;
use image::RgbImage;

/// An instance-segmentation model producing one mask per detected crown.
///
/// Masks must lie on the pixel grid of the image passed in. An empty vector
/// means nothing was detected.
pub trait SegmentationModel: Send + Sync {
    fn name(&self) -> &str;

    fn segment(&self, image: &RgbImage) -> Result<Vec<SegmentationMask>, VisionError>;
}
