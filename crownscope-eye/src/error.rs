//! Error types for crownscope-eye

use crownscope_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Segmentation model is not loaded")]
    ModelNotLoaded,

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<ndarray::ShapeError> for VisionError {
    fn from(err: ndarray::ShapeError) -> Self {
        VisionError::Processing(format!("Tensor shape mismatch: {}", err))
    }
}
