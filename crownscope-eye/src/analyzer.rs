//! Image-in, measurements-out pipeline

use crate::error::VisionError;
use crate::models::ModelManager;
use crownscope_core::{measurement, AnalysisResult, Gsd, ImageDimensions};
use image::RgbImage;
use std::sync::Arc;
use tracing::debug;

/// Decodes an uploaded image, segments it and measures every crown.
#[derive(Clone)]
pub struct CrownAnalyzer {
    models: Arc<ModelManager>,
}

impl CrownAnalyzer {
    pub fn new(models: Arc<ModelManager>) -> Self {
        Self { models }
    }

    /// Analyze encoded image bytes (any format the `image` crate can decode).
    pub fn analyze(&self, bytes: &[u8], gsd: Gsd) -> Result<AnalysisResult, VisionError> {
        let image = decode_image(bytes)?;
        self.analyze_image(&image, gsd)
    }

    pub fn analyze_image(&self, image: &RgbImage, gsd: Gsd) -> Result<AnalysisResult, VisionError> {
        let model = self.models.model()?;
        let dims = ImageDimensions::new(image.width(), image.height());

        let masks = model.segment(image)?;
        if let Some(bad) = masks
            .iter()
            .find(|m| m.width() != dims.width || m.height() != dims.height)
        {
            return Err(VisionError::Processing(format!(
                "Model '{}' returned a {}x{} mask for a {}x{} image",
                model.name(),
                bad.width(),
                bad.height(),
                dims.width,
                dims.height
            )));
        }
        debug!("Measuring {} crown masks at {}", masks.len(), gsd);

        Ok(measurement::compute(&masks, gsd, dims))
    }
}

/// Decode an uploaded image into 8-bit RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, VisionError> {
    if bytes.is_empty() {
        return Err(VisionError::Processing("Image data is empty".to_string()));
    }
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}
