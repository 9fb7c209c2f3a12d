//! Model lifecycle: construction, loading and readiness

use super::{SegmentationModel, YoloSegModel};
use crate::error::VisionError;
use crownscope_core::ModelConfig;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Owns the segmentation model for the lifetime of the service.
///
/// Construction does no I/O. [`ModelManager::load`] is the initialization
/// step; until it succeeds, [`ModelManager::is_ready`] is false and
/// [`ModelManager::model`] fails with [`VisionError::ModelNotLoaded`].
pub struct ModelManager {
    config: ModelConfig,
    model: RwLock<Option<Arc<dyn SegmentationModel>>>,
    load_error: RwLock<Option<String>>,
}

impl ModelManager {
    /// Create a new model manager
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            model: RwLock::new(None),
            load_error: RwLock::new(None),
        }
    }

    /// A manager that is ready with an already-built model.
    pub fn with_model(config: ModelConfig, model: Arc<dyn SegmentationModel>) -> Self {
        let manager = Self::new(config);
        *manager.model.write() = Some(model);
        manager
    }

    /// Load the ONNX model named by the configuration.
    pub fn load(&self) -> Result<(), VisionError> {
        match self.build() {
            Ok(model) => {
                info!("Segmentation model '{}' ready", model.name());
                *self.model.write() = Some(model);
                *self.load_error.write() = None;
                Ok(())
            }
            Err(e) => {
                error!("Failed to load segmentation model from {:?}: {}", self.config.path, e);
                *self.load_error.write() = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn build(&self) -> Result<Arc<dyn SegmentationModel>, VisionError> {
        let path = &self.config.path;
        if !path.is_file() {
            return Err(VisionError::Model(format!(
                "Model file not found: {}",
                path.display()
            )));
        }
        Ok(Arc::new(YoloSegModel::new(&self.config)?))
    }

    pub fn is_ready(&self) -> bool {
        self.model.read().is_some()
    }

    /// The loaded model, or `ModelNotLoaded`.
    pub fn model(&self) -> Result<Arc<dyn SegmentationModel>, VisionError> {
        self.model.read().clone().ok_or(VisionError::ModelNotLoaded)
    }

    /// Why the last load attempt failed, if it did.
    pub fn load_error(&self) -> Option<String> {
        self.load_error.read().clone()
    }

    pub fn model_path(&self) -> &Path {
        &self.config.path
    }
}
