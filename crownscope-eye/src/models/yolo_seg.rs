//! YOLO instance segmentation model (ONNX export)

use super::SegmentationModel;
use crate::error::VisionError;
use crate::postprocess::{decode_masks, HeadLayout, Thresholds};
use crate::preprocess::Letterbox;
use crownscope_core::{ModelConfig, SegmentationMask};
use image::RgbImage;
use ndarray::ArrayView3;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use tracing::{debug, info};

/// YOLO-seg model for crown segmentation
pub struct YoloSegModel {
    // ONNX Runtime needs exclusive access to run a session
    session: Mutex<Session>,
    input_size: u32,
    thresholds: Thresholds,
}

impl YoloSegModel {
    /// Create a new YOLO-seg model
    pub fn new(config: &ModelConfig) -> Result<Self, VisionError> {
        let session = Session::builder()
            .map_err(|e| ort_error("Failed to create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ort_error("Failed to set optimization level", e))?
            .commit_from_file(&config.path)
            .map_err(|e| ort_error("Failed to load YOLO-seg model", e))?;

        info!("YOLO-seg model loaded from {:?}", config.path);

        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            thresholds: Thresholds::from(config),
        })
    }

    /// Run the network, returning the detection head and prototype tensors.
    fn infer(&self, input: Vec<f32>) -> Result<(HeadLayout, Vec<f32>, [usize; 3], Vec<f32>), VisionError> {
        let side = self.input_size as usize;
        let shape = [1usize, 3, side, side];
        let tensor = Tensor::from_array((shape.as_slice(), input.into_boxed_slice()))
            .map_err(|e| ort_error("Failed to create input tensor", e))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| ort_error("YOLO-seg inference failed", e))?;

        if outputs.len() < 2 {
            return Err(VisionError::Model(format!(
                "Expected detection and prototype outputs, model produced {}",
                outputs.len()
            )));
        }

        let (head_shape, head_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ort_error("Failed to extract detection tensor", e))?;
        let (proto_shape, proto_data) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| ort_error("Failed to extract prototype tensor", e))?;
        debug!("YOLO-seg output shapes: {:?}, {:?}", head_shape, proto_shape);

        if head_shape.len() != 3 || proto_shape.len() != 4 {
            return Err(VisionError::Model(format!(
                "Unexpected output ranks: detection {:?}, prototypes {:?}",
                head_shape, proto_shape
            )));
        }
        let dim = |d: i64| {
            usize::try_from(d)
                .map_err(|_| VisionError::Model(format!("Negative output dimension {}", d)))
        };

        let layout = HeadLayout {
            channels: dim(head_shape[1])?,
            anchors: dim(head_shape[2])?,
            num_masks: dim(proto_shape[1])?,
        };
        let proto_dims = [layout.num_masks, dim(proto_shape[2])?, dim(proto_shape[3])?];

        // batch of one: the leading dimension can be dropped
        Ok((layout, head_data.to_vec(), proto_dims, proto_data.to_vec()))
    }
}

impl SegmentationModel for YoloSegModel {
    fn name(&self) -> &str {
        "yolo-seg"
    }

    fn segment(&self, image: &RgbImage) -> Result<Vec<SegmentationMask>, VisionError> {
        debug!("Running YOLO-seg on {}x{} image", image.width(), image.height());

        let letterbox = Letterbox::new(image.width(), image.height(), self.input_size)?;
        let input = letterbox.tensor(image)?;

        let (layout, head, proto_dims, proto_data) = self.infer(input)?;
        let protos = ArrayView3::from_shape(
            (proto_dims[0], proto_dims[1], proto_dims[2]),
            &proto_data,
        )?;

        let masks = decode_masks(&head, layout, &protos, &letterbox, &self.thresholds)?;
        debug!("YOLO-seg produced {} masks", masks.len());
        Ok(masks)
    }
}

fn ort_error(context: &str, err: impl std::fmt::Display) -> VisionError {
    VisionError::Ort(format!("{}: {}", context, err))
}
