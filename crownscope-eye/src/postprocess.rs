//! Decoding of YOLO segmentation heads into per-instance masks
//!
//! The detection head emits `[1, 4 + classes + masks, anchors]`: a center-form
//! box, per-class scores and mask coefficients for every anchor. The second
//! output holds `[1, masks, mh, mw]` prototype masks; an instance mask is the
//! sigmoid of the coefficient-weighted sum of prototypes, cropped to its box.

use crate::error::VisionError;
use crate::preprocess::Letterbox;
use crownscope_core::{MaskCrop, SegmentationMask};
use ndarray::{Array2, ArrayView3, Axis};
use tracing::debug;

/// Axis-aligned box in network input coordinates, corner form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// Intersection over union
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        if !self.is_valid() || !other.is_valid() {
            return 0.0;
        }

        let inter_w = self.x2.min(other.x2) - self.x1.max(other.x1);
        let inter_h = self.y2.min(other.y2) - self.y1.max(other.y1);
        if inter_w <= 0.0 || inter_h <= 0.0 {
            return 0.0;
        }

        let inter_area = inter_w * inter_h;
        let union_area = self.area() + other.area() - inter_area;
        if union_area <= 0.0 || !union_area.is_finite() {
            return 0.0;
        }

        (inter_area / union_area).clamp(0.0, 1.0)
    }
}

/// One anchor that cleared the confidence threshold.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: usize,
    pub coefficients: Vec<f32>,
}

/// Shape of the detection head output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadLayout {
    pub channels: usize,
    pub anchors: usize,
    pub num_masks: usize,
}

impl HeadLayout {
    pub fn num_classes(&self) -> usize {
        self.channels.saturating_sub(4 + self.num_masks)
    }
}

/// Pick out anchors whose best class score exceeds `confidence_threshold`.
pub fn decode_candidates(
    output: &[f32],
    layout: HeadLayout,
    confidence_threshold: f32,
) -> Result<Vec<Candidate>, VisionError> {
    let HeadLayout { channels, anchors, num_masks } = layout;
    let num_classes = layout.num_classes();
    if num_classes == 0 {
        return Err(VisionError::Processing(format!(
            "Detection head has {} channels, too few for {} mask coefficients",
            channels, num_masks
        )));
    }
    if output.len() != channels * anchors {
        return Err(VisionError::Processing(format!(
            "Detection head holds {} values, expected {}x{}",
            output.len(),
            channels,
            anchors
        )));
    }

    let at = |channel: usize, anchor: usize| output[channel * anchors + anchor];
    let mut candidates = Vec::new();

    for i in 0..anchors {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, at(4 + c, i)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

        if !score.is_finite() || score <= confidence_threshold {
            continue;
        }

        let bbox = BoundingBox::from_center(at(0, i), at(1, i), at(2, i), at(3, i));
        if !bbox.is_valid() {
            continue;
        }

        candidates.push(Candidate {
            bbox,
            score,
            class_id,
            coefficients: (0..num_masks).map(|k| at(4 + num_classes + k, i)).collect(),
        });
    }

    Ok(candidates)
}

/// Class-agnostic non-maximum suppression, best score first.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.len() >= max_detections {
            break;
        }
        if keep.iter().all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold) {
            keep.push(candidate);
        }
    }

    keep
}

/// Render a candidate's mask onto the source image pixel grid.
///
/// Each source pixel center is mapped into network input space, rejected if
/// it falls outside the detection box, and otherwise sampled bilinearly from
/// the instance logits at prototype resolution.
pub fn assemble_mask(
    candidate: &Candidate,
    protos: &ArrayView3<f32>,
    letterbox: &Letterbox,
    mask_threshold: f32,
) -> Result<SegmentationMask, VisionError> {
    let (num_masks, proto_h, proto_w) = protos.dim();
    if proto_h == 0 || proto_w == 0 {
        return Err(VisionError::Processing("Prototype masks are empty".to_string()));
    }
    if candidate.coefficients.len() != num_masks {
        return Err(VisionError::Processing(format!(
            "Candidate has {} mask coefficients, prototypes have {}",
            candidate.coefficients.len(),
            num_masks
        )));
    }

    let mut logits = Array2::<f32>::zeros((proto_h, proto_w));
    for (k, &coefficient) in candidate.coefficients.iter().enumerate() {
        logits.scaled_add(coefficient, &protos.index_axis(Axis(0), k));
    }

    // sigmoid(l) > t  <=>  l > ln(t / (1 - t))
    let logit_threshold = (mask_threshold / (1.0 - mask_threshold)).ln();

    let bbox = candidate.bbox;
    let (sx1, sy1) = letterbox.map_to_source(bbox.x1, bbox.y1);
    let (sx2, sy2) = letterbox.map_to_source(bbox.x2, bbox.y2);
    let x_range = pixel_span(sx1, sx2, letterbox.src_width);
    let y_range = pixel_span(sy1, sy2, letterbox.src_height);

    // only the box can hold membership, so only the box is stored
    let crop = MaskCrop {
        x: x_range.start,
        y: y_range.start,
        width: x_range.end - x_range.start,
        height: y_range.end - y_range.start,
    };
    let mut values = vec![0.0f32; crop.width as usize * crop.height as usize];

    let to_proto_x = proto_w as f32 / letterbox.input_size as f32;
    let to_proto_y = proto_h as f32 / letterbox.input_size as f32;

    for y in y_range {
        for x in x_range.clone() {
            let (ix, iy) = letterbox.map_to_input(x as f32 + 0.5, y as f32 + 0.5);
            if !bbox.contains(ix, iy) {
                continue;
            }
            let logit = bilinear(&logits, ix * to_proto_x - 0.5, iy * to_proto_y - 0.5);
            if logit > logit_threshold {
                let idx = (y - crop.y) as usize * crop.width as usize + (x - crop.x) as usize;
                values[idx] = 1.0;
            }
        }
    }

    Ok(SegmentationMask::from_crop(
        letterbox.src_width,
        letterbox.src_height,
        crop,
        values,
    )?)
}

/// Decode a full segmentation head into source-resolution masks.
pub fn decode_masks(
    head: &[f32],
    layout: HeadLayout,
    protos: &ArrayView3<f32>,
    letterbox: &Letterbox,
    thresholds: &Thresholds,
) -> Result<Vec<SegmentationMask>, VisionError> {
    let candidates = decode_candidates(head, layout, thresholds.confidence)?;
    let total = candidates.len();
    let kept = non_max_suppression(candidates, thresholds.iou, thresholds.max_detections);
    debug!("{} candidates above threshold, {} after NMS", total, kept.len());

    let masks = kept
        .iter()
        .map(|c| assemble_mask(c, protos, letterbox, thresholds.mask))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        "Holding {} mask values for {} crowns",
        masks.iter().map(SegmentationMask::stored_len).sum::<usize>(),
        masks.len()
    );
    Ok(masks)
}

/// Score, overlap and mask cut-offs applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub confidence: f32,
    pub iou: f32,
    pub mask: f32,
    pub max_detections: usize,
}

impl From<&crownscope_core::ModelConfig> for Thresholds {
    fn from(config: &crownscope_core::ModelConfig) -> Self {
        Self {
            confidence: config.confidence_threshold,
            iou: config.iou_threshold,
            mask: config.mask_threshold,
            max_detections: config.max_detections,
        }
    }
}

fn pixel_span(start: f32, end: f32, limit: u32) -> std::ops::Range<u32> {
    let lo = start.floor().clamp(0.0, limit as f32) as u32;
    let hi = end.ceil().clamp(0.0, limit as f32) as u32;
    lo..hi.max(lo)
}

fn bilinear(grid: &Array2<f32>, x: f32, y: f32) -> f32 {
    let (h, w) = grid.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = grid[[y0, x0]] * (1.0 - fx) + grid[[y0, x1]] * fx;
    let bottom = grid[[y1, x0]] * (1.0 - fx) + grid[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}
