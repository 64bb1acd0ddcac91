#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::LabelTable;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::Frame;

/// Columns before the per-class scores in a YOLOv5 prediction row:
/// cx, cy, w, h, objectness.
const BOX_COLUMNS: usize = 5;

/// Tract-based YOLOv5 backend for ONNX inference.
///
/// Frames are resized to the square model input, predictions are filtered by
/// `objectness * class score`, suppressed per class, and mapped back to frame
/// pixel coordinates.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    labels: LabelTable,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            labels: LabelTable::coco(),
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    pub fn with_labels(mut self, labels: LabelTable) -> Self {
        self.labels = labels;
        self
    }

    /// Override the default confidence and NMS IoU thresholds.
    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", frame.width, frame.height))?;
        let resized = imageops::resize(&image, self.input_size, self.input_size, FilterType::Triangle);
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode_predictions(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let predictions = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = predictions.shape().to_vec();
        let row_len = *shape
            .last()
            .ok_or_else(|| anyhow!("model output has no dimensions"))?;
        if row_len <= BOX_COLUMNS {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        if row_len - BOX_COLUMNS != self.labels.len() {
            log::warn!(
                "model reports {} classes but label table has {}",
                row_len - BOX_COLUMNS,
                self.labels.len()
            );
        }

        let scale_x = frame.width as f32 / self.input_size as f32;
        let scale_y = frame.height as f32 / self.input_size as f32;
        let max_x = frame.width as f32;
        let max_y = frame.height as f32;

        let values: Vec<f32> = predictions.iter().copied().collect();
        let mut candidates = Vec::new();
        for row in values.chunks_exact(row_len) {
            let objectness = row[4];
            if objectness < self.confidence_threshold {
                continue;
            }
            let Some((class_index, class_score)) = row[BOX_COLUMNS..]
                .iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))
            else {
                continue;
            };
            let confidence = objectness * class_score;
            if confidence < self.confidence_threshold || class_index >= self.labels.len() {
                continue;
            }
            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            candidates.push(RawDetection {
                class_index,
                confidence: confidence.clamp(0.0, 1.0),
                bbox: BoundingBox::new(
                    ((cx - w / 2.0) * scale_x).clamp(0.0, max_x),
                    ((cy - h / 2.0) * scale_y).clamp(0.0, max_y),
                    ((cx + w / 2.0) * scale_x).clamp(0.0, max_x),
                    ((cy + h / 2.0) * scale_y).clamp(0.0, max_y),
                ),
            });
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_predictions(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size;
        let blank = Frame::filled(side, side, [114, 114, 114])?;
        self.detect(&blank).map(|_| ())
    }
}

/// Greedy per-class suppression, highest confidence first.
fn non_max_suppression(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_index == candidate.class_index && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(class_index: usize, confidence: f32, x1: f32) -> RawDetection {
        RawDetection {
            class_index,
            confidence,
            bbox: BoundingBox::new(x1, 0.0, x1 + 10.0, 10.0),
        }
    }

    #[test]
    fn nms_drops_overlapping_boxes_of_same_class() {
        let kept = non_max_suppression(
            vec![raw(14, 0.6, 1.0), raw(14, 0.9, 0.0), raw(0, 0.5, 0.0)],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_index, 0);
    }

    #[test]
    fn nms_keeps_disjoint_boxes() {
        let kept = non_max_suppression(vec![raw(14, 0.6, 0.0), raw(14, 0.7, 50.0)], 0.45);
        assert_eq!(kept.len(), 2);
    }
}
