use crate::detect::{BoundingBox, Detection};

/// One detection placed in time: what the pipeline accumulates and the store
/// persists.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Elapsed video time of the frame, in whole milliseconds.
    pub timestamp_ms: i64,
    /// Zero-based sampled-frame index (not the decode index).
    pub frame_number: i64,
}

impl DetectionRecord {
    pub fn from_detection(detection: Detection, timestamp_ms: i64, frame_number: i64) -> Self {
        Self {
            class_name: detection.label,
            confidence: detection.confidence,
            bbox: detection.bbox,
            timestamp_ms,
            frame_number,
        }
    }

    /// Frame identity within one ingestion run.
    pub fn frame_key(&self) -> (i64, i64) {
        (self.timestamp_ms, self.frame_number)
    }
}
