use anyhow::{Context, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::error::BirdcountError;
use crate::frame::Frame;

/// Runs a backend and keeps only detections of one target class.
///
/// The target label is resolved to the backend's class index once, at
/// construction.
pub struct TargetDetector<'a> {
    backend: &'a mut dyn DetectorBackend,
    target_label: String,
    target_index: usize,
}

impl<'a> TargetDetector<'a> {
    pub fn new(backend: &'a mut dyn DetectorBackend, target_label: &str) -> Result<Self> {
        let target_index = backend.labels().index_of(target_label).ok_or_else(|| {
            BirdcountError::TargetClassMissing {
                label: target_label.to_string(),
                backend: backend.name(),
            }
        })?;
        log::debug!(
            "detector {}: target '{}' resolved to class index {}",
            backend.name(),
            target_label,
            target_index
        );
        Ok(Self {
            backend,
            target_label: target_label.to_string(),
            target_index,
        })
    }

    pub fn target_label(&self) -> &str {
        &self.target_label
    }

    /// One backend call; returns target-class detections in backend order.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let raw = self
            .backend
            .detect(frame)
            .with_context(|| format!("detector backend '{}' failed", self.backend.name()))?;
        Ok(raw
            .into_iter()
            .filter(|d| d.class_index == self.target_index)
            .map(|d| Detection {
                label: self.target_label.clone(),
                confidence: d.confidence,
                bbox: d.bbox,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, LabelTable, RawDetection, StubBackend};

    #[test]
    fn keeps_only_target_class_unchanged() -> Result<()> {
        let bird_box = BoundingBox::new(12.5, 20.0, 48.25, 61.0);
        let mut backend = StubBackend::new().on_call(
            0,
            vec![
                RawDetection {
                    class_index: 0,
                    confidence: 0.8,
                    bbox: BoundingBox::new(0.0, 0.0, 5.0, 5.0),
                },
                RawDetection {
                    class_index: 14,
                    confidence: 0.73,
                    bbox: bird_box,
                },
                RawDetection {
                    class_index: 15,
                    confidence: 0.91,
                    bbox: BoundingBox::new(1.0, 1.0, 2.0, 2.0),
                },
            ],
        );
        let mut detector = TargetDetector::new(&mut backend, "bird")?;
        let frame = Frame::filled(64, 64, [0, 0, 0])?;

        let detections = detector.detect(&frame)?;
        assert_eq!(
            detections,
            vec![Detection {
                label: "bird".to_string(),
                confidence: 0.73,
                bbox: bird_box,
            }]
        );
        Ok(())
    }

    #[test]
    fn missing_target_label_is_fatal() {
        let mut backend = StubBackend::new().with_labels(LabelTable::new(["cat", "dog"]));
        let err = TargetDetector::new(&mut backend, "bird")
            .err()
            .expect("expected error");
        match err.downcast_ref::<BirdcountError>() {
            Some(BirdcountError::TargetClassMissing { label, backend }) => {
                assert_eq!(label, "bird");
                assert_eq!(*backend, "stub");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
