use anyhow::Result;

use crate::detect::labels::LabelTable;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend wraps one pretrained object-detection model. It receives a frame,
/// returns every detection it finds (all classes), and exposes the label table
/// that maps its class indices to names.
///
/// Implementations must treat the frame as read-only and must be deterministic
/// per call; the pipeline never retries a failed call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Label table indexed by `RawDetection::class_index`.
    fn labels(&self) -> &LabelTable;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
