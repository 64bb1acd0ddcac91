//! Fatal error conditions raised by the pipeline.
//!
//! Functions in this crate return `anyhow::Result`; these variants are the
//! conditions callers may want to tell apart (via `downcast_ref`).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BirdcountError {
    /// The input video does not exist on the local filesystem.
    #[error("video file {} not found", .path.display())]
    VideoNotFound { path: PathBuf },

    /// The target label is not present in the detector's label table.
    #[error("target class '{label}' is not in the label table of detector backend '{backend}'")]
    TargetClassMissing { label: String, backend: &'static str },

    /// A detection carries a class name absent from the class catalog.
    #[error("class '{class_name}' is not present in the class catalog")]
    UnknownClassName { class_name: String },

    /// Sampling interval must be at least one frame.
    #[error("frame interval must be >= 1")]
    InvalidFrameInterval,

    /// The video path uses a scheme the file source does not accept.
    #[error("unsupported video source '{0}': only local paths and stub:// are accepted")]
    UnsupportedSource(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
