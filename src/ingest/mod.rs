//! Frame ingestion.
//!
//! Sources decode a video into `Frame`s; the sampler thins that stream down to
//! every Nth frame and attaches the source position to each sample.
//!
//! - Local video files (feature: ingest-ffmpeg)
//! - Synthetic `stub://` sources (tests, demos)
//!
//! A source that cannot be opened is not an error: it yields no frames.

pub mod file;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod sampler;
pub mod synthetic;

pub use file::FileSource;
pub use sampler::{FrameSampler, SampledFrame};
pub use synthetic::{SyntheticConfig, SyntheticSource};

use anyhow::Result;

use crate::frame::Frame;

/// Sequential read cursor over decoded frames.
pub trait FrameSource {
    /// Decode the next frame. `Ok(None)` means the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Presentation time of the most recently decoded frame, in milliseconds.
    fn position_ms(&self) -> Option<f64>;

    /// Total frame count as reported by the container, if known.
    fn frame_count_hint(&self) -> Option<u64> {
        None
    }

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Position of the zero-based `index`th frame at a constant frame rate, for
/// frames that carry no timestamp. `None` when the rate is unknown.
pub fn position_from_index(index: u64, fps: f64) -> Option<f64> {
    if fps > 0.0 && fps.is_finite() {
        Some(index as f64 * 1000.0 / fps)
    } else {
        None
    }
}
