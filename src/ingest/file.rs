//! Local file frame source.
//!
//! `FileSource` picks a backend from the path:
//! - `stub://...` selects the deterministic synthetic source
//! - any other local path is decoded with FFmpeg (feature: ingest-ffmpeg)
//!
//! A file that cannot be opened produces an unavailable source that yields no
//! frames. Only non-local URL schemes are rejected outright.

use anyhow::Result;

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{SyntheticConfig, SyntheticSource};
use super::FrameSource;
use crate::error::BirdcountError;
use crate::frame::Frame;

pub struct FileSource {
    path: String,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
    Unavailable(String),
}

impl FileSource {
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(BirdcountError::UnsupportedSource(path.to_string()).into());
        }
        let backend = if is_stub_path(path) {
            FileBackend::Synthetic(SyntheticSource::new(SyntheticConfig::from_url(path)?))
        } else {
            open_decoder(path)
        };
        match &backend {
            FileBackend::Unavailable(reason) => {
                log::warn!("FileSource: {} is unavailable: {}", path, reason)
            }
            _ => log::info!("FileSource: opened {}", path),
        }
        Ok(Self {
            path: path.to_string(),
            backend,
        })
    }

    /// False when the file could not be opened; such a source yields nothing.
    pub fn is_available(&self) -> bool {
        !matches!(self.backend, FileBackend::Unavailable(_))
    }
}

#[cfg(feature = "ingest-ffmpeg")]
fn open_decoder(path: &str) -> FileBackend {
    match FfmpegFileSource::open(path) {
        Ok(source) => FileBackend::Ffmpeg(source),
        Err(e) => FileBackend::Unavailable(format!("{:#}", e)),
    }
}

#[cfg(not(feature = "ingest-ffmpeg"))]
fn open_decoder(_path: &str) -> FileBackend {
    FileBackend::Unavailable("video decoding requires the ingest-ffmpeg feature".to_string())
}

impl FrameSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
            FileBackend::Unavailable(_) => Ok(None),
        }
    }

    fn position_ms(&self) -> Option<f64> {
        match &self.backend {
            FileBackend::Synthetic(source) => source.position_ms(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.position_ms(),
            FileBackend::Unavailable(_) => None,
        }
    }

    fn frame_count_hint(&self) -> Option<u64> {
        match &self.backend {
            FileBackend::Synthetic(source) => source.frame_count_hint(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frame_count_hint(),
            FileBackend::Unavailable(_) => Some(0),
        }
    }

    fn describe(&self) -> String {
        match &self.backend {
            FileBackend::Synthetic(source) => source.describe(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(_) => format!("{} (ffmpeg)", self.path),
            FileBackend::Unavailable(_) => format!("{} (unavailable)", self.path),
        }
    }
}

pub(crate) fn is_stub_path(path: &str) -> bool {
    path.starts_with("stub://")
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_stub_path(path) {
        return true;
    }
    !path.contains("://")
}
