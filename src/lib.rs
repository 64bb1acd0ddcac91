//! birdcount
//!
//! Counts birds in a video: every Nth decoded frame is run through an object
//! detector, the target-class detections are drawn onto the frame and saved,
//! and all detections land in a small SQLite schema from which a
//! count-per-second chart is rendered.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (local files via FFmpeg, synthetic `stub://`) and
//!   the every-Nth-frame sampler
//! - `detect`: detector backend trait, YOLOv5 via tract, target-class filter
//! - `annotate`: bounding-box and count overlay
//! - `pipeline`: per-video loop and the end-to-end run
//! - `storage`, `catalog`: Classes / Frames / Objects store and its CSV seed
//! - `report`: per-second aggregation and the chart

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};

pub mod annotate;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod font;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod storage;

pub use annotate::Annotator;
pub use catalog::{ClassCatalog, ClassEntry};
pub use config::{BirdcountConfig, DetectorSettings};
pub use detect::{
    backend_from_settings, BoundingBox, Detection, DetectorBackend, LabelTable, RawDetection,
    StubBackend, TargetDetector,
};
pub use error::BirdcountError;
pub use frame::Frame;
pub use ingest::{FileSource, FrameSampler, FrameSource, SampledFrame};
pub use pipeline::{run, FrameReport, Pipeline, RunSummary};
pub use record::DetectionRecord;
pub use report::{CountSeries, ReportSettings, SecondsPolicy};
pub use storage::{DetectionStore, PopulateStats};

/// URI for a named in-memory database shared by every connection opened with
/// it in this process.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:birdcount_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}
