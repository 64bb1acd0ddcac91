//! Sampling, detection and annotation across one video, then the full run:
//! ingest, store, report.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::annotate::{frame_file_name, Annotator};
use crate::catalog::ClassCatalog;
use crate::config::BirdcountConfig;
use crate::detect::{DetectorBackend, TargetDetector};
use crate::error::BirdcountError;
use crate::font::load_font;
use crate::ingest::file::is_stub_path;
use crate::ingest::{FileSource, FrameSampler, FrameSource};
use crate::record::DetectionRecord;
use crate::report::{self, CountSeries, ReportSettings};
use crate::storage::{DetectionStore, PopulateStats};

/// Per-frame progress handed to the caller after a sampled frame is saved.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub sample_index: u64,
    pub decode_index: u64,
    pub timestamp_ms: i64,
    pub detections: usize,
    pub image_path: PathBuf,
    /// Container frame count, when the source knows it.
    pub total_frames: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub frames_sampled: u64,
    pub records: usize,
    pub stats: PopulateStats,
    pub series: CountSeries,
}

pub struct Pipeline {
    backend: Box<dyn DetectorBackend>,
    annotator: Annotator,
    target_class: String,
    frames_dir: PathBuf,
    frame_interval: u64,
}

impl Pipeline {
    pub fn new(
        backend: Box<dyn DetectorBackend>,
        annotator: Annotator,
        target_class: &str,
        frames_dir: impl Into<PathBuf>,
        frame_interval: u64,
    ) -> Result<Self> {
        if frame_interval == 0 {
            return Err(BirdcountError::InvalidFrameInterval.into());
        }
        Ok(Self {
            backend,
            annotator,
            target_class: target_class.to_string(),
            frames_dir: frames_dir.into(),
            frame_interval,
        })
    }

    pub fn from_config(
        config: &BirdcountConfig,
        backend: Box<dyn DetectorBackend>,
        annotator: Annotator,
    ) -> Result<Self> {
        Self::new(
            backend,
            annotator,
            &config.target_class,
            config.frames_dir.clone(),
            config.frame_interval,
        )
    }

    /// Process every sampled frame of `video` and return the accumulated
    /// detection records.
    ///
    /// Steps run in order and stop at the first failure: check the video
    /// exists, reset the frames directory, open the source, resolve the target
    /// class, then detect, annotate and accumulate frame by frame.
    pub fn ingest_video(
        &mut self,
        video: &str,
        on_frame: &mut dyn FnMut(&FrameReport),
    ) -> Result<Vec<DetectionRecord>> {
        check_video_path(video)?;
        reset_output_dir(&self.frames_dir)?;
        let mut source = FileSource::open(video)?;
        match source.frame_count_hint() {
            Some(total) => log::info!("pipeline: {} has {} frames", source.describe(), total),
            None => log::info!("pipeline: {} has an unknown frame count", source.describe()),
        }
        self.process(&mut source, on_frame)
    }

    /// Same as `ingest_video`, over an already opened source.
    pub fn ingest_source(
        &mut self,
        source: &mut dyn FrameSource,
        on_frame: &mut dyn FnMut(&FrameReport),
    ) -> Result<Vec<DetectionRecord>> {
        reset_output_dir(&self.frames_dir)?;
        self.process(source, on_frame)
    }

    fn process(
        &mut self,
        source: &mut dyn FrameSource,
        on_frame: &mut dyn FnMut(&FrameReport),
    ) -> Result<Vec<DetectionRecord>> {
        let total_frames = source.frame_count_hint();
        let mut detector = TargetDetector::new(self.backend.as_mut(), &self.target_class)?;
        let mut sampler = FrameSampler::new(source, self.frame_interval)?;
        let mut records = Vec::new();
        let mut sampled = 0u64;

        for sample in sampler.by_ref() {
            let detections = detector.detect(&sample.frame)?;
            log::debug!(
                "pipeline: frame {} (decode {}) at {} ms: {} detections",
                sample.sample_index,
                sample.decode_index,
                sample.timestamp_ms,
                detections.len()
            );

            let image_path = self
                .frames_dir
                .join(frame_file_name(sample.sample_index, sample.timestamp_ms));
            self.annotator
                .annotate_and_save(sample.frame, &detections, &image_path)?;

            let report = FrameReport {
                sample_index: sample.sample_index,
                decode_index: sample.decode_index,
                timestamp_ms: sample.timestamp_ms,
                detections: detections.len(),
                image_path,
                total_frames,
            };
            records.extend(detections.into_iter().map(|detection| {
                DetectionRecord::from_detection(
                    detection,
                    sample.timestamp_ms,
                    sample.sample_index as i64,
                )
            }));
            sampled += 1;
            on_frame(&report);
        }

        log::info!(
            "pipeline: sampled {} of {} decoded frames, {} '{}' detections",
            sampled,
            sampler.frames_decoded(),
            records.len(),
            detector.target_label()
        );
        Ok(records)
    }
}

/// Ingest, rebuild the store, populate it and render the chart.
pub fn run(
    config: &BirdcountConfig,
    video: &str,
    backend: Box<dyn DetectorBackend>,
    on_frame: &mut dyn FnMut(&FrameReport),
) -> Result<RunSummary> {
    let font = load_font(config.font_path.as_deref())?;
    let mut pipeline = Pipeline::from_config(config, backend, Annotator::new(font.clone()))?;

    let mut frames_sampled = 0u64;
    let records = pipeline.ingest_video(video, &mut |report: &FrameReport| {
        frames_sampled += 1;
        on_frame(report);
    })?;
    let record_count = records.len();

    let mut store = DetectionStore::reinitialize(&config.db_path)?;
    let catalog = ClassCatalog::from_csv_path(&config.classes_path)?;
    let stats = store.populate(&catalog, records)?;

    let settings = ReportSettings {
        target_class: config.target_class.clone(),
        policy: config.seconds_policy,
        chart_path: config.chart_path.clone(),
        font,
    };
    let series = report::visualize(&store.conn, &settings)?;

    Ok(RunSummary {
        frames_sampled,
        records: record_count,
        stats,
        series,
    })
}

/// Reject missing local files and unsupported URLs before any side effect.
pub fn check_video_path(video: &str) -> Result<()> {
    if is_stub_path(video) {
        return Ok(());
    }
    if video.contains("://") {
        return Err(BirdcountError::UnsupportedSource(video.to_string()).into());
    }
    if !Path::new(video).exists() {
        return Err(BirdcountError::VideoNotFound {
            path: PathBuf::from(video),
        }
        .into());
    }
    Ok(())
}

/// Create `dir` if needed and delete everything inside it.
pub fn reset_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;
    let mut removed = 0usize;
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("listing output directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        }
        .with_context(|| format!("removing {}", path.display()))?;
        removed += 1;
    }
    log::info!(
        "pipeline: reset {} ({} entries removed)",
        dir.display(),
        removed
    );
    Ok(())
}
