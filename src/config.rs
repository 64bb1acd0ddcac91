use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::BirdcountError;
use crate::report::SecondsPolicy;

const DEFAULT_DB_PATH: &str = "birds.db";
const DEFAULT_FRAMES_DIR: &str = "output/frames";
const DEFAULT_CHART_PATH: &str = "output/num_birds_detected_vs_video_duration.png";
const DEFAULT_CLASSES_PATH: &str = "data/classes.csv";
const DEFAULT_TARGET_CLASS: &str = "bird";
const DEFAULT_FRAME_INTERVAL: u64 = 30;
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "yolov5s.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BirdcountConfigFile {
    db_path: Option<PathBuf>,
    frames_dir: Option<PathBuf>,
    chart_path: Option<PathBuf>,
    classes_path: Option<PathBuf>,
    target_class: Option<String>,
    frame_interval: Option<u64>,
    seconds_policy: Option<SecondsPolicy>,
    font_path: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct BirdcountConfig {
    /// SQLite store, deleted and recreated each run.
    pub db_path: PathBuf,
    /// Annotated frames; wiped at the start of each run.
    pub frames_dir: PathBuf,
    pub chart_path: PathBuf,
    /// CSV class catalog with `class_id,class_name` columns.
    pub classes_path: PathBuf,
    pub target_class: String,
    /// Process every Nth decoded frame.
    pub frame_interval: u64,
    pub seconds_policy: SecondsPolicy,
    /// TrueType font for overlay and chart text; the bundled DejaVu Sans when unset.
    pub font_path: Option<PathBuf>,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `tract` or `stub`.
    pub backend: String,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

impl Default for BirdcountConfig {
    fn default() -> Self {
        Self::from_file(BirdcountConfigFile::default())
    }
}

impl BirdcountConfig {
    /// Defaults, overlaid by the JSON file named in `BIRDCOUNT_CONFIG`, then
    /// by individual `BIRDCOUNT_*` environment variables.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BIRDCOUNT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BirdcountConfigFile) -> Self {
        let detector_file = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();
        let detector = DetectorSettings {
            backend: detector_file.backend.unwrap_or(defaults.backend),
            model_path: detector_file.model_path.unwrap_or(defaults.model_path),
            input_size: detector_file.input_size.unwrap_or(defaults.input_size),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            iou_threshold: detector_file.iou_threshold.unwrap_or(defaults.iou_threshold),
        };
        Self {
            db_path: file
                .db_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            frames_dir: file
                .frames_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAMES_DIR)),
            chart_path: file
                .chart_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHART_PATH)),
            classes_path: file
                .classes_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASSES_PATH)),
            target_class: file
                .target_class
                .unwrap_or_else(|| DEFAULT_TARGET_CLASS.to_string()),
            frame_interval: file.frame_interval.unwrap_or(DEFAULT_FRAME_INTERVAL),
            seconds_policy: file.seconds_policy.unwrap_or_default(),
            font_path: file.font_path,
            detector,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_nonempty("BIRDCOUNT_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(path) = env_nonempty("BIRDCOUNT_FRAMES_DIR") {
            self.frames_dir = PathBuf::from(path);
        }
        if let Some(path) = env_nonempty("BIRDCOUNT_CHART_PATH") {
            self.chart_path = PathBuf::from(path);
        }
        if let Some(path) = env_nonempty("BIRDCOUNT_CLASSES_PATH") {
            self.classes_path = PathBuf::from(path);
        }
        if let Some(target) = env_nonempty("BIRDCOUNT_TARGET_CLASS") {
            self.target_class = target;
        }
        if let Some(interval) = env_nonempty("BIRDCOUNT_FRAME_INTERVAL") {
            self.frame_interval = interval.parse().map_err(|_| {
                anyhow!("BIRDCOUNT_FRAME_INTERVAL must be a positive integer number of frames")
            })?;
        }
        if let Some(path) = env_nonempty("BIRDCOUNT_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(backend) = env_nonempty("BIRDCOUNT_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = env_nonempty("BIRDCOUNT_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.frame_interval == 0 {
            return Err(BirdcountError::InvalidFrameInterval.into());
        }
        self.target_class = self.target_class.trim().to_string();
        if self.target_class.is_empty() {
            return Err(invalid("target_class must not be empty"));
        }
        self.detector.backend = self.detector.backend.trim().to_lowercase();
        if self.detector.input_size == 0 {
            return Err(invalid("detector.input_size must be greater than zero"));
        }
        for (name, value) in [
            ("detector.confidence_threshold", self.detector.confidence_threshold),
            ("detector.iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(&format!("{} must be within [0, 1]", name)));
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> anyhow::Error {
    BirdcountError::InvalidConfig(message.to_string()).into()
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<BirdcountConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
