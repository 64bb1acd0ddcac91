mod backend;
mod backends;
mod labels;
mod result;
mod target;

use anyhow::Result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{LabelTable, COCO_LABELS};
pub use result::{BoundingBox, Detection, RawDetection};
pub use target::TargetDetector;

use crate::config::DetectorSettings;
use crate::error::BirdcountError;

/// Build the backend named in the configuration.
pub fn backend_from_settings(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(StubBackend::new())),
        "tract" => tract_backend(settings),
        other => Err(BirdcountError::InvalidConfig(format!(
            "unknown detector backend '{}' (expected 'tract' or 'stub')",
            other
        ))
        .into()),
    }
}

#[cfg(feature = "backend-tract")]
fn tract_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let mut backend = TractBackend::new(&settings.model_path, settings.input_size)?
        .with_thresholds(settings.confidence_threshold, settings.iou_threshold);
    backend.warm_up()?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_backend(_settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(BirdcountError::InvalidConfig(
        "the tract detector backend requires the backend-tract feature".to_string(),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_is_built_by_name() -> Result<()> {
        let settings = DetectorSettings {
            backend: "stub".to_string(),
            ..DetectorSettings::default()
        };
        let backend = backend_from_settings(&settings)?;
        assert_eq!(backend.name(), "stub");
        Ok(())
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let settings = DetectorSettings {
            backend: "opencv".to_string(),
            ..DetectorSettings::default()
        };
        assert!(backend_from_settings(&settings).is_err());
    }
}
