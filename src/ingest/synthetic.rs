//! Deterministic synthetic source (`stub://`).
//!
//! Produces a fixed number of gradient frames at a fixed frame rate. Used by
//! tests and by dry runs of the CLI without a video decoder.

use anyhow::{anyhow, Result};

use super::{position_from_index, FrameSource};
use crate::frame::Frame;

const DEFAULT_FRAMES: u64 = 300;
const DEFAULT_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    pub frames: u64,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            frames: DEFAULT_FRAMES,
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl SyntheticConfig {
    /// Parse `stub://name?frames=N&fps=F&width=W&height=H`. Every query key
    /// is optional.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source url must start with stub://"))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, query),
            None => (rest, ""),
        };
        let mut cfg = Self {
            name: if name.is_empty() {
                "synthetic".to_string()
            } else {
                name.to_string()
            },
            ..Self::default()
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub query parameter '{}'", pair))?;
            match key {
                "frames" => cfg.frames = parse_param(key, value)?,
                "fps" => cfg.fps = parse_param(key, value)?,
                "width" => cfg.width = parse_param(key, value)?,
                "height" => cfg.height = parse_param(key, value)?,
                other => return Err(anyhow!("unknown stub query parameter '{}'", other)),
            }
        }
        if cfg.fps == 0 {
            return Err(anyhow!("stub fps must be >= 1"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(anyhow!("stub frame dimensions must be non-zero"));
        }
        Ok(cfg)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub query parameter '{}' has invalid value '{}'", key, value))
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    decoded: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config, decoded: 0 }
    }

    fn generate_pixels(&self, index: u64) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + index * 7) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.decoded >= self.config.frames {
            return Ok(None);
        }
        let pixels = self.generate_pixels(self.decoded);
        self.decoded += 1;
        Frame::from_rgb(pixels, self.config.width, self.config.height).map(Some)
    }

    fn position_ms(&self) -> Option<f64> {
        let index = self.decoded.checked_sub(1)?;
        position_from_index(index, f64::from(self.config.fps))
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.config.frames)
    }

    fn describe(&self) -> String {
        format!("stub://{} (synthetic)", self.config.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_parameters() -> Result<()> {
        let cfg = SyntheticConfig::from_url("stub://yard?frames=10&fps=2&width=8&height=6")?;
        assert_eq!(cfg.name, "yard");
        assert_eq!(cfg.frames, 10);
        assert_eq!(cfg.fps, 2);
        assert_eq!((cfg.width, cfg.height), (8, 6));
        Ok(())
    }

    #[test]
    fn bare_url_uses_defaults() -> Result<()> {
        let cfg = SyntheticConfig::from_url("stub://")?;
        assert_eq!(cfg, SyntheticConfig::default());
        Ok(())
    }

    #[test]
    fn rejects_unknown_and_zero_parameters() {
        assert!(SyntheticConfig::from_url("stub://a?color=red").is_err());
        assert!(SyntheticConfig::from_url("stub://a?fps=0").is_err());
        assert!(SyntheticConfig::from_url("stub://a?frames=many").is_err());
    }

    #[test]
    fn positions_follow_frame_rate() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            frames: 3,
            fps: 4,
            width: 2,
            height: 2,
            ..SyntheticConfig::default()
        });
        assert_eq!(source.position_ms(), None);
        source.next_frame()?;
        assert_eq!(source.position_ms(), Some(0.0));
        source.next_frame()?;
        assert_eq!(source.position_ms(), Some(250.0));
        source.next_frame()?;
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.position_ms(), Some(500.0));
        Ok(())
    }
}
