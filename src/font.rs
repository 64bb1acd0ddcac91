//! TrueType font for overlay and chart text.
//!
//! DejaVu Sans ships with the crate (see `assets/fonts/LICENSE-DejaVu`), so
//! text is always rendered. A configured font path replaces it.

use std::path::Path;

use ab_glyph::FontArc;
use anyhow::{anyhow, Context, Result};

const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// Load the configured font, or the bundled one when none is configured.
///
/// A configured font that cannot be read or parsed is an error.
pub fn load_font(explicit: Option<&Path>) -> Result<FontArc> {
    match explicit {
        Some(path) => {
            let font = read_font(path)?;
            log::debug!("using font {}", path.display());
            Ok(font)
        }
        None => bundled_font(),
    }
}

/// The font compiled into the binary.
pub fn bundled_font() -> Result<FontArc> {
    FontArc::try_from_slice(BUNDLED_FONT).map_err(|e| anyhow!("invalid bundled font: {}", e))
}

fn read_font(path: &Path) -> Result<FontArc> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontArc::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))
}
