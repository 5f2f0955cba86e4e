use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::geometry::{MAX_ZOOM, MIN_ZOOM, Size};

/// Viewport and interaction tuning for a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CanvasConfig {
    pub viewport: Size,
    pub fit_padding: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Edge hit radius in screen pixels.
    pub hit_tolerance: f64,
    /// Zoom exponent per wheel delta unit.
    pub wheel_sensitivity: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            viewport: Size::new(1200.0, 800.0),
            fit_padding: 50.0,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            hit_tolerance: 6.0,
            wheel_sensitivity: 0.002,
        }
    }
}

impl CanvasConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let config: CanvasConfig = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse canvas config '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.viewport.is_empty() {
            bail!("viewport must have a positive width and height");
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            bail!(
                "zoom bounds must satisfy 0 < min <= max (got {} and {})",
                self.min_zoom,
                self.max_zoom
            );
        }
        if self.fit_padding < 0.0 || self.hit_tolerance < 0.0 {
            bail!("padding and hit tolerance cannot be negative");
        }
        Ok(())
    }
}
