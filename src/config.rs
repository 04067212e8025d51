//! Engine configuration. Hosts pass a JSON object; any field left out keeps
//! its default.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, StudioError};
use crate::types::{Point, Size};

pub const LOGICAL_WIDTH: f64 = 800.0;
pub const LOGICAL_HEIGHT: f64 = 600.0;
pub const DEFAULT_SHAPE_COLOR: &str = "#3B82F6";
pub const DEFAULT_TEXT_COLOR: &str = "#000000";
pub const DEFAULT_FONT_FAMILY: &str = "Arial, sans-serif";
pub const DEFAULT_DECODE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub logical_size: Size,
    pub default_shape_color: String,
    pub default_shape_size: Size,
    pub default_text_color: String,
    pub default_font_family: String,
    pub default_font_size: f64,
    pub default_element_opacity: f64,
    pub default_watermark_opacity: f64,
    /// Applied when a new watermark would land exactly on an existing one.
    pub watermark_offset: Point,
    pub image_watermark_max: f64,
    pub line_stroke_width: f64,
    pub decode_timeout_ms: u64,
    pub max_upload_bytes: u64,
    pub allowed_mime_types: Vec<String>,
    pub grid_spacing: f64,
    pub history_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            logical_size: Size::new(LOGICAL_WIDTH, LOGICAL_HEIGHT),
            default_shape_color: DEFAULT_SHAPE_COLOR.to_string(),
            default_shape_size: Size::new(100.0, 100.0),
            default_text_color: DEFAULT_TEXT_COLOR.to_string(),
            default_font_family: DEFAULT_FONT_FAMILY.to_string(),
            default_font_size: 24.0,
            default_element_opacity: 1.0,
            default_watermark_opacity: 1.0,
            watermark_offset: Point::new(20.0, 20.0),
            image_watermark_max: 200.0,
            line_stroke_width: 4.0,
            decode_timeout_ms: DEFAULT_DECODE_TIMEOUT_MS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_mime_types: ["image/jpeg", "image/png", "image/svg+xml", "image/gif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            grid_spacing: 20.0,
            history_depth: 100,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| StudioError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let Size { width, height } = self.logical_size;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(StudioError::Config(format!(
                "logical size must be positive, got {}x{}",
                width, height
            )));
        }
        if self.decode_timeout_ms == 0 {
            return Err(StudioError::Config("decode timeout must be non-zero".into()));
        }
        if self.image_watermark_max <= 0.0 {
            return Err(StudioError::Config("image watermark bound must be positive".into()));
        }
        Ok(())
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    pub fn center(&self) -> Point {
        Point::new(self.logical_size.width / 2.0, self.logical_size.height / 2.0)
    }
}
