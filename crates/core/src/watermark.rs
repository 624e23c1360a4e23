//! Watermark specifications, one strongly-typed variant per job type.
//!
//! The processing collaborators receive these unmodified. Validation here
//! only rejects settings no collaborator could honour; rendering details
//! (fonts, filters, blend modes) belong to the collaborators.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::JobType;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of watermark text.
pub const MAX_TEXT_LEN: usize = 500;

/// Largest accepted font size in points.
pub const MAX_FONT_SIZE: u32 = 512;

pub const DEFAULT_FONT_SIZE: u32 = 24;
pub const DEFAULT_COLOR: &str = "#ffffff";
pub const DEFAULT_OPACITY: f32 = 0.8;
pub const DEFAULT_IMAGE_SCALE: f32 = 0.2;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Anchor of the watermark within the frame or page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

/// Rendered text watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextWatermark {
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub position: WatermarkPosition,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

/// Image overlay watermark (logo file composited onto the media).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverlay {
    pub image_path: PathBuf,
    #[serde(default = "default_image_scale")]
    pub scale: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub position: WatermarkPosition,
}

/// Either a text or an image watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatermarkSpec {
    Text(TextWatermark),
    Image(ImageOverlay),
}

/// The processing payload of a job: the job type plus the watermark
/// settings that type supports. PDFs only take text watermarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobPayload {
    Video { watermark: WatermarkSpec },
    Image { watermark: WatermarkSpec },
    Pdf { watermark: TextWatermark },
}

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_opacity() -> f32 {
    DEFAULT_OPACITY
}

fn default_image_scale() -> f32 {
    DEFAULT_IMAGE_SCALE
}

impl TextWatermark {
    /// A text watermark with default styling.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: DEFAULT_FONT_SIZE,
            color: DEFAULT_COLOR.to_string(),
            position: WatermarkPosition::default(),
            opacity: DEFAULT_OPACITY,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(CoreError::Validation(
                "Watermark text must not be empty".to_string(),
            ));
        }
        if text.chars().count() > MAX_TEXT_LEN {
            return Err(CoreError::Validation(format!(
                "Watermark text must not exceed {MAX_TEXT_LEN} characters"
            )));
        }
        if self.font_size == 0 || self.font_size > MAX_FONT_SIZE {
            return Err(CoreError::Validation(format!(
                "Font size must be between 1 and {MAX_FONT_SIZE}"
            )));
        }
        if !is_hex_color(&self.color) {
            return Err(CoreError::Validation(format!(
                "Color '{}' must be a #rrggbb hex value",
                self.color
            )));
        }
        validate_unit("Opacity", self.opacity, true)
    }
}

impl ImageOverlay {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.image_path.as_os_str().is_empty() {
            return Err(CoreError::Validation(
                "Watermark image path must not be empty".to_string(),
            ));
        }
        validate_unit("Scale", self.scale, false)?;
        validate_unit("Opacity", self.opacity, true)
    }
}

impl WatermarkSpec {
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            WatermarkSpec::Text(text) => text.validate(),
            WatermarkSpec::Image(image) => image.validate(),
        }
    }
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Video { .. } => JobType::Video,
            JobPayload::Image { .. } => JobType::Image,
            JobPayload::Pdf { .. } => JobType::Pdf,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            JobPayload::Video { watermark } | JobPayload::Image { watermark } => {
                watermark.validate()
            }
            JobPayload::Pdf { watermark } => watermark.validate(),
        }
    }
}

/// Check a `0..=1` ratio. Zero is only allowed when `allow_zero` is set.
fn validate_unit(name: &str, value: f32, allow_zero: bool) -> Result<(), CoreError> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !value.is_finite() || !lower_ok || value > 1.0 {
        let range = if allow_zero { "[0, 1]" } else { "(0, 1]" };
        return Err(CoreError::Validation(format!(
            "{name} must be within {range}, got {value}"
        )));
    }
    Ok(())
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}
