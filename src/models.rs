// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to raster data for the design layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "src", rename_all = "snake_case")]
pub enum DesignImage {
    Remote(String),
    DataUri(String),
    Blob(String),
}

impl DesignImage {
    pub fn as_str(&self) -> &str {
        match self {
            DesignImage::Remote(url) | DesignImage::DataUri(url) | DesignImage::Blob(url) => url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationJob {
    pub id: String,
    pub status: JobStatus,
    pub result_image: Option<DesignImage>,
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            result_image: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the job forward. Terminal jobs stay where they are.
    pub fn transition(&mut self, status: JobStatus) -> bool {
        if self.status.is_terminal() || status == JobStatus::Unknown {
            return false;
        }
        self.status = status;
        self.updated_at = Utc::now();
        true
    }

    pub fn complete(&mut self, image: DesignImage) {
        if self.transition(JobStatus::Completed) {
            self.result_image = Some(image);
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.transition(JobStatus::Failed) {
            self.error = Some(error.into());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_inference_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

// Wire shapes of the generation service.

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<GenerationResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectResponse {
    pub result: GenerationResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodedImage {
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDesign {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledColor {
    pub rgb: [u8; 3],
    pub hex: String,
    pub intensity: u8,
}

impl SampledColor {
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let intensity = ((r as u32 + g as u32 + b as u32) as f32 / 3.0).round() as u8;
        Self {
            rgb: [r, g, b],
            hex: format!("#{:02x}{:02x}{:02x}", r, g, b),
            intensity,
        }
    }

    /// Hex digits without the leading `#`, as the transparency service expects.
    pub fn hex_digits(&self) -> &str {
        self.hex.trim_start_matches('#')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropUnit {
    #[default]
    Px,
    #[serde(rename = "%")]
    Percent,
}

/// Crop rectangle in the displayed coordinate space of the design element.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropRegion {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub unit: CropUnit,
}

impl CropRegion {
    pub fn px(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            unit: CropUnit::Px,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_lifecycle_is_terminal_once_completed() {
        let mut job = GenerationJob::new("abc");
        assert!(job.transition(JobStatus::Processing));
        job.complete(DesignImage::DataUri("data:image/png;base64,AAAA".into()));
        assert_eq!(job.status, JobStatus::Completed);

        job.fail("late failure");
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn status_response_tolerates_unknown_status() {
        let parsed: StatusResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(parsed.status, JobStatus::Unknown);
    }

    #[test]
    fn sampled_color_formats_hex_and_intensity() {
        let color = SampledColor::from_rgb(255, 0, 16);
        assert_eq!(color.hex, "#ff0010");
        assert_eq!(color.hex_digits(), "ff0010");
        assert_eq!(color.intensity, 90);
    }

    #[test]
    fn crop_region_defaults_missing_dimensions_to_empty() {
        let region: CropRegion = serde_json::from_str(r#"{"x":4,"y":4}"#).unwrap();
        assert!(region.is_empty());
        assert_eq!(region.unit, CropUnit::Px);

        let pct: CropRegion =
            serde_json::from_str(r#"{"x":0,"y":0,"width":50,"height":50,"unit":"%"}"#).unwrap();
        assert_eq!(pct.unit, CropUnit::Percent);
    }
}
