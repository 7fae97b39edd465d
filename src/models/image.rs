use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_STEPS: u32 = 50;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;
pub const DEFAULT_WIDTH: u32 = 512;
pub const DEFAULT_HEIGHT: u32 = 512;

#[derive(Debug, Clone, Deserialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    pub model_id: Option<String>,
    pub steps: Option<u32>,
    pub guidance_scale: Option<f32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageGenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model_id: None,
            steps: None,
            guidance_scale: None,
            width: None,
            height: None,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Inference API request body. Serialized once per submission; retries
    /// resend the same payload unchanged.
    pub fn payload(&self) -> serde_json::Value {
        json!({
            "inputs": self.prompt,
            "parameters": {
                "num_inference_steps": self.steps.unwrap_or(DEFAULT_STEPS),
                "guidance_scale": self.guidance_scale.unwrap_or(DEFAULT_GUIDANCE_SCALE),
                "height": self.height.unwrap_or(DEFAULT_HEIGHT),
                "width": self.width.unwrap_or(DEFAULT_WIDTH)
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct ImageGenerationResponse {
    /// Raw image bytes as returned by the provider.
    pub image_data: Vec<u8>,
    pub content_type: Option<String>,
    pub model: String,
}

impl ImageGenerationResponse {
    /// Persists the raw payload. The written file is byte-identical to
    /// what the provider returned.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, &self.image_data)
    }

    /// Base64 data URI for inline display without touching disk.
    pub fn to_data_uri(&self) -> String {
        let mime = self.content_type.as_deref().unwrap_or("image/png");
        format!("data:{};base64,{}", mime, BASE64.encode(&self.image_data))
    }

    pub fn len(&self) -> usize {
        self.image_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_data.is_empty()
    }
}

/// Structured error body the Inference API sends on non-success statuses.
/// `estimated_time` accompanies warmup 503s; it is logged but the retry
/// delay stays fixed.
#[derive(Debug, Clone, Deserialize)]
pub struct HfErrorBody {
    pub error: Option<String>,
    pub estimated_time: Option<f32>,
}
