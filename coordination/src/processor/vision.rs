//! Vision processor
//!
//! Image understanding through the inference gateway: free-form description,
//! structured screenshot analysis, UI element recognition and design-to-code.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{non_empty, prompts, ModalityProcessingError, ModalityProcessor, ProcessingResult};
use crate::context::ProcessingContext;
use crate::gateway::{InferenceGateway, InferenceOptions, InferenceRequest};
use crate::modality::Modality;

/// Default target for design-to-code when the caller names none
pub const DEFAULT_FRAMEWORK: &str = "html";

/// Structured analysis of an application screenshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotAnalysis {
    pub summary: String,
    pub application: Option<String>,
    pub text_content: Vec<String>,
    pub issues: Vec<String>,
}

/// Pixel rectangle of a recognized element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One recognized UI element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    /// Element kind as named by the model (button, input, link, ...)
    pub kind: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Processor for the image channel
pub struct VisionProcessor {
    gateway: Arc<dyn InferenceGateway>,
    model_id: String,
}

impl VisionProcessor {
    pub fn new(gateway: Arc<dyn InferenceGateway>, model_id: impl Into<String>) -> Self {
        Self {
            gateway,
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Describe an image, grounded in earlier results from other modalities
    pub async fn process_image(
        &self,
        image: &[u8],
        context: &ProcessingContext,
    ) -> ProcessingResult<String> {
        let prompt = prompts::describe_image(&context.grounding_summary(Modality::Vision));
        let text = self.infer_text(image, prompt, InferenceOptions::default()).await?;
        non_empty(Modality::Vision, text)
    }

    pub async fn analyze_screenshot(
        &self,
        image: &[u8],
        context: &ProcessingContext,
    ) -> ProcessingResult<ScreenshotAnalysis> {
        let prompt = prompts::analyze_screenshot(&context.grounding_summary(Modality::Vision));
        let value = self.infer_json(image, prompt).await?;
        let analysis: ScreenshotAnalysis = serde_json::from_value(value)
            .map_err(|e| self.error(format!("unexpected screenshot analysis shape: {}", e)))?;
        if analysis.summary.trim().is_empty() {
            return Err(self.error("screenshot analysis has no summary"));
        }
        Ok(analysis)
    }

    /// Accepts either `{"elements": [...]}` or a bare array
    pub async fn recognize_ui_elements(&self, image: &[u8]) -> ProcessingResult<Vec<UiElement>> {
        let value = self.infer_json(image, prompts::recognize_ui_elements()).await?;
        let elements = match value {
            serde_json::Value::Object(mut map) => map
                .remove("elements")
                .ok_or_else(|| self.error("UI element response has no `elements` field"))?,
            array @ serde_json::Value::Array(_) => array,
            other => {
                return Err(self.error(format!(
                    "UI element response must be an object or array, got {}",
                    other
                )))
            }
        };
        serde_json::from_value(elements)
            .map_err(|e| self.error(format!("unexpected UI element shape: {}", e)))
    }

    pub async fn generate_code_from_design(
        &self,
        image: &[u8],
        framework: Option<&str>,
        instructions: Option<&str>,
    ) -> ProcessingResult<String> {
        let framework = framework
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FRAMEWORK);
        let prompt = prompts::design_to_code(framework, instructions);
        let options = InferenceOptions::default()
            .with_max_tokens(4096)
            .with_temperature(0.1);
        let text = self.infer_text(image, prompt, options).await?;
        non_empty(Modality::Vision, strip_code_fence(&text).to_string())
    }

    async fn infer_text(
        &self,
        image: &[u8],
        prompt: String,
        options: InferenceOptions,
    ) -> ProcessingResult<String> {
        self.ensure_payload(image)?;
        let request = InferenceRequest::new(&self.model_id, prompt, image).with_options(options);
        let response = self
            .gateway
            .infer(request)
            .await
            .map_err(|e| ModalityProcessingError::gateway(Modality::Vision, e))?;
        Ok(response.into_text())
    }

    async fn infer_json(&self, image: &[u8], prompt: String) -> ProcessingResult<serde_json::Value> {
        self.ensure_payload(image)?;
        let request =
            InferenceRequest::new(&self.model_id, prompt, image).with_options(InferenceOptions::json());
        self.gateway
            .infer(request)
            .await
            .and_then(|response| response.into_json())
            .map_err(|e| ModalityProcessingError::gateway(Modality::Vision, e))
    }

    fn ensure_payload(&self, image: &[u8]) -> ProcessingResult<()> {
        if image.is_empty() {
            return Err(self.error("image payload is empty"));
        }
        debug!(model = %self.model_id, bytes = image.len(), "vision gateway call");
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> ModalityProcessingError {
        ModalityProcessingError::new(Modality::Vision, message)
    }
}

#[async_trait]
impl ModalityProcessor for VisionProcessor {
    fn modality(&self) -> Modality {
        Modality::Vision
    }

    async fn process(
        &self,
        payload: &[u8],
        context: &ProcessingContext,
    ) -> ProcessingResult<String> {
        self.process_image(payload, context).await
    }
}

/// Keep only the body of a fenced code answer
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
