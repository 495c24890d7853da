//! `vision` tool

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::params::{optional_str, require_binary, Params};
use super::{to_output, ToolAdapter, ToolResult};
use crate::controller::SharedController;
use crate::modality::{Modality, ModalityResult};
use crate::processor::VisionProcessor;

const ACTIONS: &[&str] = &[
    "processImage",
    "analyzeScreenshot",
    "recognizeUIElements",
    "generateCodeFromDesign",
];

/// Image actions backed by the vision processor
pub struct VisionTool {
    processor: Arc<VisionProcessor>,
    controller: SharedController,
}

impl VisionTool {
    pub fn new(processor: Arc<VisionProcessor>, controller: SharedController) -> Self {
        Self {
            processor,
            controller,
        }
    }

    /// Describe an image and record the result in the session history
    async fn process_image(&self, params: &Params) -> ToolResult<Value> {
        let image = require_binary(params, "image")?;
        let context = self.controller.context_snapshot().await;
        let started = Instant::now();

        let outcome = self.processor.process_image(&image, &context).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(text) => {
                self.controller
                    .record_result(ModalityResult::success(Modality::Vision, text.clone(), duration_ms))
                    .await;
                Ok(json!({ "text": text }))
            }
            Err(err) => {
                self.controller
                    .record_result(ModalityResult::failure(Modality::Vision, err.message.clone(), duration_ms))
                    .await;
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl ToolAdapter for VisionTool {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn description(&self) -> &'static str {
        "Image understanding: describe images, analyze screenshots, recognize UI elements, turn designs into code"
    }

    fn actions(&self) -> &'static [&'static str] {
        ACTIONS
    }

    fn modality(&self) -> Option<Modality> {
        Some(Modality::Vision)
    }

    async fn execute(
        &self,
        action: &str,
        params: &Params,
        _cancel: &CancellationToken,
    ) -> ToolResult<Value> {
        match action {
            "processImage" => self.process_image(params).await,
            "analyzeScreenshot" => {
                let image = require_binary(params, "image")?;
                let context = self.controller.context_snapshot().await;
                let analysis = self.processor.analyze_screenshot(&image, &context).await?;
                to_output(&analysis)
            }
            "recognizeUIElements" => {
                let image = require_binary(params, "image")?;
                let elements = self.processor.recognize_ui_elements(&image).await?;
                Ok(json!({ "elements": to_output(&elements)? }))
            }
            "generateCodeFromDesign" => {
                let image = require_binary(params, "image")?;
                let framework = optional_str(params, "framework")?;
                let instructions = optional_str(params, "instructions")?;
                let code = self
                    .processor
                    .generate_code_from_design(&image, framework, instructions)
                    .await?;
                Ok(json!({
                    "code": code,
                    "framework": framework.unwrap_or(crate::processor::vision::DEFAULT_FRAMEWORK),
                }))
            }
            other => Err(super::ToolError::UnknownAction(other.to_string())),
        }
    }
}
