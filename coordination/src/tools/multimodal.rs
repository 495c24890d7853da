//! `multimodal` tool - controller operations

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::params::{optional_binary, optional_record, require_str, Params};
use super::{to_output, ToolAdapter, ToolError, ToolResult};
use crate::controller::SharedController;
use crate::modality::{ModalitySelection, MultimodalInput};

const ACTIONS: &[&str] = &["processInput", "setModality", "getContext", "resetContext"];

/// Exposes the coordination controller as tool actions
pub struct MultimodalTool {
    controller: SharedController,
}

impl MultimodalTool {
    pub fn new(controller: SharedController) -> Self {
        Self { controller }
    }

    /// Payloads come either from a nested `input` record or from top-level
    /// `image`/`audio` fields
    fn read_input(params: &Params) -> ToolResult<MultimodalInput> {
        let source = optional_record(params, "input")?.unwrap_or(params);
        let input = MultimodalInput {
            image: optional_binary(source, "image")?,
            audio: optional_binary(source, "audio")?,
        };
        if input.is_empty() {
            return Err(ToolError::missing("image or audio"));
        }
        Ok(input)
    }
}

#[async_trait]
impl ToolAdapter for MultimodalTool {
    fn name(&self) -> &'static str {
        "multimodal"
    }

    fn description(&self) -> &'static str {
        "Combined image and audio processing with fallback, plus session context management"
    }

    fn actions(&self) -> &'static [&'static str] {
        ACTIONS
    }

    async fn execute(
        &self,
        action: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> ToolResult<Value> {
        match action {
            "processInput" => {
                let input = Self::read_input(params)?;
                let result = self
                    .controller
                    .process_input_with_cancel(&input, cancel)
                    .await?;
                to_output(&result)
            }
            "setModality" => {
                let selection: ModalitySelection = require_str(params, "modality")?
                    .parse()
                    .map_err(|e: String| ToolError::invalid("modality", &e))?;
                let previous = self.controller.set_current_modality(selection).await;
                Ok(json!({ "previous": previous, "current": selection }))
            }
            "getContext" => {
                let context = self.controller.context_snapshot().await;
                let health = self.controller.health().await;
                Ok(json!({
                    "currentModality": context.current_modality(),
                    "history": to_output(&context.history())?,
                    "health": to_output(&health)?,
                }))
            }
            "resetContext" => {
                self.controller.reset_context().await;
                Ok(json!({ "reset": true }))
            }
            other => Err(ToolError::UnknownAction(other.to_string())),
        }
    }
}
