//! `voice` tool

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::params::{optional_binary, optional_str, require_binary, require_str, Params};
use super::{to_output, ToolAdapter, ToolError, ToolResult};
use crate::controller::SharedController;
use crate::modality::{Modality, ModalityResult};
use crate::processor::{ProcessingResult, VoiceProcessor};

const ACTIONS: &[&str] = &[
    "transcribe",
    "synthesize",
    "ask",
    "executeCommand",
    "startDictation",
    "stopDictation",
];

/// Speech actions backed by the voice processor
pub struct VoiceTool {
    processor: Arc<VoiceProcessor>,
    controller: SharedController,
}

impl VoiceTool {
    pub fn new(processor: Arc<VoiceProcessor>, controller: SharedController) -> Self {
        Self {
            processor,
            controller,
        }
    }

    /// Record a text-producing call in the session history
    async fn record(&self, outcome: &ProcessingResult<String>, started: Instant) {
        let duration_ms = started.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(text) => ModalityResult::success(Modality::Voice, text.clone(), duration_ms),
            Err(err) => ModalityResult::failure(Modality::Voice, err.message.clone(), duration_ms),
        };
        self.controller.record_result(result).await;
    }
}

#[async_trait]
impl ToolAdapter for VoiceTool {
    fn name(&self) -> &'static str {
        "voice"
    }

    fn description(&self) -> &'static str {
        "Speech: transcription, synthesis, spoken questions, editor commands and dictation"
    }

    fn actions(&self) -> &'static [&'static str] {
        ACTIONS
    }

    fn modality(&self) -> Option<Modality> {
        Some(Modality::Voice)
    }

    async fn execute(
        &self,
        action: &str,
        params: &Params,
        _cancel: &CancellationToken,
    ) -> ToolResult<Value> {
        match action {
            "transcribe" => {
                let audio = require_binary(params, "audio")?;
                let context = self.controller.context_snapshot().await;
                let started = Instant::now();
                let outcome = self.processor.transcribe(&audio, &context).await;
                self.record(&outcome, started).await;
                Ok(json!({ "text": outcome? }))
            }
            "synthesize" => {
                let text = require_str(params, "text")?;
                let voice = optional_str(params, "voice")?;
                let synthesis = self.processor.synthesize(text, voice).await?;
                to_output(&synthesis)
            }
            "ask" => {
                let audio = optional_binary(params, "audio")?.filter(|a| !a.is_empty());
                let question = match (optional_str(params, "question")?, &audio) {
                    (Some(question), _) => question,
                    (None, Some(_)) => "",
                    (None, None) => return Err(ToolError::missing("question")),
                };
                let context = self.controller.context_snapshot().await;
                let started = Instant::now();
                let outcome = self
                    .processor
                    .ask(question, audio.as_deref(), &context)
                    .await;
                self.record(&outcome, started).await;
                Ok(json!({ "answer": outcome? }))
            }
            "executeCommand" => {
                let command = require_str(params, "command")?;
                let context = self.controller.context_snapshot().await;
                let interpreted = self.processor.execute_command(command, &context).await?;
                to_output(&interpreted)
            }
            "startDictation" => {
                let session_id = self.processor.start_dictation()?;
                Ok(json!({ "sessionId": session_id }))
            }
            "stopDictation" => {
                let transcript = self.processor.stop_dictation()?;
                to_output(&transcript)
            }
            other => Err(ToolError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::stack;
    use super::super::ToolRequest;
    use crate::events::VOICE_PROCESSING_ERROR;
    use crate::modality::Modality;
    use crate::processor::testing::ScriptedGateway;
    use serde_json::json;

    #[tokio::test]
    async fn test_transcribe_and_ask_share_history() {
        let s = stack(ScriptedGateway::new().text("what does this button do").text("It signs you in."));

        let response = s
            .registry
            .invoke(&ToolRequest::new("voice", "transcribe").with_param("audio", "YXVk"))
            .await;
        assert_eq!(response.output, Some(json!({"text": "what does this button do"})));

        let response = s
            .registry
            .invoke(&ToolRequest::new("voice", "ask").with_param("question", "and then?"))
            .await;
        assert_eq!(response.output, Some(json!({"answer": "It signs you in."})));

        let context = s.controller.context_snapshot().await;
        assert_eq!(context.history().len(), 2);
        assert!(context.history().iter().all(|r| r.modality == Modality::Voice));
    }

    #[tokio::test]
    async fn test_ask_requires_question_or_audio() {
        let s = stack(ScriptedGateway::new());
        let response = s.registry.invoke(&ToolRequest::new("voice", "ask")).await;
        assert_eq!(
            response.error.as_deref(),
            Some("Missing required parameter: question")
        );
    }

    #[tokio::test]
    async fn test_synthesize_requires_text() {
        let s = stack(ScriptedGateway::new());
        let response = s.registry.invoke(&ToolRequest::new("voice", "synthesize")).await;
        assert_eq!(response.error.as_deref(), Some("Missing required parameter: text"));
    }

    #[tokio::test]
    async fn test_execute_command() {
        let s = stack(ScriptedGateway::new().json(json!({"intent": "save_file"})));
        let response = s
            .registry
            .invoke(&ToolRequest::new("voice", "executeCommand").with_param("command", "save"))
            .await;
        assert!(response.success);
        assert_eq!(response.output.unwrap()["intent"], "save_file");
    }

    #[tokio::test]
    async fn test_dictation_lifecycle() {
        let s = stack(ScriptedGateway::new().text("dear team"));

        let response = s.registry.invoke(&ToolRequest::new("voice", "stopDictation")).await;
        assert_eq!(
            response.error.as_deref(),
            Some("no active dictation session")
        );

        let started = s.registry.invoke(&ToolRequest::new("voice", "startDictation")).await;
        let session_id = started.output.unwrap()["sessionId"].as_str().unwrap().to_string();

        let again = s.registry.invoke(&ToolRequest::new("voice", "startDictation")).await;
        assert_eq!(
            again.error,
            Some(format!("dictation already active: {}", session_id))
        );

        // Misuse never reached the model, so nothing reports a voice failure
        assert_eq!(s.events.count(VOICE_PROCESSING_ERROR), 0);
        assert!(s.gateway.requests().is_empty());

        s.registry
            .invoke(&ToolRequest::new("voice", "transcribe").with_param("audio", "YXVk"))
            .await;
        let stopped = s.registry.invoke(&ToolRequest::new("voice", "stopDictation")).await;
        let output = stopped.output.unwrap();
        assert_eq!(output["session_id"], session_id.as_str());
        assert_eq!(output["text"], "dear team");
    }
}
