//! Voice processor
//!
//! Speech through the inference gateway: transcription, synthesis, spoken
//! questions, editor commands and dictation sessions.
//!
//! A dictation session collects every transcript produced while it is open.
//! At most one session is open per processor.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{non_empty, prompts, ModalityProcessingError, ModalityProcessor, ProcessingResult};
use crate::context::ProcessingContext;
use crate::gateway::{GatewayResponse, InferenceGateway, InferenceOptions, InferenceRequest};
use crate::modality::Modality;

/// Audio format assumed when the gateway does not name one
pub const DEFAULT_AUDIO_FORMAT: &str = "wav";

/// Dictation used out of order. No model call is involved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DictationError {
    #[error("dictation already active: {0}")]
    AlreadyActive(String),

    #[error("no active dictation session")]
    NotActive,
}

/// Synthesized speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    /// Base64 audio or a gateway-side reference, as returned by the gateway
    pub audio: String,
    pub format: String,
}

/// Structured interpretation of a voice command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCommand {
    pub intent: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Everything transcribed during a dictation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictationTranscript {
    pub session_id: String,
    pub text: String,
    pub segments: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug)]
struct DictationSession {
    id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    segments: Vec<String>,
}

/// Processor for the audio channel
pub struct VoiceProcessor {
    gateway: Arc<dyn InferenceGateway>,
    model_id: String,
    dictation: Mutex<Option<DictationSession>>,
}

impl VoiceProcessor {
    pub fn new(gateway: Arc<dyn InferenceGateway>, model_id: impl Into<String>) -> Self {
        Self {
            gateway,
            model_id: model_id.into(),
            dictation: Mutex::new(None),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Transcribe speech. The transcript is also appended to the open
    /// dictation session, if any.
    pub async fn transcribe(
        &self,
        audio: &[u8],
        context: &ProcessingContext,
    ) -> ProcessingResult<String> {
        self.ensure_payload(audio)?;
        let prompt = prompts::transcribe(&context.grounding_summary(Modality::Voice));
        let text = self.infer(audio, prompt, InferenceOptions::default()).await?;
        let text = non_empty(Modality::Voice, text.into_text())?;

        if let Some(session) = self.session().as_mut() {
            session.segments.push(text.clone());
            debug!(session_id = %session.id, segments = session.segments.len(), "dictation segment");
        }
        Ok(text)
    }

    /// Same as [`transcribe`](Self::transcribe)
    pub async fn process_audio(
        &self,
        audio: &[u8],
        context: &ProcessingContext,
    ) -> ProcessingResult<String> {
        self.transcribe(audio, context).await
    }

    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> ProcessingResult<SynthesisResult> {
        if text.trim().is_empty() {
            return Err(self.error("nothing to synthesize"));
        }
        let response = self
            .infer(&[], prompts::synthesize(text, voice), InferenceOptions::json())
            .await?;

        match response {
            GatewayResponse::Json(value) => {
                let audio = value
                    .get("audio")
                    .and_then(|a| a.as_str())
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| self.error("synthesis response has no `audio` field"))?;
                let format = value
                    .get("format")
                    .and_then(|f| f.as_str())
                    .unwrap_or(DEFAULT_AUDIO_FORMAT);
                Ok(SynthesisResult {
                    audio: audio.to_string(),
                    format: format.to_string(),
                })
            }
            GatewayResponse::Text(audio) => Ok(SynthesisResult {
                audio: non_empty(Modality::Voice, audio)?,
                format: DEFAULT_AUDIO_FORMAT.to_string(),
            }),
        }
    }

    /// Answer a question, optionally spoken. Earlier results from other
    /// modalities ground the answer.
    pub async fn ask(
        &self,
        question: &str,
        audio: Option<&[u8]>,
        context: &ProcessingContext,
    ) -> ProcessingResult<String> {
        let audio = audio.unwrap_or_default();
        if question.trim().is_empty() && audio.is_empty() {
            return Err(self.error("a question or audio is required"));
        }
        let prompt = prompts::ask(question, &context.grounding_summary(Modality::Voice));
        let response = self.infer(audio, prompt, InferenceOptions::default()).await?;
        non_empty(Modality::Voice, response.into_text())
    }

    pub async fn execute_command(
        &self,
        command: &str,
        context: &ProcessingContext,
    ) -> ProcessingResult<VoiceCommand> {
        if command.trim().is_empty() {
            return Err(self.error("command is empty"));
        }
        let prompt = prompts::interpret_command(command, &context.grounding_summary(Modality::Voice));
        let value = self
            .infer(&[], prompt, InferenceOptions::json())
            .await?
            .into_json()
            .map_err(|e| ModalityProcessingError::gateway(Modality::Voice, e))?;

        let parsed: VoiceCommand = serde_json::from_value(value)
            .map_err(|e| self.error(format!("unexpected command shape: {}", e)))?;
        if parsed.intent.trim().is_empty() {
            return Err(self.error("command interpretation has no intent"));
        }
        info!(intent = %parsed.intent, "voice command interpreted");
        Ok(parsed)
    }

    /// Open a dictation session and return its id
    pub fn start_dictation(&self) -> Result<String, DictationError> {
        let mut slot = self.session();
        if let Some(existing) = slot.as_ref() {
            return Err(DictationError::AlreadyActive(existing.id.clone()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        *slot = Some(DictationSession {
            id: id.clone(),
            started_at: Utc::now(),
            started: Instant::now(),
            segments: Vec::new(),
        });
        info!(session_id = %id, "dictation started");
        Ok(id)
    }

    /// Close the open session and return what it collected
    pub fn stop_dictation(&self) -> Result<DictationTranscript, DictationError> {
        let session = self.session().take().ok_or(DictationError::NotActive)?;

        let transcript = DictationTranscript {
            text: session.segments.join(" "),
            session_id: session.id,
            segments: session.segments,
            started_at: session.started_at,
            duration_ms: session.started.elapsed().as_millis() as u64,
        };
        info!(
            session_id = %transcript.session_id,
            segments = transcript.segments.len(),
            "dictation stopped"
        );
        Ok(transcript)
    }

    /// Id of the open dictation session
    pub fn active_dictation(&self) -> Option<String> {
        self.session().as_ref().map(|s| s.id.clone())
    }

    async fn infer(
        &self,
        payload: &[u8],
        prompt: String,
        options: InferenceOptions,
    ) -> ProcessingResult<GatewayResponse> {
        debug!(model = %self.model_id, bytes = payload.len(), "voice gateway call");
        let request = InferenceRequest::new(&self.model_id, prompt, payload).with_options(options);
        self.gateway
            .infer(request)
            .await
            .map_err(|e| ModalityProcessingError::gateway(Modality::Voice, e))
    }

    fn ensure_payload(&self, audio: &[u8]) -> ProcessingResult<()> {
        if audio.is_empty() {
            Err(self.error("audio payload is empty"))
        } else {
            Ok(())
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<DictationSession>> {
        self.dictation.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn error(&self, message: impl Into<String>) -> ModalityProcessingError {
        ModalityProcessingError::new(Modality::Voice, message)
    }
}

#[async_trait]
impl ModalityProcessor for VoiceProcessor {
    fn modality(&self) -> Modality {
        Modality::Voice
    }

    async fn process(
        &self,
        payload: &[u8],
        context: &ProcessingContext,
    ) -> ProcessingResult<String> {
        self.transcribe(payload, context).await
    }
}
