//! Modality processors
//!
//! One processor per [`Modality`]. Each wraps the inference gateway with the
//! fixed prompt templates in [`prompts`] and turns every failure (gateway
//! error, malformed JSON, empty answer) into a [`ModalityProcessingError`].
//!
//! The controller only ever calls [`ModalityProcessor::process`]; the richer
//! per-operation methods on [`VisionProcessor`] and [`VoiceProcessor`] back
//! the tool actions.

pub mod prompts;
pub mod vision;
pub mod voice;

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ProcessingContext;
use crate::gateway::GatewayError;
use crate::modality::Modality;

pub use vision::{BoundingBox, ScreenshotAnalysis, UiElement, VisionProcessor};
pub use voice::{DictationError, DictationTranscript, SynthesisResult, VoiceCommand, VoiceProcessor};

/// A modality call failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{modality} processing failed: {message}")]
pub struct ModalityProcessingError {
    pub modality: Modality,
    pub message: String,
}

impl ModalityProcessingError {
    pub fn new(modality: Modality, message: impl Into<String>) -> Self {
        Self {
            modality,
            message: message.into(),
        }
    }

    /// Wrap a gateway failure for the given modality
    pub fn gateway(modality: Modality, err: GatewayError) -> Self {
        Self::new(modality, err.to_string())
    }
}

/// Result type for processor operations
pub type ProcessingResult<T> = Result<T, ModalityProcessingError>;

/// A model-backed input channel
#[async_trait]
pub trait ModalityProcessor: Send + Sync {
    /// Which modality this processor handles
    fn modality(&self) -> Modality;

    /// Turn a raw payload into text.
    ///
    /// `context` is a snapshot; processors read it for grounding and never
    /// write back.
    async fn process(&self, payload: &[u8], context: &ProcessingContext)
        -> ProcessingResult<String>;
}

/// Shared processor handle
pub type SharedProcessor = Arc<dyn ModalityProcessor>;

/// The processors a controller dispatches to, one slot per modality
#[derive(Clone, Default)]
pub struct ProcessorSet {
    vision: Option<SharedProcessor>,
    voice: Option<SharedProcessor>,
}

impl ProcessorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a processor in the slot named by its own `modality()`,
    /// replacing any previous one
    pub fn with(mut self, processor: SharedProcessor) -> Self {
        match processor.modality() {
            Modality::Vision => self.vision = Some(processor),
            Modality::Voice => self.voice = Some(processor),
        }
        self
    }

    pub fn get(&self, modality: Modality) -> Option<&SharedProcessor> {
        match modality {
            Modality::Vision => self.vision.as_ref(),
            Modality::Voice => self.voice.as_ref(),
        }
    }

    pub fn contains(&self, modality: Modality) -> bool {
        self.get(modality).is_some()
    }
}

impl std::fmt::Debug for ProcessorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorSet")
            .field("vision", &self.vision.is_some())
            .field("voice", &self.voice.is_some())
            .finish()
    }
}

/// Reject answers that carry no text
pub(crate) fn non_empty(modality: Modality, text: String) -> ProcessingResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(ModalityProcessingError::new(
            modality,
            GatewayError::EmptyResponse.to_string(),
        ))
    } else if trimmed.len() == text.len() {
        Ok(text)
    } else {
        Ok(trimmed.to_string())
    }
}
