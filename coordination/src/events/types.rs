//! Lifecycle events emitted by the coordination engine
//!
//! Each variant serializes with a `type` tag carrying its dotted event name,
//! e.g. `{"type": "multimodal.modality.switched", "from": "auto", ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FallbackStrategy;
use crate::modality::{Modality, ModalitySelection};

/// Identifier of one `process_input` or tool invocation
pub type InvocationId = String;

pub const PROCESSING_STARTED: &str = "multimodal.processing.started";
pub const PROCESSING_COMPLETED: &str = "multimodal.processing.completed";
pub const PROCESSING_FALLBACK: &str = "multimodal.processing.fallback";
pub const VISION_PROCESSING_ERROR: &str = "multimodal.vision.processing.error";
pub const VOICE_PROCESSING_ERROR: &str = "multimodal.voice.processing.error";
pub const MODALITY_SWITCHED: &str = "multimodal.modality.switched";

/// All coordination lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MultimodalEvent {
    /// Input accepted and processing begun
    #[serde(rename = "multimodal.processing.started")]
    ProcessingStarted {
        invocation_id: InvocationId,
        strategy: FallbackStrategy,
        eligible: Vec<Modality>,
        timestamp: DateTime<Utc>,
    },

    /// Invocation resolved, successfully or not
    #[serde(rename = "multimodal.processing.completed")]
    ProcessingCompleted {
        invocation_id: InvocationId,
        success: bool,
        modalities: Vec<Modality>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// No modality produced a result; the sentinel was returned
    #[serde(rename = "multimodal.processing.fallback")]
    ProcessingFallback {
        invocation_id: InvocationId,
        attempted: Vec<Modality>,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The vision call failed
    #[serde(rename = "multimodal.vision.processing.error")]
    VisionProcessingError {
        invocation_id: InvocationId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The voice call failed
    #[serde(rename = "multimodal.voice.processing.error")]
    VoiceProcessingError {
        invocation_id: InvocationId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The caller changed the current modality selection
    #[serde(rename = "multimodal.modality.switched")]
    ModalitySwitched {
        from: ModalitySelection,
        to: ModalitySelection,
        timestamp: DateTime<Utc>,
    },
}

impl MultimodalEvent {
    /// Build the error event for a failed modality call
    pub fn modality_error(
        modality: Modality,
        invocation_id: impl Into<InvocationId>,
        error: impl Into<String>,
    ) -> Self {
        let invocation_id = invocation_id.into();
        let error = error.into();
        let timestamp = Utc::now();
        match modality {
            Modality::Vision => MultimodalEvent::VisionProcessingError {
                invocation_id,
                error,
                timestamp,
            },
            Modality::Voice => MultimodalEvent::VoiceProcessingError {
                invocation_id,
                error,
                timestamp,
            },
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MultimodalEvent::ProcessingStarted { timestamp, .. } => *timestamp,
            MultimodalEvent::ProcessingCompleted { timestamp, .. } => *timestamp,
            MultimodalEvent::ProcessingFallback { timestamp, .. } => *timestamp,
            MultimodalEvent::VisionProcessingError { timestamp, .. } => *timestamp,
            MultimodalEvent::VoiceProcessingError { timestamp, .. } => *timestamp,
            MultimodalEvent::ModalitySwitched { timestamp, .. } => *timestamp,
        }
    }

    /// Get the dotted event name
    pub fn event_type(&self) -> &'static str {
        match self {
            MultimodalEvent::ProcessingStarted { .. } => PROCESSING_STARTED,
            MultimodalEvent::ProcessingCompleted { .. } => PROCESSING_COMPLETED,
            MultimodalEvent::ProcessingFallback { .. } => PROCESSING_FALLBACK,
            MultimodalEvent::VisionProcessingError { .. } => VISION_PROCESSING_ERROR,
            MultimodalEvent::VoiceProcessingError { .. } => VOICE_PROCESSING_ERROR,
            MultimodalEvent::ModalitySwitched { .. } => MODALITY_SWITCHED,
        }
    }

    /// Get the invocation ID if this event is invocation-scoped
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            MultimodalEvent::ProcessingStarted { invocation_id, .. }
            | MultimodalEvent::ProcessingCompleted { invocation_id, .. }
            | MultimodalEvent::ProcessingFallback { invocation_id, .. }
            | MultimodalEvent::VisionProcessingError { invocation_id, .. }
            | MultimodalEvent::VoiceProcessingError { invocation_id, .. } => Some(invocation_id),
            MultimodalEvent::ModalitySwitched { .. } => None,
        }
    }

    /// Get the modality an error event refers to
    pub fn error_modality(&self) -> Option<Modality> {
        match self {
            MultimodalEvent::VisionProcessingError { .. } => Some(Modality::Vision),
            MultimodalEvent::VoiceProcessingError { .. } => Some(Modality::Voice),
            _ => None,
        }
    }

    /// Whether this is a per-modality error event
    pub fn is_error(&self) -> bool {
        self.error_modality().is_some()
    }

    /// Create a new unique invocation ID
    pub fn new_invocation_id() -> InvocationId {
        uuid::Uuid::new_v4().to_string()
    }
}
