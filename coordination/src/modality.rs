//! Modality types shared by the controller, processors and tool layer
//!
//! The set of modalities is closed: adding one means adding a variant here,
//! a processor implementation, and an entry in the configured priority list.

use serde::{Deserialize, Serialize};

/// Text returned when no modality produced a result.
pub const NO_INPUT_PROCESSED: &str = "No input processed successfully";

/// An input channel backed by a distinct external inference call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Vision,
    Voice,
}

impl Modality {
    /// All modalities in their default priority order
    pub const ALL: [Modality; 2] = [Modality::Vision, Modality::Voice];

    /// Tag prefixed to this modality's segment in parallel output
    pub fn segment_tag(&self) -> &'static str {
        match self {
            Modality::Vision => "[VISION]",
            Modality::Voice => "[AUDIO]",
        }
    }

    /// Name of the input field that feeds this modality
    pub fn input_field(&self) -> &'static str {
        match self {
            Modality::Vision => "image",
            Modality::Voice => "audio",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modality::Vision => write!(f, "vision"),
            Modality::Voice => write!(f, "voice"),
        }
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vision" | "image" => Ok(Modality::Vision),
            "voice" | "audio" => Ok(Modality::Voice),
            other => Err(format!("Unknown modality: {}", other)),
        }
    }
}

/// The caller-selected modality, tracked for telemetry only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalitySelection {
    #[default]
    Auto,
    Vision,
    Voice,
}

impl From<Modality> for ModalitySelection {
    fn from(modality: Modality) -> Self {
        match modality {
            Modality::Vision => ModalitySelection::Vision,
            Modality::Voice => ModalitySelection::Voice,
        }
    }
}

impl std::fmt::Display for ModalitySelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModalitySelection::Auto => write!(f, "auto"),
            ModalitySelection::Vision => write!(f, "vision"),
            ModalitySelection::Voice => write!(f, "voice"),
        }
    }
}

impl std::str::FromStr for ModalitySelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ModalitySelection::Auto),
            other => other.parse::<Modality>().map(ModalitySelection::from),
        }
    }
}

/// Outcome of one attempted modality call. Constructed once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityResult {
    pub modality: Modality,
    pub text: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ModalityResult {
    pub fn success(modality: Modality, text: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            modality,
            text: text.into(),
            success: true,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(modality: Modality, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            modality,
            text: String::new(),
            success: false,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Input envelope submitted to the controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultimodalInput {
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub audio: Option<Vec<u8>>,
}

impl MultimodalInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_audio(mut self, audio: impl Into<Vec<u8>>) -> Self {
        self.audio = Some(audio.into());
        self
    }

    /// Whether neither an image nor audio payload carries any bytes
    pub fn is_empty(&self) -> bool {
        Modality::ALL.iter().all(|m| self.payload(*m).is_none())
    }

    /// The payload feeding the given modality. Zero-length payloads count
    /// as absent; the fields themselves keep them for echoing.
    pub fn payload(&self, modality: Modality) -> Option<&[u8]> {
        let field = match modality {
            Modality::Vision => &self.image,
            Modality::Voice => &self.audio,
        };
        field.as_deref().filter(|bytes| !bytes.is_empty())
    }
}

/// How an invocation resolved, for callers that pattern-match instead of
/// comparing the result text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// At least one modality produced text
    Processed { modalities: Vec<Modality> },
    /// Every attempted modality failed, or none was eligible
    AllFailed { errors: Vec<ModalityFailure> },
}

/// A single modality failure carried in [`ProcessingOutcome::AllFailed`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityFailure {
    pub modality: Modality,
    pub message: String,
}

/// Output envelope. `image` and `audio` echo the submitted payloads verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResult {
    pub text: String,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub audio: Option<Vec<u8>>,
    pub outcome: ProcessingOutcome,
}

impl UnifiedResult {
    /// Build a successful result echoing the input payloads
    pub fn processed(text: String, input: &MultimodalInput, modalities: Vec<Modality>) -> Self {
        Self {
            text,
            image: input.image.clone(),
            audio: input.audio.clone(),
            outcome: ProcessingOutcome::Processed { modalities },
        }
    }

    /// Build the sentinel result returned when nothing succeeded
    pub fn all_failed(input: &MultimodalInput, errors: Vec<ModalityFailure>) -> Self {
        Self {
            text: NO_INPUT_PROCESSED.to_string(),
            image: input.image.clone(),
            audio: input.audio.clone(),
            outcome: ProcessingOutcome::AllFailed { errors },
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self.outcome, ProcessingOutcome::Processed { .. })
    }
}

/// Serde adapter encoding optional binary payloads as base64 strings
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
