//! Configuration for the coordination engine
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables, then CLI flags (applied by the binary).
//! The resulting [`CoordinationConfig`] is immutable once a controller is
//! built from it.
//!
//! # Environment
//!
//! ```text
//! MULTIMODAL_FALLBACK_STRATEGY   sequential | parallel | none
//! MULTIMODAL_MODALITY_PRIORITY   comma separated, e.g. "vision,voice"
//! MULTIMODAL_VISION_ENABLED      true | false
//! MULTIMODAL_AUDIO_ENABLED       true | false
//! MULTIMODAL_CALL_TIMEOUT_MS     per modality call deadline
//! MULTIMODAL_TOOL_TIMEOUT_MS     per tool invocation deadline
//! INFERENCE_GATEWAY_URL          gateway base URL
//! INFERENCE_GATEWAY_API_KEY      bearer token (optional)
//! VISION_MODEL / VOICE_MODEL     model ids sent to the gateway
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::modality::Modality;

/// Error type for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// How alternate modalities are attempted after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Try modalities one at a time in priority order until one succeeds
    #[default]
    Sequential,
    /// Run every eligible modality concurrently and merge the successes
    Parallel,
    /// Attempt only the first eligible modality
    None,
}

impl std::fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackStrategy::Sequential => write!(f, "sequential"),
            FallbackStrategy::Parallel => write!(f, "parallel"),
            FallbackStrategy::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for FallbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(FallbackStrategy::Sequential),
            "parallel" => Ok(FallbackStrategy::Parallel),
            "none" => Ok(FallbackStrategy::None),
            other => Err(format!("Unknown fallback strategy: {}", other)),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub fallback_strategy: FallbackStrategy,
    /// Order in which modalities are attempted and in which parallel
    /// segments are concatenated
    pub modality_priority: Vec<Modality>,
    pub vision_enabled: bool,
    pub audio_enabled: bool,
    /// Deadline for each individual modality call
    pub call_timeout_ms: u64,
    /// Capacity of the event delivery queue
    pub event_queue_capacity: usize,
    /// Maximum history entries retained per session (0 = unbounded)
    pub history_limit: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            fallback_strategy: FallbackStrategy::Sequential,
            modality_priority: Modality::ALL.to_vec(),
            vision_enabled: true,
            audio_enabled: true,
            call_timeout_ms: 30_000,
            event_queue_capacity: 256,
            history_limit: 100,
        }
    }
}

impl CoordinationConfig {
    pub fn with_strategy(mut self, strategy: FallbackStrategy) -> Self {
        self.fallback_strategy = strategy;
        self
    }

    pub fn with_priority(mut self, priority: Vec<Modality>) -> Self {
        self.modality_priority = priority;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Whether the modality is switched on
    pub fn is_enabled(&self, modality: Modality) -> bool {
        match modality {
            Modality::Vision => self.vision_enabled,
            Modality::Voice => self.audio_enabled,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.modality_priority.is_empty() {
            return Err(ConfigError::Invalid(
                "modality_priority must list at least one modality".to_string(),
            ));
        }
        for (idx, modality) in self.modality_priority.iter().enumerate() {
            if self.modality_priority[..idx].contains(modality) {
                return Err(ConfigError::Invalid(format!(
                    "modality_priority lists {} more than once",
                    modality
                )));
            }
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "call_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inference gateway connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub vision_model: String,
    pub voice_model: String,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            api_key: None,
            vision_model: "llava-v1.6".to_string(),
            voice_model: "whisper-large-v3".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub coordination: CoordinationConfig,
    pub gateway: GatewayConfig,
    pub tools: ToolsConfig,
}

/// Tool invocation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Deadline for a whole tool invocation
    pub invocation_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: 120_000,
        }
    }
}

impl ToolsConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    /// The invocation deadline must leave room for every prioritized
    /// modality to run to its own call deadline in turn.
    pub fn validate(&self, coordination: &CoordinationConfig) -> ConfigResult<()> {
        if self.invocation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "invocation_timeout_ms must be greater than zero".to_string(),
            ));
        }
        let modalities = coordination.modality_priority.len() as u64;
        let chain_ms = coordination.call_timeout_ms.saturating_mul(modalities);
        if self.invocation_timeout_ms < chain_ms {
            return Err(ConfigError::Invalid(format!(
                "invocation_timeout_ms ({}) is shorter than call_timeout_ms x {} modalities ({}ms)",
                self.invocation_timeout_ms, modalities, chain_ms
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.coordination.validate()?;
        self.tools.validate(&self.coordination)
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load defaults, then the optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Create from environment only
    pub fn from_env() -> ConfigResult<Self> {
        Self::load(None)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("MULTIMODAL_FALLBACK_STRATEGY") {
            self.coordination.fallback_strategy =
                val.parse().map_err(|_| invalid("MULTIMODAL_FALLBACK_STRATEGY", &val))?;
        }
        if let Some(val) = lookup("MULTIMODAL_MODALITY_PRIORITY") {
            self.coordination.modality_priority = val
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<Modality>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid("MULTIMODAL_MODALITY_PRIORITY", &val))?;
        }
        if let Some(val) = lookup("MULTIMODAL_VISION_ENABLED") {
            self.coordination.vision_enabled = parse_bool(&val);
        }
        if let Some(val) = lookup("MULTIMODAL_AUDIO_ENABLED") {
            self.coordination.audio_enabled = parse_bool(&val);
        }
        if let Some(val) = lookup("MULTIMODAL_CALL_TIMEOUT_MS") {
            self.coordination.call_timeout_ms = val
                .parse()
                .map_err(|_| invalid("MULTIMODAL_CALL_TIMEOUT_MS", &val))?;
        }
        if let Some(val) = lookup("MULTIMODAL_TOOL_TIMEOUT_MS") {
            self.tools.invocation_timeout_ms = val
                .parse()
                .map_err(|_| invalid("MULTIMODAL_TOOL_TIMEOUT_MS", &val))?;
        }
        if let Some(val) = lookup("INFERENCE_GATEWAY_URL") {
            self.gateway.base_url = val;
        }
        if let Some(val) = lookup("INFERENCE_GATEWAY_API_KEY") {
            self.gateway.api_key = Some(val).filter(|k| !k.is_empty());
        }
        if let Some(val) = lookup("VISION_MODEL") {
            self.gateway.vision_model = val;
        }
        if let Some(val) = lookup("VOICE_MODEL") {
            self.gateway.voice_model = val;
        }
        Ok(())
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = CoordinationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fallback_strategy, FallbackStrategy::Sequential);
        assert_eq!(
            config.modality_priority,
            vec![Modality::Vision, Modality::Voice]
        );
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empty() {
        let config = CoordinationConfig::default()
            .with_priority(vec![Modality::Voice, Modality::Voice]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = CoordinationConfig::default().with_priority(vec![]);
        assert!(config.validate().is_err());

        let config = CoordinationConfig::default().with_call_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tool_deadline_must_cover_fallback_chain() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        // Two modalities at 30s each need at least 60s
        config.tools.invocation_timeout_ms = 10_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("(60000ms)"));

        config.tools.invocation_timeout_ms = 60_000;
        assert!(config.validate().is_ok());

        config.coordination.modality_priority = vec![Modality::Vision];
        config.tools.invocation_timeout_ms = 30_000;
        assert!(config.validate().is_ok());

        config.tools.invocation_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_parsing_with_partial_sections() {
        let config = AppConfig::from_toml_str(
            r#"
            [coordination]
            fallback_strategy = "parallel"
            modality_priority = ["voice", "vision"]
            audio_enabled = false

            [gateway]
            base_url = "http://gateway:9000"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.coordination.fallback_strategy,
            FallbackStrategy::Parallel
        );
        assert_eq!(
            config.coordination.modality_priority,
            vec![Modality::Voice, Modality::Vision]
        );
        assert!(!config.coordination.audio_enabled);
        assert!(config.coordination.vision_enabled);
        assert_eq!(config.gateway.base_url, "http://gateway:9000");
        assert_eq!(config.gateway.vision_model, GatewayConfig::default().vision_model);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MULTIMODAL_FALLBACK_STRATEGY", "none"),
            ("MULTIMODAL_MODALITY_PRIORITY", "audio, image"),
            ("MULTIMODAL_VISION_ENABLED", "0"),
            ("MULTIMODAL_CALL_TIMEOUT_MS", "1500"),
            ("INFERENCE_GATEWAY_API_KEY", ""),
            ("VOICE_MODEL", "whisper-tiny"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.coordination.fallback_strategy, FallbackStrategy::None);
        assert_eq!(
            config.coordination.modality_priority,
            vec![Modality::Voice, Modality::Vision]
        );
        assert!(!config.coordination.vision_enabled);
        assert_eq!(config.coordination.call_timeout_ms, 1500);
        assert_eq!(config.gateway.api_key, None);
        assert_eq!(config.gateway.voice_model, "whisper-tiny");
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|key| (key == "MULTIMODAL_FALLBACK_STRATEGY").then(|| "random".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("MULTIMODAL_FALLBACK_STRATEGY"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("multimodal.toml");
        std::fs::write(
            &path,
            "[coordination]\ncall_timeout_ms = 2500\n[tools]\ninvocation_timeout_ms = 5000\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.coordination.call_timeout_ms, 2500);
        assert_eq!(config.tools.invocation_timeout_ms, 5000);

        std::fs::write(&path, "[tools]\ninvocation_timeout_ms = 1000\n").unwrap();
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));

        let missing = AppConfig::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_strategy_display_roundtrip() {
        for strategy in [
            FallbackStrategy::Sequential,
            FallbackStrategy::Parallel,
            FallbackStrategy::None,
        ] {
            assert_eq!(strategy.to_string().parse::<FallbackStrategy>().unwrap(), strategy);
        }
    }
}
