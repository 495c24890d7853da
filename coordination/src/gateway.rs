//! Inference gateway client
//!
//! The gateway is the external service that actually runs vision and voice
//! models. It accepts a model id, a prompt and an opaque binary payload and
//! answers with either plain text or a JSON document.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GatewayConfig;

/// Error type for gateway calls
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse gateway response: {0}")]
    Parse(String),

    #[error("Gateway returned an empty response")]
    EmptyResponse,
}

/// Result type for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Expected shape of the gateway answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// Per-request generation options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
            response_format: ResponseFormat::Text,
        }
    }
}

impl InferenceOptions {
    pub fn json() -> Self {
        Self {
            response_format: ResponseFormat::Json,
            ..Self::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// One call to the gateway
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub model_id: String,
    pub prompt: String,
    pub payload: Vec<u8>,
    pub options: InferenceOptions,
}

impl InferenceRequest {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>, payload: &[u8]) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            payload: payload.to_vec(),
            options: InferenceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: InferenceOptions) -> Self {
        self.options = options;
        self
    }
}

/// What the gateway answered
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse {
    Text(String),
    Json(serde_json::Value),
}

impl GatewayResponse {
    /// Flatten into a plain string. JSON answers carrying a `text` field are
    /// unwrapped; any other document is rendered compactly.
    pub fn into_text(self) -> String {
        match self {
            GatewayResponse::Text(text) => text,
            GatewayResponse::Json(value) => match value.get("text").and_then(|t| t.as_str()) {
                Some(text) => text.to_string(),
                None => value.to_string(),
            },
        }
    }

    /// Interpret as JSON, parsing text answers if they hold a JSON document
    pub fn into_json(self) -> GatewayResult<serde_json::Value> {
        match self {
            GatewayResponse::Json(value) => Ok(value),
            GatewayResponse::Text(text) => {
                serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
                    GatewayError::Parse(format!("expected JSON, got text ({})", e))
                })
            }
        }
    }
}

/// Models often wrap JSON in a markdown fence
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Trait for the external inference gateway
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Run one inference call
    async fn infer(&self, request: InferenceRequest) -> GatewayResult<GatewayResponse>;
}

/// Gateway reached over HTTP
pub struct HttpInferenceGateway {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpInferenceGateway {
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/v1/infer", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    payload: String,
    options: &'a InferenceOptions,
}

#[derive(Deserialize)]
struct WireResponse {
    output: Option<serde_json::Value>,
}

#[async_trait]
impl InferenceGateway for HttpInferenceGateway {
    async fn infer(&self, request: InferenceRequest) -> GatewayResult<GatewayResponse> {
        let body = WireRequest {
            model: &request.model_id,
            prompt: &request.prompt,
            payload: BASE64.encode(&request.payload),
            options: &request.options,
        };

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body });
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        debug!(model = %request.model_id, "Gateway call complete");

        match wire.output {
            None | Some(serde_json::Value::Null) => Err(GatewayError::EmptyResponse),
            Some(serde_json::Value::String(text)) if text.trim().is_empty() => {
                Err(GatewayError::EmptyResponse)
            }
            Some(serde_json::Value::String(text)) => Ok(GatewayResponse::Text(text)),
            Some(value) => Ok(GatewayResponse::Json(value)),
        }
    }
}
