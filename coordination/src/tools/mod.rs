//! Tool layer
//!
//! Hosts call named actions on three tools (`vision`, `voice`,
//! `multimodal`). Each tool is a [`ToolAdapter`]; the [`ToolRegistry`]
//! looks tools up by name, enforces a deadline, and wraps every outcome in
//! the uniform [`ToolResponse`] envelope:
//!
//! ```json
//! { "success": true, "output": { ... }, "executionTimeMs": 12 }
//! { "success": false, "error": "Missing required parameter: image", "executionTimeMs": 0 }
//! ```
//!
//! Failures never escape as `Err`; the envelope is the only result shape.

pub mod multimodal;
pub mod params;
pub mod vision;
pub mod voice;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::controller::CoordinationError;
use crate::events::{EventSink, MultimodalEvent};
use crate::modality::Modality;
use crate::processor::{DictationError, ModalityProcessingError};
use crate::reporting::{InvocationReport, ReportSink};
use crate::telemetry;

pub use multimodal::MultimodalTool;
pub use params::Params;
pub use vision::VisionTool;
pub use voice::VoiceTool;

/// Parameter naming the action inside `parameters`
pub const ACTION_PARAM: &str = "action";

/// How long a timed-out action may take to unwind after its token fires
const CANCEL_GRACE: Duration = Duration::from_millis(500);

/// Error type for tool actions
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error(transparent)]
    Processing(#[from] ModalityProcessingError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Session state misuse; publishes no modality error event
    #[error(transparent)]
    Dictation(#[from] DictationError),

    #[error("Tool call timed out after {0}ms")]
    Timeout(u64),
}

impl ToolError {
    pub fn missing(name: &str) -> Self {
        ToolError::Validation(format!("Missing required parameter: {}", name))
    }

    pub fn invalid(name: &str, reason: &str) -> Self {
        ToolError::Validation(format!("Invalid parameter {}: {}", name, reason))
    }
}

/// Result type for tool actions
pub type ToolResult<T> = Result<T, ToolError>;

/// Request envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Params,
    /// Opaque host context; logged, never interpreted
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

impl ToolRequest {
    pub fn new(tool_name: &str, action: &str) -> Self {
        let mut parameters = Params::new();
        parameters.insert(ACTION_PARAM.to_string(), Value::String(action.to_string()));
        Self {
            tool_name: tool_name.to_string(),
            parameters,
            context: Value::Null,
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl ToolResponse {
    pub fn ok(output: Value, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            execution_time_ms,
        }
    }

    pub fn err(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            execution_time_ms,
        }
    }
}

/// Tool listing entry for hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub actions: Vec<String>,
}

/// A named group of actions
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Every action `execute` accepts
    fn actions(&self) -> &'static [&'static str];

    /// Modality whose error event a timed-out action publishes
    fn modality(&self) -> Option<Modality> {
        None
    }

    /// Run one action. `action` is always one of [`actions`](Self::actions).
    ///
    /// `cancel` fires when the registry deadline passes; actions that honor
    /// it get a short grace period to finish before they are dropped.
    async fn execute(
        &self,
        action: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> ToolResult<Value>;
}

/// Tools by name
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn ToolAdapter>>,
    timeout: Duration,
    events: Arc<dyn EventSink>,
    reports: Arc<dyn ReportSink>,
}

impl ToolRegistry {
    pub fn new(timeout: Duration, events: Arc<dyn EventSink>, reports: Arc<dyn ReportSink>) -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout,
            events,
            reports,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn ToolAdapter>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn ToolAdapter>) -> Self {
        self.register(tool);
        self
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                actions: tool.actions().iter().map(|a| a.to_string()).collect(),
            })
            .collect()
    }

    /// Run a request and wrap the outcome in the response envelope
    pub async fn invoke(&self, request: &ToolRequest) -> ToolResponse {
        let started = Instant::now();
        let invocation_id = MultimodalEvent::new_invocation_id();
        debug!(tool = %request.tool_name, context = %request.context, "Tool request");
        let action = request
            .parameters
            .get(ACTION_PARAM)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let operation = format!("{}.{}", request.tool_name, action);

        let outcome = self.dispatch(&invocation_id, request, action).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                info!(%operation, invocation_id = %invocation_id, elapsed_ms, "Tool action succeeded");
                self.reports
                    .record(InvocationReport::success(&operation, &invocation_id, elapsed_ms));
                ToolResponse::ok(output, elapsed_ms)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(%operation, invocation_id = %invocation_id, error = %message, "Tool action failed");
                self.reports.record(InvocationReport::failure(
                    &operation,
                    &invocation_id,
                    elapsed_ms,
                    &message,
                ));
                ToolResponse::err(message, elapsed_ms)
            }
        }
    }

    async fn dispatch(&self, invocation_id: &str, request: &ToolRequest, action: &str) -> ToolResult<Value> {
        let tool = self
            .tools
            .get(request.tool_name.as_str())
            .ok_or_else(|| ToolError::UnknownTool(request.tool_name.clone()))?;
        if action.is_empty() {
            return Err(ToolError::missing(ACTION_PARAM));
        }
        if !tool.actions().iter().any(|a| *a == action) {
            return Err(ToolError::UnknownAction(action.to_string()));
        }

        let span = telemetry::tool_span(tool.name(), action);
        let started = Instant::now();
        let cancel = CancellationToken::new();
        let execution = tool
            .execute(action, &request.parameters, &cancel)
            .instrument(span.clone());
        tokio::pin!(execution);

        let result = tokio::select! {
            result = &mut execution => result,
            _ = tokio::time::sleep(self.timeout) => {
                cancel.cancel();
                if tokio::time::timeout(CANCEL_GRACE, &mut execution).await.is_err() {
                    warn!(tool = tool.name(), action, "Tool action ignored cancellation");
                }
                Err(ToolError::Timeout(self.timeout.as_millis() as u64))
            }
        };
        telemetry::record_result(&span, result.is_ok(), started.elapsed().as_millis() as u64);

        if let Err(err) = &result {
            let modality = match err {
                ToolError::Processing(e) => Some(e.modality),
                ToolError::Timeout(_) => tool.modality(),
                _ => None,
            };
            if let Some(modality) = modality {
                self.events
                    .publish(MultimodalEvent::modality_error(modality, invocation_id, err.to_string()));
            }
        }
        result
    }
}

/// Serialize a tool output
pub(crate) fn to_output<T: Serialize>(value: &T) -> ToolResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| ToolError::Validation(format!("Failed to encode output: {}", e)))
}
