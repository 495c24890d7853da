//! Tracing span helpers
//!
//! Structured `tracing` spans for the coordination pipeline. Field names use
//! OpenTelemetry-style dot notation so exporters can pick them up unchanged.
//!
//! # Span Hierarchy
//!
//! ```text
//! multimodal.process_input     (root, one per controller invocation)
//!   └─ multimodal.modality     (one per modality call)
//! multimodal.tool              (one per tool action)
//! ```

use tracing::Span;

use crate::config::FallbackStrategy;
use crate::modality::Modality;

pub const SPAN_PROCESS_INPUT: &str = "multimodal.process_input";
pub const SPAN_MODALITY: &str = "multimodal.modality";
pub const SPAN_TOOL: &str = "multimodal.tool";

pub const FIELD_INVOCATION_ID: &str = "multimodal.invocation.id";
pub const FIELD_STRATEGY: &str = "multimodal.strategy";
pub const FIELD_MODALITY: &str = "multimodal.modality";
pub const FIELD_SUCCESS: &str = "multimodal.success";
pub const FIELD_DURATION_MS: &str = "multimodal.duration_ms";
pub const FIELD_TOOL_NAME: &str = "multimodal.tool.name";
pub const FIELD_TOOL_ACTION: &str = "multimodal.tool.action";

/// Root span for one controller invocation.
///
/// `multimodal.success` and `multimodal.duration_ms` are filled in by
/// [`record_result`].
pub fn process_input_span(invocation_id: &str, strategy: FallbackStrategy) -> Span {
    tracing::info_span!(
        "multimodal.process_input",
        "multimodal.invocation.id" = %invocation_id,
        "multimodal.strategy" = %strategy,
        "multimodal.success" = tracing::field::Empty,
        "multimodal.duration_ms" = tracing::field::Empty,
    )
}

/// Span for one modality call.
pub fn modality_span(modality: Modality) -> Span {
    tracing::info_span!(
        "multimodal.modality",
        "multimodal.modality" = %modality,
        "multimodal.success" = tracing::field::Empty,
        "multimodal.duration_ms" = tracing::field::Empty,
    )
}

/// Span for one tool action.
pub fn tool_span(tool_name: &str, action: &str) -> Span {
    tracing::info_span!(
        "multimodal.tool",
        "multimodal.tool.name" = %tool_name,
        "multimodal.tool.action" = %action,
        "multimodal.success" = tracing::field::Empty,
        "multimodal.duration_ms" = tracing::field::Empty,
    )
}

/// Record outcome fields on any of the spans above.
pub fn record_result(span: &Span, success: bool, duration_ms: u64) {
    span.record(FIELD_SUCCESS, success);
    span.record(FIELD_DURATION_MS, duration_ms);
}
