//! Invocation reports for benchmark and regression tooling
//!
//! Every `process_input` call and every tool action produces one
//! [`InvocationReport`]. The external harness computes pass rates and latency
//! percentiles from these; nothing here aggregates.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Operation name used for controller invocations
pub const OP_PROCESS_INPUT: &str = "multimodal.process_input";

/// Timing and outcome of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationReport {
    /// Stable operation name (e.g. "multimodal.process_input", "vision.processImage")
    pub operation: String,
    pub invocation_id: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl InvocationReport {
    pub fn success(operation: &str, invocation_id: &str, duration_ms: u64) -> Self {
        Self {
            operation: operation.to_string(),
            invocation_id: invocation_id.to_string(),
            duration_ms,
            success: true,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(operation: &str, invocation_id: &str, duration_ms: u64, error: &str) -> Self {
        Self {
            operation: operation.to_string(),
            invocation_id: invocation_id.to_string(),
            duration_ms,
            success: false,
            error: Some(error.to_string()),
            finished_at: Utc::now(),
        }
    }
}

/// Receiver of invocation reports
pub trait ReportSink: Send + Sync {
    fn record(&self, report: InvocationReport);
}

/// Emits each report as a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReportSink;

impl ReportSink for TracingReportSink {
    fn record(&self, report: InvocationReport) {
        info!(
            operation = %report.operation,
            invocation_id = %report.invocation_id,
            duration_ms = report.duration_ms,
            success = report.success,
            error = report.error.as_deref().unwrap_or(""),
            "invocation"
        );
    }
}

/// Keeps reports in memory for a harness to drain
#[derive(Debug, Default)]
pub struct RecordingReportSink {
    reports: Mutex<Vec<InvocationReport>>,
}

impl RecordingReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<InvocationReport> {
        self.lock().clone()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<InvocationReport> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<InvocationReport>> {
        self.reports.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ReportSink for RecordingReportSink {
    fn record(&self, report: InvocationReport) {
        self.lock().push(report);
    }
}
