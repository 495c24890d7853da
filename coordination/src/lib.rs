//! Multimodal Coordination Library
//!
//! Coordinates an image (vision) channel and an audio (voice) channel so a
//! caller can submit either or both and get one textual result back, even
//! when one channel's model call fails.
//!
//! # Layers
//!
//! - [`controller`]: the fallback / aggregation state machine
//!   (`sequential`, `parallel`, `none`), per-call deadlines, cancellation
//! - [`processor`]: vision and voice processors over the inference gateway
//! - [`tools`]: named tool actions with a uniform `{success, output, error,
//!   executionTimeMs}` envelope
//! - [`events`]: lifecycle events, broadcast bus, bounded publisher queue
//! - [`context`]: per-session modality selection and result history
//! - [`reporting`], [`telemetry`], [`health`]: invocation reports, tracing
//!   spans, per-modality health
//!
//! # Tools
//!
//! - `vision`: `processImage`, `analyzeScreenshot`, `recognizeUIElements`,
//!   `generateCodeFromDesign`
//! - `voice`: `transcribe`, `synthesize`, `ask`, `executeCommand`,
//!   `startDictation`, `stopDictation`
//! - `multimodal`: `processInput`, `setModality`, `getContext`, `resetContext`
//!
//! # Usage
//!
//! ```bash
//! # MCP stdio server with defaults
//! multimodal-coordination
//!
//! # Parallel strategy against a remote gateway
//! INFERENCE_GATEWAY_URL=http://gpu-01:8000 multimodal-coordination --strategy parallel
//!
//! # Config file plus overrides
//! multimodal-coordination --config ./multimodal.toml --call-timeout-ms 10000
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod context;
pub mod controller;
pub mod events;
pub mod gateway;
pub mod health;
pub mod modality;
pub mod processor;
pub mod reporting;
pub mod telemetry;
pub mod tools;

pub use config::{AppConfig, ConfigError, CoordinationConfig, FallbackStrategy, GatewayConfig};
pub use context::ProcessingContext;
pub use controller::{CoordinationController, CoordinationError, SharedController};
pub use events::{EventBus, EventLog, EventPublisher, EventSink, MultimodalEvent};
pub use gateway::{HttpInferenceGateway, InferenceGateway};
pub use health::{DegradationLevel, ModalityHealth};
pub use modality::{
    Modality, ModalityResult, ModalitySelection, MultimodalInput, ProcessingOutcome,
    UnifiedResult, NO_INPUT_PROCESSED,
};
pub use processor::{
    ModalityProcessingError, ModalityProcessor, ProcessorSet, VisionProcessor, VoiceProcessor,
};
pub use reporting::{InvocationReport, RecordingReportSink, ReportSink, TracingReportSink};
pub use tools::{ToolAdapter, ToolRegistry, ToolRequest, ToolResponse};

use std::sync::Arc;

/// Everything a host needs, wired together
pub struct Engine {
    pub controller: SharedController,
    pub registry: ToolRegistry,
    pub publisher: EventPublisher,
    pub bus: events::SharedEventBus,
}

impl Engine {
    /// Build the full stack over a gateway.
    ///
    /// Must be called inside a Tokio runtime: the event publisher spawns its
    /// forwarding task immediately.
    pub fn build(
        config: &AppConfig,
        gateway: Arc<dyn InferenceGateway>,
        reports: Arc<dyn ReportSink>,
    ) -> Result<Self, CoordinationError> {
        config.validate()?;

        let bus = EventBus::new().shared();
        let publisher = EventPublisher::spawn(bus.clone(), config.coordination.event_queue_capacity);
        let events: Arc<dyn EventSink> = Arc::new(publisher.clone());

        let vision = Arc::new(VisionProcessor::new(
            gateway.clone(),
            config.gateway.vision_model.clone(),
        ));
        let voice = Arc::new(VoiceProcessor::new(gateway, config.gateway.voice_model.clone()));

        let processors = ProcessorSet::new().with(vision.clone()).with(voice.clone());
        let controller = CoordinationController::new(
            config.coordination.clone(),
            processors,
            events.clone(),
            reports.clone(),
        )?
        .shared();

        let registry = ToolRegistry::new(config.tools.invocation_timeout(), events, reports)
            .with_tool(Arc::new(tools::VisionTool::new(vision, controller.clone())))
            .with_tool(Arc::new(tools::VoiceTool::new(voice, controller.clone())))
            .with_tool(Arc::new(tools::MultimodalTool::new(controller.clone())));

        Ok(Self {
            controller,
            registry,
            publisher,
            bus,
        })
    }
}
