//! MCP Server for multimodal coordination
//!
//! Exposes the tool registry to an IDE host over stdio:
//! - `invoke_tool`: run one action on the `vision`, `voice` or `multimodal` tool
//! - `list_tools`: list tools and their actions
//!
//! # Usage
//!
//! ```bash
//! # Defaults (sequential strategy, gateway on localhost:8000)
//! multimodal-coordination
//!
//! # Parallel strategy, config file, verbose logs
//! RUST_LOG=multimodal_coordination=debug multimodal-coordination --config ./multimodal.toml --strategy parallel
//! ```

// Suppress false positive dead_code warnings from #[tool_router] macro and serde deserialization
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use tokio::io::{stdin, stdout};
use tokio::sync::broadcast::error::RecvError;

use multimodal_coordination::events::{
    EventBusExt, EventFilter, PROCESSING_FALLBACK, VISION_PROCESSING_ERROR,
    VOICE_PROCESSING_ERROR,
};
use multimodal_coordination::{
    AppConfig, Engine, FallbackStrategy, HttpInferenceGateway, ToolRegistry, ToolRequest,
    TracingReportSink,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (environment variables still override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fallback strategy: sequential, parallel or none (overrides MULTIMODAL_FALLBACK_STRATEGY)
    #[arg(long)]
    strategy: Option<FallbackStrategy>,

    /// Per-modality call deadline in milliseconds (overrides MULTIMODAL_CALL_TIMEOUT_MS)
    #[arg(long)]
    call_timeout_ms: Option<u64>,

    /// Inference gateway base URL (overrides INFERENCE_GATEWAY_URL)
    #[arg(long)]
    gateway_url: Option<String>,

    /// Log every lifecycle event, not just errors and fallbacks
    #[arg(long, default_value_t = false)]
    log_events: bool,
}

/// Request parameters for invoke_tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct InvokeToolRequest {
    #[schemars(description = "Tool name: vision, voice or multimodal")]
    tool_name: String,
    #[schemars(
        description = "Action name, e.g. processImage, transcribe, processInput, setModality"
    )]
    action: String,
    #[schemars(
        description = "Action parameters. Binary fields (image, audio) are base64 strings or byte arrays"
    )]
    parameters: Option<serde_json::Map<String, serde_json::Value>>,
    #[schemars(description = "Optional: opaque host context, logged only")]
    context: Option<serde_json::Value>,
}

/// Request parameters for list_tools
#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListToolsRequest {}

#[derive(Clone)]
struct MultimodalServer {
    registry: Arc<ToolRegistry>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MultimodalServer {
    fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Invoke one action on a multimodal tool. Returns the JSON envelope {success, output, error, executionTimeMs}. Tools: vision (processImage, analyzeScreenshot, recognizeUIElements, generateCodeFromDesign), voice (transcribe, synthesize, ask, executeCommand, startDictation, stopDictation), multimodal (processInput, setModality, getContext, resetContext)."
    )]
    async fn invoke_tool(
        &self,
        Parameters(req): Parameters<InvokeToolRequest>,
    ) -> Result<String, String> {
        let mut request = ToolRequest::new(&req.tool_name, &req.action);
        for (name, value) in req.parameters.unwrap_or_default() {
            // The explicit action argument wins over one smuggled into parameters
            if name != multimodal_coordination::tools::ACTION_PARAM {
                request.parameters.insert(name, value);
            }
        }
        request.context = req.context.unwrap_or_default();

        let response = self.registry.invoke(&request).await;
        serde_json::to_string_pretty(&response).map_err(|e| e.to_string())
    }

    #[tool(description = "List the available tools and their actions.")]
    async fn list_tools(
        &self,
        Parameters(_req): Parameters<ListToolsRequest>,
    ) -> Result<String, String> {
        serde_json::to_string_pretty(&self.registry.descriptors()).map_err(|e| e.to_string())
    }
}

#[tool_handler]
impl ServerHandler for MultimodalServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = "MCP server coordinating vision and voice models.\n\
                 - invoke_tool: run a vision, voice or multimodal action; the result is always an envelope with `success`\n\
                 - list_tools: discover tools and actions\n\
                 `multimodal.processInput` accepts image and/or audio and falls back across modalities; \
                 when nothing succeeds the text is \"No input processed successfully\" and outcome.status is \"all_failed\".";

        ServerInfo {
            instructions: Some(instructions.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("multimodal_coordination=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(strategy) = args.strategy {
        config.coordination.fallback_strategy = strategy;
    }
    if let Some(ms) = args.call_timeout_ms {
        config.coordination.call_timeout_ms = ms;
    }
    if let Some(url) = args.gateway_url {
        config.gateway.base_url = url;
    }

    let gateway = HttpInferenceGateway::new(&config.gateway)
        .map_err(|e| anyhow::anyhow!("Failed to create gateway client: {}", e))?;
    tracing::info!(
        "Starting Multimodal Coordination MCP Server: strategy={}, gateway={}, vision_model={}, voice_model={}",
        config.coordination.fallback_strategy,
        gateway.endpoint(),
        config.gateway.vision_model,
        config.gateway.voice_model
    );

    let engine = Engine::build(&config, Arc::new(gateway), Arc::new(TracingReportSink))
        .map_err(|e| anyhow::anyhow!("Failed to build engine: {}", e))?;

    // Errors and fallbacks are always logged; --log-events widens this to every event
    let filter = if args.log_events {
        EventFilter::new()
    } else {
        EventFilter::new().types(vec![
            VISION_PROCESSING_ERROR,
            VOICE_PROCESSING_ERROR,
            PROCESSING_FALLBACK,
        ])
    };
    let mut receiver = engine.bus.subscribe_filtered(filter);
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    tracing::info!(
                        event_type = event.event_type(),
                        invocation_id = ?event.invocation_id(),
                        "event"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let publisher = engine.publisher.clone();
    let server = MultimodalServer::new(engine.registry);

    let transport = (stdin(), stdout());
    let service = server.serve(transport).await?;

    service.waiting().await?;

    publisher.flush().await;
    if publisher.dropped_count() > 0 {
        tracing::warn!(dropped = publisher.dropped_count(), "Events dropped under load");
    }

    Ok(())
}
