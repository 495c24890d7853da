//! Coordination controller - fallback and aggregation across modalities
//!
//! The controller decides which modalities to attempt for an input, runs
//! each call under a deadline and a cancellation token, and folds the
//! attempts into one [`UnifiedResult`].
//!
//! # Strategies
//!
//! ```text
//! sequential:  vision ──fail──▶ voice ──fail──▶ sentinel
//!                 │ok              │ok
//!                 ▼                ▼
//!               text             text
//!
//! parallel:    vision ┐
//!                     ├─ join_all ─▶ "[VISION] v\n[AUDIO] a"  (priority order)
//!              voice  ┘
//!
//! none:        first eligible modality only, whatever its outcome
//! ```
//!
//! Events flow through an [`EventSink`]; in production that is an
//! [`EventPublisher`](crate::events::EventPublisher) so delivery never
//! blocks processing.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::config::{ConfigError, CoordinationConfig, FallbackStrategy};
use crate::context::ProcessingContext;
use crate::events::{EventSink, InvocationId, MultimodalEvent};
use crate::health::{HealthBoard, ModalityHealth};
use crate::modality::{
    Modality, ModalityFailure, ModalityResult, ModalitySelection, MultimodalInput,
    ProcessingOutcome, UnifiedResult, NO_INPUT_PROCESSED,
};
use crate::processor::ProcessorSet;
use crate::reporting::{InvocationReport, ReportSink, OP_PROCESS_INPUT};
use crate::telemetry;

/// Error type for controller operations
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("Input must contain an image or audio payload")]
    EmptyInput,

    #[error("Processing was cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for controller operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Shared reference to CoordinationController
pub type SharedController = Arc<CoordinationController>;

/// Strategy state machine over the configured processors
pub struct CoordinationController {
    config: CoordinationConfig,
    processors: ProcessorSet,
    context: RwLock<ProcessingContext>,
    health: RwLock<HealthBoard>,
    events: Arc<dyn EventSink>,
    reports: Arc<dyn ReportSink>,
}

impl CoordinationController {
    /// Create a controller. Fails if the configuration is invalid.
    pub fn new(
        config: CoordinationConfig,
        processors: ProcessorSet,
        events: Arc<dyn EventSink>,
        reports: Arc<dyn ReportSink>,
    ) -> CoordinationResult<Self> {
        config.validate()?;
        for modality in &config.modality_priority {
            if !processors.contains(*modality) {
                warn!(%modality, "No processor registered; attempts will fail");
            }
        }

        Ok(Self {
            context: RwLock::new(ProcessingContext::with_history_limit(config.history_limit)),
            config,
            processors,
            health: RwLock::new(HealthBoard::new()),
            events,
            reports,
        })
    }

    pub fn shared(self) -> SharedController {
        Arc::new(self)
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Process an input under the configured strategy
    pub async fn process_input(&self, input: &MultimodalInput) -> CoordinationResult<UnifiedResult> {
        self.process_input_with_cancel(input, &CancellationToken::new())
            .await
    }

    /// Process an input, abandoning in-flight calls if `cancel` fires
    pub async fn process_input_with_cancel(
        &self,
        input: &MultimodalInput,
        cancel: &CancellationToken,
    ) -> CoordinationResult<UnifiedResult> {
        if input.is_empty() {
            return Err(CoordinationError::EmptyInput);
        }

        let strategy = self.config.fallback_strategy;
        let invocation_id = MultimodalEvent::new_invocation_id();
        let eligible = self.eligible(input);
        let span = telemetry::process_input_span(&invocation_id, strategy);
        let started = Instant::now();

        self.events.publish(MultimodalEvent::ProcessingStarted {
            invocation_id: invocation_id.clone(),
            strategy,
            eligible: eligible.clone(),
            timestamp: chrono::Utc::now(),
        });

        let outcome = async {
            info!(invocation_id = %invocation_id, %strategy, ?eligible, "Processing input");
            match strategy {
                FallbackStrategy::Sequential => {
                    self.run_sequential(&invocation_id, input, &eligible, cancel, false)
                        .await
                }
                FallbackStrategy::None => {
                    self.run_sequential(&invocation_id, input, &eligible, cancel, true)
                        .await
                }
                FallbackStrategy::Parallel => {
                    self.run_parallel(&invocation_id, input, &eligible, cancel)
                        .await
                }
            }
        }
        .instrument(span.clone())
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;

        let attempts = match outcome {
            Ok(attempts) => attempts,
            Err(err) => {
                warn!(invocation_id = %invocation_id, duration_ms, "Invocation cancelled");
                telemetry::record_result(&span, false, duration_ms);
                self.reports.record(InvocationReport::failure(
                    OP_PROCESS_INPUT,
                    &invocation_id,
                    duration_ms,
                    &err.to_string(),
                ));
                return Err(err);
            }
        };

        let result = aggregate(strategy, input, &attempts);
        let produced = match &result.outcome {
            ProcessingOutcome::Processed { modalities } => modalities.clone(),
            ProcessingOutcome::AllFailed { .. } => Vec::new(),
        };

        if !result.is_processed() {
            let reason = if attempts.is_empty() {
                "no eligible modality".to_string()
            } else {
                "all modalities failed".to_string()
            };
            warn!(invocation_id = %invocation_id, %reason, "Returning fallback result");
            self.events.publish(MultimodalEvent::ProcessingFallback {
                invocation_id: invocation_id.clone(),
                attempted: attempts.iter().map(|a| a.modality).collect(),
                reason,
                timestamp: chrono::Utc::now(),
            });
        }

        self.events.publish(MultimodalEvent::ProcessingCompleted {
            invocation_id: invocation_id.clone(),
            success: result.is_processed(),
            modalities: produced,
            duration_ms,
            timestamp: chrono::Utc::now(),
        });

        telemetry::record_result(&span, result.is_processed(), duration_ms);
        self.reports.record(if result.is_processed() {
            InvocationReport::success(OP_PROCESS_INPUT, &invocation_id, duration_ms)
        } else {
            InvocationReport::failure(
                OP_PROCESS_INPUT,
                &invocation_id,
                duration_ms,
                NO_INPUT_PROCESSED,
            )
        });

        info!(
            invocation_id = %invocation_id,
            success = result.is_processed(),
            attempts = attempts.len(),
            duration_ms,
            "Input processed"
        );
        Ok(result)
    }

    /// Modalities to attempt, in priority order
    fn eligible(&self, input: &MultimodalInput) -> Vec<Modality> {
        self.config
            .modality_priority
            .iter()
            .copied()
            .filter(|m| self.config.is_enabled(*m) && input.payload(*m).is_some())
            .collect()
    }

    /// Try candidates in order, stopping at the first success, or after the
    /// first attempt when `first_only` is set
    async fn run_sequential(
        &self,
        invocation_id: &InvocationId,
        input: &MultimodalInput,
        eligible: &[Modality],
        cancel: &CancellationToken,
        first_only: bool,
    ) -> CoordinationResult<Vec<ModalityResult>> {
        let mut attempts = Vec::new();

        for &modality in eligible {
            if cancel.is_cancelled() {
                return Err(CoordinationError::Cancelled);
            }
            let payload = input.payload(modality).unwrap_or_default();
            let context = self.context_snapshot().await;

            let result = self.attempt(modality, payload, &context, cancel).await?;
            self.record_attempt(invocation_id, &result).await;

            let done = result.success || first_only;
            attempts.push(result);
            if done {
                break;
            }
        }

        Ok(attempts)
    }

    /// Fan out to every candidate and wait for all of them
    async fn run_parallel(
        &self,
        invocation_id: &InvocationId,
        input: &MultimodalInput,
        eligible: &[Modality],
        cancel: &CancellationToken,
    ) -> CoordinationResult<Vec<ModalityResult>> {
        let context = self.context_snapshot().await;
        let calls = eligible.iter().map(|&modality| {
            let payload = input.payload(modality).unwrap_or_default();
            self.attempt(modality, payload, &context, cancel)
        });

        // join_all keeps input order, so results line up with priority
        let resolved = join_all(calls).await;

        let mut attempts = Vec::with_capacity(resolved.len());
        let mut cancelled = false;
        for outcome in resolved {
            match outcome {
                Ok(result) => {
                    self.record_attempt(invocation_id, &result).await;
                    attempts.push(result);
                }
                Err(_) => cancelled = true,
            }
        }

        if cancelled {
            Err(CoordinationError::Cancelled)
        } else {
            Ok(attempts)
        }
    }

    /// One modality call under the deadline. Only cancellation is an `Err`;
    /// every other failure becomes a failed [`ModalityResult`].
    async fn attempt(
        &self,
        modality: Modality,
        payload: &[u8],
        context: &ProcessingContext,
        cancel: &CancellationToken,
    ) -> CoordinationResult<ModalityResult> {
        let Some(processor) = self.processors.get(modality) else {
            return Ok(ModalityResult::failure(
                modality,
                format!("No processor registered for {}", modality),
                0,
            ));
        };

        let span = telemetry::modality_span(modality);
        let started = Instant::now();
        let call = tokio::time::timeout(self.config.call_timeout(), processor.process(payload, context))
            .instrument(span.clone());

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoordinationError::Cancelled),
            outcome = call => outcome,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(Ok(text)) => ModalityResult::success(modality, text, duration_ms),
            Ok(Err(err)) => ModalityResult::failure(modality, err.message, duration_ms),
            Err(_) => ModalityResult::failure(
                modality,
                format!(
                    "{} call timed out after {}ms",
                    modality, self.config.call_timeout_ms
                ),
                duration_ms,
            ),
        };

        telemetry::record_result(&span, result.success, duration_ms);
        debug!(%modality, success = result.success, duration_ms, "Modality call resolved");
        Ok(result)
    }

    /// History, health and error event for one resolved attempt
    async fn record_attempt(&self, invocation_id: &str, result: &ModalityResult) {
        if let Some(error) = &result.error {
            warn!(
                invocation_id = %invocation_id,
                modality = %result.modality,
                error = %error,
                "Modality call failed"
            );
            self.events.publish(MultimodalEvent::modality_error(
                result.modality,
                invocation_id,
                error.as_str(),
            ));
        }
        self.record_result(result.clone()).await;
    }

    /// Append a result produced outside `process_input` (for example by a
    /// single-modality tool action) to history and health
    pub async fn record_result(&self, result: ModalityResult) {
        {
            let mut health = self.health.write().await;
            health.record(&result);
        }
        self.context.write().await.record(result);
    }

    /// Update the caller's modality selection and emit the switch event.
    /// Returns the previous selection.
    pub async fn set_current_modality(&self, selection: ModalitySelection) -> ModalitySelection {
        let from = self.context.write().await.switch_modality(selection);
        info!(%from, to = %selection, "Modality switched");
        self.events.publish(MultimodalEvent::ModalitySwitched {
            from,
            to: selection,
            timestamp: chrono::Utc::now(),
        });
        from
    }

    /// Copy of the current context
    pub async fn context_snapshot(&self) -> ProcessingContext {
        self.context.read().await.clone()
    }

    /// Clear history and return the selection to auto
    pub async fn reset_context(&self) {
        self.context.write().await.reset();
        info!("Processing context reset");
    }

    pub async fn health(&self) -> Vec<ModalityHealth> {
        self.health.read().await.snapshot()
    }
}

/// Fold attempts into the output envelope
fn aggregate(
    strategy: FallbackStrategy,
    input: &MultimodalInput,
    attempts: &[ModalityResult],
) -> UnifiedResult {
    let successes: Vec<&ModalityResult> = attempts.iter().filter(|a| a.success).collect();

    if successes.is_empty() {
        let errors = attempts
            .iter()
            .map(|a| ModalityFailure {
                modality: a.modality,
                message: a.error.clone().unwrap_or_default(),
            })
            .collect();
        return UnifiedResult::all_failed(input, errors);
    }

    let modalities = successes.iter().map(|a| a.modality).collect();
    let text = match strategy {
        FallbackStrategy::Parallel => successes
            .iter()
            .map(|a| format!("{} {}", a.modality.segment_tag(), a.text))
            .collect::<Vec<_>>()
            .join("\n"),
        FallbackStrategy::Sequential | FallbackStrategy::None => successes[0].text.clone(),
    };

    UnifiedResult::processed(text, input, modalities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProcessingContext;
    use crate::events::{
        EventLog, MODALITY_SWITCHED, PROCESSING_COMPLETED, PROCESSING_FALLBACK,
        PROCESSING_STARTED, VISION_PROCESSING_ERROR, VOICE_PROCESSING_ERROR,
    };
    use crate::processor::{ModalityProcessingError, ModalityProcessor, ProcessingResult};
    use crate::reporting::RecordingReportSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Processor with a fixed answer, optional delay and a call counter
    struct Stub {
        modality: Modality,
        answer: Result<String, String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Stub {
        fn ok(modality: Modality, text: &str) -> Arc<Self> {
            Arc::new(Self {
                modality,
                answer: Ok(text.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(modality: Modality, error: &str) -> Arc<Self> {
            Arc::new(Self {
                modality,
                answer: Err(error.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn delayed(modality: Modality, text: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                modality,
                answer: Ok(text.to_string()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModalityProcessor for Stub {
        fn modality(&self) -> Modality {
            self.modality
        }

        async fn process(&self, _: &[u8], _: &ProcessingContext) -> ProcessingResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.answer
                .clone()
                .map_err(|msg| ModalityProcessingError::new(self.modality, msg))
        }
    }

    struct Harness {
        controller: CoordinationController,
        events: Arc<EventLog>,
        reports: Arc<RecordingReportSink>,
    }

    fn harness(config: CoordinationConfig, vision: Arc<Stub>, voice: Arc<Stub>) -> Harness {
        let events = Arc::new(EventLog::new());
        let reports = Arc::new(RecordingReportSink::new());
        let processors = ProcessorSet::new().with(vision).with(voice);
        let controller =
            CoordinationController::new(config, processors, events.clone(), reports.clone())
                .unwrap();
        Harness {
            controller,
            events,
            reports,
        }
    }

    fn both() -> MultimodalInput {
        MultimodalInput::new().with_image(b"img".to_vec()).with_audio(b"aud".to_vec())
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let vision = Stub::ok(Modality::Vision, "v");
        let voice = Stub::ok(Modality::Voice, "a");
        let h = harness(CoordinationConfig::default(), vision.clone(), voice.clone());

        let err = h
            .controller
            .process_input(&MultimodalInput::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinationError::EmptyInput));
        assert_eq!(vision.calls() + voice.calls(), 0);
        assert!(h.events.is_empty());
        assert!(h.reports.is_empty());
    }

    #[tokio::test]
    async fn test_image_only_sequential_echoes_input() {
        let vision = Stub::ok(Modality::Vision, "UI with login form");
        let voice = Stub::ok(Modality::Voice, "unused");
        let h = harness(CoordinationConfig::default(), vision, voice.clone());

        let input = MultimodalInput::new().with_image(b"B".to_vec());
        let result = h.controller.process_input(&input).await.unwrap();

        assert_eq!(result.text, "UI with login form");
        assert_eq!(result.image.as_deref(), Some(&b"B"[..]));
        assert!(result.audio.is_none());
        assert_eq!(voice.calls(), 0);
    }

    #[tokio::test]
    async fn test_sequential_falls_back_to_voice() {
        let vision = Stub::failing(Modality::Vision, "model offline");
        let voice = Stub::ok(Modality::Voice, "open settings");
        let h = harness(CoordinationConfig::default(), vision.clone(), voice.clone());

        let result = h.controller.process_input(&both()).await.unwrap();

        assert_eq!(result.text, "open settings");
        assert_eq!(result.image.as_deref(), Some(&b"img"[..]));
        assert_eq!(result.audio.as_deref(), Some(&b"aud"[..]));
        assert_eq!(
            result.outcome,
            ProcessingOutcome::Processed {
                modalities: vec![Modality::Voice]
            }
        );
        assert_eq!(vision.calls(), 1);
        assert_eq!(voice.calls(), 1);
        assert_eq!(h.events.count(VISION_PROCESSING_ERROR), 1);
        assert_eq!(h.events.count(VOICE_PROCESSING_ERROR), 0);
        assert_eq!(h.events.count(PROCESSING_FALLBACK), 0);
        assert_eq!(h.events.count(PROCESSING_COMPLETED), 1);
    }

    #[tokio::test]
    async fn test_sequential_all_fail_returns_sentinel() {
        let vision = Stub::failing(Modality::Vision, "v down");
        let voice = Stub::failing(Modality::Voice, "a down");
        let h = harness(CoordinationConfig::default(), vision, voice);

        let result = h.controller.process_input(&both()).await.unwrap();

        assert_eq!(result.text, NO_INPUT_PROCESSED);
        assert!(!result.is_processed());
        match &result.outcome {
            ProcessingOutcome::AllFailed { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].message, "v down");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.events.count(VISION_PROCESSING_ERROR), 1);
        assert_eq!(h.events.count(VOICE_PROCESSING_ERROR), 1);
        assert_eq!(h.events.count(PROCESSING_FALLBACK), 1);

        let reports = h.reports.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].operation, OP_PROCESS_INPUT);
        assert!(!reports[0].success);
    }

    #[tokio::test]
    async fn test_event_order_for_fallback() {
        let h = harness(
            CoordinationConfig::default(),
            Stub::failing(Modality::Vision, "x"),
            Stub::failing(Modality::Voice, "y"),
        );
        h.controller.process_input(&both()).await.unwrap();

        let types: Vec<&str> = h.events.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                PROCESSING_STARTED,
                VISION_PROCESSING_ERROR,
                VOICE_PROCESSING_ERROR,
                PROCESSING_FALLBACK,
                PROCESSING_COMPLETED,
            ]
        );
        let ids: Vec<_> = h
            .events
            .events()
            .iter()
            .map(|e| e.invocation_id().map(str::to_string))
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_orders_by_priority_not_completion() {
        let vision = Stub::delayed(Modality::Vision, "a dashboard", Duration::from_millis(500));
        let voice = Stub::ok(Modality::Voice, "show revenue");
        let config = CoordinationConfig::default().with_strategy(FallbackStrategy::Parallel);
        let h = harness(config, vision, voice);

        let result = h.controller.process_input(&both()).await.unwrap();

        assert_eq!(result.text, "[VISION] a dashboard\n[AUDIO] show revenue");
        assert_eq!(
            result.outcome,
            ProcessingOutcome::Processed {
                modalities: vec![Modality::Vision, Modality::Voice]
            }
        );
    }

    #[tokio::test]
    async fn test_parallel_respects_custom_priority() {
        let config = CoordinationConfig::default()
            .with_strategy(FallbackStrategy::Parallel)
            .with_priority(vec![Modality::Voice, Modality::Vision]);
        let h = harness(
            config,
            Stub::ok(Modality::Vision, "v"),
            Stub::ok(Modality::Voice, "a"),
        );

        let result = h.controller.process_input(&both()).await.unwrap();
        assert_eq!(result.text, "[AUDIO] a\n[VISION] v");
    }

    #[tokio::test]
    async fn test_parallel_partial_failure() {
        let config = CoordinationConfig::default().with_strategy(FallbackStrategy::Parallel);
        let h = harness(
            config,
            Stub::failing(Modality::Vision, "blurry"),
            Stub::ok(Modality::Voice, "hello"),
        );

        let result = h.controller.process_input(&both()).await.unwrap();
        assert_eq!(result.text, "[AUDIO] hello");
        assert_eq!(h.events.count(VISION_PROCESSING_ERROR), 1);
        assert_eq!(h.events.count(PROCESSING_FALLBACK), 0);

        let history = h.controller.context_snapshot().await;
        assert_eq!(history.history().len(), 2);
        assert_eq!(history.history()[0].modality, Modality::Vision);
    }

    #[tokio::test]
    async fn test_strategy_none_stops_after_first() {
        let vision = Stub::ok(Modality::Vision, "v");
        let voice = Stub::ok(Modality::Voice, "a");
        let config = CoordinationConfig::default().with_strategy(FallbackStrategy::None);
        let h = harness(config, vision.clone(), voice.clone());

        let result = h.controller.process_input(&both()).await.unwrap();
        assert_eq!(result.text, "v");
        assert_eq!(voice.calls(), 0);
    }

    #[tokio::test]
    async fn test_strategy_none_does_not_fall_back() {
        let vision = Stub::failing(Modality::Vision, "down");
        let voice = Stub::ok(Modality::Voice, "a");
        let config = CoordinationConfig::default().with_strategy(FallbackStrategy::None);
        let h = harness(config, vision, voice.clone());

        let result = h.controller.process_input(&both()).await.unwrap();
        assert_eq!(result.text, NO_INPUT_PROCESSED);
        assert_eq!(voice.calls(), 0);
        assert_eq!(h.events.count(PROCESSING_FALLBACK), 1);
    }

    #[tokio::test]
    async fn test_disabled_modality_is_skipped() {
        let vision = Stub::ok(Modality::Vision, "v");
        let voice = Stub::ok(Modality::Voice, "a");
        let mut config = CoordinationConfig::default();
        config.vision_enabled = false;
        let h = harness(config, vision.clone(), voice);

        let result = h.controller.process_input(&both()).await.unwrap();
        assert_eq!(result.text, "a");
        assert_eq!(vision.calls(), 0);
    }

    #[tokio::test]
    async fn test_nothing_eligible_returns_sentinel() {
        let mut config = CoordinationConfig::default();
        config.audio_enabled = false;
        let h = harness(
            config,
            Stub::ok(Modality::Vision, "v"),
            Stub::ok(Modality::Voice, "a"),
        );

        let input = MultimodalInput::new().with_audio(b"aud".to_vec());
        let result = h.controller.process_input(&input).await.unwrap();
        assert_eq!(result.text, NO_INPUT_PROCESSED);

        match h.events.events().iter().find(|e| e.event_type() == PROCESSING_FALLBACK) {
            Some(MultimodalEvent::ProcessingFallback { attempted, reason, .. }) => {
                assert!(attempted.is_empty());
                assert_eq!(reason, "no eligible modality");
            }
            other => panic!("expected fallback event, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out_and_falls_back() {
        let vision = Stub::delayed(Modality::Vision, "late", Duration::from_secs(3600));
        let voice = Stub::ok(Modality::Voice, "on time");
        let config = CoordinationConfig::default().with_call_timeout(Duration::from_millis(250));
        let h = harness(config, vision, voice);

        let result = h.controller.process_input(&both()).await.unwrap();
        assert_eq!(result.text, "on time");

        let context = h.controller.context_snapshot().await;
        assert_eq!(
            context.history()[0].error.as_deref(),
            Some("vision call timed out after 250ms")
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let vision = Stub::ok(Modality::Vision, "v");
        let h = harness(
            CoordinationConfig::default(),
            vision.clone(),
            Stub::ok(Modality::Voice, "a"),
        );
        let token = CancellationToken::new();
        token.cancel();

        let err = h
            .controller
            .process_input_with_cancel(&both(), &token)
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinationError::Cancelled));
        assert_eq!(vision.calls(), 0);
        assert_eq!(h.events.count(PROCESSING_COMPLETED), 0);
        assert!(!h.reports.reports()[0].success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_resolved_attempts() {
        let vision = Stub::ok(Modality::Vision, "fast");
        let voice = Stub::delayed(Modality::Voice, "slow", Duration::from_secs(60));
        let config = CoordinationConfig::default().with_strategy(FallbackStrategy::Parallel);
        let h = harness(config, vision, voice);

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = h
            .controller
            .process_input_with_cancel(&both(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::Cancelled));

        let context = h.controller.context_snapshot().await;
        assert_eq!(context.history().len(), 1);
        assert_eq!(context.history()[0].text, "fast");
    }

    #[tokio::test]
    async fn test_history_appended_per_attempt() {
        let h = harness(
            CoordinationConfig::default(),
            Stub::failing(Modality::Vision, "down"),
            Stub::ok(Modality::Voice, "hi"),
        );
        h.controller.process_input(&both()).await.unwrap();
        h.controller
            .process_input(&MultimodalInput::new().with_audio(b"x".to_vec()))
            .await
            .unwrap();

        let context = h.controller.context_snapshot().await;
        let modalities: Vec<_> = context.history().iter().map(|r| r.modality).collect();
        assert_eq!(modalities, vec![Modality::Vision, Modality::Voice, Modality::Voice]);

        h.controller.reset_context().await;
        assert!(h.controller.context_snapshot().await.history().is_empty());
    }

    #[tokio::test]
    async fn test_set_current_modality_emits_switches_in_order() {
        let h = harness(
            CoordinationConfig::default(),
            Stub::ok(Modality::Vision, "v"),
            Stub::ok(Modality::Voice, "a"),
        );

        h.controller
            .set_current_modality(ModalitySelection::Vision)
            .await;
        let previous = h
            .controller
            .set_current_modality(ModalitySelection::Voice)
            .await;
        assert_eq!(previous, ModalitySelection::Vision);

        let switches: Vec<_> = h
            .events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                MultimodalEvent::ModalitySwitched { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            switches,
            vec![
                (ModalitySelection::Auto, ModalitySelection::Vision),
                (ModalitySelection::Vision, ModalitySelection::Voice),
            ]
        );
        assert_eq!(h.events.count(MODALITY_SWITCHED), 2);
    }

    #[tokio::test]
    async fn test_health_tracks_failures() {
        let h = harness(
            CoordinationConfig::default(),
            Stub::failing(Modality::Vision, "down"),
            Stub::ok(Modality::Voice, "a"),
        );
        for _ in 0..3 {
            h.controller.process_input(&both()).await.unwrap();
        }

        let health = h.controller.health().await;
        let vision = health.iter().find(|m| m.modality == Modality::Vision).unwrap();
        assert_eq!(vision.level, crate::health::DegradationLevel::Unavailable);
        let voice = health.iter().find(|m| m.modality == Modality::Voice).unwrap();
        assert_eq!(voice.failures, 0);
        assert_eq!(voice.attempts, 3);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CoordinationConfig::default()
            .with_priority(vec![Modality::Vision, Modality::Vision]);
        let result = CoordinationController::new(
            config,
            ProcessorSet::new(),
            Arc::new(EventLog::new()),
            Arc::new(RecordingReportSink::new()),
        );
        assert!(matches!(result, Err(CoordinationError::Config(_))));
    }
}
