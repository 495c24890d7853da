//! Event-driven lifecycle notifications
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): the six lifecycle events emitted by the
//!    controller and tool layer.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub plus the
//!    [`EventSink`] trait producers publish through.
//!
//! 3. **Publisher** (`publisher.rs`): bounded fire-and-forget queue that
//!    keeps delivery off the processing path.
//!
//! 4. **Event Log** (`log.rs`): in-memory ordered record with filter queries.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Controller  │────▶│  Publisher   │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │ (bounded q)  │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use multimodal_coordination::events::{EventBus, EventPublisher, EventSink};
//!
//! let bus = EventBus::new().shared();
//! let mut receiver = bus.subscribe();
//! let publisher = EventPublisher::spawn(bus.clone(), 256);
//!
//! publisher.publish(MultimodalEvent::modality_error(Modality::Voice, id, "timeout"));
//! let event = receiver.recv().await?;
//! ```

pub mod bus;
pub mod log;
pub mod publisher;
pub mod types;

pub use bus::{EventBus, EventBusExt, EventFilter, EventSink, FilteredReceiver, SharedEventBus};
pub use log::EventLog;
pub use publisher::EventPublisher;
pub use types::{
    InvocationId, MultimodalEvent, MODALITY_SWITCHED, PROCESSING_COMPLETED, PROCESSING_FALLBACK,
    PROCESSING_STARTED, VISION_PROCESSING_ERROR, VOICE_PROCESSING_ERROR,
};
