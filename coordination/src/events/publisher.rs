//! Queued event delivery
//!
//! [`EventPublisher`] puts a bounded queue between producers and the actual
//! sink. Publishing is a non-blocking `try_send`; a background task drains
//! the queue into the sink. When the queue is full the event is dropped and
//! counted, so a slow subscriber never adds latency to modality processing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::bus::EventSink;
use super::types::MultimodalEvent;

enum QueueItem {
    Event(MultimodalEvent),
    Flush(oneshot::Sender<()>),
}

/// Bounded, fire-and-forget front for an [`EventSink`]
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<QueueItem>,
    dropped: Arc<AtomicU64>,
}

impl EventPublisher {
    /// Start the delivery task. Must be called from within a Tokio runtime.
    pub fn spawn(sink: Arc<dyn EventSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<QueueItem>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    QueueItem::Event(event) => sink.publish(event),
                    QueueItem::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("Event delivery task stopped");
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait until every event queued before this call has reached the sink
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(QueueItem::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Number of events discarded because the queue was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for EventPublisher {
    fn publish(&self, event: MultimodalEvent) {
        let event_type = event.event_type();
        match self.tx.try_send(QueueItem::Event(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event_type, "Event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(event_type, "Event queue closed, dropping event");
            }
        }
    }
}
