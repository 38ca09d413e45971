//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the ingestion
//! coordinator and whatever forwards events outward.

use genpic_db::models::picture::PublicPicture;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// IngestEvent
// ---------------------------------------------------------------------------

/// Outcome of ingesting one discovered file.
///
/// Only the stripped [`PublicPicture`] shape is ever carried, so subscribers
/// can forward events across the API boundary unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    /// A picture row was inserted.
    PictureCreated { picture: PublicPicture },

    /// A file was skipped. `reason` is the failure kind, e.g. `"orphan_file"`.
    FileRejected {
        file_name: String,
        reason: String,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// ```rust
/// use genpic_events::bus::{EventBus, IngestEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(IngestEvent::FileRejected {
///     file_name: "a.png".into(),
///     reason: "orphan_file".into(),
///     detail: String::new(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
pub struct EventBus {
    sender: broadcast::Sender<IngestEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: IngestEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No ingest event subscribers");
        }
    }

    /// Create a new receiver for all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
