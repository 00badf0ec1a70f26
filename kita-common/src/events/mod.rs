//! Event types for the Kita event system
//!
//! Provides shared event definitions and the EventBus used by Kita services.

mod process_types;

pub use process_types::ProcessStatus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Kita event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KitaEvent {
    /// Upload accepted and its process row persisted
    ///
    /// Triggers:
    /// - SSE: Show new pending recording
    ProcessCreated {
        /// Process identifier returned to the uploader
        process_id: i64,
        /// Initial status (always `starting`)
        status: ProcessStatus,
        /// When the process was created
        timestamp: DateTime<Utc>,
    },

    /// Process moved to a new status
    ///
    /// Triggers:
    /// - SSE: Update polling clients without a round trip
    ProcessStatusChanged {
        /// Process identifier
        process_id: i64,
        /// Status before the change
        old_status: ProcessStatus,
        /// Status after the change
        new_status: ProcessStatus,
        /// Documentation entries written so far
        records_written: usize,
        /// Entries the analysis produced, once known
        records_expected: Option<usize>,
        /// Failure reason for `failed`
        failure_reason: Option<String>,
        /// When the status changed
        timestamp: DateTime<Utc>,
    },

    /// One documentation entry persisted by the fan-out writer
    DocumentationEntryCreated {
        /// Process that produced the entry (None when the run was untracked)
        process_id: Option<i64>,
        /// Store-assigned entry identifier
        entry_id: i64,
        /// Child the observation is about
        child_id: i64,
        /// When the entry was written
        timestamp: DateTime<Utc>,
    },
}

impl KitaEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            KitaEvent::ProcessCreated { .. } => "ProcessCreated",
            KitaEvent::ProcessStatusChanged { .. } => "ProcessStatusChanged",
            KitaEvent::DocumentationEntryCreated { .. } => "DocumentationEntryCreated",
        }
    }

    /// Process the event belongs to, if any
    pub fn process_id(&self) -> Option<i64> {
        match self {
            KitaEvent::ProcessCreated { process_id, .. } => Some(*process_id),
            KitaEvent::ProcessStatusChanged { process_id, .. } => Some(*process_id),
            KitaEvent::DocumentationEntryCreated { process_id, .. } => *process_id,
        }
    }
}

/// Broadcast bus for KitaEvents
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KitaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    ///
    /// # Examples
    ///
    /// ```
    /// use kita_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<KitaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: KitaEvent,
    ) -> Result<usize, broadcast::error::SendError<KitaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress events are advisory; polling is the source of truth.
    pub fn emit_lossy(&self, event: KitaEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
