//! ABOUTME: Best-effort broadcast of workflow events to subscribers
//! ABOUTME: Slow subscribers lag and drop; emission never blocks node execution

use crate::event::{EventEnvelope, WorkflowEvent};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out publisher for [`WorkflowEvent`]s.
///
/// Built on a broadcast channel: publishing is non-blocking, and a
/// subscriber that falls more than the channel capacity behind loses the
/// oldest events rather than stalling the workflow.
#[derive(Debug, Clone)]
pub struct ProgressEmitter {
    tx: broadcast::Sender<EventEnvelope>,
}

impl ProgressEmitter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that were sent the event; zero
    /// subscribers is not an error.
    pub fn emit(&self, event: WorkflowEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        trace!(kind = envelope.event.kind(), sequence = envelope.sequence, "emitting event");
        self.tx.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Subscribe as an async stream (lagged windows surface as errors the
    /// stream consumer may ignore).
    pub fn stream(&self) -> BroadcastStream<EventEnvelope> {
        BroadcastStream::new(self.tx.subscribe())
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressEmitter {
    fn default() -> Self {
        Self::new()
    }
}
