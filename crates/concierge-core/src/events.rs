//! Observability events for handled turns
//!
//! Sinks are fire-and-forget: `record` is synchronous, returns nothing and
//! must not block, so a slow or broken consumer can never hold up a turn.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ErrorCategory;
use crate::types::{Tag, Urgency};

/// One handled turn, as seen by logging and metrics consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnEvent {
    pub session_id: Option<String>,
    pub specialist: String,
    pub matched_tags: Vec<Tag>,
    pub handoff: bool,
    pub urgency: Urgency,
    /// Set when the reply is a fallback
    pub failure: Option<ErrorCategory>,
    /// Lengths in characters, not bytes
    pub input_chars: usize,
    pub output_chars: usize,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl std::fmt::Display for TurnEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.failure {
            Some(category) => write!(
                f,
                "turn via {} fell back ({}) after {}ms",
                self.specialist, category, self.elapsed_ms
            ),
            None => write!(
                f,
                "turn via {} completed in {}ms ({} -> {} chars)",
                self.specialist, self.elapsed_ms, self.input_chars, self.output_chars
            ),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: &TurnEvent);
}

/// Writes events to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &TurnEvent) {
        if event.failure.is_some() {
            warn!(
                specialist = %event.specialist,
                urgency = %event.urgency,
                elapsed_ms = event.elapsed_ms,
                "{}",
                event
            );
        } else {
            info!(
                specialist = %event.specialist,
                urgency = %event.urgency,
                elapsed_ms = event.elapsed_ms,
                "{}",
                event
            );
        }
    }
}

/// Forwards events to an mpsc channel; drops them when the channel is full or closed
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<TurnEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<TurnEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn record(&self, event: &TurnEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            debug!("Dropping turn event: {}", e);
        }
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &TurnEvent) {}
}
