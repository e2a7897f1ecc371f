//! Per-conversation mutable state.

use chrono::{DateTime, Utc};

use negotiation_core::AnyMessage;

use crate::error::ProtocolError;

/// The last failure caught at a state-action boundary, with the moment it
/// was recorded.
#[derive(Debug)]
pub struct RecordedError {
    pub error: ProtocolError,
    pub at: DateTime<Utc>,
}

/// Append-only exchange history plus the last-error slot.
///
/// One instance exists per running machine and is never shared across
/// conversations.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    history: Vec<AnyMessage>,
    last_error: Option<RecordedError>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an exchanged (validated) message.
    pub fn push(&mut self, message: AnyMessage) {
        self.history.push(message);
    }

    pub fn history(&self) -> &[AnyMessage] {
        &self.history
    }

    pub fn last(&self) -> Option<&AnyMessage> {
        self.history.last()
    }

    pub fn record_error(&mut self, error: ProtocolError) {
        self.last_error = Some(RecordedError {
            error,
            at: Utc::now(),
        });
    }

    pub fn last_error(&self) -> Option<&RecordedError> {
        self.last_error.as_ref()
    }

    /// Claim the recorded error, leaving the slot empty.
    pub fn take_last_error(&mut self) -> Option<RecordedError> {
        self.last_error.take()
    }
}
