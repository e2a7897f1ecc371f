//! The recoverable failure classes caught at the state-action boundary.

use std::fmt;

use thiserror::Error;

use negotiation_core::{MessageError, MessageKind};

use crate::transport::TransportError;

/// Anything that can go wrong inside a single state action.
///
/// All variants are recoverable: the engine records the error, routes the
/// machine through its Error state and resumes at the role's recovery
/// state. Fatal conditions live in [`crate::machine::EngineError`].
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// No message arrived within the receive deadline.
    #[error("timed out waiting for a message")]
    Timeout,

    /// A message kind outside the current state's accepted set, or a
    /// missing prerequisite in the conversation history.
    #[error("{}", violation_display(.state, .kind))]
    Violation {
        state: String,
        kind: Option<MessageKind>,
    },

    /// A required field was missing or the envelope could not be wrapped.
    #[error(transparent)]
    Malformed(#[from] MessageError),

    /// An injected domain callback failed.
    #[error("domain callback failed: {0}")]
    Callback(#[from] anyhow::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    pub(crate) fn violation(state: impl fmt::Debug, kind: Option<MessageKind>) -> Self {
        Self::Violation {
            state: format!("{state:?}"),
            kind,
        }
    }
}

fn violation_display(state: &str, kind: &Option<MessageKind>) -> String {
    match kind {
        Some(kind) => format!("message kind {kind} is not accepted in state {state}"),
        None => format!("state {state} has no usable message in history"),
    }
}
