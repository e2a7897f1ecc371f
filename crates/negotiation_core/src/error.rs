use thiserror::Error;

use crate::messages::MessageKind;

/// A value object could not be reconstructed from its serialized text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to parse {target}: {reason}")]
pub struct FieldParseError {
    pub target: &'static str,
    pub reason: String,
}

/// Errors raised while packing, unpacking or wrapping protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("required field `{0}` is missing from the message body")]
    MissingField(&'static str),

    #[error("field `{name}` could not be parsed: {source}")]
    UnparsableField {
        name: &'static str,
        #[source]
        source: FieldParseError,
    },

    #[error("message carries no `{0}` metadata entry")]
    MissingMetadata(&'static str),

    #[error("unknown message type tag: {0}")]
    UnknownKind(String),

    #[error("message tagged as {found:?} cannot be read as {expected:?}")]
    KindMismatch {
        expected: MessageKind,
        found: MessageKind,
    },

    #[error("message depth metadata is missing or not a non-negative integer")]
    InvalidDepth,
}
