//! negotiation_core - Core types and message grammar for the negotiation protocol
//!
//! This crate provides the building blocks of the explainee/recommender
//! negotiation protocol: the value objects carried in message bodies, the
//! transport-level message envelope with its delimited-tag packing scheme,
//! and the closed hierarchy of protocol message types whose reply-derivation
//! methods encode the conversation grammar.

pub mod data;
pub mod envelope;
pub mod error;
pub mod messages;

// Re-export commonly used types
pub use data::{Explanation, Feature, FieldValue, Motivation, Query, Recommendation};
pub use envelope::{Envelope, METADATA_DEPTH, METADATA_TYPE};
pub use error::{FieldParseError, MessageError};
pub use messages::{
    AcceptMessage, AnyMessage, CollisionMessage, ComparisonMessage, ComparisonResponse,
    DetailsResponse, DisapproveMessage, InvalidAlternativeMessage, InvalidAlternativeResponse,
    MessageKind, MoreDetailsMessage, OverrideRecommendationMessage, PreferAlternativeMessage,
    QueryMessage, RecommendationMessage, RecommendationResponse, UnclearExplanationMessage,
    WhyMessage, WhyNotMessage,
};
