//! The protocol message hierarchy.
//!
//! The reply-derivation methods on the typed messages *are* the conversation
//! grammar: each concrete type can only construct the message types the
//! protocol allows as its replies, one depth level further down. Dispatch on
//! an incoming wire message goes through [`AnyMessage`], a closed enum, so a
//! state machine that forgets a variant fails to compile rather than at
//! runtime.

mod typed;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::envelope::{Envelope, METADATA_TYPE};
use crate::error::MessageError;

pub use typed::{
    AcceptMessage, CollisionMessage, ComparisonMessage, DisapproveMessage,
    InvalidAlternativeMessage, MoreDetailsMessage, OverrideRecommendationMessage,
    PreferAlternativeMessage, QueryMessage, RecommendationMessage, UnclearExplanationMessage,
    WhyMessage, WhyNotMessage,
};

/// The closed set of concrete protocol message types.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Query,
    Recommendation,
    Why,
    WhyNot,
    Accept,
    Collision,
    Disapprove,
    MoreDetails,
    UnclearExplanation,
    Comparison,
    InvalidAlternative,
    OverrideRecommendation,
    PreferAlternative,
}

impl MessageKind {
    pub const ALL: [MessageKind; 13] = [
        MessageKind::Query,
        MessageKind::Recommendation,
        MessageKind::Why,
        MessageKind::WhyNot,
        MessageKind::Accept,
        MessageKind::Collision,
        MessageKind::Disapprove,
        MessageKind::MoreDetails,
        MessageKind::UnclearExplanation,
        MessageKind::Comparison,
        MessageKind::InvalidAlternative,
        MessageKind::OverrideRecommendation,
        MessageKind::PreferAlternative,
    ];

    /// The wire tag stored in the metadata side channel.
    pub fn tag(&self) -> &'static str {
        match self {
            MessageKind::Query => "Query",
            MessageKind::Recommendation => "Recommendation",
            MessageKind::Why => "Why",
            MessageKind::WhyNot => "WhyNot",
            MessageKind::Accept => "Accept",
            MessageKind::Collision => "Collision",
            MessageKind::Disapprove => "Disapprove",
            MessageKind::MoreDetails => "MoreDetails",
            MessageKind::UnclearExplanation => "UnclearExplanation",
            MessageKind::Comparison => "Comparison",
            MessageKind::InvalidAlternative => "InvalidAlternative",
            MessageKind::OverrideRecommendation => "OverrideRecommendation",
            MessageKind::PreferAlternative => "PreferAlternative",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, MessageError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| MessageError::UnknownKind(tag.to_owned()))
    }

    /// Whether receiving a message of this kind ends the conversation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageKind::Accept
                | MessageKind::OverrideRecommendation
                | MessageKind::PreferAlternative
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

macro_rules! any_delegate {
    ($any:expr, $msg:ident => $body:expr) => {
        match $any {
            AnyMessage::Query($msg) => $body,
            AnyMessage::Recommendation($msg) => $body,
            AnyMessage::Why($msg) => $body,
            AnyMessage::WhyNot($msg) => $body,
            AnyMessage::Accept($msg) => $body,
            AnyMessage::Collision($msg) => $body,
            AnyMessage::Disapprove($msg) => $body,
            AnyMessage::MoreDetails($msg) => $body,
            AnyMessage::UnclearExplanation($msg) => $body,
            AnyMessage::Comparison($msg) => $body,
            AnyMessage::InvalidAlternative($msg) => $body,
            AnyMessage::OverrideRecommendation($msg) => $body,
            AnyMessage::PreferAlternative($msg) => $body,
        }
    };
}

/// A protocol message of any concrete type, as read off the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnyMessage {
    Query(QueryMessage),
    Recommendation(RecommendationMessage),
    Why(WhyMessage),
    WhyNot(WhyNotMessage),
    Accept(AcceptMessage),
    Collision(CollisionMessage),
    Disapprove(DisapproveMessage),
    MoreDetails(MoreDetailsMessage),
    UnclearExplanation(UnclearExplanationMessage),
    Comparison(ComparisonMessage),
    InvalidAlternative(InvalidAlternativeMessage),
    OverrideRecommendation(OverrideRecommendationMessage),
    PreferAlternative(PreferAlternativeMessage),
}

impl AnyMessage {
    /// Wrap an inbound transport message, dispatching on the type tag in
    /// its metadata side channel.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, MessageError> {
        let tag = envelope
            .type_tag()
            .ok_or(MessageError::MissingMetadata(METADATA_TYPE))?;
        Ok(match MessageKind::from_tag(tag)? {
            MessageKind::Query => Self::Query(QueryMessage::from_envelope(envelope)?),
            MessageKind::Recommendation => {
                Self::Recommendation(RecommendationMessage::from_envelope(envelope)?)
            }
            MessageKind::Why => Self::Why(WhyMessage::from_envelope(envelope)?),
            MessageKind::WhyNot => Self::WhyNot(WhyNotMessage::from_envelope(envelope)?),
            MessageKind::Accept => Self::Accept(AcceptMessage::from_envelope(envelope)?),
            MessageKind::Collision => Self::Collision(CollisionMessage::from_envelope(envelope)?),
            MessageKind::Disapprove => {
                Self::Disapprove(DisapproveMessage::from_envelope(envelope)?)
            }
            MessageKind::MoreDetails => {
                Self::MoreDetails(MoreDetailsMessage::from_envelope(envelope)?)
            }
            MessageKind::UnclearExplanation => {
                Self::UnclearExplanation(UnclearExplanationMessage::from_envelope(envelope)?)
            }
            MessageKind::Comparison => {
                Self::Comparison(ComparisonMessage::from_envelope(envelope)?)
            }
            MessageKind::InvalidAlternative => {
                Self::InvalidAlternative(InvalidAlternativeMessage::from_envelope(envelope)?)
            }
            MessageKind::OverrideRecommendation => {
                Self::OverrideRecommendation(OverrideRecommendationMessage::from_envelope(envelope)?)
            }
            MessageKind::PreferAlternative => {
                Self::PreferAlternative(PreferAlternativeMessage::from_envelope(envelope)?)
            }
        })
    }

    pub fn kind(&self) -> MessageKind {
        any_delegate!(self, m => m.kind())
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    pub fn depth(&self) -> u32 {
        any_delegate!(self, m => m.depth())
    }

    pub fn envelope(&self) -> &Envelope {
        any_delegate!(self, m => m.envelope())
    }

    pub fn into_envelope(self) -> Envelope {
        any_delegate!(self, m => m.into_envelope())
    }
}

/// Allowed replies to a [`RecommendationMessage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecommendationResponse {
    Why(WhyMessage),
    WhyNot(WhyNotMessage),
    Accept(AcceptMessage),
    Collision(CollisionMessage),
    Disapprove(DisapproveMessage),
}

impl RecommendationResponse {
    pub fn into_any(self) -> AnyMessage {
        match self {
            Self::Why(m) => AnyMessage::Why(m),
            Self::WhyNot(m) => AnyMessage::WhyNot(m),
            Self::Accept(m) => AnyMessage::Accept(m),
            Self::Collision(m) => AnyMessage::Collision(m),
            Self::Disapprove(m) => AnyMessage::Disapprove(m),
        }
    }
}

/// Allowed replies to a [`MoreDetailsMessage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetailsResponse {
    UnclearExplanation(UnclearExplanationMessage),
    Accept(AcceptMessage),
    Collision(CollisionMessage),
    Disapprove(DisapproveMessage),
}

impl DetailsResponse {
    pub fn into_any(self) -> AnyMessage {
        match self {
            Self::UnclearExplanation(m) => AnyMessage::UnclearExplanation(m),
            Self::Accept(m) => AnyMessage::Accept(m),
            Self::Collision(m) => AnyMessage::Collision(m),
            Self::Disapprove(m) => AnyMessage::Disapprove(m),
        }
    }
}

/// Allowed replies to a [`ComparisonMessage`]; both end the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComparisonResponse {
    Accept(AcceptMessage),
    PreferAlternative(PreferAlternativeMessage),
}

impl ComparisonResponse {
    pub fn into_any(self) -> AnyMessage {
        match self {
            Self::Accept(m) => AnyMessage::Accept(m),
            Self::PreferAlternative(m) => AnyMessage::PreferAlternative(m),
        }
    }
}

/// Allowed replies to an [`InvalidAlternativeMessage`]; both end the
/// conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidAlternativeResponse {
    Accept(AcceptMessage),
    OverrideRecommendation(OverrideRecommendationMessage),
}

impl InvalidAlternativeResponse {
    pub fn into_any(self) -> AnyMessage {
        match self {
            Self::Accept(m) => AnyMessage::Accept(m),
            Self::OverrideRecommendation(m) => AnyMessage::OverrideRecommendation(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_set_is_exact() {
        for kind in MessageKind::ALL {
            let expected = matches!(
                kind,
                MessageKind::Accept
                    | MessageKind::OverrideRecommendation
                    | MessageKind::PreferAlternative
            );
            assert_eq!(kind.is_terminal(), expected, "kind {kind}");
        }
    }

    #[test]
    fn tags_round_trip() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_tag(kind.tag()).unwrap(), kind);
        }
        assert!(matches!(
            MessageKind::from_tag("Greeting"),
            Err(MessageError::UnknownKind(_))
        ));
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&MessageKind::WhyNot).unwrap(),
            "\"why_not\""
        );
        assert_eq!(
            serde_json::from_str::<MessageKind>("\"unclear_explanation\"").unwrap(),
            MessageKind::UnclearExplanation
        );
    }

    #[test]
    fn untagged_envelope_cannot_be_wrapped() {
        let env = Envelope::new("a@h", "b@h", "t");
        assert!(matches!(
            AnyMessage::from_envelope(env),
            Err(MessageError::MissingMetadata(METADATA_TYPE))
        ));
    }
}
