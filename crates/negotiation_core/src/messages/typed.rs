//! Typed views over [`Envelope`], one per concrete message type.
//!
//! Every struct here is a thin wrapper around exactly one envelope; the
//! type tag and depth live in the envelope's metadata side channel and are
//! fixed at creation. Reply-derivation methods rebuild the child body from
//! an empty shell so no stale field from an earlier exchange leaks forward.

use crate::data::{Explanation, Feature, Motivation, Query, Recommendation};
use crate::envelope::{Envelope, METADATA_TYPE};
use crate::error::MessageError;
use crate::messages::MessageKind;

fn reply_envelope(parent: &Envelope, kind: MessageKind, depth: u32) -> Envelope {
    let mut env = parent.reply_shell();
    env.set_metadata(METADATA_TYPE, kind.tag());
    env.set_depth(depth);
    env
}

macro_rules! protocol_message {
    (
        $(#[$doc:meta])*
        $name:ident => $kind:ident {
            $( required $field:ident: $fty:ty => $setter:ident; )*
            $( optional $ofield:ident: $ofty:ty => $osetter:ident; )*
        }
    ) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name {
            env: Envelope,
            depth: u32,
        }

        impl $name {
            pub const KIND: MessageKind = MessageKind::$kind;

            fn from_parts(env: Envelope, depth: u32) -> Self {
                Self { env, depth }
            }

            /// Wrap an envelope whose side channel tags it as this type.
            pub fn from_envelope(env: Envelope) -> Result<Self, MessageError> {
                let tag = env
                    .type_tag()
                    .ok_or(MessageError::MissingMetadata(METADATA_TYPE))?;
                let found = MessageKind::from_tag(tag)?;
                if found != Self::KIND {
                    return Err(MessageError::KindMismatch {
                        expected: Self::KIND,
                        found,
                    });
                }
                let depth = env.depth()?;
                Ok(Self { env, depth })
            }

            pub fn kind(&self) -> MessageKind {
                Self::KIND
            }

            pub fn is_terminal(&self) -> bool {
                Self::KIND.is_terminal()
            }

            pub fn depth(&self) -> u32 {
                self.depth
            }

            pub fn envelope(&self) -> &Envelope {
                &self.env
            }

            pub fn into_envelope(self) -> Envelope {
                self.env
            }

            $(
                pub fn $field(&self) -> Result<$fty, MessageError> {
                    self.env
                        .unpack_field(stringify!($field))?
                        .ok_or(MessageError::MissingField(stringify!($field)))
                }

                /// Reassign the field, repacking only its body segment.
                pub fn $setter(&mut self, value: &$fty) {
                    self.env.pack_field(stringify!($field), value);
                }
            )*

            $(
                pub fn $ofield(&self) -> Result<Option<$ofty>, MessageError> {
                    self.env.unpack_field(stringify!($ofield))
                }

                /// Reassign or clear the field, touching only its segment.
                pub fn $osetter(&mut self, value: Option<&$ofty>) {
                    match value {
                        Some(value) => self.env.pack_field(stringify!($ofield), value),
                        None => self.env.remove_field(stringify!($ofield)),
                    }
                }
            )*
        }
    };
}

protocol_message! {
    /// Opens a conversation; the root message at depth 0.
    QueryMessage => Query {
        required query: Query => set_query;
    }
}

protocol_message! {
    /// The recommender's proposal for a query.
    RecommendationMessage => Recommendation {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
    }
}

protocol_message! {
    /// Asks the recommender to explain its proposal.
    WhyMessage => Why {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
    }
}

protocol_message! {
    /// Challenges the proposal with an alternative the explainee prefers.
    WhyNotMessage => WhyNot {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        required alternative: Recommendation => set_alternative;
    }
}

protocol_message! {
    /// Terminal: the explainee accepts the proposal.
    AcceptMessage => Accept {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        optional explanation: Explanation => set_explanation;
    }
}

protocol_message! {
    /// The proposal collides with a feature on the explainee's side; asks
    /// for a fresh proposal.
    CollisionMessage => Collision {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        required feature: Feature => set_feature;
        optional explanation: Explanation => set_explanation;
    }
}

protocol_message! {
    /// The explainee disapproves, stating a motivation; asks for a fresh
    /// proposal.
    DisapproveMessage => Disapprove {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        required motivation: Motivation => set_motivation;
        optional explanation: Explanation => set_explanation;
    }
}

protocol_message! {
    /// The recommender's explanation of its proposal.
    MoreDetailsMessage => MoreDetails {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        required explanation: Explanation => set_explanation;
    }
}

protocol_message! {
    /// The explainee did not understand the explanation and wants another.
    UnclearExplanationMessage => UnclearExplanation {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        required explanation: Explanation => set_explanation;
    }
}

protocol_message! {
    /// Contrastive explanation for a valid alternative.
    ComparisonMessage => Comparison {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        required alternative: Recommendation => set_alternative;
        required explanation: Explanation => set_explanation;
    }
}

protocol_message! {
    /// Explains why the proposed alternative is not viable.
    InvalidAlternativeMessage => InvalidAlternative {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        required alternative: Recommendation => set_alternative;
        required explanation: Explanation => set_explanation;
    }
}

protocol_message! {
    /// Terminal: the explainee insists on its alternative despite the
    /// recommender deeming it invalid.
    OverrideRecommendationMessage => OverrideRecommendation {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        required alternative: Recommendation => set_alternative;
    }
}

protocol_message! {
    /// Terminal: the explainee picks the alternative after seeing the
    /// comparison.
    PreferAlternativeMessage => PreferAlternative {
        required query: Query => set_query;
        required recommendation: Recommendation => set_recommendation;
        required alternative: Recommendation => set_alternative;
    }
}

impl QueryMessage {
    /// Create a root query message at depth 0.
    pub fn new(
        query: Query,
        sender: impl Into<String>,
        to: impl Into<String>,
        thread: impl Into<String>,
    ) -> Self {
        let mut env = Envelope::new(sender, to, thread);
        env.set_metadata(METADATA_TYPE, Self::KIND.tag());
        env.set_depth(0);
        env.pack_field("query", &query);
        Self::from_parts(env, 0)
    }

    /// Query -> Recommendation: copy the query, add the proposal.
    pub fn make_recommendation_reply(
        &self,
        recommendation: &Recommendation,
    ) -> Result<RecommendationMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Recommendation, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", recommendation);
        Ok(RecommendationMessage::from_parts(env, depth))
    }
}

impl RecommendationMessage {
    /// Recommendation -> Why: ask for an explanation.
    pub fn make_why_reply(&self) -> Result<WhyMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Why, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        Ok(WhyMessage::from_parts(env, depth))
    }

    /// Recommendation -> WhyNot: challenge with an alternative.
    pub fn make_why_not_reply(
        &self,
        alternative: &Recommendation,
    ) -> Result<WhyNotMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::WhyNot, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("alternative", alternative);
        Ok(WhyNotMessage::from_parts(env, depth))
    }

    /// Recommendation -> Accept (terminal).
    pub fn make_accept_reply(&self) -> Result<AcceptMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Accept, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        Ok(AcceptMessage::from_parts(env, depth))
    }

    /// Recommendation -> Collision: report a conflicting feature.
    pub fn make_collision_reply(
        &self,
        feature: &Feature,
    ) -> Result<CollisionMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Collision, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("feature", feature);
        Ok(CollisionMessage::from_parts(env, depth))
    }

    /// Recommendation -> Disapprove: reject with a motivation.
    pub fn make_disapprove_reply(
        &self,
        motivation: &Motivation,
    ) -> Result<DisapproveMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Disapprove, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("motivation", motivation);
        Ok(DisapproveMessage::from_parts(env, depth))
    }
}

impl WhyMessage {
    /// Why -> MoreDetails: attach the computed explanation.
    pub fn make_more_details_reply(
        &self,
        explanation: &Explanation,
    ) -> Result<MoreDetailsMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::MoreDetails, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("explanation", explanation);
        Ok(MoreDetailsMessage::from_parts(env, depth))
    }
}

impl WhyNotMessage {
    /// WhyNot -> Comparison: the alternative was valid; explain the
    /// difference.
    pub fn make_comparison_reply(
        &self,
        explanation: &Explanation,
    ) -> Result<ComparisonMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Comparison, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("alternative", &self.alternative()?);
        env.pack_field("explanation", explanation);
        Ok(ComparisonMessage::from_parts(env, depth))
    }

    /// WhyNot -> InvalidAlternative: the alternative was not viable;
    /// explain why.
    pub fn make_invalid_alternative_reply(
        &self,
        explanation: &Explanation,
    ) -> Result<InvalidAlternativeMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::InvalidAlternative, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("alternative", &self.alternative()?);
        env.pack_field("explanation", explanation);
        Ok(InvalidAlternativeMessage::from_parts(env, depth))
    }
}

impl MoreDetailsMessage {
    /// MoreDetails -> Accept (terminal), preserving the explanation.
    pub fn make_accept_reply(&self) -> Result<AcceptMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Accept, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("explanation", &self.explanation()?);
        Ok(AcceptMessage::from_parts(env, depth))
    }

    /// MoreDetails -> Collision, preserving the explanation.
    pub fn make_collision_reply(
        &self,
        feature: &Feature,
    ) -> Result<CollisionMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Collision, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("feature", feature);
        env.pack_field("explanation", &self.explanation()?);
        Ok(CollisionMessage::from_parts(env, depth))
    }

    /// MoreDetails -> Disapprove, preserving the explanation.
    pub fn make_disapprove_reply(
        &self,
        motivation: &Motivation,
    ) -> Result<DisapproveMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Disapprove, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("motivation", motivation);
        env.pack_field("explanation", &self.explanation()?);
        Ok(DisapproveMessage::from_parts(env, depth))
    }

    /// MoreDetails -> UnclearExplanation: the explanation did not land.
    pub fn make_unclear_reply(&self) -> Result<UnclearExplanationMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::UnclearExplanation, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("explanation", &self.explanation()?);
        Ok(UnclearExplanationMessage::from_parts(env, depth))
    }
}

impl UnclearExplanationMessage {
    /// UnclearExplanation -> MoreDetails: retry with a new explanation.
    pub fn make_more_details_reply(
        &self,
        explanation: &Explanation,
    ) -> Result<MoreDetailsMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::MoreDetails, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("explanation", explanation);
        Ok(MoreDetailsMessage::from_parts(env, depth))
    }
}

impl ComparisonMessage {
    /// Comparison -> Accept (terminal), keeping the contrastive
    /// explanation and dropping the alternative.
    pub fn make_accept_reply(&self) -> Result<AcceptMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Accept, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("explanation", &self.explanation()?);
        Ok(AcceptMessage::from_parts(env, depth))
    }

    /// Comparison -> PreferAlternative (terminal).
    pub fn make_prefer_alternative_reply(
        &self,
    ) -> Result<PreferAlternativeMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::PreferAlternative, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("alternative", &self.alternative()?);
        Ok(PreferAlternativeMessage::from_parts(env, depth))
    }
}

impl InvalidAlternativeMessage {
    /// InvalidAlternative -> Accept (terminal), keeping the explanation.
    pub fn make_accept_reply(&self) -> Result<AcceptMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Accept, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("explanation", &self.explanation()?);
        Ok(AcceptMessage::from_parts(env, depth))
    }

    /// InvalidAlternative -> OverrideRecommendation (terminal): the
    /// explainee insists on its alternative.
    pub fn make_override_recommendation_reply(
        &self,
    ) -> Result<OverrideRecommendationMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::OverrideRecommendation, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", &self.recommendation()?);
        env.pack_field("alternative", &self.alternative()?);
        Ok(OverrideRecommendationMessage::from_parts(env, depth))
    }
}

impl CollisionMessage {
    /// Collision -> Recommendation: restart with a fresh proposal for the
    /// same query.
    pub fn make_recommendation_reply(
        &self,
        recommendation: &Recommendation,
    ) -> Result<RecommendationMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Recommendation, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", recommendation);
        Ok(RecommendationMessage::from_parts(env, depth))
    }
}

impl DisapproveMessage {
    /// Disapprove -> Recommendation: restart with a fresh proposal for the
    /// same query.
    pub fn make_recommendation_reply(
        &self,
        recommendation: &Recommendation,
    ) -> Result<RecommendationMessage, MessageError> {
        let depth = self.depth + 1;
        let mut env = reply_envelope(&self.env, MessageKind::Recommendation, depth);
        env.pack_field("query", &self.query()?);
        env.pack_field("recommendation", recommendation);
        Ok(RecommendationMessage::from_parts(env, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_checks_the_type_tag() {
        let query = QueryMessage::new(Query::new("q"), "user@h", "agent@h", "t#1");
        let err = RecommendationMessage::from_envelope(query.into_envelope()).unwrap_err();
        assert_eq!(
            err,
            MessageError::KindMismatch {
                expected: MessageKind::Recommendation,
                found: MessageKind::Query,
            }
        );
    }

    #[test]
    fn wrapping_requires_a_depth() {
        let mut env = Envelope::new("a@h", "b@h", "t");
        env.set_metadata(METADATA_TYPE, MessageKind::Query.tag());
        env.pack_field("query", &Query::new("q"));
        assert_eq!(
            QueryMessage::from_envelope(env).unwrap_err(),
            MessageError::InvalidDepth
        );
    }

    #[test]
    fn missing_required_field_is_reported_by_name() {
        let query = QueryMessage::new(Query::new("q"), "user@h", "agent@h", "t#1");
        let mut rec = query
            .make_recommendation_reply(&Recommendation::new("r"))
            .unwrap();
        // Simulate a peer that dropped the segment.
        let mut env = rec.envelope().clone();
        env.remove_field("recommendation");
        rec = RecommendationMessage::from_envelope(env).unwrap();
        assert_eq!(
            rec.recommendation().unwrap_err(),
            MessageError::MissingField("recommendation")
        );
        assert_eq!(rec.query().unwrap(), Query::new("q"));
    }

    #[test]
    fn restart_reply_drops_stale_fields() {
        let query = QueryMessage::new(Query::new("q"), "user@h", "agent@h", "t#1");
        let rec = query
            .make_recommendation_reply(&Recommendation::new("r1"))
            .unwrap();
        let collision = rec.make_collision_reply(&Feature::new("no-dairy")).unwrap();
        let second = collision
            .make_recommendation_reply(&Recommendation::new("r2"))
            .unwrap();

        assert_eq!(second.recommendation().unwrap(), Recommendation::new("r2"));
        assert_eq!(second.query().unwrap(), Query::new("q"));
        assert!(!second.envelope().body().contains("feature"));
        assert_eq!(second.depth(), collision.depth() + 1);
    }

    #[test]
    fn replies_alternate_addressing() {
        let query = QueryMessage::new(Query::new("q"), "user@h", "agent@h", "t#1");
        let rec = query
            .make_recommendation_reply(&Recommendation::new("r"))
            .unwrap();
        assert_eq!(rec.envelope().sender, "agent@h");
        assert_eq!(rec.envelope().to, "user@h");
        let why = rec.make_why_reply().unwrap();
        assert_eq!(why.envelope().sender, "user@h");
        assert_eq!(why.envelope().to, "agent@h");
        assert_eq!(why.envelope().thread, "t#1");
    }

    #[test]
    fn optional_explanation_reads_as_absent_when_not_packed() {
        let query = QueryMessage::new(Query::new("q"), "user@h", "agent@h", "t#1");
        let rec = query
            .make_recommendation_reply(&Recommendation::new("r"))
            .unwrap();
        let accept = rec.make_accept_reply().unwrap();
        assert_eq!(accept.explanation().unwrap(), None);

        let details = rec
            .make_why_reply()
            .unwrap()
            .make_more_details_reply(&Explanation::new("because"))
            .unwrap();
        let accept = details.make_accept_reply().unwrap();
        assert_eq!(
            accept.explanation().unwrap(),
            Some(Explanation::new("because"))
        );
    }
}
