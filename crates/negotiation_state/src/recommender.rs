//! The recommender role: a persistent service loop that answers queries,
//! defends its recommendations, and returns to idle once the explainee
//! settles.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use negotiation_core::{
    AnyMessage, Explanation, Feature, Motivation, Query, Recommendation,
};

use crate::error::ProtocolError;
use crate::machine::{ConversationMemory, Machine, StateActions, Step, TransitionGraph};
use crate::transport::Transport;

/// Injected domain behavior for the recommender side.
///
/// The `compute_*` and `is_valid` methods produce content; the `on_*`
/// notification hooks observe the explainee's verdicts and default to
/// doing nothing.
#[async_trait]
pub trait RecommenderHandler: Send {
    async fn on_error(&mut self, _error: &ProtocolError) -> anyhow::Result<()> {
        Ok(())
    }

    async fn compute_recommendation(&mut self, query: &Query) -> anyhow::Result<Recommendation>;

    async fn compute_explanation(
        &mut self,
        query: &Query,
        recommendation: &Recommendation,
    ) -> anyhow::Result<Explanation>;

    /// Explain `recommendation` against the explainee's `alternative`. The
    /// result backs the comparison reply when the alternative is valid and
    /// the invalid-alternative reply when it is not.
    async fn compute_contrastive_explanation(
        &mut self,
        query: &Query,
        recommendation: &Recommendation,
        alternative: &Recommendation,
    ) -> anyhow::Result<Explanation>;

    async fn is_valid(
        &mut self,
        query: &Query,
        recommendation: &Recommendation,
        alternative: &Recommendation,
    ) -> anyhow::Result<bool>;

    async fn on_collision(
        &mut self,
        _query: &Query,
        _recommendation: &Recommendation,
        _feature: &Feature,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_disagree(
        &mut self,
        _query: &Query,
        _recommendation: &Recommendation,
        _motivation: &Motivation,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_accept(
        &mut self,
        _query: &Query,
        _recommendation: &Recommendation,
        _explanation: Option<&Explanation>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_unclear(
        &mut self,
        _query: &Query,
        _recommendation: &Recommendation,
        _explanation: &Explanation,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_prefer_alternative(
        &mut self,
        _query: &Query,
        _recommendation: &Recommendation,
        _alternative: &Recommendation,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_override_alternative(
        &mut self,
        _query: &Query,
        _recommendation: &Recommendation,
        _alternative: &Recommendation,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommenderState {
    Idle,
    ComputingRecommendation,
    WaitingRecommendationFeedback,
    ComputingExplanation,
    WaitingExplanationFeedback,
    ComputingComparativeExplanation,
    WaitingComparisonFeedback,
    WaitingInvalidFeedback,
    Error,
}

/// The recommender service. Unlike the explainee it has no terminal state:
/// after each settled conversation it returns to `Idle` for the next
/// query on the same transport, and the run ends when the peer closes.
pub struct Recommender<T: Transport, H: RecommenderHandler> {
    transport: T,
    handler: H,
    receive_timeout: Option<Duration>,
}

impl<T: Transport, H: RecommenderHandler> Recommender<T, H> {
    pub fn new(transport: T, handler: H) -> Self {
        Self {
            transport,
            handler,
            receive_timeout: None,
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    pub fn into_machine(self) -> Machine<Self> {
        Machine::new(self)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    async fn receive_any(&mut self) -> Result<AnyMessage, ProtocolError> {
        let envelope = self
            .transport
            .receive(self.receive_timeout)
            .await?
            .ok_or(ProtocolError::Timeout)?;
        Ok(AnyMessage::from_envelope(envelope)?)
    }

    async fn dispatch(
        &mut self,
        memory: &mut ConversationMemory,
        message: AnyMessage,
    ) -> Result<(), ProtocolError> {
        log::debug!("sending {}", message.kind());
        self.transport.send(message.envelope().clone()).await?;
        memory.push(message);
        Ok(())
    }
}

#[async_trait]
impl<T: Transport, H: RecommenderHandler> StateActions for Recommender<T, H> {
    type State = RecommenderState;

    fn graph(&self) -> TransitionGraph<RecommenderState> {
        use RecommenderState::*;
        let mut graph = TransitionGraph::new(Idle, Error, Idle);
        graph.add_transitions(Idle, &[ComputingRecommendation], Error);
        graph.add_transitions(
            ComputingRecommendation,
            &[WaitingRecommendationFeedback],
            Error,
        );
        graph.add_transitions(
            WaitingRecommendationFeedback,
            &[
                Idle,
                ComputingRecommendation,
                ComputingExplanation,
                ComputingComparativeExplanation,
            ],
            Error,
        );
        graph.add_transitions(ComputingExplanation, &[WaitingExplanationFeedback], Error);
        graph.add_transitions(
            WaitingExplanationFeedback,
            &[Idle, ComputingRecommendation, ComputingExplanation],
            Error,
        );
        graph.add_transitions(
            ComputingComparativeExplanation,
            &[WaitingComparisonFeedback, WaitingInvalidFeedback],
            Error,
        );
        graph.add_transitions(WaitingComparisonFeedback, &[Idle], Error);
        graph.add_transitions(WaitingInvalidFeedback, &[Idle], Error);
        graph.add_transitions(Error, &[Idle], Error);
        graph
    }

    async fn act(
        &mut self,
        state: RecommenderState,
        memory: &mut ConversationMemory,
    ) -> Result<Step<RecommenderState>, ProtocolError> {
        use RecommenderState::*;
        match state {
            Idle => {
                let message = match self.receive_any().await? {
                    AnyMessage::Query(m) => m,
                    other => return Err(ProtocolError::violation(state, Some(other.kind()))),
                };
                log::info!("[{}] query received", message.envelope().thread);
                memory.push(AnyMessage::Query(message));
                Ok(Step::Goto(ComputingRecommendation))
            }

            // The reply parent is whichever message routed here: the
            // opening query, or a collision/disapproval restarting the
            // negotiation.
            ComputingRecommendation => {
                let parent = memory
                    .last()
                    .cloned()
                    .ok_or_else(|| ProtocolError::violation(state, None))?;
                let reply = match &parent {
                    AnyMessage::Query(m) => {
                        let query = m.query()?;
                        let recommendation =
                            self.handler
                                .compute_recommendation(&query)
                                .await
                                .map_err(ProtocolError::Callback)?;
                        m.make_recommendation_reply(&recommendation)?
                    }
                    AnyMessage::Collision(m) => {
                        let query = m.query()?;
                        let recommendation =
                            self.handler
                                .compute_recommendation(&query)
                                .await
                                .map_err(ProtocolError::Callback)?;
                        m.make_recommendation_reply(&recommendation)?
                    }
                    AnyMessage::Disapprove(m) => {
                        let query = m.query()?;
                        let recommendation =
                            self.handler
                                .compute_recommendation(&query)
                                .await
                                .map_err(ProtocolError::Callback)?;
                        m.make_recommendation_reply(&recommendation)?
                    }
                    other => return Err(ProtocolError::violation(state, Some(other.kind()))),
                };
                self.dispatch(memory, AnyMessage::Recommendation(reply))
                    .await?;
                Ok(Step::Goto(WaitingRecommendationFeedback))
            }

            WaitingRecommendationFeedback => match self.receive_any().await? {
                AnyMessage::Accept(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let explanation = m.explanation()?;
                    self.handler
                        .on_accept(&query, &recommendation, explanation.as_ref())
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::Accept(m));
                    Ok(Step::Goto(Idle))
                }
                AnyMessage::Collision(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let feature = m.feature()?;
                    self.handler
                        .on_collision(&query, &recommendation, &feature)
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::Collision(m));
                    Ok(Step::Goto(ComputingRecommendation))
                }
                AnyMessage::Disapprove(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let motivation = m.motivation()?;
                    self.handler
                        .on_disagree(&query, &recommendation, &motivation)
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::Disapprove(m));
                    Ok(Step::Goto(ComputingRecommendation))
                }
                AnyMessage::Why(m) => {
                    memory.push(AnyMessage::Why(m));
                    Ok(Step::Goto(ComputingExplanation))
                }
                AnyMessage::WhyNot(m) => {
                    memory.push(AnyMessage::WhyNot(m));
                    Ok(Step::Goto(ComputingComparativeExplanation))
                }
                other => Err(ProtocolError::violation(state, Some(other.kind()))),
            },

            // Why asks for a first explanation; UnclearExplanation asks
            // for a fresh attempt at one.
            ComputingExplanation => {
                let parent = memory
                    .last()
                    .cloned()
                    .ok_or_else(|| ProtocolError::violation(state, None))?;
                let reply = match &parent {
                    AnyMessage::Why(m) => {
                        let (query, recommendation) = (m.query()?, m.recommendation()?);
                        let explanation = self
                            .handler
                            .compute_explanation(&query, &recommendation)
                            .await
                            .map_err(ProtocolError::Callback)?;
                        m.make_more_details_reply(&explanation)?
                    }
                    AnyMessage::UnclearExplanation(m) => {
                        let (query, recommendation) = (m.query()?, m.recommendation()?);
                        let explanation = self
                            .handler
                            .compute_explanation(&query, &recommendation)
                            .await
                            .map_err(ProtocolError::Callback)?;
                        m.make_more_details_reply(&explanation)?
                    }
                    other => return Err(ProtocolError::violation(state, Some(other.kind()))),
                };
                self.dispatch(memory, AnyMessage::MoreDetails(reply)).await?;
                Ok(Step::Goto(WaitingExplanationFeedback))
            }

            WaitingExplanationFeedback => match self.receive_any().await? {
                AnyMessage::Accept(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let explanation = m.explanation()?;
                    self.handler
                        .on_accept(&query, &recommendation, explanation.as_ref())
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::Accept(m));
                    Ok(Step::Goto(Idle))
                }
                AnyMessage::Collision(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let feature = m.feature()?;
                    self.handler
                        .on_collision(&query, &recommendation, &feature)
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::Collision(m));
                    Ok(Step::Goto(ComputingRecommendation))
                }
                AnyMessage::Disapprove(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let motivation = m.motivation()?;
                    self.handler
                        .on_disagree(&query, &recommendation, &motivation)
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::Disapprove(m));
                    Ok(Step::Goto(ComputingRecommendation))
                }
                AnyMessage::UnclearExplanation(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let explanation = m.explanation()?;
                    self.handler
                        .on_unclear(&query, &recommendation, &explanation)
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::UnclearExplanation(m));
                    Ok(Step::Goto(ComputingExplanation))
                }
                other => Err(ProtocolError::violation(state, Some(other.kind()))),
            },

            ComputingComparativeExplanation => {
                let parent = match memory.last() {
                    Some(AnyMessage::WhyNot(m)) => m.clone(),
                    other => {
                        return Err(ProtocolError::violation(state, other.map(AnyMessage::kind)))
                    }
                };
                let query = parent.query()?;
                let recommendation = parent.recommendation()?;
                let alternative = parent.alternative()?;
                let valid = self
                    .handler
                    .is_valid(&query, &recommendation, &alternative)
                    .await
                    .map_err(ProtocolError::Callback)?;
                let explanation = self
                    .handler
                    .compute_contrastive_explanation(&query, &recommendation, &alternative)
                    .await
                    .map_err(ProtocolError::Callback)?;
                if valid {
                    let reply = parent.make_comparison_reply(&explanation)?;
                    self.dispatch(memory, AnyMessage::Comparison(reply)).await?;
                    Ok(Step::Goto(WaitingComparisonFeedback))
                } else {
                    let reply = parent.make_invalid_alternative_reply(&explanation)?;
                    self.dispatch(memory, AnyMessage::InvalidAlternative(reply))
                        .await?;
                    Ok(Step::Goto(WaitingInvalidFeedback))
                }
            }

            // A comparison cannot be re-challenged with the base complaint
            // types; only the two terminal verdicts are admitted.
            WaitingComparisonFeedback => match self.receive_any().await? {
                AnyMessage::Accept(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let explanation = m.explanation()?;
                    self.handler
                        .on_accept(&query, &recommendation, explanation.as_ref())
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::Accept(m));
                    Ok(Step::Goto(Idle))
                }
                AnyMessage::PreferAlternative(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let alternative = m.alternative()?;
                    self.handler
                        .on_prefer_alternative(&query, &recommendation, &alternative)
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::PreferAlternative(m));
                    Ok(Step::Goto(Idle))
                }
                other => Err(ProtocolError::violation(state, Some(other.kind()))),
            },

            WaitingInvalidFeedback => match self.receive_any().await? {
                AnyMessage::Accept(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let explanation = m.explanation()?;
                    self.handler
                        .on_accept(&query, &recommendation, explanation.as_ref())
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::Accept(m));
                    Ok(Step::Goto(Idle))
                }
                AnyMessage::OverrideRecommendation(m) => {
                    let (query, recommendation) = (m.query()?, m.recommendation()?);
                    let alternative = m.alternative()?;
                    self.handler
                        .on_override_alternative(&query, &recommendation, &alternative)
                        .await
                        .map_err(ProtocolError::Callback)?;
                    memory.push(AnyMessage::OverrideRecommendation(m));
                    Ok(Step::Goto(Idle))
                }
                other => Err(ProtocolError::violation(state, Some(other.kind()))),
            },

            // Driven by the engine; reaching it through act() means the
            // graph is misconfigured.
            Error => Err(ProtocolError::violation(state, None)),
        }
    }

    async fn on_error(&mut self, error: &ProtocolError) -> anyhow::Result<()> {
        self.handler.on_error(error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct NoopTransport;

    #[async_trait]
    impl Transport for NoopTransport {
        async fn send(
            &self,
            _envelope: negotiation_core::Envelope,
        ) -> Result<(), crate::transport::TransportError> {
            Ok(())
        }

        async fn receive(
            &mut self,
            _timeout: Option<Duration>,
        ) -> Result<Option<negotiation_core::Envelope>, crate::transport::TransportError> {
            Ok(None)
        }
    }

    struct NoopHandler;

    #[async_trait]
    impl RecommenderHandler for NoopHandler {
        async fn compute_recommendation(
            &mut self,
            _query: &Query,
        ) -> anyhow::Result<Recommendation> {
            Ok(Recommendation::new("r"))
        }

        async fn compute_explanation(
            &mut self,
            _query: &Query,
            _recommendation: &Recommendation,
        ) -> anyhow::Result<Explanation> {
            Ok(Explanation::new("e"))
        }

        async fn compute_contrastive_explanation(
            &mut self,
            _query: &Query,
            _recommendation: &Recommendation,
            _alternative: &Recommendation,
        ) -> anyhow::Result<Explanation> {
            Ok(Explanation::new("e"))
        }

        async fn is_valid(
            &mut self,
            _query: &Query,
            _recommendation: &Recommendation,
            _alternative: &Recommendation,
        ) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    fn graph() -> TransitionGraph<RecommenderState> {
        Recommender::new(NoopTransport, NoopHandler).graph()
    }

    fn reachable(state: RecommenderState) -> HashSet<RecommenderState> {
        let mut set = graph().reachable(state);
        set.remove(&RecommenderState::Error);
        set
    }

    #[test]
    fn transition_table_is_complete() {
        use RecommenderState::*;
        assert_eq!(reachable(Idle), HashSet::from([ComputingRecommendation]));
        assert_eq!(
            reachable(ComputingRecommendation),
            HashSet::from([WaitingRecommendationFeedback])
        );
        assert_eq!(
            reachable(WaitingRecommendationFeedback),
            HashSet::from([
                Idle,
                ComputingRecommendation,
                ComputingExplanation,
                ComputingComparativeExplanation
            ])
        );
        assert_eq!(
            reachable(ComputingExplanation),
            HashSet::from([WaitingExplanationFeedback])
        );
        assert_eq!(
            reachable(WaitingExplanationFeedback),
            HashSet::from([Idle, ComputingRecommendation, ComputingExplanation])
        );
        assert_eq!(
            reachable(ComputingComparativeExplanation),
            HashSet::from([WaitingComparisonFeedback, WaitingInvalidFeedback])
        );
        assert_eq!(reachable(WaitingComparisonFeedback), HashSet::from([Idle]));
        assert_eq!(reachable(WaitingInvalidFeedback), HashSet::from([Idle]));
        assert_eq!(reachable(Error), HashSet::from([Idle]));
    }

    #[test]
    fn states_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&RecommenderState::WaitingComparisonFeedback).unwrap(),
            "\"waiting_comparison_feedback\""
        );
        assert_eq!(
            serde_json::from_str::<RecommenderState>("\"idle\"").unwrap(),
            RecommenderState::Idle
        );
    }

    #[test]
    fn every_state_can_reach_the_error_state() {
        use RecommenderState::*;
        let graph = graph();
        for state in [
            Idle,
            ComputingRecommendation,
            WaitingRecommendationFeedback,
            ComputingExplanation,
            WaitingExplanationFeedback,
            ComputingComparativeExplanation,
            WaitingComparisonFeedback,
            WaitingInvalidFeedback,
        ] {
            assert!(graph.allows(state, Error), "missing error edge from {state:?}");
        }
    }
}
