//! The explainee role: issues a query, reacts to proposals and
//! explanations, and eventually accepts, overrides or defects to an
//! alternative.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use negotiation_core::{
    AnyMessage, ComparisonMessage, ComparisonResponse, DetailsResponse, InvalidAlternativeMessage,
    InvalidAlternativeResponse, MoreDetailsMessage, Query, QueryMessage, RecommendationMessage,
    RecommendationResponse,
};

use crate::error::ProtocolError;
use crate::machine::{ConversationMemory, Machine, StateActions, Step, TransitionGraph};
use crate::transport::Transport;

/// Addressing and timing for one conversation, injected explicitly into
/// the machine that drives it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConversationConfig {
    /// Who this machine speaks as.
    pub identity: String,
    /// The peer on the other side of the thread.
    pub peer: String,
    /// The conversation/thread identifier shared by both sides.
    pub thread: String,
    /// Deadline for each blocking receive; `None` waits indefinitely.
    pub receive_timeout: Option<Duration>,
}

impl ConversationConfig {
    /// New conversation with a fresh thread id and no receive deadline.
    pub fn new(identity: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            peer: peer.into(),
            thread: format!("conversation#{}", Uuid::new_v4()),
            receive_timeout: None,
        }
    }

    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = thread.into();
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }
}

/// Injected domain behavior for the explainee side.
///
/// Each `handle_*` method receives the message just taken off the wire and
/// must answer with one of the reply types the grammar allows there —
/// enforced by the closed response enums at compile time.
#[async_trait]
pub trait ExplaineeHandler: Send {
    async fn on_error(&mut self, _error: &ProtocolError) -> anyhow::Result<()> {
        Ok(())
    }

    async fn handle_recommendation(
        &mut self,
        message: &RecommendationMessage,
    ) -> anyhow::Result<RecommendationResponse>;

    async fn handle_details(
        &mut self,
        message: &MoreDetailsMessage,
    ) -> anyhow::Result<DetailsResponse>;

    async fn handle_comparison(
        &mut self,
        message: &ComparisonMessage,
    ) -> anyhow::Result<ComparisonResponse>;

    async fn handle_invalid_alternative(
        &mut self,
        message: &InvalidAlternativeMessage,
    ) -> anyhow::Result<InvalidAlternativeResponse>;
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExplaineeState {
    Init,
    AwaitingRecommendation,
    AwaitingDetails,
    AwaitingComparativeExplanation,
    HandlingComparison,
    HandlingInvalid,
    End,
    Error,
}

/// One explainee-side conversation.
pub struct Explainee<T: Transport, H: ExplaineeHandler> {
    config: ConversationConfig,
    query: Query,
    transport: T,
    handler: H,
}

impl<T: Transport, H: ExplaineeHandler> Explainee<T, H> {
    pub fn new(query: Query, config: ConversationConfig, transport: T, handler: H) -> Self {
        Self {
            config,
            query,
            transport,
            handler,
        }
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
            .receive(self.config.receive_timeout)
            .await?
            .ok_or(ProtocolError::Timeout)?;
        log::debug!(
            "[{}] received a {:?} message",
            self.config.thread,
            envelope.type_tag()
        );
        Ok(AnyMessage::from_envelope(envelope)?)
    }

    /// Send a reply and record it in history.
    async fn dispatch(
        &mut self,
        memory: &mut ConversationMemory,
        message: AnyMessage,
    ) -> Result<(), ProtocolError> {
        log::debug!("[{}] sending {}", self.config.thread, message.kind());
        self.transport.send(message.envelope().clone()).await?;
        memory.push(message);
        Ok(())
    }
}

#[async_trait]
impl<T: Transport, H: ExplaineeHandler> StateActions for Explainee<T, H> {
    type State = ExplaineeState;

    fn graph(&self) -> TransitionGraph<ExplaineeState> {
        use ExplaineeState::*;
        let mut graph = TransitionGraph::new(Init, Error, Init);
        graph.add_transitions(Init, &[AwaitingRecommendation], Error);
        graph.add_transitions(
            AwaitingRecommendation,
            &[
                AwaitingRecommendation,
                AwaitingDetails,
                AwaitingComparativeExplanation,
                End,
            ],
            Error,
        );
        graph.add_transitions(
            AwaitingDetails,
            &[AwaitingRecommendation, AwaitingDetails, End],
            Error,
        );
        graph.add_transitions(
            AwaitingComparativeExplanation,
            &[HandlingComparison, HandlingInvalid],
            Error,
        );
        graph.add_transitions(HandlingComparison, &[End], Error);
        graph.add_transitions(HandlingInvalid, &[End], Error);
        graph.add_transitions(End, &[], Error);
        graph.add_transitions(Error, &[Init], Error);
        graph
    }

    async fn act(
        &mut self,
        state: ExplaineeState,
        memory: &mut ConversationMemory,
    ) -> Result<Step<ExplaineeState>, ProtocolError> {
        use ExplaineeState::*;
        match state {
            Init => {
                log::info!("[{}] issuing query {}", self.config.thread, self.query);
                let message = QueryMessage::new(
                    self.query.clone(),
                    self.config.identity.clone(),
                    self.config.peer.clone(),
                    self.config.thread.clone(),
                );
                self.dispatch(memory, AnyMessage::Query(message)).await?;
                Ok(Step::Goto(AwaitingRecommendation))
            }

            AwaitingRecommendation => {
                let message = match self.receive_any().await? {
                    AnyMessage::Recommendation(m) => m,
                    other => return Err(ProtocolError::violation(state, Some(other.kind()))),
                };
                let response = self
                    .handler
                    .handle_recommendation(&message)
                    .await
                    .map_err(ProtocolError::Callback)?;
                memory.push(AnyMessage::Recommendation(message));
                let next = match &response {
                    RecommendationResponse::Collision(_) | RecommendationResponse::Disapprove(_) => {
                        AwaitingRecommendation
                    }
                    RecommendationResponse::Why(_) => AwaitingDetails,
                    RecommendationResponse::WhyNot(_) => AwaitingComparativeExplanation,
                    RecommendationResponse::Accept(_) => End,
                };
                self.dispatch(memory, response.into_any()).await?;
                Ok(Step::Goto(next))
            }

            AwaitingDetails => {
                let message = match self.receive_any().await? {
                    AnyMessage::MoreDetails(m) => m,
                    other => return Err(ProtocolError::violation(state, Some(other.kind()))),
                };
                let response = self
                    .handler
                    .handle_details(&message)
                    .await
                    .map_err(ProtocolError::Callback)?;
                memory.push(AnyMessage::MoreDetails(message));
                let next = match &response {
                    DetailsResponse::Collision(_) | DetailsResponse::Disapprove(_) => {
                        AwaitingRecommendation
                    }
                    DetailsResponse::UnclearExplanation(_) => AwaitingDetails,
                    DetailsResponse::Accept(_) => End,
                };
                self.dispatch(memory, response.into_any()).await?;
                Ok(Step::Goto(next))
            }

            AwaitingComparativeExplanation => {
                // Routing only; the callback fires in the handling state on
                // the stored message.
                match self.receive_any().await? {
                    AnyMessage::Comparison(m) => {
                        memory.push(AnyMessage::Comparison(m));
                        Ok(Step::Goto(HandlingComparison))
                    }
                    AnyMessage::InvalidAlternative(m) => {
                        memory.push(AnyMessage::InvalidAlternative(m));
                        Ok(Step::Goto(HandlingInvalid))
                    }
                    other => Err(ProtocolError::violation(state, Some(other.kind()))),
                }
            }

            HandlingComparison => {
                let message = match memory.last() {
                    Some(AnyMessage::Comparison(m)) => m.clone(),
                    other => {
                        return Err(ProtocolError::violation(state, other.map(AnyMessage::kind)))
                    }
                };
                let response = self
                    .handler
                    .handle_comparison(&message)
                    .await
                    .map_err(ProtocolError::Callback)?;
                self.dispatch(memory, response.into_any()).await?;
                Ok(Step::Goto(End))
            }

            HandlingInvalid => {
                let message = match memory.last() {
                    Some(AnyMessage::InvalidAlternative(m)) => m.clone(),
                    other => {
                        return Err(ProtocolError::violation(state, other.map(AnyMessage::kind)))
                    }
                };
                let response = self
                    .handler
                    .handle_invalid_alternative(&message)
                    .await
                    .map_err(ProtocolError::Callback)?;
                self.dispatch(memory, response.into_any()).await?;
                Ok(Step::Goto(End))
            }

            End => {
                log::info!("[{}] conversation complete", self.config.thread);
                Ok(Step::Done)
            }

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
    impl ExplaineeHandler for NoopHandler {
        async fn handle_recommendation(
            &mut self,
            message: &RecommendationMessage,
        ) -> anyhow::Result<RecommendationResponse> {
            Ok(RecommendationResponse::Accept(message.make_accept_reply()?))
        }

        async fn handle_details(
            &mut self,
            message: &MoreDetailsMessage,
        ) -> anyhow::Result<DetailsResponse> {
            Ok(DetailsResponse::Accept(message.make_accept_reply()?))
        }

        async fn handle_comparison(
            &mut self,
            message: &ComparisonMessage,
        ) -> anyhow::Result<ComparisonResponse> {
            Ok(ComparisonResponse::Accept(message.make_accept_reply()?))
        }

        async fn handle_invalid_alternative(
            &mut self,
            message: &InvalidAlternativeMessage,
        ) -> anyhow::Result<InvalidAlternativeResponse> {
            Ok(InvalidAlternativeResponse::Accept(
                message.make_accept_reply()?,
            ))
        }
    }

    fn graph() -> TransitionGraph<ExplaineeState> {
        Explainee::new(
            Query::new("q"),
            ConversationConfig::new("user@h", "agent@h"),
            NoopTransport,
            NoopHandler,
        )
        .graph()
    }

    fn reachable(state: ExplaineeState) -> HashSet<ExplaineeState> {
        let mut set = graph().reachable(state);
        set.remove(&ExplaineeState::Error);
        set
    }

    // The declared graph must match the documented transition table.
    #[test]
    fn transition_table_is_complete() {
        use ExplaineeState::*;
        assert_eq!(reachable(Init), HashSet::from([AwaitingRecommendation]));
        assert_eq!(
            reachable(AwaitingRecommendation),
            HashSet::from([
                AwaitingRecommendation,
                AwaitingDetails,
                AwaitingComparativeExplanation,
                End
            ])
        );
        assert_eq!(
            reachable(AwaitingDetails),
            HashSet::from([AwaitingRecommendation, AwaitingDetails, End])
        );
        assert_eq!(
            reachable(AwaitingComparativeExplanation),
            HashSet::from([HandlingComparison, HandlingInvalid])
        );
        assert_eq!(reachable(HandlingComparison), HashSet::from([End]));
        assert_eq!(reachable(HandlingInvalid), HashSet::from([End]));
        assert_eq!(reachable(End), HashSet::new());
        assert_eq!(reachable(Error), HashSet::from([Init]));
    }

    #[test]
    fn every_state_can_reach_the_error_state() {
        use ExplaineeState::*;
        let graph = graph();
        for state in [
            Init,
            AwaitingRecommendation,
            AwaitingDetails,
            AwaitingComparativeExplanation,
            HandlingComparison,
            HandlingInvalid,
            End,
        ] {
            assert!(graph.allows(state, Error), "missing error edge from {state:?}");
        }
    }

    #[test]
    fn fresh_configs_get_distinct_threads() {
        let a = ConversationConfig::new("user@h", "agent@h");
        let b = ConversationConfig::new("user@h", "agent@h");
        assert_ne!(a.thread, b.thread);
        assert!(a.thread.starts_with("conversation#"));
    }
}
