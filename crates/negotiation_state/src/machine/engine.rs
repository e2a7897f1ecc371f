//! The run contract shared by both role machines.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ProtocolError;
use crate::transport::TransportError;

use super::graph::{StateId, TransitionGraph};
use super::memory::ConversationMemory;

/// What a state action decided to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<S> {
    /// Move to the given state; the edge must be declared in the graph.
    Goto(S),
    /// The conversation reached a terminal state; stop the run.
    Done,
}

/// Fatal conditions that end a run. Everything in [`ProtocolError`] is
/// recoverable; these are not.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A state returned a successor outside its declared reachable set —
    /// a configuration defect, surfaced here instead of silently looping.
    #[error("undeclared transition from {from} to {to}")]
    UnregisteredTransition { from: String, to: String },

    /// The Error state was entered with an empty last-error slot.
    #[error("entered the error state with no recorded error")]
    NoRecordedError,

    /// The role's `on_error` callback itself failed.
    #[error("error callback failed: {0}")]
    RecoveryFailed(#[source] anyhow::Error),

    /// The peer end of the transport is gone; the conversation is over.
    #[error("transport closed")]
    TransportClosed,
}

/// Per-state behavior of a role machine.
#[async_trait]
pub trait StateActions: Send {
    type State: StateId;

    /// The transition graph, built once when the machine is created.
    fn graph(&self) -> TransitionGraph<Self::State>;

    /// Execute one state's action. Any `Err` is recorded and routed to the
    /// Error state. The Error state itself is driven by the engine and
    /// never reaches this method.
    async fn act(
        &mut self,
        state: Self::State,
        memory: &mut ConversationMemory,
    ) -> Result<Step<Self::State>, ProtocolError>;

    /// Invoked from the Error state with the recorded failure. An `Err`
    /// here is fatal to the conversation.
    async fn on_error(&mut self, error: &ProtocolError) -> anyhow::Result<()>;
}

/// Drives one conversation for one role: enter the current state, run its
/// action, follow the declared transition.
pub struct Machine<A: StateActions> {
    actions: A,
    graph: TransitionGraph<A::State>,
    memory: ConversationMemory,
    state: A::State,
}

impl<A: StateActions> Machine<A> {
    pub fn new(actions: A) -> Self {
        let graph = actions.graph();
        let state = graph.initial();
        Self {
            actions,
            graph,
            memory: ConversationMemory::new(),
            state,
        }
    }

    pub fn state(&self) -> A::State {
        self.state
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn actions(&self) -> &A {
        &self.actions
    }

    /// Run states until the conversation completes or a fatal condition
    /// surfaces.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        while self.step().await? {}
        Ok(())
    }

    /// Enter and execute exactly one state. Returns `Ok(false)` once the
    /// conversation is done.
    pub async fn step(&mut self) -> Result<bool, EngineError> {
        log::debug!("entering state {:?}", self.state);

        if self.state == self.graph.error_state() {
            return self.recover().await.map(|_| true);
        }

        match self.actions.act(self.state, &mut self.memory).await {
            Ok(Step::Goto(next)) => {
                if !self.graph.allows(self.state, next) {
                    return Err(EngineError::UnregisteredTransition {
                        from: format!("{:?}", self.state),
                        to: format!("{next:?}"),
                    });
                }
                log::debug!("moving from {:?} to {:?}", self.state, next);
                self.state = next;
                Ok(true)
            }
            Ok(Step::Done) => {
                log::info!("conversation finished in state {:?}", self.state);
                Ok(false)
            }
            Err(ProtocolError::Transport(TransportError::Closed)) => {
                log::info!("transport closed in state {:?}", self.state);
                Err(EngineError::TransportClosed)
            }
            Err(error) => {
                log::warn!("error in state {:?}: {error}", self.state);
                self.memory.record_error(error);
                self.state = self.graph.error_state();
                Ok(true)
            }
        }
    }

    async fn recover(&mut self) -> Result<(), EngineError> {
        let recorded = self
            .memory
            .take_last_error()
            .ok_or(EngineError::NoRecordedError)?;
        log::warn!("handling recorded error: {}", recorded.error);
        self.actions
            .on_error(&recorded.error)
            .await
            .map_err(EngineError::RecoveryFailed)?;
        let recovery = self.graph.recovery_state();
        log::debug!("recovered; resuming at {recovery:?}");
        self.state = recovery;
        Ok(())
    }
}
