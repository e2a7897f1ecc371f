//! negotiation_state - State machines and FSM logic driving negotiation
//! conversations.
//!
//! This crate hosts the generic conversation engine (transition graph,
//! per-conversation memory, run contract with uniform error recovery) and
//! the two role machines built on it: the explainee, which issues a query
//! and reacts to proposals, and the recommender, which computes proposals
//! and reacts to objections. Domain behavior is injected through the
//! handler traits; the wire sits behind the [`Transport`] trait.

pub mod error;
pub mod explainee;
pub mod machine;
pub mod recommender;
pub mod transport;

// Re-export commonly used types
pub use error::ProtocolError;
pub use explainee::{ConversationConfig, Explainee, ExplaineeHandler, ExplaineeState};
pub use machine::{
    ConversationMemory, EngineError, Machine, RecordedError, StateActions, StateId, Step,
    TransitionGraph,
};
pub use recommender::{Recommender, RecommenderHandler, RecommenderState};
pub use transport::{channel_pair, ChannelTransport, Transport, TransportError};
