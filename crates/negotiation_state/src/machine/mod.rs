//! The generic conversation engine.
//!
//! A role machine is three pieces: a [`TransitionGraph`] declared once at
//! startup, a [`ConversationMemory`] owned exclusively by the running
//! machine, and a [`StateActions`] implementation supplying the per-state
//! behavior. [`Machine`] drives the run contract: enter, act, transition,
//! with uniform routing of recoverable failures through the Error state.

mod engine;
mod graph;
mod memory;

pub use engine::{EngineError, Machine, StateActions, Step};
pub use graph::{StateId, TransitionGraph};
pub use memory::{ConversationMemory, RecordedError};
