//! Dialogue state machine
//!
//! States consume a message and return a [`Directive`] describing what the
//! conversation does next. The engine owns the active state and the
//! checkpoint table and resolves directives, possibly reprocessing the same
//! message under a new state.

pub mod context;
pub mod directive;
mod engine;
mod error;
pub mod registry;
pub mod resumable;

#[cfg(test)]
mod proptests;

pub use context::{Context, Memory, Reply};
pub use directive::{CallState, Checkpoint, Directive, Param, Redirect, State, StateFn};
pub use engine::{DialogueEngine, MAX_RESOLUTION_DEPTH};
pub use error::StateError;
pub use registry::{StateModule, StateRegistry};
pub use resumable::{Resumable, Step, Suspended};
