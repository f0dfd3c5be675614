//! State machine error types

use crate::knowledge::LoadError;
use thiserror::Error;

/// Failure while processing a turn
///
/// Any of these reaching the engine resets the conversation to the default
/// state and is reported to the user as an error message.
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("State resolution exceeded {0} nested transitions")]
    ResolutionDepth(usize),
    #[error("{0}")]
    Failed(String),
}

impl StateError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
