//! Multi-turn computations as explicit continuations
//!
//! A form that asks several questions is written as a [`Resumable`]: each
//! call to `resume` receives one user answer and either suspends again with
//! the next continuation or completes with an optional directive.

use super::{Context, Directive, Param, State, StateError, StateFn};
use std::fmt;

pub trait Resumable: ResumableClone + Send + Sync + fmt::Debug {
    fn resume(self: Box<Self>, ctx: &mut Context<'_>, input: &str) -> Result<Step, StateError>;
}

pub trait ResumableClone {
    fn clone_box(&self) -> Box<dyn Resumable>;
}

impl<T: Resumable + Clone + 'static> ResumableClone for T {
    fn clone_box(&self) -> Box<dyn Resumable> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Resumable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Outcome of running a computation up to its next question
#[derive(Debug)]
pub enum Step {
    /// Waiting for the next message
    Suspend(Box<dyn Resumable>),
    /// Finished; `None` returns to the default state
    Complete(Option<Directive>),
}

impl Step {
    pub fn suspend(next: impl Resumable + 'static) -> Self {
        Self::Suspend(Box::new(next))
    }

    pub fn complete(directive: Directive) -> Self {
        Self::Complete(Some(directive))
    }

    pub fn done() -> Self {
        Self::Complete(None)
    }
}

/// Active state wrapping a suspended computation
#[derive(Debug, Clone)]
pub struct Suspended {
    continuation: Box<dyn Resumable>,
}

impl State for Suspended {
    fn process_message(self: Box<Self>, ctx: &mut Context<'_>) -> Result<Directive, StateError> {
        let input = ctx.text().to_string();
        match self.continuation.resume(ctx, &input)? {
            Step::Suspend(next) => Ok(Directive::state(Suspended { continuation: next })),
            Step::Complete(directive) => Ok(directive.unwrap_or(Directive::Default)),
        }
    }
}

/// Turn the first step of a computation into a directive
///
/// A computation that completes immediately yields its own directive, or
/// `default` when it produced none.
pub fn start(step: Step, default: Directive) -> Directive {
    match step {
        Step::Suspend(continuation) => Directive::state(Suspended { continuation }),
        Step::Complete(directive) => directive.unwrap_or(default),
    }
}

/// Wrap a computation's entry point as a state function
pub fn resumable<F>(name: &str, default: Directive, entry: F) -> StateFn
where
    F: Fn(&mut Context<'_>, &[Param]) -> Result<Step, StateError> + Send + Sync + 'static,
{
    StateFn::new(name, move |ctx, params| {
        Ok(start(entry(ctx, params)?, default.clone()))
    })
}
