//! States and the directives they return

use super::{Context, StateError};
use std::fmt;
use std::sync::Arc;

/// Positional parameter passed to a state; regex groups that did not
/// match arrive as `None`
pub type Param = Option<String>;

/// A state that can be active in a conversation
///
/// `process_message` consumes the state. Returning `Directive::State(self)`
/// keeps it active for the next message.
pub trait State: StateClone + Send + Sync + fmt::Debug {
    fn process_message(self: Box<Self>, ctx: &mut Context<'_>) -> Result<Directive, StateError>;
}

/// Lets boxed states be cloned for checkpoints
pub trait StateClone {
    fn clone_box(&self) -> Box<dyn State>;
}

impl<T: State + Clone + 'static> StateClone for T {
    fn clone_box(&self) -> Box<dyn State> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn State> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

type StateFnInner =
    dyn Fn(&mut Context<'_>, &[Param]) -> Result<Directive, StateError> + Send + Sync;

/// A named state function, invoked with the context and trailing params
#[derive(Clone)]
pub struct StateFn {
    name: Arc<str>,
    func: Arc<StateFnInner>,
}

impl StateFn {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&mut Context<'_>, &[Param]) -> Result<Directive, StateError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, ctx: &mut Context<'_>, params: &[Param]) -> Result<Directive, StateError> {
        (self.func)(ctx, params)
    }
}

impl fmt::Debug for StateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateFn({})", self.name)
    }
}

/// What the conversation does after a state ran
#[derive(Debug, Clone)]
pub enum Directive {
    /// Return to the default state
    Default,
    /// Return to the default state and process the same message again
    Reprocess,
    /// `!subject <key>` or `<module>?<function>`, optionally prefixed with
    /// `>` to reprocess the message once the command resolved
    Command(String),
    /// Invoke now; the result is resolved in turn
    Call(StateFn),
    /// Becomes the active state as is
    State(Box<dyn State>),
    Redirect(Redirect),
}

impl Directive {
    pub fn state(state: impl State + 'static) -> Self {
        Self::State(Box::new(state))
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self::Command(command.into())
    }
}

/// Jump to `target`, handing it `params`
///
/// Raised by handlers and states instead of returning normally.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub target: Box<Directive>,
    pub params: Vec<Param>,
}

impl Redirect {
    pub fn new(target: Directive, params: Vec<Param>) -> Self {
        Self {
            target: Box::new(target),
            params,
        }
    }
}

impl From<Redirect> for Directive {
    fn from(redirect: Redirect) -> Self {
        Directive::Redirect(redirect)
    }
}

/// State restored when the user replies to a bot message
#[derive(Debug, Clone)]
pub enum Checkpoint {
    Default,
    State(Box<dyn State>),
}

impl Checkpoint {
    pub fn state(state: impl State + 'static) -> Self {
        Self::State(Box::new(state))
    }

    /// Checkpoint that runs `target` on the threaded reply
    pub fn call(target: StateFn) -> Self {
        Self::state(CallState(target))
    }
}

/// Adapts a state function into a state that handles the next message
#[derive(Debug, Clone)]
pub struct CallState(pub StateFn);

impl State for CallState {
    fn process_message(self: Box<Self>, ctx: &mut Context<'_>) -> Result<Directive, StateError> {
        self.0.call(ctx, &[])
    }
}
