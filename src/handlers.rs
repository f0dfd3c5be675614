//! Solvers consulted by the default state
//!
//! Each solver looks at the message independently. The first one that does
//! not return [`Solution::Unhandled`] decides the turn.

pub mod options;
mod regex;
pub mod subject;
mod url;

pub use self::regex::RegexHandler;
pub use self::url::UrlHandler;
pub use options::{show_options, StatefulOption};
pub use subject::SubjectHandler;

use crate::knowledge::Knowledge;
use crate::state_machine::{Checkpoint, Context, Directive, Redirect, StateError};
use std::sync::Arc;

pub const NOT_UNDERSTOOD: &str = "I could not process this query. Please, try a different query";

/// Outcome of offering a message to a solver
#[derive(Debug)]
pub enum Solution {
    Handled(Directive),
    Unhandled,
    /// Jump to another state with params
    Redirect(Redirect),
}

pub trait Solver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, ctx: &mut Context<'_>) -> Result<Solution, StateError>;
}

/// The state a conversation rests in between flows
pub struct DefaultState {
    solvers: Vec<Arc<dyn Solver>>,
    subjects: Arc<SubjectHandler>,
}

impl std::fmt::Debug for DefaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.solvers.iter().map(|s| s.name()).collect();
        f.debug_struct("DefaultState")
            .field("solvers", &names)
            .finish()
    }
}

impl DefaultState {
    pub fn new(knowledge: &Knowledge) -> Self {
        let subjects = Arc::new(SubjectHandler::new(Arc::clone(&knowledge.subjects)));
        let solvers: Vec<Arc<dyn Solver>> = vec![
            Arc::new(RegexHandler::new(Arc::clone(&knowledge.rules))),
            Arc::new(UrlHandler),
            Arc::clone(&subjects) as Arc<dyn Solver>,
        ];
        Self { solvers, subjects }
    }

    pub fn subjects(&self) -> &SubjectHandler {
        &self.subjects
    }

    pub fn process_message(&self, ctx: &mut Context<'_>) -> Result<Directive, StateError> {
        for solver in &self.solvers {
            match solver.solve(ctx)? {
                Solution::Unhandled => {}
                Solution::Handled(directive) => {
                    tracing::debug!(solver = solver.name(), "Message handled");
                    return Ok(directive);
                }
                Solution::Redirect(redirect) => {
                    tracing::debug!(solver = solver.name(), "Message redirected");
                    return Ok(Directive::Redirect(redirect));
                }
            }
        }
        ctx.reply_checkpoint(NOT_UNDERSTOOD, Checkpoint::Default);
        Ok(Directive::Default)
    }
}
