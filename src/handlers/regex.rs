use super::{Solution, Solver};
use crate::knowledge::{Reloadable, RuleSet};
use crate::state_machine::{Context, Directive, Redirect, StateError};
use std::sync::Arc;

/// Loads the state of the first regex rule matching the message
pub struct RegexHandler {
    rules: Arc<Reloadable<RuleSet>>,
}

impl RegexHandler {
    pub fn new(rules: Arc<Reloadable<RuleSet>>) -> Self {
        Self { rules }
    }
}

impl Solver for RegexHandler {
    fn name(&self) -> &str {
        "regex"
    }

    fn solve(&self, ctx: &mut Context<'_>) -> Result<Solution, StateError> {
        let rules = self.rules.current()?;
        let Some((rule, params)) = rules.first_match(ctx.text()) else {
            return Ok(Solution::Unhandled);
        };
        tracing::debug!(state = %rule.state, pattern = %rule.pattern, "Regex rule matched");
        Ok(Solution::Redirect(Redirect::new(
            Directive::command(rule.state.clone()),
            params,
        )))
    }
}
