//! Turn processing and directive resolution

use super::{Checkpoint, Context, Directive, Param, State, StateError, StateRegistry};
use crate::handlers::DefaultState;
use crate::knowledge::Knowledge;
use crate::message::MessageId;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Nested transitions allowed while resolving one turn
pub const MAX_RESOLUTION_DEPTH: usize = 64;

const SUBJECT_COMMAND: &str = "!subject";
const SHOW_COMMAND: &str = "!show";

/// Arguments of `text` when it invokes `command` as a whole word
fn command_args<'t>(text: &'t str, command: &str) -> Option<&'t str> {
    let rest = text.strip_prefix(command)?;
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

/// The state currently answering messages
#[derive(Debug, Clone, Default)]
enum Active {
    #[default]
    Default,
    State(Box<dyn State>),
}

impl From<Checkpoint> for Active {
    fn from(checkpoint: Checkpoint) -> Self {
        match checkpoint {
            Checkpoint::Default => Active::Default,
            Checkpoint::State(state) => Active::State(state),
        }
    }
}

impl Active {
    fn checkpoint(&self) -> Checkpoint {
        match self {
            Active::Default => Checkpoint::Default,
            Active::State(state) => Checkpoint::State(state.clone()),
        }
    }
}

/// Dialogue engine of one conversation
///
/// Owns the active state and the checkpoint table. Every failure inside a
/// turn is reported to the user and leaves the conversation in the default
/// state.
pub struct DialogueEngine {
    default: DefaultState,
    registry: Arc<StateRegistry>,
    active: Active,
    checkpoints: HashMap<MessageId, Checkpoint>,
}

impl DialogueEngine {
    pub fn new(knowledge: &Knowledge) -> Self {
        Self {
            default: DefaultState::new(knowledge),
            registry: Arc::clone(&knowledge.registry),
            active: Active::Default,
            checkpoints: HashMap::new(),
        }
    }

    pub fn default_state(&self) -> &DefaultState {
        &self.default
    }

    pub fn is_default(&self) -> bool {
        matches!(self.active, Active::Default)
    }

    /// Debug representation of the active state
    pub fn describe_active(&self) -> String {
        match &self.active {
            Active::Default => format!("{:?}", self.default),
            Active::State(state) => format!("{state:?}"),
        }
    }

    pub fn checkpoint(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.get(id)
    }

    /// Handle one user message
    pub fn process_message(&mut self, ctx: &mut Context<'_>) {
        self.handle(ctx);
        for reply in ctx.replies_mut() {
            if let Some(checkpoint) = reply.checkpoint.take() {
                self.checkpoints.insert(reply.message.id.clone(), checkpoint);
            }
        }
    }

    fn handle(&mut self, ctx: &mut Context<'_>) {
        let text = ctx.text().to_string();

        if text == "!debug" {
            let description = self.describe_active();
            ctx.reply_checkpoint(
                format!("Current state: {description}"),
                self.active.checkpoint(),
            );
            return;
        }
        if command_args(&text, SUBJECT_COMMAND).is_some() {
            self.guarded(ctx, |engine, ctx| {
                engine.resolve(ctx, Directive::Command(text.clone()), Vec::new(), 0)
            });
            return;
        }
        if let Some(keys) = command_args(&text, SHOW_COMMAND) {
            self.show_memory(ctx, keys);
            return;
        }

        if let Some(reply) = ctx.message().reply.clone() {
            if let Some(checkpoint) = self.checkpoints.get(&reply) {
                tracing::debug!(reply = %reply, "Resuming checkpoint");
                self.active = checkpoint.clone().into();
            } else if ctx.previous_id().is_some_and(|previous| previous != reply) {
                // Answering something older than the last message without a
                // checkpoint abandons whatever flow was active
                tracing::debug!(reply = %reply, "Stale reply, resetting to default state");
                self.active = Active::Default;
            }
        }

        self.guarded(ctx, |engine, ctx| engine.run_active(ctx, 0));
    }

    fn show_memory(&self, ctx: &mut Context<'_>, keys: &str) {
        let mut keys: Vec<String> = keys.split_whitespace().map(str::to_string).collect();
        if keys.is_empty() {
            keys = ctx.memory().keys().map(str::to_string).collect();
        }
        let lines: Vec<String> = keys
            .iter()
            .map(|key| match ctx.memory().get(key) {
                Some(Value::String(value)) => format!("{key}: {value}"),
                Some(value) => format!("{key}: {value}"),
                None => format!("{key}: !not found"),
            })
            .collect();
        ctx.reply_checkpoint(lines.join("\n"), self.active.checkpoint());
    }

    /// Run `step`; on error or panic reply the failure and reset to default
    fn guarded<F>(&mut self, ctx: &mut Context<'_>, step: F)
    where
        F: FnOnce(&mut Self, &mut Context<'_>) -> Result<(), StateError>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| step(self, ctx)));
        let detail = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic_info) => {
                if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                }
            }
        };
        tracing::error!(error = %detail, "Turn failed, resetting to default state");
        self.active = Active::Default;
        ctx.reply_error(format!("Something is wrong: {detail}"), Checkpoint::Default);
    }

    /// Let the active state process the message and resolve its directive
    fn run_active(&mut self, ctx: &mut Context<'_>, depth: usize) -> Result<(), StateError> {
        let directive = match std::mem::take(&mut self.active) {
            Active::Default => self.default.process_message(ctx)?,
            Active::State(state) => state.process_message(ctx)?,
        };
        self.resolve(ctx, directive, Vec::new(), depth)
    }

    fn resolve(
        &mut self,
        ctx: &mut Context<'_>,
        directive: Directive,
        params: Vec<Param>,
        depth: usize,
    ) -> Result<(), StateError> {
        if depth >= MAX_RESOLUTION_DEPTH {
            return Err(StateError::ResolutionDepth(MAX_RESOLUTION_DEPTH));
        }
        match directive {
            Directive::Default => self.active = Active::Default,
            Directive::Reprocess => {
                self.active = Active::Default;
                self.run_active(ctx, depth + 1)?;
            }
            Directive::State(state) => self.active = Active::State(state),
            Directive::Call(state) => {
                let next = state.call(ctx, &params)?;
                self.resolve(ctx, next, Vec::new(), depth + 1)?;
            }
            Directive::Redirect(redirect) => {
                self.resolve(ctx, *redirect.target, redirect.params, depth + 1)?;
            }
            Directive::Command(command) => self.run_command(ctx, &command, params, depth)?,
        }
        Ok(())
    }

    fn run_command(
        &mut self,
        ctx: &mut Context<'_>,
        command: &str,
        params: Vec<Param>,
        depth: usize,
    ) -> Result<(), StateError> {
        let (reprocess, command) = match command.strip_prefix('>') {
            Some(rest) => (true, rest),
            None => (false, command),
        };

        if let Some(key) = command_args(command, SUBJECT_COMMAND) {
            self.active = Active::Default;
            let key = key.trim();
            if !key.is_empty() {
                match self.default.subjects().state_by_key(key)? {
                    Some(state) => {
                        let next = state.call(ctx, &[])?;
                        self.resolve(ctx, next, Vec::new(), depth + 1)?;
                    }
                    None => {
                        ctx.reply_checkpoint(
                            format!("Subject {key} not found. Loading default state"),
                            Checkpoint::Default,
                        );
                        self.active = Active::Default;
                    }
                }
            }
        } else {
            let Some((module, function)) = command.split_once('?') else {
                return Err(StateError::failed(format!(
                    "Invalid state command {command:?}, expected <module>?<function>"
                )));
            };
            match self.registry.lookup(module, function) {
                Ok(state) => {
                    tracing::debug!(module, function, "Loading state");
                    let next = state.call(ctx, &params)?;
                    self.resolve(ctx, next, Vec::new(), depth + 1)?;
                }
                Err(e) => {
                    tracing::warn!(module, function, "State lookup failed");
                    ctx.reply_checkpoint(e.to_string(), Checkpoint::Default);
                    self.active = Active::Default;
                    return Ok(());
                }
            }
        }

        if reprocess {
            self.run_active(ctx, depth + 1)?;
        }
        Ok(())
    }
}
