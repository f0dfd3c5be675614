//! Bots driving chat instances

mod dummy;
mod newton;

pub use dummy::DummyBot;
pub use newton::{NewtonBot, GREETING};

use crate::config::{BotKind, ConfigFields};
use crate::instance::{Chat, SyncKind};
use crate::knowledge::{Knowledge, LoadError};
use crate::state_machine::Context;
use serde_json::{Map, Value};

/// Conversation logic plugged into a chat instance
pub trait Bot: Send {
    /// Fields accepted in the `data` of a new instance
    fn config() -> ConfigFields
    where
        Self: Sized;

    /// Initialize a fresh instance, usually by greeting the user
    fn start(&mut self, chat: &mut Chat, data: &Map<String, Value>);

    /// Resend the history after the front end lost it
    fn refresh(&mut self, chat: &mut Chat) {
        chat.sync(SyncKind::Refresh);
    }

    /// Answer one user message through the context's replies
    fn process_message(&mut self, ctx: &mut Context<'_>);

    fn process_autocomplete(
        &mut self,
        chat: &mut Chat,
        request_id: Value,
        query: &str,
    ) -> Result<(), LoadError>;

    /// Bot specific state kept in instance snapshots
    fn save(&self) -> Value {
        Value::Null
    }

    fn load(&mut self, _data: &Value) {}
}

impl BotKind {
    pub fn name(self) -> &'static str {
        match self {
            BotKind::Newton => "newton",
            BotKind::Dummy => "dummy",
        }
    }

    pub fn all() -> [BotKind; 2] {
        [BotKind::Newton, BotKind::Dummy]
    }

    pub fn config_fields(self) -> ConfigFields {
        match self {
            BotKind::Newton => NewtonBot::config(),
            BotKind::Dummy => DummyBot::config(),
        }
    }

    pub fn create(self, knowledge: &Knowledge) -> Box<dyn Bot> {
        match self {
            BotKind::Newton => Box::new(NewtonBot::new(knowledge)),
            BotKind::Dummy => Box::new(DummyBot::default()),
        }
    }
}
