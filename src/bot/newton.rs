use super::Bot;
use crate::config::ConfigFields;
use crate::instance::Chat;
use crate::knowledge::{Knowledge, LoadError};
use crate::message::Message;
use crate::protocol::Outbound;
use crate::state_machine::{Context, DialogueEngine};
use serde_json::{Map, Value};

pub const GREETING: &str = "Hello, I am Newton, an assistant that can help you with machine \
learning. You can ask me questions at any given time and go back to previous questions too. \
How can I help you?";

/// Knowledge base assistant backed by the dialogue engine
pub struct NewtonBot {
    engine: DialogueEngine,
}

impl NewtonBot {
    pub fn new(knowledge: &Knowledge) -> Self {
        Self {
            engine: DialogueEngine::new(knowledge),
        }
    }
}

impl Bot for NewtonBot {
    fn config() -> ConfigFields {
        ConfigFields::new()
    }

    fn start(&mut self, chat: &mut Chat, _data: &Map<String, Value>) {
        chat.push(Message::bot(GREETING));
    }

    fn process_message(&mut self, ctx: &mut Context<'_>) {
        self.engine.process_message(ctx);
    }

    fn process_autocomplete(
        &mut self,
        chat: &mut Chat,
        request_id: Value,
        query: &str,
    ) -> Result<(), LoadError> {
        let items = self.engine.default_state().subjects().autocomplete(query)?;
        chat.send(Outbound::AutocompleteResponse {
            response_id: request_id,
            items,
        });
        Ok(())
    }
}
