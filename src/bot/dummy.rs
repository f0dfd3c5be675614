use super::Bot;
use crate::config::{ConfigFields, FieldKind};
use crate::instance::Chat;
use crate::knowledge::LoadError;
use crate::message::Message;
use crate::protocol::Outbound;
use crate::state_machine::Context;
use serde_json::{json, Map, Value};

const DEFAULT_FORMAT: &str = "{}, ditto";

/// Bot that repeats user messages through a template
#[derive(Debug, Clone)]
pub struct DummyBot {
    format_str: String,
}

impl Default for DummyBot {
    fn default() -> Self {
        Self {
            format_str: DEFAULT_FORMAT.to_string(),
        }
    }
}

impl DummyBot {
    /// Fill the first `{}` of the template with `text`
    fn format(&self, text: &str) -> String {
        self.format_str.replacen("{}", text, 1)
    }
}

impl Bot for DummyBot {
    fn config() -> ConfigFields {
        ConfigFields::from([(
            "format_str",
            (FieldKind::Text, json!({ "value": DEFAULT_FORMAT })),
        )])
    }

    fn start(&mut self, chat: &mut Chat, data: &Map<String, Value>) {
        if let Some(format_str) = data.get("format_str").and_then(Value::as_str) {
            self.format_str = format_str.to_string();
        }
        chat.push(Message::bot(format!(
            "Hello, I am a dummy bot that repeats messages using the template {}",
            self.format_str
        )));
        chat.config.set("enable_autocomplete", Value::Bool(false));
    }

    fn process_message(&mut self, ctx: &mut Context<'_>) {
        let text = self.format(ctx.text());
        ctx.reply(text);
    }

    fn process_autocomplete(
        &mut self,
        chat: &mut Chat,
        request_id: Value,
        _query: &str,
    ) -> Result<(), LoadError> {
        chat.send(Outbound::AutocompleteResponse {
            response_id: request_id,
            items: Vec::new(),
        });
        Ok(())
    }

    fn save(&self) -> Value {
        json!({ "format_str": self.format_str })
    }

    fn load(&mut self, data: &Value) {
        if let Some(format_str) = data.get("format_str").and_then(Value::as_str) {
            self.format_str = format_str.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::context::testing::Turn;

    #[test]
    fn test_echo_through_template() {
        let mut bot = DummyBot::default();
        let mut turn = Turn::new("hello");
        let mut ctx = turn.context();
        bot.process_message(&mut ctx);
        assert_eq!(ctx.replies()[0].message.text, "hello, ditto");
    }

    #[test]
    fn test_start_reads_template() {
        let mut bot = DummyBot::default();
        let mut chat = Chat::new("echo", 5);
        let mut data = Map::new();
        data.insert("format_str".to_string(), json!("<{}>"));
        bot.start(&mut chat, &data);
        assert_eq!(bot.format("x"), "<x>");
        assert!(!chat.config.enable_autocomplete());
        assert!(chat.history()[0].text.ends_with("template <{}>"));
    }

    #[test]
    fn test_save_and_load() {
        let mut bot = DummyBot::default();
        bot.load(&json!({"format_str": "{}!"}));
        let mut restored = DummyBot::default();
        restored.load(&bot.save());
        assert_eq!(restored.format("hey"), "hey!");
    }
}
