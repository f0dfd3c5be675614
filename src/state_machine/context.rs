//! Per-turn processing context

use super::Checkpoint;
use crate::message::{
    render_code, render_options, render_panel, Message, MessageId, MessageType,
    OptionItem, OptionLayout,
};
use crate::pagination::Paginator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-conversation scratch storage shared by all states
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Memory(BTreeMap<String, Value>);

impl Memory {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// A bot message produced during a turn
#[derive(Debug, Clone)]
pub struct Reply {
    pub message: Message,
    /// State to restore when the user answers this message
    pub checkpoint: Option<Checkpoint>,
}

/// Everything a state sees while handling one message
pub struct Context<'a> {
    message: &'a Message,
    previous: Option<MessageId>,
    memory: &'a mut Memory,
    paginator: &'a mut Paginator,
    replies: Vec<Reply>,
}

impl<'a> Context<'a> {
    pub fn new(
        message: &'a Message,
        previous: Option<MessageId>,
        memory: &'a mut Memory,
        paginator: &'a mut Paginator,
    ) -> Self {
        Self {
            message,
            previous,
            memory,
            paginator,
            replies: Vec::new(),
        }
    }

    pub fn message(&self) -> &Message {
        self.message
    }

    pub fn text(&self) -> &str {
        &self.message.text
    }

    /// Id of the history entry preceding the message being processed
    pub fn previous_id(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    pub fn memory(&self) -> &Memory {
        &*self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut *self.memory
    }

    pub fn paginator(&mut self) -> &mut Paginator {
        &mut *self.paginator
    }

    // ========================================================================
    // Replies
    // ========================================================================

    /// Queue a reply threaded to the message being processed, shown the
    /// way that message asked replies to be shown
    pub fn reply_with(
        &mut self,
        text: impl Into<String>,
        kind: MessageType,
        checkpoint: Option<Checkpoint>,
    ) -> MessageId {
        let message = Message::create(
            text,
            kind,
            Some(self.message.id.clone()),
            self.message.kernel_display,
        );
        let id = message.id.clone();
        self.replies.push(Reply {
            message,
            checkpoint,
        });
        id
    }

    pub fn reply(&mut self, text: impl Into<String>) -> MessageId {
        self.reply_with(text, MessageType::Bot, None)
    }

    pub fn reply_checkpoint(
        &mut self,
        text: impl Into<String>,
        checkpoint: Checkpoint,
    ) -> MessageId {
        self.reply_with(text, MessageType::Bot, Some(checkpoint))
    }

    pub fn reply_error(&mut self, text: impl Into<String>, checkpoint: Checkpoint) -> MessageId {
        self.reply_with(text, MessageType::Error, Some(checkpoint))
    }

    /// Reply with an option list, preceded by `text` when given
    pub fn reply_options(
        &mut self,
        options: &[OptionItem],
        layout: OptionLayout,
        text: Option<&str>,
        checkpoint: Option<Checkpoint>,
    ) -> MessageId {
        let markup = render_options(options, layout);
        let body = match text {
            Some(text) => format!("{text}\n{markup}"),
            None => markup,
        };
        self.reply_with(body, MessageType::Bot, checkpoint)
    }

    pub fn open_panel(&mut self, url: &str, title: &str) -> MessageId {
        self.reply(render_panel(title, url))
    }

    /// Reply with code the user can copy into a cell
    pub fn reply_code(&mut self, text: &str, code: &str) -> MessageId {
        self.reply(format!("{text}\n{}", render_code(code)))
    }

    pub fn replies(&self) -> &[Reply] {
        &self.replies
    }

    pub fn replies_mut(&mut self) -> &mut [Reply] {
        &mut self.replies
    }

    pub fn into_replies(self) -> Vec<Reply> {
        self.replies
    }
}
