//! Chat instances
//!
//! An instance owns one conversation: its history, scratch memory, front end
//! configuration and the bot answering it. Every inbound operation is
//! handled to completion and produces a batch of outbound operations.

use crate::bot::Bot;
use crate::config::{BotKind, InstanceConfig};
use crate::knowledge::{Knowledge, LoadError};
use crate::message::{KernelProcess, Message, MessageId};
use crate::pagination::Paginator;
use crate::protocol::{Inbound, Outbound};
use crate::state_machine::{Context, Memory};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("sync-message requires a message id")]
    MissingId,
    #[error("Message {0} not found")]
    UnknownMessage(MessageId),
    #[error("Invalid message update: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Invalid instance name {0:?}")]
    InvalidName(String),
    #[error("Snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Which full-history operation to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Init,
    Refresh,
}

// ============================================================================
// Chat
// ============================================================================

/// Conversation data shared between an instance and its bot
#[derive(Debug)]
pub struct Chat {
    name: String,
    history: Vec<Message>,
    index: HashMap<MessageId, usize>,
    pub memory: Memory,
    pub paginator: Paginator,
    pub config: InstanceConfig,
    outbox: Vec<Outbound>,
}

impl Chat {
    pub fn new(name: impl Into<String>, page_size: usize) -> Self {
        Self {
            name: name.into(),
            history: Vec::new(),
            index: HashMap::new(),
            memory: Memory::default(),
            paginator: Paginator::new(page_size),
            config: InstanceConfig::default(),
            outbox: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.index.get(id).map(|&position| &self.history[position])
    }

    /// Append to the history without notifying the front end
    pub fn push(&mut self, message: Message) {
        self.index.insert(message.id.clone(), self.history.len());
        self.history.push(message);
    }

    pub fn send(&mut self, operation: Outbound) {
        self.outbox.push(operation);
    }

    /// Append to the history and send it as a `reply`
    pub fn reply_message(&mut self, message: Message) {
        self.push(message.clone());
        self.send(Outbound::Reply { message });
    }

    /// Send the whole history with the configuration
    pub fn sync(&mut self, kind: SyncKind) {
        let history = self.history.clone();
        let config = self.config.clone();
        self.send(match kind {
            SyncKind::Init => Outbound::Init { history, config },
            SyncKind::Refresh => Outbound::Refresh { history, config },
        });
    }

    fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }
}

/// Merge `update` into `original`, descending into nested objects
fn apply_partial(original: &mut Value, update: Map<String, Value>) {
    let Value::Object(target) = original else {
        *original = Value::Object(update);
        return;
    };
    for (key, value) in update {
        match value {
            Value::Object(nested) if target.get(&key).is_some_and(Value::is_object) => {
                if let Some(existing) = target.get_mut(&key) {
                    apply_partial(existing, nested);
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}

// ============================================================================
// Instance
// ============================================================================

pub struct ChatInstance {
    kind: BotKind,
    bot: Box<dyn Bot>,
    chat: Chat,
}

impl ChatInstance {
    /// Create an instance and let its bot greet the user
    pub fn start(
        name: impl Into<String>,
        kind: BotKind,
        knowledge: &Knowledge,
        page_size: usize,
        data: &Map<String, Value>,
    ) -> Self {
        let mut bot = kind.create(knowledge);
        let mut chat = Chat::new(name, page_size);
        bot.start(&mut chat, data);
        tracing::info!(instance = %chat.name, bot = kind.name(), "Chat instance started");
        Self { kind, bot, chat }
    }

    pub fn name(&self) -> &str {
        self.chat.name()
    }

    pub fn kind(&self) -> BotKind {
        self.kind
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    /// Outbound `init` with the current history
    pub fn init(&mut self) -> Vec<Outbound> {
        self.chat.sync(SyncKind::Init);
        self.chat.take_outbox()
    }

    /// Handle one inbound operation; failures become an `error` operation
    pub fn receive(&mut self, operation: Inbound) -> Vec<Outbound> {
        let command = operation.operation();
        if let Err(e) = self.dispatch(operation) {
            tracing::warn!(instance = %self.chat.name, command, error = %e, "Operation failed");
            self.chat.send(Outbound::Error {
                command: command.to_string(),
                message: e.to_string(),
            });
        }
        self.chat.take_outbox()
    }

    fn dispatch(&mut self, operation: Inbound) -> Result<(), InstanceError> {
        match operation {
            Inbound::Message { message } => self.receive_message(message),
            Inbound::Refresh => self.bot.refresh(&mut self.chat),
            Inbound::AutocompleteQuery { request_id, query }
            | Inbound::Query { request_id, query } => {
                if self.chat.config.enable_autocomplete() {
                    self.bot
                        .process_autocomplete(&mut self.chat, request_id, &query)?;
                } else {
                    self.chat.send(Outbound::AutocompleteResponse {
                        response_id: request_id,
                        items: Vec::new(),
                    });
                }
            }
            Inbound::Config { key, value, mode } => {
                let update = mode.as_deref() == Some("update");
                let current = self.chat.config.apply(&key, value, update).clone();
                let mut config = Map::new();
                config.insert(key, current);
                self.chat.send(Outbound::UpdateConfig { config });
            }
            Inbound::SyncMessage { message } => self.sync_message(message)?,
        }
        Ok(())
    }

    fn receive_message(&mut self, message: Message) {
        self.chat.reply_message(message.clone());

        let process = (message.kernel_process == KernelProcess::Process
            && self.chat.config.process_in_kernel())
            || message.kernel_process == KernelProcess::Force;
        if !process {
            return;
        }

        let previous = self
            .chat
            .history
            .len()
            .checked_sub(2)
            .map(|position| self.chat.history[position].id.clone());
        let mut ctx = Context::new(
            &message,
            previous,
            &mut self.chat.memory,
            &mut self.chat.paginator,
        );
        self.bot.process_message(&mut ctx);
        let replies = ctx.into_replies();
        tracing::debug!(instance = %self.chat.name, replies = replies.len(), "Message processed");
        for reply in replies {
            self.chat.reply_message(reply.message);
        }
    }

    fn sync_message(&mut self, partial: Value) -> Result<(), InstanceError> {
        let Value::Object(partial) = partial else {
            return Err(InstanceError::MissingId);
        };
        let id = partial
            .get("id")
            .and_then(Value::as_str)
            .ok_or(InstanceError::MissingId)?
            .to_string();
        let position = *self
            .chat
            .index
            .get(&id)
            .ok_or_else(|| InstanceError::UnknownMessage(id.clone()))?;

        let mut merged = serde_json::to_value(&self.chat.history[position])?;
        apply_partial(&mut merged, partial);
        let message: Message = serde_json::from_value(merged)?;
        self.chat.history[position] = message.clone();
        self.chat.send(Outbound::UpdateMessage { message });
        Ok(())
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Serializable state of an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub mode: BotKind,
    pub history: Vec<Message>,
    pub memory: Memory,
    pub config: InstanceConfig,
    #[serde(default)]
    pub bot: Value,
}

fn snapshot_path(dir: &Path, name: &str) -> Result<PathBuf, InstanceError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(InstanceError::InvalidName(name.to_string()));
    }
    Ok(dir.join(format!("{name}.json")))
}

impl ChatInstance {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            name: self.chat.name.clone(),
            mode: self.kind,
            history: self.chat.history.clone(),
            memory: self.chat.memory.clone(),
            config: self.chat.config.clone(),
            bot: self.bot.save(),
        }
    }

    /// Rebuild an instance from a snapshot
    ///
    /// Dialogue state and checkpoints are not part of a snapshot, so the
    /// restored conversation starts in the default state.
    pub fn restore(snapshot: Snapshot, knowledge: &Knowledge, page_size: usize) -> Self {
        let mut bot = snapshot.mode.create(knowledge);
        bot.load(&snapshot.bot);
        let mut chat = Chat::new(snapshot.name, page_size);
        for message in snapshot.history {
            chat.push(message);
        }
        chat.memory = snapshot.memory;
        chat.config = snapshot.config;
        Self {
            kind: snapshot.mode,
            bot,
            chat,
        }
    }

    /// Write the snapshot to `<dir>/<name>.json`
    pub fn save(&self, dir: &Path) -> Result<PathBuf, InstanceError> {
        let path = snapshot_path(dir, self.name())?;
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::create_dir_all(dir).map_err(|source| InstanceError::Snapshot {
            path: dir.to_path_buf(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| InstanceError::Snapshot {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Read every snapshot in `dir`
    pub fn load_snapshots(dir: &Path) -> Result<Vec<Snapshot>, InstanceError> {
        let io_error = |source| InstanceError::Snapshot {
            path: dir.to_path_buf(),
            source,
        };
        let mut snapshots = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|source| {
                InstanceError::Snapshot {
                    path: path.clone(),
                    source,
                }
            })?;
            snapshots.push(serde_json::from_str(&content)?);
        }
        snapshots.sort_by(|a: &Snapshot, b| a.name.cmp(&b.name));
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::NewtonBot;
    use crate::handlers::options::INVALID_OPTION;
    use crate::handlers::NOT_UNDERSTOOD;
    use crate::knowledge::rules::RULES_FILE;
    use crate::knowledge::subjects::SUBJECTS_FILE;
    use crate::knowledge::testing::write_definition;
    use crate::message::{MessageDisplay, MessageType};
    use crate::pagination::MORE_LABEL;
    use serde_json::json;
    use tempfile::TempDir;

    fn subjects() -> Value {
        json!([
            {
                "name": ["Pandas", "Dataframes"],
                "description": "Tabular data library",
                "url": "https://pandas.pydata.org",
                "children": [{"name": "Describe", "description": "Summary statistics"}]
            }
        ])
    }

    fn setup() -> (TempDir, Knowledge) {
        let dir = TempDir::new().unwrap();
        write_definition(dir.path(), SUBJECTS_FILE, &subjects());
        write_definition(
            dir.path(),
            RULES_FILE,
            &json!([
                {"regex": "^describe a column$", "state": "data?select_column"},
                {"regex": "^classification steps$", "state": "classification?steps"}
            ]),
        );
        let knowledge = Knowledge::load(dir.path()).unwrap();
        (dir, knowledge)
    }

    fn newton(knowledge: &Knowledge) -> ChatInstance {
        ChatInstance::start("base", BotKind::Newton, knowledge, 5, &Map::new())
    }

    /// Send a user message; returns the bot replies that followed the echo
    fn send(instance: &mut ChatInstance, text: &str, reply: Option<&str>) -> Vec<Message> {
        let message = Message::user(text, reply.map(str::to_string));
        let outbound = instance.receive(Inbound::Message {
            message: message.clone(),
        });
        let mut messages = outbound.into_iter().map(|operation| match operation {
            Outbound::Reply { message } => message,
            other => panic!("unexpected {other:?}"),
        });
        assert_eq!(messages.next().as_ref(), Some(&message));
        messages.collect()
    }

    #[test]
    fn test_start_greets() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let outbound = instance.init();
        let Outbound::Init { history, config } = &outbound[0] else {
            panic!("expected init");
        };
        assert_eq!(history[0].text, crate::bot::GREETING);
        assert!(config.process_in_kernel());
    }

    #[test]
    fn test_url_opens_panel_and_stays_default() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let replies = send(&mut instance, "https://example.com/docs", None);
        assert_eq!(
            replies[0].text,
            "####web-panel#:URL View#:https://example.com/docs"
        );
        let replies = send(&mut instance, "zebra", None);
        assert_eq!(replies[0].text, NOT_UNDERSTOOD);
    }

    #[test]
    fn test_reply_selects_option() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let replies = send(&mut instance, "!subject Pandas", None);
        let options = replies.last().unwrap();
        assert!(options.text.contains("Pandas::url::bot::Documentation"));

        let replies = send(&mut instance, "2", Some(&options.id));
        assert_eq!(
            replies[0].text,
            "####web-panel#:Pandas#:https://pandas.pydata.org"
        );
        assert_eq!(replies[0].reply.as_deref(), Some(instance.chat().history()[3].id.as_str()));
    }

    #[test]
    fn test_two_question_form() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let replies = send(&mut instance, "describe a column", None);
        assert_eq!(replies[0].text, "Please, write the expression of the dataframe");
        let replies = send(&mut instance, "sales", Some(&replies[0].id));
        assert_eq!(replies[0].text, "Please, write the column name");
        let replies = send(&mut instance, "price", Some(&replies[0].id));
        assert!(replies[0].text.ends_with("sales['price'].describe()"));

        let memory = &instance.chat().memory;
        assert_eq!(memory.get_str("dataframe"), Some("sales"));
        assert_eq!(memory.get_str("column"), Some("price"));
    }

    #[test]
    fn test_invalid_option_keeps_waiting() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let replies = send(&mut instance, "classification steps", None);
        assert_eq!(replies.len(), 2);
        assert!(replies[1].text.starts_with("####ul#:"));

        let replies = send(&mut instance, "gamma", None);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, INVALID_OPTION);

        let replies = send(&mut instance, "!debug", None);
        assert!(replies[0].text.contains("OptionSelection"), "{}", replies[0].text);
        assert!(replies[0].text.contains("Retry"));

        let replies = send(&mut instance, "Validation", None);
        assert!(replies.iter().all(|reply| reply.text != INVALID_OPTION));
        let replies = send(&mut instance, "!debug", None);
        assert!(!replies[0].text.contains("OptionSelection"));
    }

    #[test]
    fn test_subject_edit_changes_search() {
        let (dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let replies = send(&mut instance, "zebra", None);
        assert_eq!(replies[0].text, NOT_UNDERSTOOD);

        let mut edited = subjects();
        edited
            .as_array_mut()
            .unwrap()
            .push(json!({"name": "Zebra", "description": "Striped"}));
        write_definition(dir.path(), SUBJECTS_FILE, &edited);

        let replies = send(&mut instance, "zebra", None);
        assert!(replies[0].text.starts_with("I found 1 subjects"));
        assert!(replies[1].text.contains("Zebra::bot::Zebra"));
    }

    /// Keys listed in an option list reply
    fn option_keys(text: &str) -> Vec<String> {
        text.lines()
            .filter_map(|line| line.strip_prefix('-'))
            .filter_map(|line| line.split("::bot::").next())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_more_pages_list_every_subject_once() {
        let dir = TempDir::new().unwrap();
        let topics: Vec<Value> = (1..=7)
            .map(|i| json!({"name": format!("Topic {i}"), "description": "A topic"}))
            .collect();
        write_definition(dir.path(), SUBJECTS_FILE, &Value::Array(topics));
        write_definition(dir.path(), RULES_FILE, &json!([]));
        let knowledge = Knowledge::load(dir.path()).unwrap();
        let mut instance =
            ChatInstance::start("base", BotKind::Newton, &knowledge, 2, &Map::new());

        let replies = send(&mut instance, "topic", None);
        assert_eq!(replies.len(), 3);
        assert!(replies[0].text.starts_with("I found 7 subjects"));
        assert_eq!(replies[1].text, "Showing 1..2 (page 1)");
        let mut options = replies[2].clone();
        let mut seen = Vec::new();
        let mut headers = Vec::new();
        for page_id in 0..2 {
            let keys = option_keys(&options.text);
            assert_eq!(keys.len(), 3);
            assert_eq!(keys[2], format!("<page {page_id}>"));
            seen.extend(keys[..2].iter().cloned());

            let replies = send(&mut instance, MORE_LABEL, Some(&options.id));
            assert_eq!(replies.len(), 2);
            headers.push(replies[0].text.clone());
            options = replies[1].clone();
        }
        assert_eq!(headers, ["Showing 3..4 (page 2)", "Showing 5..7 (page 3)"]);
        let last = option_keys(&options.text);
        assert!(!options.text.contains(MORE_LABEL));
        assert_eq!(last.len(), 3);
        seen.extend(last);

        seen.sort();
        let expected: Vec<String> = (1..=7).map(|i| format!("Topic {i}")).collect();
        assert_eq!(seen, expected);

        // Page keys keep counting within the conversation
        let replies = send(&mut instance, "topic", None);
        assert_eq!(option_keys(&replies[2].text)[2], "<page 2>");
        let mut other = ChatInstance::start("other", BotKind::Newton, &knowledge, 2, &Map::new());
        let replies = send(&mut other, "topic", None);
        assert_eq!(option_keys(&replies[2].text)[2], "<page 0>");
    }

    #[test]
    fn test_kernel_process_gating() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);

        let mut message = Message::user("zebra", None);
        message.kernel_process = KernelProcess::Prevent;
        let outbound = instance.receive(Inbound::Message { message });
        assert_eq!(outbound.len(), 1);

        instance.receive(Inbound::Config {
            key: "process_in_kernel".to_string(),
            value: json!(false),
            mode: Some("update".to_string()),
        });
        let outbound = instance.receive(Inbound::Message {
            message: Message::user("zebra", None),
        });
        assert_eq!(outbound.len(), 1);

        let mut message = Message::user("zebra", None);
        message.kernel_process = KernelProcess::Force;
        let outbound = instance.receive(Inbound::Message { message });
        assert_eq!(outbound.len(), 2);
    }

    #[test]
    fn test_config_without_update_keeps_value() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let outbound = instance.receive(Inbound::Config {
            key: "show_time".to_string(),
            value: json!(false),
            mode: None,
        });
        let Outbound::UpdateConfig { config } = &outbound[0] else {
            panic!("expected update-config");
        };
        assert_eq!(config["show_time"], json!(true));
    }

    #[test]
    fn test_sync_message_merges() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let id = instance.chat().history()[0].id.clone();
        let outbound = instance.receive(Inbound::SyncMessage {
            message: json!({"id": id, "feedback": {"rate": 1}, "display": 1}),
        });
        let Outbound::UpdateMessage { message } = &outbound[0] else {
            panic!("expected update-message");
        };
        assert_eq!(message.feedback.rate, 1);
        assert_eq!(message.feedback.reason, "");
        assert_eq!(message.display, MessageDisplay::Hidden);
        assert_eq!(instance.chat().message(&id), Some(message));
    }

    #[test]
    fn test_sync_unknown_message_is_error() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let outbound = instance.receive(Inbound::SyncMessage {
            message: json!({"id": "nope"}),
        });
        let Outbound::Error { command, message } = &outbound[0] else {
            panic!("expected error");
        };
        assert_eq!(command, "sync-message");
        assert_eq!(message, "Message nope not found");
    }

    #[test]
    fn test_autocomplete_respects_config() {
        let (_dir, knowledge) = setup();
        let mut instance = newton(&knowledge);
        let outbound = instance.receive(Inbound::AutocompleteQuery {
            request_id: json!(1),
            query: "pandas".to_string(),
        });
        let Outbound::AutocompleteResponse { response_id, items } = &outbound[0] else {
            panic!("expected autocomplete-response");
        };
        assert_eq!(*response_id, json!(1));
        assert_eq!(items[0].key, "Pandas");

        let mut dummy = ChatInstance::start("echo", BotKind::Dummy, &knowledge, 5, &Map::new());
        let outbound = dummy.receive(Inbound::Query {
            request_id: json!(2),
            query: "pandas".to_string(),
        });
        assert!(matches!(
            &outbound[0],
            Outbound::AutocompleteResponse { items, .. } if items.is_empty()
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (_dir, knowledge) = setup();
        let snapshots = TempDir::new().unwrap();
        let mut instance = newton(&knowledge);
        send(&mut instance, "describe a column", None);
        let path = instance.save(snapshots.path()).unwrap();
        assert!(path.ends_with("base.json"));

        let loaded = ChatInstance::load_snapshots(snapshots.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        let restored = ChatInstance::restore(loaded[0].clone(), &knowledge, 5);
        assert_eq!(restored.kind(), BotKind::Newton);
        assert_eq!(restored.chat().history(), instance.chat().history());
        let error_free = restored
            .chat()
            .history()
            .iter()
            .all(|m| m.kind != MessageType::Error);
        assert!(error_free);
    }

    #[test]
    fn test_snapshot_rejects_path_names() {
        let (_dir, knowledge) = setup();
        let dir = TempDir::new().unwrap();
        let instance = ChatInstance::start("../x", BotKind::Dummy, &knowledge, 5, &Map::new());
        assert!(matches!(
            instance.save(dir.path()),
            Err(InstanceError::InvalidName(_))
        ));
    }

    #[test]
    fn test_apply_partial_nested() {
        let mut original = json!({"a": {"b": 1, "c": 2}, "d": 3});
        let Value::Object(update) = json!({"a": {"b": 5}, "e": 6}) else {
            unreachable!()
        };
        apply_partial(&mut original, update);
        assert_eq!(original, json!({"a": {"b": 5, "c": 2}, "d": 3, "e": 6}));
    }

    #[test]
    fn test_newton_config_is_empty() {
        assert!(<NewtonBot as Bot>::config().is_empty());
    }
}
