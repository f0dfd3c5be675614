//! Chat message model
//!
//! Messages are the unit exchanged with the UI. Their JSON shape is the
//! rendering contract with the front end, so field names follow its
//! camelCase conventions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type MessageId = String;

/// Semantic tag of a message
///
/// Unknown tags are kept verbatim so newer front ends can introduce
/// message kinds without a backend release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    Bot,
    User,
    Error,
    Options,
    Ordered,
    Cell,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Bot => "bot",
            MessageType::User => "user",
            MessageType::Error => "error",
            MessageType::Options => "options",
            MessageType::Ordered => "ordered",
            MessageType::Cell => "cell",
            MessageType::Other(tag) => tag,
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "bot" => MessageType::Bot,
            "user" => MessageType::User,
            "error" => MessageType::Error,
            "options" => MessageType::Options,
            "ordered" => MessageType::Ordered,
            "cell" => MessageType::Cell,
            _ => MessageType::Other(tag),
        }
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the kernel should run dialogue processing for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum KernelProcess {
    #[default]
    Prevent,
    Process,
    Force,
}

impl From<u8> for KernelProcess {
    fn from(value: u8) -> Self {
        match value {
            1 => KernelProcess::Process,
            2 => KernelProcess::Force,
            _ => KernelProcess::Prevent,
        }
    }
}

impl From<KernelProcess> for u8 {
    fn from(value: KernelProcess) -> Self {
        match value {
            KernelProcess::Prevent => 0,
            KernelProcess::Process => 1,
            KernelProcess::Force => 2,
        }
    }
}

/// Display mode of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum MessageDisplay {
    #[default]
    Default,
    Hidden,
    SupermodeInput,
}

impl From<u8> for MessageDisplay {
    fn from(value: u8) -> Self {
        match value {
            1 => MessageDisplay::Hidden,
            2 => MessageDisplay::SupermodeInput,
            _ => MessageDisplay::Default,
        }
    }
}

impl From<MessageDisplay> for u8 {
    fn from(value: MessageDisplay) -> Self {
        match value {
            MessageDisplay::Default => 0,
            MessageDisplay::Hidden => 1,
            MessageDisplay::SupermodeInput => 2,
        }
    }
}

/// User rating attached to a message after creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default)]
    pub rate: i32,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub otherreason: String,
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default)]
    pub reply: Option<MessageId>,
    #[serde(default)]
    pub display: MessageDisplay,
    #[serde(default)]
    pub kernel_process: KernelProcess,
    #[serde(default)]
    pub kernel_display: MessageDisplay,
    #[serde(default)]
    pub feedback: Feedback,
    #[serde(default)]
    pub loading: bool,
}

impl Message {
    /// Create a message with a fresh id and the current timestamp
    pub fn create(
        text: impl Into<String>,
        kind: MessageType,
        reply: Option<MessageId>,
        display: MessageDisplay,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            kind,
            timestamp: Utc::now().timestamp_millis(),
            reply,
            display,
            kernel_process: KernelProcess::Prevent,
            kernel_display: MessageDisplay::Default,
            feedback: Feedback::default(),
            loading: false,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::create(text, MessageType::Bot, None, MessageDisplay::Default)
    }

    /// A user message that asks the kernel to process it
    pub fn user(text: impl Into<String>, reply: Option<MessageId>) -> Self {
        let mut message = Self::create(text, MessageType::User, reply, MessageDisplay::Default);
        message.kernel_process = KernelProcess::Process;
        message
    }
}

/// A selectable option as presented to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub key: String,
    pub label: String,
}

/// Layout used for option lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionLayout {
    Ordered,
    Unordered,
}

/// Render options into the front end's part markup
pub fn render_options(options: &[OptionItem], layout: OptionLayout) -> String {
    let mode = match layout {
        OptionLayout::Ordered => "ol",
        OptionLayout::Unordered => "ul",
    };
    let lines: Vec<String> = options
        .iter()
        .map(|option| format!("{}::bot::{}", option.key, option.label))
        .collect();
    format!("####{mode}#:\n-{}", lines.join("\n-"))
}

/// Render a side panel opening instruction
pub fn render_panel(title: &str, url: &str) -> String {
    format!("####web-panel#:{title}#:{url}")
}

/// Render a code block the user can copy to a cell
pub fn render_code(code: &str) -> String {
    format!("####code#:\n{code}")
}
