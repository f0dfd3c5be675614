//! Process and per-instance configuration

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Number of options shown per page before a "More..." link is added
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Which bot drives newly created instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotKind {
    #[default]
    Newton,
    Dummy,
}

impl BotKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "newton" => Some(Self::Newton),
            "dummy" => Some(Self::Dummy),
            _ => None,
        }
    }
}

/// Process-wide configuration read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding `subjects.json`, `regexes.json` and the files they redirect to
    pub data_dir: PathBuf,
    pub page_size: usize,
    pub bot: BotKind,
    /// When set, instances are restored from and saved to `<dir>/<instance>.json`
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            page_size: DEFAULT_PAGE_SIZE,
            bot: BotKind::default(),
            snapshot_dir: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("NEWTON_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            page_size: std::env::var("NEWTON_PAGE_SIZE")
                .ok()
                .and_then(|size| size.parse().ok())
                .filter(|size: &usize| *size > 0)
                .unwrap_or(defaults.page_size),
            bot: std::env::var("NEWTON_BOT")
                .ok()
                .and_then(|name| {
                    let kind = BotKind::parse(&name);
                    if kind.is_none() {
                        tracing::warn!(bot = %name, "Unknown NEWTON_BOT, using newton");
                    }
                    kind
                })
                .unwrap_or(defaults.bot),
            snapshot_dir: std::env::var("NEWTON_SNAPSHOT_DIR").ok().map(PathBuf::from),
        }
    }
}

// ============================================================================
// Instance configuration
// ============================================================================

/// Flags shared with the front end through `config` operations
///
/// The front end may set keys the backend knows nothing about, so this is
/// an open map with typed accessors for the flags the backend reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceConfig(Map<String, Value>);

const DEFAULT_FLAGS: &[(&str, bool)] = &[
    ("process_in_kernel", true),
    ("enable_autocomplete", true),
    ("enable_auto_loading", false),
    ("loading", false),
    ("show_replied", false),
    ("show_index", false),
    ("show_time", true),
    ("show_build_messages", true),
    ("show_kernel_messages", true),
];

impl Default for InstanceConfig {
    fn default() -> Self {
        Self(
            DEFAULT_FLAGS
                .iter()
                .map(|(key, value)| ((*key).to_string(), Value::Bool(*value)))
                .collect(),
        )
    }
}

impl InstanceConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Apply a `config` operation. Without `update` mode an existing key is kept.
    pub fn apply(&mut self, key: &str, value: Value, update: bool) -> &Value {
        if update || !self.0.contains_key(key) {
            self.0.insert(key.to_string(), value);
        }
        &self.0[key]
    }

    fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn process_in_kernel(&self) -> bool {
        self.flag("process_in_kernel")
    }

    pub fn enable_autocomplete(&self) -> bool {
        self.flag("enable_autocomplete")
    }
}

/// Input type of a bot configuration field, as the front end renders it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
}

/// Configuration inputs of a bot: field name to its input type and the
/// options of that input (`{"value": <default>}`)
pub type ConfigFields = BTreeMap<&'static str, (FieldKind, Value)>;
