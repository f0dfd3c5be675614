//! JSON operations exchanged with the front end
//!
//! Every payload is a flat object carrying an `operation` tag and the name
//! of the chat `instance` it targets. The reserved instance `<meta>`
//! addresses the manager itself and `<all>` broadcasts to every instance.

use crate::config::{BotKind, ConfigFields, InstanceConfig};
use crate::message::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const META_INSTANCE: &str = "<meta>";
pub const ALL_INSTANCES: &str = "<all>";
pub const BASE_INSTANCE: &str = "base";

// ============================================================================
// Inbound
// ============================================================================

/// Operation addressed to one chat instance
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Inbound {
    Message {
        message: Message,
    },
    Refresh,
    #[serde(rename_all = "camelCase")]
    AutocompleteQuery {
        #[serde(default)]
        request_id: Value,
        #[serde(default)]
        query: String,
    },
    /// Older clients send autocomplete requests under this name
    #[serde(rename_all = "camelCase")]
    Query {
        #[serde(default)]
        request_id: Value,
        #[serde(default)]
        query: String,
    },
    Config {
        key: String,
        value: Value,
        #[serde(rename = "_mode", default)]
        mode: Option<String>,
    },
    SyncMessage {
        /// Partial message; must carry the `id` of a history entry
        message: Value,
    },
}

impl Inbound {
    pub fn operation(&self) -> &'static str {
        match self {
            Inbound::Message { .. } => "message",
            Inbound::Refresh => "refresh",
            Inbound::AutocompleteQuery { .. } => "autocomplete-query",
            Inbound::Query { .. } => "query",
            Inbound::Config { .. } => "config",
            Inbound::SyncMessage { .. } => "sync-message",
        }
    }
}

/// Operation addressed to the instance manager
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum MetaRequest {
    NewInstance {
        name: String,
        #[serde(default)]
        mode: Option<BotKind>,
        #[serde(default)]
        data: Map<String, Value>,
    },
    Refresh,
    RemoveInstance {
        name: String,
    },
    SaveInstances,
}

/// Which instances an inbound operation reaches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Instance(String),
}

/// A parsed inbound line
#[derive(Debug, Clone)]
pub enum Request {
    Meta(MetaRequest),
    Chat { target: Target, operation: Inbound },
}

/// Parse one inbound JSON object
///
/// On failure the `operation` field, when present, is returned alongside the
/// error so it can be echoed back in the `error` reply.
pub fn parse_request(line: &str) -> Result<Request, (String, serde_json::Error)> {
    let value: Value = serde_json::from_str(line).map_err(|e| (undefined(), e))?;
    let operation = value
        .get("operation")
        .and_then(Value::as_str)
        .map_or_else(undefined, str::to_string);
    let instance = value
        .get("instance")
        .and_then(Value::as_str)
        .unwrap_or(BASE_INSTANCE)
        .to_string();

    if instance == META_INSTANCE {
        let request = serde_json::from_value(value).map_err(|e| (operation, e))?;
        return Ok(Request::Meta(request));
    }
    let parsed = serde_json::from_value(value).map_err(|e| (operation, e))?;
    let target = if instance == ALL_INSTANCES {
        Target::All
    } else {
        Target::Instance(instance)
    };
    Ok(Request::Chat {
        target,
        operation: parsed,
    })
}

fn undefined() -> String {
    "<operation undefined>".to_string()
}

// ============================================================================
// Outbound
// ============================================================================

/// Item offered by autocomplete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutocompleteItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
    pub value: String,
    pub url: String,
}

/// Operation sent by one chat instance
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Outbound {
    Init {
        history: Vec<Message>,
        config: InstanceConfig,
    },
    Refresh {
        history: Vec<Message>,
        config: InstanceConfig,
    },
    Reply {
        message: Message,
    },
    UpdateConfig {
        config: Map<String, Value>,
    },
    UpdateMessage {
        message: Message,
    },
    Error {
        command: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    AutocompleteResponse {
        response_id: Value,
        items: Vec<AutocompleteItem>,
    },
}

/// Bot kinds with their configuration fields, and live instances with their kind
#[derive(Debug, Clone, Serialize)]
pub struct MetaSnapshot {
    pub loaders: BTreeMap<&'static str, ConfigFields>,
    pub instances: BTreeMap<String, BotKind>,
}

/// Operation sent by the instance manager
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum MetaOutbound {
    SyncMeta(MetaSnapshot),
    Error { command: String, message: String },
}

/// Outbound payload tagged with the instance that produced it
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub instance: String,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Chat(Outbound),
    Meta(MetaOutbound),
}

impl Envelope {
    pub fn chat(instance: impl Into<String>, payload: Outbound) -> Self {
        Self {
            instance: instance.into(),
            payload: Payload::Chat(payload),
        }
    }

    pub fn meta(payload: MetaOutbound) -> Self {
        Self {
            instance: META_INSTANCE.to_string(),
            payload: Payload::Meta(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_message() {
        let message = serde_json::to_value(Message::user("hi", None)).unwrap();
        let line = json!({"instance": "base", "operation": "message", "message": message});
        let Request::Chat { target, operation } = parse_request(&line.to_string()).unwrap() else {
            panic!("expected a chat request");
        };
        assert_eq!(target, Target::Instance("base".to_string()));
        assert!(matches!(operation, Inbound::Message { ref message } if message.text == "hi"));
    }

    #[test]
    fn test_parse_config_and_autocomplete() {
        let line = r#"{"instance":"<all>","operation":"config","key":"loading","value":true,"_mode":"update"}"#;
        let Request::Chat { target, operation } = parse_request(line).unwrap() else {
            panic!("expected a chat request");
        };
        assert_eq!(target, Target::All);
        assert!(matches!(
            operation,
            Inbound::Config { ref mode, .. } if mode.as_deref() == Some("update")
        ));

        let line = r#"{"instance":"base","operation":"autocomplete-query","requestId":7,"query":"pan"}"#;
        let Request::Chat { operation, .. } = parse_request(line).unwrap() else {
            panic!("expected a chat request");
        };
        assert!(matches!(
            operation,
            Inbound::AutocompleteQuery { ref request_id, .. } if *request_id == json!(7)
        ));
    }

    #[test]
    fn test_parse_meta() {
        let line = r#"{"instance":"<meta>","operation":"new-instance","name":"echo","mode":"dummy"}"#;
        let Request::Meta(MetaRequest::NewInstance { name, mode, .. }) =
            parse_request(line).unwrap()
        else {
            panic!("expected new-instance");
        };
        assert_eq!(name, "echo");
        assert_eq!(mode, Some(BotKind::Dummy));
    }

    #[test]
    fn test_unknown_operation_reports_name() {
        let (operation, _) =
            parse_request(r#"{"instance":"base","operation":"dance"}"#).unwrap_err();
        assert_eq!(operation, "dance");
        let (operation, _) = parse_request("not json").unwrap_err();
        assert_eq!(operation, "<operation undefined>");
    }

    #[test]
    fn test_outbound_shape() {
        let envelope = Envelope::chat(
            "base",
            Outbound::AutocompleteResponse {
                response_id: json!(3),
                items: vec![AutocompleteItem {
                    kind: "subject".to_string(),
                    key: "Pandas".to_string(),
                    value: String::new(),
                    url: String::new(),
                }],
            },
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["instance"], "base");
        assert_eq!(value["operation"], "autocomplete-response");
        assert_eq!(value["responseId"], 3);
        assert_eq!(value["items"][0]["type"], "subject");
    }

    #[test]
    fn test_update_config_shape() {
        let mut config = Map::new();
        config.insert("loading".to_string(), json!(true));
        let value = serde_json::to_value(Envelope::chat(
            "base",
            Outbound::UpdateConfig { config },
        ))
        .unwrap();
        assert_eq!(
            value,
            json!({"instance": "base", "operation": "update-config", "config": {"loading": true}})
        );
    }

    #[test]
    fn test_sync_meta_shape() {
        let loaders = BotKind::all()
            .into_iter()
            .map(|kind| (kind.name(), kind.config_fields()))
            .collect();
        let instances = BTreeMap::from([("base".to_string(), BotKind::Newton)]);
        let value = serde_json::to_value(Envelope::meta(MetaOutbound::SyncMeta(MetaSnapshot {
            loaders,
            instances,
        })))
        .unwrap();
        assert_eq!(value["instance"], META_INSTANCE);
        assert_eq!(value["operation"], "sync-meta");
        assert_eq!(value["loaders"]["newton"], json!({}));
        assert_eq!(
            value["loaders"]["dummy"],
            json!({"format_str": ["text", {"value": "{}, ditto"}]})
        );
        assert_eq!(value["instances"], json!({"base": "newton"}));
    }
}
