//! Message wrappers, outbound normalisation, and enqueue-time validation.
//!
//! Validation here runs synchronously before anything is queued: a malformed
//! payload is the caller's bug and is never treated as a retryable failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Property holding an object's type tag.
pub const TYPE_KEY: &str = "_t";

/// Property holding an object's signature. Signing happens at the provider,
/// so outbound objects never carry one.
pub const SIG_KEY: &str = "_s";

/// Type tag of a plain-text message.
pub const SIMPLE_MESSAGE_TYPE: &str = "tradle.SimpleMessage";

/// Wrap plain text in a simple-message object.
pub fn simple_message(text: &str) -> Value {
    let mut object = Map::new();
    object.insert(TYPE_KEY.to_string(), Value::String(SIMPLE_MESSAGE_TYPE.to_string()));
    object.insert("message".to_string(), Value::String(text.to_string()));
    Value::Object(object)
}

/// What a caller asks the bot to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Plain text, wrapped as a simple message before enqueue.
    Text(String),
    /// A structured object, validated before enqueue.
    Object(Value),
}

impl From<&str> for Outbound {
    fn from(s: &str) -> Self {
        Outbound::Text(s.to_string())
    }
}

impl From<String> for Outbound {
    fn from(s: String) -> Self {
        Outbound::Text(s)
    }
}

impl From<Value> for Outbound {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => Outbound::Text(s),
            other => Outbound::Object(other),
        }
    }
}

impl Outbound {
    /// Whether the object carries a signature that [`normalize`](Self::normalize) will drop.
    pub fn is_signed(&self) -> bool {
        matches!(self, Outbound::Object(Value::Object(map)) if map.contains_key(SIG_KEY))
    }

    /// Produce the object that will actually be queued.
    ///
    /// Text becomes a simple message; objects must be JSON objects with no
    /// `null` anywhere in their tree, and lose their signature property.
    pub fn normalize(self) -> Result<Value, ValidationError> {
        match self {
            Outbound::Text(text) => Ok(simple_message(&text)),
            Outbound::Object(Value::Object(mut map)) => {
                map.remove(SIG_KEY);
                let object = Value::Object(map);
                if let Some(path) = find_null(&object, "") {
                    return Err(ValidationError::UndefinedValue(path));
                }
                Ok(object)
            }
            Outbound::Object(_) => Err(ValidationError::InvalidField {
                field: "object".to_string(),
                reason: "expected object or string".to_string(),
            }),
        }
    }
}

/// Return the path of the first `null` inside `value`, if any.
pub fn find_null(value: &Value, path: &str) -> Option<String> {
    match value {
        Value::Null => Some(if path.is_empty() { "$".to_string() } else { path.to_string() }),
        Value::Object(map) => map.iter().find_map(|(k, v)| {
            let child = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
            find_null(v, &child)
        }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, v)| find_null(v, &format!("{path}[{i}]"))),
        _ => None,
    }
}

/// Validate a recipient or author id.
pub fn validate_user_id(field: &str, id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

/// A message received from a counterparty, as delivered by the provider.
///
/// Only `author` and `object` are required; everything else the provider
/// attaches is preserved verbatim in `extra` and recorded in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundWrapper {
    pub author: String,
    /// The signed message; its own `object` property is the payload.
    pub object: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundWrapper {
    /// Parse and validate a raw wrapper. Like outbound objects, it may not
    /// contain `null` anywhere.
    pub fn from_value(raw: Value) -> Result<Self, ValidationError> {
        let Value::Object(map) = &raw else {
            return Err(ValidationError::InvalidField {
                field: "wrapper".to_string(),
                reason: "expected object".to_string(),
            });
        };

        match map.get("author") {
            Some(Value::String(author)) => validate_user_id("author", author)?,
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "author".to_string(),
                    reason: "expected string".to_string(),
                });
            }
            None => return Err(ValidationError::MissingField("author".to_string())),
        }

        match map.get("object") {
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "object".to_string(),
                    reason: "expected object".to_string(),
                });
            }
            None => return Err(ValidationError::MissingField("object".to_string())),
        }

        if let Some(path) = find_null(&raw, "") {
            return Err(ValidationError::UndefinedValue(path));
        }

        serde_json::from_value(raw).map_err(|e| ValidationError::InvalidField {
            field: "wrapper".to_string(),
            reason: e.to_string(),
        })
    }

    /// The message link: top-level `link`, else `objectinfo.link`.
    pub fn message_link(&self) -> Option<&str> {
        self.link.as_deref().or_else(|| {
            self.extra
                .get("objectinfo")
                .and_then(|info| info.get("link"))
                .and_then(Value::as_str)
        })
    }

    /// The payload inside the signed message, or `Null` if absent.
    pub fn payload(&self) -> Value {
        self.object.get("object").cloned().unwrap_or(Value::Null)
    }

    /// The wrapper as it is recorded in history, flagged inbound.
    pub fn to_history_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("inbound".to_string(), Value::Bool(true));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_becomes_simple_message() {
        let object = Outbound::from("hi").normalize().unwrap();
        assert_eq!(object, json!({"_t": "tradle.SimpleMessage", "message": "hi"}));
    }

    #[test]
    fn signature_is_stripped() {
        let signed = Outbound::Object(json!({"_t": "tradle.Form", "_s": "sig", "a": 1}));
        assert!(signed.is_signed());
        let object = signed.normalize().unwrap();
        assert_eq!(object, json!({"_t": "tradle.Form", "a": 1}));
    }

    #[test]
    fn nested_null_is_rejected_with_path() {
        let err = Outbound::Object(json!({"a": {"b": [1, null]}}))
            .normalize()
            .unwrap_err();
        match err {
            ValidationError::UndefinedValue(path) => assert_eq!(path, "a.b[1]"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = Outbound::Object(json!(42)).normalize().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { .. }));
    }

    #[test]
    fn wrapper_requires_author_and_object() {
        let missing_author = InboundWrapper::from_value(json!({"object": {}}));
        assert!(matches!(missing_author, Err(ValidationError::MissingField(f)) if f == "author"));

        let bad_object = InboundWrapper::from_value(json!({"author": "ted", "object": "hey"}));
        assert!(matches!(bad_object, Err(ValidationError::InvalidField { .. })));

        let empty_author = InboundWrapper::from_value(json!({"author": " ", "object": {}}));
        assert!(empty_author.is_err());
    }

    #[test]
    fn wrapper_with_null_anywhere_is_rejected() {
        let err = InboundWrapper::from_value(json!({
            "author": "ted",
            "object": {"object": {"a": null}}
        }))
        .unwrap_err();
        match err {
            ValidationError::UndefinedValue(path) => assert_eq!(path, "object.object.a"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = InboundWrapper::from_value(json!({
            "author": "ted",
            "object": {},
            "link": null
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::UndefinedValue(path) if path == "link"));
    }

    #[test]
    fn wrapper_preserves_extra_fields_and_finds_link() {
        let wrapper = InboundWrapper::from_value(json!({
            "author": "ted",
            "object": {"_t": "tradle.Message", "object": simple_message("hey")},
            "objectinfo": {"link": "abc123"},
            "metadata": {"seq": 1}
        }))
        .unwrap();

        assert_eq!(wrapper.message_link(), Some("abc123"));
        assert_eq!(wrapper.payload(), simple_message("hey"));

        let recorded = wrapper.to_history_value();
        assert_eq!(recorded["inbound"], json!(true));
        assert_eq!(recorded["metadata"], json!({"seq": 1}));
        assert_eq!(recorded["author"], json!("ted"));
    }
}
