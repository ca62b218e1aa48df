//! Protocol messages and their wire representation.
//!
//! A [`Message`] is immutable once built. Its JSON text is rendered once at
//! construction and reused for every response it is written to, so clones
//! share both the fields and the serialized form.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Channel prefix reserved for protocol meta messages.
pub const META_PREFIX: &str = "/meta/";

struct Inner {
    fields: Map<String, Value>,
    json: String,
}

/// A single protocol message with a stable serialized form.
#[derive(Clone)]
pub struct Message(Arc<Inner>);

impl Message {
    /// Start building a message addressed to `channel`.
    #[must_use]
    pub fn builder(channel: impl Into<String>) -> MessageBuilder {
        let mut fields = Map::new();
        fields.insert("channel".into(), Value::String(channel.into()));
        MessageBuilder { fields }
    }

    /// Wrap an already decoded JSON object.
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        let json = Value::Object(fields.clone()).to_string();
        Self(Arc::new(Inner { fields, json }))
    }

    /// Channel the message is addressed to, if present.
    #[must_use]
    pub fn channel(&self) -> Option<&str> { self.get("channel").and_then(Value::as_str) }

    /// Message identifier, if present.
    #[must_use]
    pub fn id(&self) -> Option<&str> { self.get("id").and_then(Value::as_str) }

    /// Client identifier, if present.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> { self.get("clientId").and_then(Value::as_str) }

    /// Returns `true` for messages on a `/meta/` channel.
    #[must_use]
    pub fn is_meta(&self) -> bool { self.channel().is_some_and(|c| c.starts_with(META_PREFIX)) }

    /// Look up a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> { self.0.fields.get(key) }

    /// All top-level fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> { &self.0.fields }

    /// Serialized JSON text, rendered once at construction.
    #[must_use]
    pub fn json(&self) -> &str { &self.0.json }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool { self.0.fields == other.0.fields }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Message").field(&self.0.json).finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.json()) }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::from_fields)
    }
}

/// Builder for [`Message`].
#[derive(Debug)]
#[must_use]
pub struct MessageBuilder {
    fields: Map<String, Value>,
}

impl MessageBuilder {
    /// Set the message identifier.
    pub fn id(self, id: impl Into<String>) -> Self { self.field("id", id.into()) }

    /// Set the client identifier.
    pub fn client_id(self, client_id: impl Into<String>) -> Self {
        self.field("clientId", client_id.into())
    }

    /// Set the `successful` flag carried by meta replies.
    pub fn successful(self, successful: bool) -> Self { self.field("successful", successful) }

    /// Set the application payload.
    pub fn data(self, data: impl Into<Value>) -> Self { self.field("data", data) }

    /// Set an arbitrary top-level field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Freeze the message and render its wire form.
    #[must_use]
    pub fn build(self) -> Message { Message::from_fields(self.fields) }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_preserves_field_order_in_json() {
        let message = Message::builder("/meta/connect")
            .successful(true)
            .id("1")
            .build();
        assert_eq!(
            message.json(),
            r#"{"channel":"/meta/connect","successful":true,"id":"1"}"#
        );
        assert!(message.is_meta());
        assert_eq!(message.id(), Some("1"));
    }

    #[test]
    fn clones_share_the_rendered_json() {
        let message = Message::builder("/foo").data(1).build();
        let clone = message.clone();
        assert!(std::ptr::eq(message.json(), clone.json()));
        assert_eq!(message, clone);
    }

    #[test]
    fn deserializes_from_object() {
        let message: Message =
            serde_json::from_value(json!({"channel": "/chat", "data": {"text": "hi"}}))
                .expect("object should deserialize");
        assert_eq!(message.channel(), Some("/chat"));
        assert!(!message.is_meta());
        assert_eq!(message.get("data"), Some(&json!({"text": "hi"})));
    }
}
