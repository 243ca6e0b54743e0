//! The message model: topic, optional body, and protocol properties.

use crate::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delivery quality requested for one publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    /// Fire once, no acknowledgment
    AtMostOnce,

    /// Acknowledged by the broker; re-sent after a reconnect if unacked
    AtLeastOnce,
}

impl Default for QoS {
    fn default() -> Self {
        QoS::AtMostOnce
    }
}

/// Per-publish delivery options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    pub qos: QoS,

    /// Ask the broker to keep this message as the topic's last value and
    /// hand it to every future subscriber.
    pub retain: bool,
}

impl PublishOptions {
    /// At-least-once delivery, as used for requests and replies
    pub fn at_least_once() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }

    /// Retained at-least-once delivery, as used for status topics
    pub fn retained() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            retain: true,
        }
    }
}

/// Transport-level metadata carried alongside a message
///
/// These are the only channel-native correlation primitives; the RPC layer
/// is built entirely on top of them. Both are round-tripped from request to
/// reply byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    /// Topic the receiver should publish its one reply to
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_topic: Option<String>,

    /// Opaque token echoed from request to reply
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation: Option<Vec<u8>>,
}

impl Properties {
    /// Properties for a request expecting a reply on `response_topic`
    pub fn request(response_topic: impl Into<String>, correlation: &[u8]) -> Self {
        Self {
            response_topic: Some(response_topic.into()),
            correlation: Some(correlation.to_vec()),
        }
    }

    /// Properties for a reply, echoing the request's correlation token
    pub fn reply(correlation: Option<Vec<u8>>) -> Self {
        Self {
            response_topic: None,
            correlation,
        }
    }
}

/// One message as observed by a client
///
/// `payload` is conventionally JSON. An absent payload is a valid, distinct
/// "no body" state and is not the same as an empty object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Option<Vec<u8>>,
    pub properties: Properties,

    /// True when this was the topic's retained value, delivered on subscribe
    pub retained: bool,
}

impl Message {
    /// Decode the body as JSON
    ///
    /// Returns `Ok(None)` for an absent body; a present but malformed body
    /// is an error, never silently dropped.
    pub fn json(&self) -> Result<Option<Value>> {
        match &self.payload {
            None => Ok(None),
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        }
    }

    /// Decode the body as a concrete type
    pub fn json_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        match &self.payload {
            None => Err(ProtocolError::EmptyBody),
            Some(bytes) => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

/// Encode a JSON value as a message body
pub fn encode_body(value: &Value) -> Vec<u8> {
    // Value-to-bytes cannot fail for well-formed Value trees
    serde_json::to_vec(value).unwrap_or_default()
}
