//! Wire-level conventions shared by every Hypha component.
//!
//! The broker moves opaque messages; everything that gives them meaning lives
//! here: topic naming rules, the message/properties model, and the
//! `{result}` / `{error}` reply envelope used by bus procedures.

pub mod message;
pub mod reply;
pub mod topics;

pub use message::{encode_body, Message, Properties, PublishOptions, QoS};
pub use reply::{ErrorBody, Issue, Reply};
pub use topics::{CallId, TopicBuilder};

use thiserror::Error;

/// Error types for payload decoding
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed JSON body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("message has no body")]
    EmptyBody,
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
