//! The reply envelope published by bus procedures.
//!
//! Every reply body is exactly one of `{"result": <any>}` or
//! `{"error": {"message": "...", ...}}`. Validation failures carry a
//! machine-readable `issues` list so callers can distinguish them from
//! generic handler errors.

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One reply to one request
///
/// Externally tagged, which serializes to the exact wire shapes above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Result(Value),
    Error(ErrorBody),
}

impl Reply {
    /// A successful reply carrying the handler's value
    pub fn ok(value: Value) -> Self {
        Reply::Result(value)
    }

    /// A generic error reply
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(ErrorBody {
            message: message.into(),
            issues: None,
        })
    }

    /// A validation error reply with per-field detail
    pub fn validation(issues: Vec<Issue>) -> Self {
        Reply::Error(ErrorBody {
            message: "validation error".to_string(),
            issues: Some(issues),
        })
    }

    /// Encode for publishing
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode a reply body
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The error half of the envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub issues: Option<Vec<Issue>>,
}

/// One per-field validation failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Path of the offending field (e.g. "settings/exposure")
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}
