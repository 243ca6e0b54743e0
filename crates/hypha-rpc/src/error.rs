use hypha_protocol::Issue;
use thiserror::Error;

/// Error returned to the caller of a bus procedure
#[derive(Error, Debug)]
pub enum CallError {
    /// The responder replied with an error envelope
    #[error("{message}")]
    Remote {
        message: String,
        /// Per-field detail when the failure was a validation error
        issues: Option<Vec<Issue>>,
    },

    /// The response arrived but its body was not a valid envelope
    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    /// The pending call was torn down before any response arrived
    #[error("call abandoned before a response arrived")]
    Abandoned,

    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("bus error: {0}")]
    Bus(#[from] hypha_bus::BusError),
}

impl CallError {
    /// True when the remote failure carried validation issues
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CallError::Remote {
                issues: Some(_),
                ..
            }
        )
    }
}

/// Outcome type for bound procedure handlers
///
/// Handler failures become error envelopes on the wire; they never escape
/// the responder. Validation failures are a distinct variant so callers can
/// machine-read the per-field issues.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),

    #[error("validation error")]
    Validation(Vec<Issue>),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Message(message.into())
    }
}
