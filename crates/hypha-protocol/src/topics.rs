//! Topic naming conventions and helpers
//!
//! Topics are hierarchical, slash-separated strings. The conventions are:
//! - Command topics: the bare subject (e.g. "pump")
//! - Status topics: "status/<subject>" for continuous, retained state
//! - Response topics: "<subject>/<id>/response", one per outstanding call
//!
//! Nothing below the broker enforces these shapes; producers and consumers
//! agree on them by convention, and the response-topic rule is what the RPC
//! layer relies on for correlation.

use std::fmt;
use uuid::Uuid;

/// Helper for building topic names with consistent conventions
pub struct TopicBuilder;

impl TopicBuilder {
    /// Create a command topic name (standard pub/sub)
    ///
    /// # Example
    /// ```
    /// use hypha_protocol::TopicBuilder;
    ///
    /// let topic = TopicBuilder::command("pump");
    /// assert_eq!(topic, "pump");
    /// ```
    pub fn command(subject: &str) -> String {
        subject.to_string()
    }

    /// Create a status topic name for continuous state
    ///
    /// Status topics are conventionally published with the retain flag so
    /// late subscribers immediately see the last known value.
    ///
    /// # Example
    /// ```
    /// use hypha_protocol::TopicBuilder;
    ///
    /// let topic = TopicBuilder::status("pump");
    /// assert_eq!(topic, "status/pump");
    /// ```
    pub fn status(subject: &str) -> String {
        format!("status/{}", subject)
    }

    /// Create an ephemeral response topic for one call
    ///
    /// Uniqueness of the call identity is what prevents cross-talk between
    /// concurrent calls to the same subject.
    ///
    /// # Example
    /// ```
    /// use hypha_protocol::{CallId, TopicBuilder};
    ///
    /// let id = CallId::generate();
    /// let topic = TopicBuilder::response("pump", &id);
    /// assert_eq!(topic, format!("pump/{}/response", id));
    /// ```
    pub fn response(subject: &str, id: &CallId) -> String {
        format!("{}/{}/response", subject, id)
    }
}

/// Probabilistically-unique correlation identity for one call
///
/// Also round-tripped as the correlation token on request and reply, so an
/// intermediary can disambiguate overlapping exchanges without parsing
/// topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallId(String);

impl CallId {
    /// Generate a fresh identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identity as an opaque correlation token
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
