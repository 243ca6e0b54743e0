use hypha_bus::{BusClient, Result};
use hypha_protocol::{Properties, PublishOptions, TopicBuilder};
use serde_json::Value;

/// Publish the current state of a subject to its status topic
///
/// Status values are retained: a subscriber arriving later immediately
/// receives the last published state instead of waiting for the next change.
pub async fn publish_status(client: &BusClient, subject: &str, value: &Value) -> Result<()> {
    client
        .publish(
            &TopicBuilder::status(subject),
            Some(value),
            Properties::default(),
            PublishOptions::retained(),
        )
        .await
}
