use hypha_bus::{BusClient, MessageStream, Result};
use serde_json::Value;

/// Open a lazy, unbounded sequence of future messages on a topic
///
/// The sequence starts at "now": nothing published before this call is
/// replayed, unless the broker holds a retained value for the topic, in
/// which case that value arrives first. A second `watch` on the same topic
/// is an independent sequence. The sequence never completes on its own;
/// stop consuming by dropping the watcher, and call
/// [`Watcher::unsubscribe`] to drop broker-side interest too.
pub async fn watch(client: &BusClient, topic: &str) -> Result<Watcher> {
    // Open the fan-out before subscribing so nothing delivered between the
    // two steps can be missed.
    let stream = client.messages();
    client.subscribe(topic).await?;

    Ok(Watcher {
        client: client.clone(),
        stream,
        topic: topic.to_string(),
    })
}

/// One live watch on one topic
pub struct Watcher {
    client: BusClient,
    stream: MessageStream,
    topic: String,
}

impl Watcher {
    /// Receive the next message on the watched topic, in arrival order
    ///
    /// Bodies are decoded as JSON; a non-JSON body degrades to a string
    /// value and an absent body to null. Returns None only when the owning
    /// client is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let msg = self.stream.recv().await?;
            if msg.topic != self.topic {
                continue;
            }
            return Some(decode(msg.payload));
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Drop broker-side interest in the topic
    pub async fn unsubscribe(self) -> Result<()> {
        self.client.unsubscribe(&self.topic).await
    }
}

fn decode(payload: Option<Vec<u8>>) -> Value {
    match payload {
        None => Value::Null,
        Some(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(_) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        },
    }
}
