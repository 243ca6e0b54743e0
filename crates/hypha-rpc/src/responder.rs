use crate::error::HandlerError;
use dashmap::DashMap;
use hypha_bus::{BusClient, BusError};
use hypha_protocol::{Message, Properties, PublishOptions, Reply};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;
type Handler = dyn Fn(Option<Value>) -> HandlerFuture + Send + Sync;

/// Binds procedure handlers to topics and answers requests
///
/// Each inbound request is served on its own task, so one slow handler never
/// blocks procedures bound to other topics. A handler runs at most once per
/// inbound message and produces exactly one reply, success or failure.
pub struct Responder {
    client: BusClient,
    bindings: Arc<DashMap<String, Arc<Handler>>>,
    _dispatch: TaskGuard,
}

struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Responder {
    pub fn new(client: BusClient) -> Self {
        let bindings: Arc<DashMap<String, Arc<Handler>>> = Arc::new(DashMap::new());

        let mut messages = client.messages();
        let table = Arc::clone(&bindings);
        let reply_client = client.clone();
        let dispatch = tokio::spawn(async move {
            while let Some(msg) = messages.recv().await {
                let Some(handler) = table.get(&msg.topic).map(|h| h.value().clone()) else {
                    continue;
                };
                tokio::spawn(respond(reply_client.clone(), handler, msg));
            }
        });

        Self {
            client,
            bindings,
            _dispatch: TaskGuard(dispatch),
        }
    }

    /// Bind a handler to a topic
    ///
    /// A later binding on the same topic replaces the earlier one; the
    /// replacement is logged since it usually means two components claimed
    /// the same procedure name.
    pub async fn bind<F, Fut>(&self, topic: &str, handler: F) -> Result<(), BusError>
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.client.subscribe(topic).await?;

        let handler: Arc<Handler> =
            Arc::new(move |payload| -> HandlerFuture { Box::pin(handler(payload)) });
        if self
            .bindings
            .insert(topic.to_string(), handler)
            .is_some()
        {
            tracing::warn!(topic, "replacing existing procedure binding");
        }

        Ok(())
    }

    /// Topics currently bound
    pub fn bound_topics(&self) -> Vec<String> {
        self.bindings.iter().map(|e| e.key().clone()).collect()
    }
}

/// Serve one request end to end
async fn respond(client: BusClient, handler: Arc<Handler>, msg: Message) {
    // A request that cannot carry a reply is not served; every bound
    // procedure answers, there is no fire-and-forget shape.
    let Some(response_topic) = msg.properties.response_topic.clone() else {
        tracing::debug!(topic = %msg.topic, "request without response topic ignored");
        return;
    };
    let correlation = msg.properties.correlation.clone();

    // Decode the body, tolerating its absence. A malformed body is answered,
    // not dropped; the handler is not invoked for it.
    let payload = match msg.json() {
        Ok(payload) => payload,
        Err(e) => {
            send_reply(&client, &response_topic, correlation, Reply::error(e.to_string())).await;
            return;
        }
    };

    let reply = match handler(payload).await {
        Ok(value) => Reply::ok(value),
        Err(HandlerError::Validation(issues)) => {
            tracing::error!(topic = %msg.topic, "procedure input rejected");
            Reply::validation(issues)
        }
        Err(e) => {
            tracing::error!(topic = %msg.topic, error = %e, "procedure handler failed");
            Reply::error(e.to_string())
        }
    };

    send_reply(&client, &response_topic, correlation, reply).await;
}

async fn send_reply(
    client: &BusClient,
    response_topic: &str,
    correlation: Option<Vec<u8>>,
    reply: Reply,
) {
    let body = match serde_json::to_value(&reply) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(topic = %response_topic, "reply not serializable: {}", e);
            return;
        }
    };

    if let Err(e) = client
        .publish(
            response_topic,
            Some(&body),
            Properties::reply(correlation),
            PublishOptions::at_least_once(),
        )
        .await
    {
        tracing::error!(topic = %response_topic, "failed to publish reply: {}", e);
    }
}
