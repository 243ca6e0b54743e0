use crate::error::CallError;
use dashmap::DashMap;
use hypha_bus::BusClient;
use hypha_protocol::{CallId, Properties, PublishOptions, Reply, TopicBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type CallOutcome = Result<Value, CallError>;

/// Per-call options
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Bound on waiting for the response; absent means wait indefinitely,
    /// which is how the rest of the system was built to behave.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn timeout(limit: Duration) -> Self {
        Self {
            timeout: Some(limit),
        }
    }
}

/// Issues calls against procedures bound elsewhere on the bus
///
/// One pending-call table keyed by response topic, fed by a dispatcher task
/// reading the client's inbound stream. Concurrent calls to the same subject
/// are independent: each gets its own response topic and table entry, so
/// there is no head-of-line blocking between unrelated calls.
#[derive(Clone)]
pub struct RpcClient {
    client: BusClient,
    pending: Arc<DashMap<String, oneshot::Sender<CallOutcome>>>,
    _dispatch: Arc<TaskGuard>,
}

struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl RpcClient {
    pub fn new(client: BusClient) -> Self {
        let pending: Arc<DashMap<String, oneshot::Sender<CallOutcome>>> = Arc::new(DashMap::new());

        let mut messages = client.messages();
        let table = Arc::clone(&pending);
        let dispatch = tokio::spawn(async move {
            while let Some(msg) = messages.recv().await {
                let Some((_, waiter)) = table.remove(&msg.topic) else {
                    continue;
                };
                let _ = waiter.send(decode_response(msg.payload.as_deref()));
            }
        });

        Self {
            client,
            pending,
            _dispatch: Arc::new(TaskGuard(dispatch)),
        }
    }

    /// Call a procedure and wait for its one reply
    pub async fn call(&self, topic: &str, payload: Option<&Value>) -> CallOutcome {
        self.call_with(topic, payload, CallOptions::default()).await
    }

    /// Call a procedure with per-call options
    pub async fn call_with(
        &self,
        topic: &str,
        payload: Option<&Value>,
        options: CallOptions,
    ) -> CallOutcome {
        let id = CallId::generate();
        let response_topic = TopicBuilder::response(topic, &id);

        // Subscribe before publishing: a reply that beats the subscription
        // to the broker would otherwise be lost.
        self.client.subscribe(&response_topic).await?;

        let (waiter, response) = oneshot::channel();
        self.pending.insert(response_topic.clone(), waiter);

        let properties = Properties::request(response_topic.clone(), id.as_bytes());
        if let Err(e) = self
            .client
            .publish(topic, payload, properties, PublishOptions::at_least_once())
            .await
        {
            self.finish(&response_topic).await;
            return Err(e.into());
        }

        let outcome = match options.timeout {
            None => response
                .await
                .unwrap_or_else(|_| Err(CallError::Abandoned)),
            Some(limit) => match tokio::time::timeout(limit, response).await {
                Ok(resolved) => resolved.unwrap_or_else(|_| Err(CallError::Abandoned)),
                Err(_) => Err(CallError::Timeout(limit)),
            },
        };

        self.finish(&response_topic).await;
        outcome
    }

    /// Remove the pending entry (idempotent) and drop the ephemeral topic
    async fn finish(&self, response_topic: &str) {
        self.pending.remove(response_topic);
        if let Err(e) = self.client.unsubscribe(response_topic).await {
            tracing::debug!(topic = %response_topic, "unsubscribe after call failed: {}", e);
        }
    }
}

fn decode_response(payload: Option<&[u8]>) -> CallOutcome {
    let Some(bytes) = payload else {
        return Err(CallError::InvalidResponse("response has no body".to_string()));
    };

    match Reply::decode(bytes) {
        Ok(Reply::Result(value)) => Ok(value),
        Ok(Reply::Error(body)) => Err(CallError::Remote {
            message: body.message,
            issues: body.issues,
        }),
        Err(e) => Err(CallError::InvalidResponse(e.to_string())),
    }
}
