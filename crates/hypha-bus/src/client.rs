use crate::broker::Broker;
use crate::codec::Frame;
use crate::config::BusConfig;
use crate::connection::{self, Link};
use crate::error::{BusError, Result};
use dashmap::DashMap;
use hypha_protocol::{encode_body, Message, Properties, PublishOptions, QoS};
use serde_json::Value;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// One logical connection to the bus
///
/// Cheap to clone; all clones share the connection. Connection state is
/// never surfaced to callers: a lost TCP link reconnects with backoff, the
/// client re-subscribes its topics, re-sends unacknowledged at-least-once
/// publishes, and queues anything published in the meantime. Pending
/// higher-level exchanges (RPC calls) are not replayed; their owners decide
/// whether to re-issue.
#[derive(Clone)]
pub struct BusClient {
    state: Arc<ClientState>,
    _task: Arc<TaskGuard>,
}

pub(crate) struct ClientState {
    pub(crate) client_id: String,
    pub(crate) config: BusConfig,
    pub(crate) outbound: mpsc::UnboundedSender<Frame>,
    pub(crate) fanout: broadcast::Sender<Message>,
    /// Topics to re-subscribe after a reconnect
    pub(crate) subscriptions: Mutex<HashSet<String>>,
    /// Sequence → waiter for the broker's acknowledgment
    pub(crate) pending_acks: DashMap<u64, oneshot::Sender<()>>,
    /// Sequence → frame to re-send if the connection drops before the ack
    pub(crate) inflight: DashMap<u64, Frame>,
    next_seq: AtomicU64,
}

impl ClientState {
    pub(crate) fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Aborts the connection task when the last client clone is dropped
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl BusClient {
    /// Attach to an in-process broker
    pub fn connect_local(broker: &Broker) -> Self {
        Self::connect_local_with(broker, BusConfig::default())
    }

    /// Attach to an in-process broker with custom configuration
    pub fn connect_local_with(broker: &Broker, config: BusConfig) -> Self {
        Self::start(Link::Local(broker.attach()), config)
    }

    /// Connect to a broker over TCP
    ///
    /// Makes one attempt and fails fast; once established, reconnection is
    /// automatic for the life of the client.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with(addr, BusConfig::default()).await
    }

    /// Connect over TCP with custom configuration
    pub async fn connect_with(addr: SocketAddr, config: BusConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        tracing::debug!("bus connected to {}", addr);
        Ok(Self::start(
            Link::Tcp {
                addr,
                initial: Some(stream),
            },
            config,
        ))
    }

    fn start(link: Link, config: BusConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (fanout, _) = broadcast::channel(config.channel_capacity);
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("hypha-{}", Uuid::new_v4().simple()));

        let state = Arc::new(ClientState {
            client_id,
            config,
            outbound,
            fanout,
            subscriptions: Mutex::new(HashSet::new()),
            pending_acks: DashMap::new(),
            inflight: DashMap::new(),
            next_seq: AtomicU64::new(0),
        });

        let task = tokio::spawn(connection::run(Arc::clone(&state), outbound_rx, link));

        Self {
            state,
            _task: Arc::new(TaskGuard(task)),
        }
    }

    /// Publish one JSON-bodied message
    ///
    /// `payload: None` sends a message with no body, which is distinct from
    /// an empty object. At-least-once publishes resolve when the broker
    /// acknowledges; at-most-once publishes resolve on enqueue.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Option<&Value>,
        properties: Properties,
        options: PublishOptions,
    ) -> Result<()> {
        self.publish_raw(topic, payload.map(encode_body), properties, options)
            .await
    }

    /// Publish one message with an arbitrary byte body
    ///
    /// The bus does not interpret bodies; JSON is convention, not contract.
    pub async fn publish_raw(
        &self,
        topic: &str,
        payload: Option<Vec<u8>>,
        properties: Properties,
        options: PublishOptions,
    ) -> Result<()> {
        let seq = self.state.next_seq();
        let frame = Frame::Publish {
            seq,
            topic: topic.to_string(),
            payload,
            properties,
            qos: options.qos,
            retain: options.retain,
        };

        match options.qos {
            QoS::AtMostOnce => self.send(frame),
            QoS::AtLeastOnce => self.acked(seq, frame).await,
        }
    }

    /// Add topic interest
    ///
    /// Resolves once the broker has registered the subscription, so a
    /// publish awaited after this call cannot race past it.
    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        self.state
            .subscriptions
            .lock()
            .await
            .insert(topic.to_string());

        let seq = self.state.next_seq();
        self.acked(
            seq,
            Frame::Subscribe {
                seq,
                topic: topic.to_string(),
            },
        )
        .await
    }

    /// Remove topic interest
    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.state.subscriptions.lock().await.remove(topic);

        let seq = self.state.next_seq();
        self.acked(
            seq,
            Frame::Unsubscribe {
                seq,
                topic: topic.to_string(),
            },
        )
        .await
    }

    /// A stream of every inbound message on every subscribed topic
    ///
    /// Each stream sees everything; filtering by topic or response topic is
    /// the consumer's responsibility.
    pub fn messages(&self) -> MessageStream {
        MessageStream {
            rx: self.state.fanout.subscribe(),
        }
    }

    fn send(&self, frame: Frame) -> Result<()> {
        self.state
            .outbound
            .send(frame)
            .map_err(|_| BusError::ConnectionClosed)
    }

    async fn acked(&self, seq: u64, frame: Frame) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.state.pending_acks.insert(seq, ack_tx);
        self.state.inflight.insert(seq, frame.clone());

        if let Err(e) = self.send(frame) {
            self.state.pending_acks.remove(&seq);
            self.state.inflight.remove(&seq);
            return Err(e);
        }

        match self.state.config.ack_timeout() {
            None => ack_rx.await.map_err(|_| BusError::ConnectionClosed),
            Some(limit) => match tokio::time::timeout(limit, ack_rx).await {
                Ok(result) => result.map_err(|_| BusError::ConnectionClosed),
                Err(_) => {
                    self.state.pending_acks.remove(&seq);
                    self.state.inflight.remove(&seq);
                    Err(BusError::Timeout(limit))
                }
            },
        }
    }
}

/// Inbound side of a client, handed out by [`BusClient::messages`]
pub struct MessageStream {
    rx: broadcast::Receiver<Message>,
}

impl MessageStream {
    /// Receive the next inbound message
    ///
    /// Returns None once the owning client is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("bus listener lagged by {} messages", n);
                    continue;
                }
            }
        }
    }
}
