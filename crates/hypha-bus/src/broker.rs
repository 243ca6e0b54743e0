use crate::codec::{read_frame, write_frame, Frame};
use crate::error::Result;
use dashmap::DashMap;
use hypha_protocol::{Properties, QoS};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Topic-addressed publish/subscribe broker
///
/// The broker relays messages by topic; it knows nothing about payload
/// contents, reply envelopes, or correlation. Clients attach either in
/// process (channel pair) or over TCP, and every attached session is served
/// by the same frame handler, so the two links behave identically.
///
/// Retained messages are kept per topic and handed to late subscribers the
/// moment they subscribe.
#[derive(Clone)]
pub struct Broker {
    state: Arc<BrokerState>,
    local_addr: Option<SocketAddr>,
}

struct Retained {
    payload: Vec<u8>,
    properties: Properties,
}

struct BrokerState {
    next_session: AtomicU64,
    /// Session id → frames headed for that client
    sessions: DashMap<u64, mpsc::UnboundedSender<Frame>>,
    /// Topic → sessions subscribed to it (exact match, no wildcards)
    subscriptions: DashMap<String, HashSet<u64>>,
    /// Topic → last retained value
    retained: DashMap<String, Retained>,
}

/// Channel pair connecting an in-process client to the broker
pub(crate) struct LocalLink {
    pub(crate) to_broker: mpsc::UnboundedSender<Frame>,
    pub(crate) from_broker: mpsc::UnboundedReceiver<Frame>,
}

impl Broker {
    /// Create an in-process broker with no network listener
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState {
                next_session: AtomicU64::new(0),
                sessions: DashMap::new(),
                subscriptions: DashMap::new(),
                retained: DashMap::new(),
            }),
            local_addr: None,
        }
    }

    /// Create a broker and start accepting TCP clients on `addr`
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let broker = Self::new();
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        spawn_accept_loop(Arc::clone(&broker.state), listener);

        Ok(Self {
            local_addr: Some(local_addr),
            ..broker
        })
    }

    /// The bound TCP address, if this broker is listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of topics with at least one subscription entry
    pub fn topic_count(&self) -> usize {
        self.state.subscriptions.len()
    }

    /// Number of sessions subscribed to a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .subscriptions
            .get(topic)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Attach an in-process session
    pub(crate) fn attach(&self) -> LocalLink {
        let session = self.state.next_session.fetch_add(1, Ordering::Relaxed);
        let (deliver_tx, deliver_rx) = mpsc::unbounded_channel();
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();

        self.state.sessions.insert(session, deliver_tx);

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                handle_frame(&state, session, frame);
            }
            remove_session(&state, session);
        });

        LocalLink {
            to_broker: frame_tx,
            from_broker: deliver_rx,
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_accept_loop(state: Arc<BrokerState>, listener: TcpListener) {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!("accepted bus connection from {}", addr);
                    spawn_session(Arc::clone(&state), stream);
                }
                Err(e) => {
                    tracing::error!("accept error: {}", e);
                }
            }
        }
    });
}

fn spawn_session(state: Arc<BrokerState>, stream: TcpStream) {
    let session = state.next_session.fetch_add(1, Ordering::Relaxed);
    let (deliver_tx, mut deliver_rx) = mpsc::unbounded_channel();
    state.sessions.insert(session, deliver_tx);

    let (mut read_half, mut write_half) = stream.into_split();

    tokio::spawn(async move {
        while let Some(frame) = deliver_rx.recv().await {
            if let Err(e) = write_frame(&mut write_half, &frame).await {
                tracing::debug!("session {} write side closed: {}", session, e);
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match read_frame(&mut read_half).await {
                Ok(frame) => handle_frame(&state, session, frame),
                Err(e) => {
                    tracing::debug!("session {} closed: {}", session, e);
                    break;
                }
            }
        }
        remove_session(&state, session);
    });
}

/// Process one client frame
///
/// Frames from one session are handled in arrival order, which preserves
/// same-topic publish order from a single publisher end to end.
fn handle_frame(state: &BrokerState, session: u64, frame: Frame) {
    match frame {
        Frame::Connect { client_id } => {
            tracing::debug!(client = %client_id, session, "bus client connected");
            send_to(state, session, Frame::ConnAck);
        }

        Frame::Subscribe { seq, topic } => {
            state
                .subscriptions
                .entry(topic.clone())
                .or_default()
                .insert(session);

            // Hand the retained value to the late subscriber before the ack
            // so it is observable as soon as subscribe() returns.
            if let Some(retained) = state.retained.get(&topic) {
                send_to(
                    state,
                    session,
                    Frame::Deliver {
                        topic: topic.clone(),
                        payload: Some(retained.payload.clone()),
                        properties: retained.properties.clone(),
                        retained: true,
                    },
                );
            }

            send_to(state, session, Frame::SubAck { seq });
        }

        Frame::Unsubscribe { seq, topic } => {
            if let Some(mut subscribers) = state.subscriptions.get_mut(&topic) {
                subscribers.remove(&session);
            }
            send_to(state, session, Frame::UnsubAck { seq });
        }

        Frame::Publish {
            seq,
            topic,
            payload,
            properties,
            qos,
            retain,
        } => {
            if retain {
                match &payload {
                    Some(bytes) => {
                        state.retained.insert(
                            topic.clone(),
                            Retained {
                                payload: bytes.clone(),
                                properties: properties.clone(),
                            },
                        );
                    }
                    // A retained publish with no body clears the slot
                    None => {
                        state.retained.remove(&topic);
                    }
                }
            }

            if let Some(subscribers) = state.subscriptions.get(&topic) {
                for subscriber in subscribers.iter() {
                    send_to(
                        state,
                        *subscriber,
                        Frame::Deliver {
                            topic: topic.clone(),
                            payload: payload.clone(),
                            properties: properties.clone(),
                            retained: false,
                        },
                    );
                }
            }

            if qos == QoS::AtLeastOnce {
                send_to(state, session, Frame::PubAck { seq });
            }
        }

        other => {
            tracing::warn!(session, frame = ?other, "unexpected client frame");
        }
    }
}

fn send_to(state: &BrokerState, session: u64, frame: Frame) {
    if let Some(tx) = state.sessions.get(&session) {
        // A send failure means the session is tearing down; the reader task
        // will clean up its registrations.
        let _ = tx.send(frame);
    }
}

fn remove_session(state: &BrokerState, session: u64) {
    state.sessions.remove(&session);
    for mut entry in state.subscriptions.iter_mut() {
        entry.value_mut().remove(&session);
    }
    tracing::debug!(session, "bus session removed");
}
