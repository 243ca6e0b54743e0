//! Connection drivers for the two link kinds.
//!
//! A client owns exactly one connection task. For a local link the task is a
//! plain forwarding loop; for TCP it is a reconnect loop that re-announces
//! the session, re-subscribes every tracked topic, and re-sends every frame
//! still waiting on an acknowledgment. Frames produced while disconnected
//! sit in the outbound queue and flush on reconnect; they are never dropped.

use crate::broker::LocalLink;
use crate::client::ClientState;
use crate::codec::{read_frame, write_frame, Frame};
use crate::error::{BusError, Result};
use hypha_protocol::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub(crate) enum Link {
    Local(LocalLink),
    Tcp {
        addr: SocketAddr,
        /// Connection established by `connect()`, consumed on first use
        initial: Option<TcpStream>,
    },
}

pub(crate) async fn run(
    state: Arc<ClientState>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    link: Link,
) {
    match link {
        Link::Local(link) => run_local(state, outbound, link).await,
        Link::Tcp { addr, initial } => run_tcp(state, outbound, addr, initial).await,
    }
}

async fn run_local(
    state: Arc<ClientState>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    mut link: LocalLink,
) {
    let _ = link.to_broker.send(Frame::Connect {
        client_id: state.client_id.clone(),
    });

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(frame) => {
                    if link.to_broker.send(frame).is_err() {
                        tracing::warn!("broker dropped; local bus link closed");
                        break;
                    }
                }
                // All client handles dropped
                None => break,
            },
            inbound = link.from_broker.recv() => match inbound {
                Some(frame) => route(&state, frame),
                None => {
                    tracing::warn!("broker dropped; local bus link closed");
                    break;
                }
            },
        }
    }
}

async fn run_tcp(
    state: Arc<ClientState>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    addr: SocketAddr,
    mut initial: Option<TcpStream>,
) {
    let mut backoff = state.config.reconnect_initial();

    loop {
        let stream = match initial.take() {
            Some(stream) => Some(stream),
            None => match TcpStream::connect(addr).await {
                Ok(stream) => {
                    tracing::debug!("bus reconnected to {}", addr);
                    Some(stream)
                }
                Err(e) => {
                    tracing::warn!("bus connect to {} failed: {}", addr, e);
                    None
                }
            },
        };

        if let Some(stream) = stream {
            backoff = state.config.reconnect_initial();
            match drive(&state, &mut outbound, stream).await {
                // All client handles dropped
                Ok(()) => return,
                Err(e) => tracing::warn!("bus connection lost: {}", e),
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(state.config.reconnect_max());
    }
}

/// Serve one established connection until it fails or the client goes away
async fn drive(
    state: &Arc<ClientState>,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    stream: TcpStream,
) -> Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();

    let (in_tx, mut in_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            match read_frame(&mut read_half).await {
                Ok(frame) => {
                    if in_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("bus read side closed: {}", e);
                    break;
                }
            }
        }
    });

    write_frame(
        &mut write_half,
        &Frame::Connect {
            client_id: state.client_id.clone(),
        },
    )
    .await?;

    // Re-establish broker-side state: every tracked subscription, then every
    // frame still waiting on an acknowledgment (at-least-once publishes and
    // in-progress subscribes keep their original sequence numbers, so their
    // waiters resolve against the new session).
    let topics: Vec<String> = state.subscriptions.lock().await.iter().cloned().collect();
    for topic in topics {
        let seq = state.next_seq();
        write_frame(&mut write_half, &Frame::Subscribe { seq, topic }).await?;
    }

    let mut inflight: Vec<(u64, Frame)> = state
        .inflight
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();
    inflight.sort_by_key(|(seq, _)| *seq);
    for (_, frame) in inflight {
        write_frame(&mut write_half, &frame).await?;
    }

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(frame) => write_frame(&mut write_half, &frame).await?,
                None => return Ok(()),
            },
            inbound = in_rx.recv() => match inbound {
                Some(frame) => route(state, frame),
                None => return Err(BusError::ConnectionClosed),
            },
        }
    }
}

/// Route one broker frame into client state
pub(crate) fn route(state: &ClientState, frame: Frame) {
    match frame {
        Frame::ConnAck => {
            tracing::debug!("bus session established");
        }

        Frame::SubAck { seq } | Frame::UnsubAck { seq } | Frame::PubAck { seq } => {
            state.inflight.remove(&seq);
            // Acks for frames re-sent during a resubscribe have no waiter;
            // that is fine.
            if let Some((_, ack)) = state.pending_acks.remove(&seq) {
                let _ = ack.send(());
            }
        }

        Frame::Deliver {
            topic,
            payload,
            properties,
            retained,
        } => {
            tracing::debug!(topic = %topic, retained, "bus message");
            // No listeners is a valid state; delivery is fan-out best effort.
            let _ = state.fanout.send(Message {
                topic,
                payload,
                properties,
                retained,
            });
        }

        other => {
            tracing::warn!(frame = ?other, "unexpected broker frame");
        }
    }
}
