use hypha_protocol::{Properties, QoS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Upper bound on one frame; anything larger is a protocol violation.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Frame format:
/// ```text
/// ┌──────────┬──────────────┐
/// │ Length   │ Body         │
/// │ 4 bytes  │ N bytes      │
/// │ (u32 LE) │ (JSON)       │
/// └──────────┴──────────────┘
/// ```
///
/// Bodies are JSON rather than a fixed binary layout: payloads are
/// schema-less by design, so the frame layer follows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Frame {
    /// Client hello; the broker answers with ConnAck
    Connect { client_id: String },
    ConnAck,

    Subscribe { seq: u64, topic: String },
    SubAck { seq: u64 },

    Unsubscribe { seq: u64, topic: String },
    UnsubAck { seq: u64 },

    Publish {
        seq: u64,
        topic: String,
        payload: Option<Vec<u8>>,
        properties: Properties,
        qos: QoS,
        retain: bool,
    },
    /// Sent by the broker only for at-least-once publishes
    PubAck { seq: u64 },

    /// Broker-to-client message delivery
    Deliver {
        topic: String,
        payload: Option<Vec<u8>>,
        properties: Properties,
        retained: bool,
    },
}

/// Write one length-prefixed frame to an async stream
pub(crate) async fn write_frame<W>(stream: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(body.len()));
    }

    stream.write_all(&(body.len() as u32).to_le_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;

    Ok(())
}

/// Read one length-prefixed frame from an async stream
pub(crate) async fn read_frame<R>(stream: &mut R) -> Result<Frame>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;

    Ok(serde_json::from_slice(&body)?)
}
