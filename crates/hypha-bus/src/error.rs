use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("bus connection task is gone")]
    ConnectionClosed,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
