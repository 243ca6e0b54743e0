use async_trait::async_trait;
use hypha_singleflight::{FlightError, SingleFlight};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EepromError {
    #[error("device error: {0}")]
    Device(String),

    #[error("write protect error: {0}")]
    WriteProtect(String),

    #[error("read abandoned before completing")]
    Abandoned,
}

pub type Result<T> = std::result::Result<T, EepromError>;

/// Codec for the physical identity record
///
/// The record's on-chip encoding is the codec's concern; up here it is a
/// JSON value. Implementations talk to the actual device (or stand in for
/// one, see [`crate::MemoryCodec`]).
#[async_trait]
pub trait RecordCodec: Send + Sync + 'static {
    async fn read(&self) -> Result<Value>;
    async fn write(&self, record: &Value) -> Result<()>;
}

/// The GPIO write-protect line guarding the device
#[async_trait]
pub trait WriteProtect: Send + Sync + 'static {
    /// Release the line so a write can go through
    async fn disable(&self) -> Result<()>;

    /// Re-assert the line
    async fn enable(&self) -> Result<()>;
}

/// Serialized access to the identity EEPROM
///
/// The device sits on a serial bus that cannot tolerate overlapping
/// operations, so reads go through a single-flight serializer: concurrent
/// readers coalesce onto one physical read and all observe its outcome.
/// Writes release the write-protect line only for the duration of the write
/// and re-assert it even when the write fails.
pub struct Eeprom<C, W> {
    codec: Arc<C>,
    write_protect: W,
    reads: SingleFlight<Value, EepromError>,
}

impl<C: RecordCodec, W: WriteProtect> Eeprom<C, W> {
    pub fn new(codec: C, write_protect: W) -> Self {
        Self {
            codec: Arc::new(codec),
            write_protect,
            reads: SingleFlight::new(),
        }
    }

    /// The codec this device was built over
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Read the identity record
    ///
    /// At most one physical read is in flight at a time; callers arriving
    /// while one is running receive that read's outcome.
    pub async fn read(&self) -> Result<Value> {
        let codec = Arc::clone(&self.codec);
        match self.reads.run(move || async move { codec.read().await }).await {
            Ok(record) => Ok(record),
            Err(FlightError::Operation(e)) => Err(e),
            Err(FlightError::Abandoned) => Err(EepromError::Abandoned),
        }
    }

    /// Write the identity record inside a write-protect window
    pub async fn write(&self, record: &Value) -> Result<()> {
        self.write_protect.disable().await?;
        tracing::debug!("eeprom write protect released");

        let written = self.codec.write(record).await;

        let protected = self.write_protect.enable().await;
        tracing::debug!("eeprom write protect re-asserted");

        written?;
        protected
    }
}
