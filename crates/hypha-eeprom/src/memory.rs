//! In-memory doubles for the device seams, used in simulation and tests.

use crate::device::{EepromError, RecordCodec, Result, WriteProtect};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A record codec backed by memory instead of an I2C device
///
/// Read latency and failures are scriptable so callers can exercise the
/// coalescing and error paths without hardware.
pub struct MemoryCodec {
    record: Mutex<Value>,
    read_delay: Duration,
    read_error: Option<String>,
    write_error: Option<String>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryCodec {
    pub fn new(record: Value) -> Self {
        Self {
            record: Mutex::new(record),
            read_delay: Duration::ZERO,
            read_error: None,
            write_error: None,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Simulate physical read latency
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Make every read fail with a device error
    pub fn with_read_error(mut self, message: impl Into<String>) -> Self {
        self.read_error = Some(message.into());
        self
    }

    /// Make every write fail with a device error
    pub fn with_write_error(mut self, message: impl Into<String>) -> Self {
        self.write_error = Some(message.into());
        self
    }

    /// Number of physical reads performed
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of physical writes performed
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordCodec for MemoryCodec {
    async fn read(&self) -> Result<Value> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }

        if let Some(message) = &self.read_error {
            return Err(EepromError::Device(message.clone()));
        }

        Ok(lock(&self.record).clone())
    }

    async fn write(&self, record: &Value) -> Result<()> {
        if let Some(message) = &self.write_error {
            return Err(EepromError::Device(message.clone()));
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        *lock(&self.record) = record.clone();
        Ok(())
    }
}

/// A write-protect line that is always willing
pub struct NoopWriteProtect;

#[async_trait]
impl WriteProtect for NoopWriteProtect {
    async fn disable(&self) -> Result<()> {
        Ok(())
    }

    async fn enable(&self) -> Result<()> {
        Ok(())
    }
}

fn lock(record: &Mutex<Value>) -> std::sync::MutexGuard<'_, Value> {
    record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
