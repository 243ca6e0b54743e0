//! Access to the instrument's identity EEPROM.
//!
//! The device lives on a serial bus that must never see overlapping
//! operations. Reads are coalesced through a single-flight serializer;
//! writes happen inside a write-protect window that is always closed again.
//! The actual record encoding and the GPIO line are external concerns,
//! reached through the [`RecordCodec`] and [`WriteProtect`] seams.

pub mod device;
pub mod memory;

pub use device::{Eeprom, EepromError, RecordCodec, Result, WriteProtect};
pub use memory::{MemoryCodec, NoopWriteProtect};
