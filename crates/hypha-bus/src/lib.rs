//! The shared bus: a topic-addressed broker and the client that rides it.
//!
//! Processes in the instrument never talk to each other directly; every
//! exchange crosses this broker. The client hides connection state entirely:
//! reconnects, re-subscribes, and queued publishes are its business, not the
//! caller's.

pub mod broker;
pub mod client;
pub mod codec;
pub mod config;
mod connection;
pub mod error;

pub use broker::Broker;
pub use client::{BusClient, MessageStream};
pub use codec::CodecError;
pub use config::{BusConfig, ConfigError};
pub use error::{BusError, Result};
