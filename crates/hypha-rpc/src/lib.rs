//! Request/response semantics on top of the broadcast bus.
//!
//! The bus delivers unordered, at-least-once broadcasts; this crate turns
//! them into things callers can await: a procedure call with exactly one
//! reply, a watched topic as an unbounded sequence, and a retained status
//! publication. Correlation rides entirely on the channel's two native
//! primitives: the response topic and the correlation token.

pub mod caller;
pub mod error;
pub mod responder;
pub mod status;
pub mod watcher;

pub use caller::{CallOptions, RpcClient};
pub use error::{CallError, HandlerError};
pub use responder::Responder;
pub use status::publish_status;
pub use watcher::{watch, Watcher};
