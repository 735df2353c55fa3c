//! Buffered socket runtime.
//!
//! The core is [`BufferedSocket`]: it owns a [`RawSocket`] and an
//! [`InputBuffer`] and drives a [`BufferedSocketHandler`] through a
//! read/write/close state machine. Everything else supports it:
//!
//! - `defer`, `timer`: single-threaded deferred task and timeout queues
//! - `socket`: the raw socket trait consumed by the core
//! - `mio`: a concrete raw socket and event loop on top of mio
//! - `connection`: socket + handler pairs kept in a slab

mod buffer;
mod buffered;
mod connection;
mod defer;
mod error;
mod handler;
pub mod mio;
mod socket;
mod timer;

#[cfg(test)]
pub(crate) mod mock;

pub use buffer::{CapacityError, InputBuffer};
pub use buffered::{BufferedSocket, WriteResult, DEFAULT_INPUT_CAPACITY};
pub use connection::{Connection, ConnectionRegistry};
pub use defer::{DeferEvent, DeferKind, DeferQueue, DeferTask, SharedDeferQueue};
pub use error::SocketError;
pub use handler::{BrokenDisposition, BufferedResult, BufferedSocketHandler, DirectResult};
pub use socket::{FdType, RawSocket, Readiness};
pub use timer::{SharedTimerQueue, TimerEvent, TimerQueue};
