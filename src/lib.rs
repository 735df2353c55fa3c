//! Event-driven buffered sockets.
//!
//! [`runtime::BufferedSocket`] wraps a non-blocking socket with an input
//! buffer and turns readiness events into calls on a
//! [`runtime::BufferedSocketHandler`]. The `protocols` module provides
//! the handlers served by the binary, and `runtime::mio` the event loop
//! that drives them.

pub mod config;
pub mod protocols;
pub mod runtime;
