//! mio-based event loop implementation.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS).

mod event_loop;
mod socket;

pub use event_loop::{run, EventLoop};
pub use socket::{readiness, MioSocket, Reactor};
