//! Ping protocol.
//!
//! Line-based request/response protocol used for health checks and latency
//! measurement:
//!
//! ```text
//! Request:  PING\r\n
//! Response: PONG\r\n
//!
//! Request:  PING hello\r\n
//! Response: PONG hello\r\n
//!
//! Request:  QUIT\r\n
//! Response: OK\r\n (then the server closes the connection)
//! ```
//!
//! Unknown lines are answered with `ERROR unknown command\r\n`. A line that
//! does not fit into the input buffer is a fatal error.

pub mod handler;
pub mod parser;

pub use handler::PingHandler;
