//! Echo protocol.
//!
//! Every byte received is sent back unchanged. There is no framing, which
//! makes it a good fit for throughput tests and for exercising partial
//! reads and writes. The handler stops consuming input while too much
//! output is queued, and it supports direct mode: bytes are received
//! straight from the descriptor without going through the input buffer.

pub mod handler;

pub use handler::EchoHandler;
