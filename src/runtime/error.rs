//! Errors reported to the handler's error callback.

use std::io;
use thiserror::Error;

/// Fatal connection error.
///
/// Once one of these reaches `on_buffered_error()`, the connection is
/// assumed to be closed by the handler.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("recv() failed: {0}")]
    Receive(#[source] io::Error),

    #[error("send() failed: {0}")]
    Send(#[source] io::Error),

    #[error("direct transfer from socket failed: {0}")]
    Direct(#[source] io::Error),

    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    /// The peer closed the connection before the handler was done.
    #[error("peer closed the socket prematurely")]
    ClosedPrematurely,

    /// The handler needs more data but the input buffer is full.
    #[error("socket input buffer is full")]
    BufferFull,

    #[error("write timeout")]
    Timeout,

    /// The handler rejected the byte stream.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl SocketError {
    /// Wrap an arbitrary handler failure.
    pub fn handler<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        SocketError::Handler(error.into())
    }

    /// Errors which mean the peer went away rather than misbehaved.
    pub fn is_disconnect(&self) -> bool {
        match self {
            SocketError::Receive(e) | SocketError::Send(e) | SocketError::Socket(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionAborted
            ),
            SocketError::ClosedPrematurely => true,
            _ => false,
        }
    }
}
