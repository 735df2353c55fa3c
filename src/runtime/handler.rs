//! Callback surface driven by [`BufferedSocket`].
//!
//! All callbacks run synchronously on the event loop thread, one at a time,
//! and receive the socket so they can consume input, write, close or
//! destroy it from inside the callback.

use crate::runtime::buffered::BufferedSocket;
use crate::runtime::error::SocketError;
use crate::runtime::socket::{FdType, RawSocket};
use std::io;
use std::os::unix::io::RawFd;

/// Outcome of [`BufferedSocketHandler::on_buffered_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferedResult {
    /// At least one byte was consumed and the handler is willing to receive
    /// more data.
    Ok,

    /// The handler needs more data to finish the operation. If no more data
    /// can arrive (socket already closed) or the input buffer is already
    /// full, this becomes an error.
    More,

    /// Call the handler again right away without reading from the socket.
    /// Behaves like [`Ok`](Self::Ok) if the input buffer is now empty.
    AgainOptional,

    /// Call the handler again right away without reading from the socket.
    /// Behaves like [`More`](Self::More) if the input buffer is now empty.
    AgainExpect,

    /// The handler cannot accept data right now; it calls
    /// [`BufferedSocket::read`] again once it can.
    Blocking,

    /// The handler closed the socket. It must not be touched any more.
    Closed,
}

/// Outcome of [`BufferedSocketHandler::on_buffered_direct`].
#[derive(Debug)]
pub enum DirectResult {
    /// Some data was moved out of the socket.
    Ok,

    /// The handler cannot accept data right now; it calls
    /// [`BufferedSocket::read`] again once it can.
    Blocking,

    /// The socket had nothing to read; wait for readiness.
    Empty,

    /// The peer closed the socket, which is not yet reflected in the
    /// `BufferedSocket`.
    End,

    /// The handler closed the socket.
    Closed,

    /// Transfer failed; reported through the error callback.
    Error(io::Error),
}

/// Disposition chosen by [`BufferedSocketHandler::on_buffered_broken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokenDisposition {
    /// Treat it as a hard I/O error; the write returns the error.
    Error,
    /// Only the sending side failed; keep reading buffered input. The write
    /// returns [`WriteResult::Broken`](crate::runtime::WriteResult::Broken).
    Continue,
    /// The handler destroyed the socket.
    Destroyed,
}

/// Protocol-specific behavior on top of a [`BufferedSocket`].
pub trait BufferedSocketHandler<S: RawSocket> {
    /// Data was read into the input buffer. Use
    /// [`BufferedSocket::read_buffer`] and
    /// [`BufferedSocket::dispose_consumed`] to process it.
    ///
    /// An `Err` is passed to [`on_buffered_error`](Self::on_buffered_error).
    fn on_buffered_data(
        &mut self,
        sock: &mut BufferedSocket<S>,
    ) -> Result<BufferedResult, SocketError>;

    /// The socket is readable and direct mode is enabled; move data out of
    /// `fd` without going through the input buffer.
    ///
    /// Only called after [`BufferedSocket::set_direct`]; handlers enabling
    /// direct mode must override it.
    fn on_buffered_direct(
        &mut self,
        _sock: &mut BufferedSocket<S>,
        _fd: RawFd,
        _fd_type: FdType,
    ) -> Result<DirectResult, SocketError> {
        unreachable!("direct transfer invoked on a handler without direct support")
    }

    /// The peer shut down its side. Data may still be pending in the kernel,
    /// so reading continues.
    ///
    /// Returns `false` if the socket has been closed.
    fn on_buffered_hangup(&mut self, _sock: &mut BufferedSocket<S>) -> bool {
        true
    }

    /// The peer finished sending and closed the socket. When returning
    /// `true` the method must have closed or abandoned the socket; buffered
    /// input is delivered afterwards. It may consume input itself.
    ///
    /// Returns `false` if no more data shall be delivered; neither
    /// [`on_buffered_remaining`](Self::on_buffered_remaining) nor the error
    /// callback are invoked then. The handler then owns the rest of the
    /// shutdown, e.g. it keeps the descriptor open until queued output is
    /// sent and destroys the socket afterwards.
    fn on_buffered_closed(&mut self, sock: &mut BufferedSocket<S>) -> bool;

    /// Called after [`on_buffered_closed`](Self::on_buffered_closed) with the
    /// number of bytes still in the input buffer (possibly zero).
    ///
    /// Returns `false` if no more data shall be delivered; the end callback
    /// is not invoked then.
    fn on_buffered_remaining(&mut self, _sock: &mut BufferedSocket<S>, _remaining: usize) -> bool {
        true
    }

    /// The input buffer became empty after the peer closed the socket.
    ///
    /// Returns `true` if the stream ended properly. The default reports an
    /// unexpected end, which surfaces as
    /// [`SocketError::ClosedPrematurely`].
    fn on_buffered_end(&mut self, _sock: &mut BufferedSocket<S>) -> bool {
        false
    }

    /// The socket is ready for writing.
    ///
    /// Returns `Ok(false)` if the socket has been closed.
    fn on_buffered_write(&mut self, sock: &mut BufferedSocket<S>) -> Result<bool, SocketError>;

    /// All pending output was written. Advisory; filters on top of the
    /// socket call it, the socket itself never does.
    ///
    /// Returns `false` if the socket has been destroyed.
    fn on_buffered_drained(&mut self, _sock: &mut BufferedSocket<S>) -> bool {
        true
    }

    /// The write timeout expired.
    ///
    /// Returns `false` if the socket has been closed.
    fn on_buffered_timeout(&mut self, sock: &mut BufferedSocket<S>) -> bool {
        self.on_buffered_error(sock, SocketError::Timeout);
        false
    }

    /// A write failed because the peer closed (at least one side of) the
    /// socket.
    fn on_buffered_broken(&mut self, _sock: &mut BufferedSocket<S>) -> BrokenDisposition {
        BrokenDisposition::Error
    }

    /// A fatal error occurred. The socket is assumed to be closed when this
    /// returns.
    fn on_buffered_error(&mut self, sock: &mut BufferedSocket<S>, error: SocketError);
}
