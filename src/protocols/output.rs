//! Pending response bytes shared by the protocol handlers.

use crate::runtime::{BufferedSocket, BufferedSocketHandler, RawSocket, SocketError, WriteResult};
use bytes::{Buf, BytesMut};
use std::io;

/// Pending output above which handlers stop consuming input.
pub const OUTPUT_LIMIT: usize = 64 * 1024;

/// Outcome of [`flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Everything was written.
    Done,
    /// The socket would block; the write event is scheduled.
    Pending,
    /// The peer stopped receiving; the rest was discarded.
    Broken,
    /// The socket was destroyed by a nested callback.
    Destroyed,
}

/// Write as much of `pending` as the socket takes, advancing it past the
/// written bytes.
///
/// `pending` must not be borrowed from `handler`; handlers move their queue
/// out with `std::mem::take` for the duration of the call.
pub fn flush<S, H>(
    sock: &mut BufferedSocket<S>,
    handler: &mut H,
    pending: &mut BytesMut,
) -> Result<Flush, SocketError>
where
    S: RawSocket,
    H: BufferedSocketHandler<S> + ?Sized,
{
    while !pending.is_empty() {
        match sock.write(handler, &pending[..]) {
            WriteResult::Written(0) => {
                return Err(SocketError::Send(io::ErrorKind::WriteZero.into()));
            }
            WriteResult::Written(n) => pending.advance(n),
            WriteResult::Blocking => return Ok(Flush::Pending),
            WriteResult::Broken => {
                pending.clear();
                return Ok(Flush::Broken);
            }
            WriteResult::Destroyed => return Ok(Flush::Destroyed),
            WriteResult::Error(e) => return Err(SocketError::Send(e)),
            // only produced by write_from()
            WriteResult::SourceEof | WriteResult::SourceBlocking => return Ok(Flush::Pending),
        }
    }

    Ok(Flush::Done)
}

/// Outcome of [`close_when_flushed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closing {
    /// Output is out and the descriptor closed.
    Closed,
    /// Output is still queued; the descriptor stays open with the write
    /// event scheduled. Release the socket once the output is sent.
    Lingering,
    /// The socket was destroyed or an error was reported.
    Gone,
}

/// Close after the peer stopped sending, without dropping queued output.
///
/// Reads are unscheduled while lingering. The write timeout bounds how long
/// an unresponsive peer keeps the descriptor open.
pub fn close_when_flushed<S, H>(
    sock: &mut BufferedSocket<S>,
    handler: &mut H,
    pending: &mut BytesMut,
) -> Closing
where
    S: RawSocket,
    H: BufferedSocketHandler<S> + ?Sized,
{
    match flush(sock, handler, pending) {
        Ok(Flush::Done | Flush::Broken) => {
            sock.close();
            Closing::Closed
        }
        Ok(Flush::Pending) => {
            sock.unschedule_read();
            Closing::Lingering
        }
        Ok(Flush::Destroyed) => Closing::Gone,
        Err(error) => {
            handler.on_buffered_error(sock, error);
            Closing::Gone
        }
    }
}

/// Close if still connected, then destroy.
pub fn release<S: RawSocket>(sock: &mut BufferedSocket<S>) {
    if sock.is_connected() {
        sock.close();
    }
    if sock.is_valid() {
        sock.destroy();
    }
}

/// Log a fatal connection error at a level matching its cause.
pub fn log_error<S: RawSocket>(sock: &BufferedSocket<S>, error: &SocketError) {
    if error.is_disconnect() {
        tracing::debug!(conn = sock.id(), error = %error, "Connection lost");
    } else {
        tracing::warn!(conn = sock.id(), error = %error, "Connection error");
    }
}
