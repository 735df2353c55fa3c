//! Echo protocol handler.

use crate::protocols::output::{self, Closing, Flush, OUTPUT_LIMIT};
use crate::runtime::{
    BufferedResult, BufferedSocket, BufferedSocketHandler, DirectResult, FdType, RawSocket,
    SocketError,
};
use bytes::BytesMut;
use std::io;
use std::os::unix::io::RawFd;
use tracing::trace;

/// Size of the stack buffer used for direct receives.
const DIRECT_CHUNK: usize = 16 * 1024;

/// Sends every received byte back to the peer.
pub struct EchoHandler {
    pending: BytesMut,
    limit: usize,
    /// Input was refused because output backed up; resume reading once it
    /// drains.
    blocked: bool,
    /// The peer is done sending; release the socket once output drains.
    closing: bool,
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::with_limit(OUTPUT_LIMIT)
    }
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop consuming input while `limit` bytes are waiting to be sent.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            limit,
            blocked: false,
            closing: false,
        }
    }

    /// Bytes received but not yet sent.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn room(&self) -> usize {
        self.limit.saturating_sub(self.pending.len())
    }

    fn send<S: RawSocket>(&mut self, sock: &mut BufferedSocket<S>) -> Result<Flush, SocketError> {
        let mut pending = std::mem::take(&mut self.pending);
        let result = output::flush(sock, self, &mut pending);
        self.pending = pending;
        result
    }
}

impl<S: RawSocket> BufferedSocketHandler<S> for EchoHandler {
    fn on_buffered_data(
        &mut self,
        sock: &mut BufferedSocket<S>,
    ) -> Result<BufferedResult, SocketError> {
        if !sock.is_connected() {
            // nobody left to echo to
            sock.dispose_consumed(sock.available());
            return Ok(BufferedResult::Ok);
        }

        let data = sock.read_buffer();
        let n = data.len().min(self.room());
        if n == 0 {
            self.blocked = true;
            return Ok(BufferedResult::Blocking);
        }

        self.pending.extend_from_slice(&data[..n]);
        sock.dispose_consumed(n);
        trace!(conn = sock.id(), bytes = n, "echo");

        if self.send(sock)? == Flush::Destroyed {
            return Ok(BufferedResult::Closed);
        }

        if self.room() == 0 {
            self.blocked = true;
            Ok(BufferedResult::Blocking)
        } else if sock.is_empty() {
            Ok(BufferedResult::Ok)
        } else {
            Ok(BufferedResult::AgainOptional)
        }
    }

    fn on_buffered_direct(
        &mut self,
        sock: &mut BufferedSocket<S>,
        fd: RawFd,
        _fd_type: FdType,
    ) -> Result<DirectResult, SocketError> {
        let room = self.room();
        if room == 0 {
            self.blocked = true;
            return Ok(DirectResult::Blocking);
        }

        let mut buf = [0u8; DIRECT_CHUNK];
        let want = room.min(buf.len());
        // SAFETY: buf is valid for `want` bytes
        let n = unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), want, 0) };
        if n < 0 {
            let e = io::Error::last_os_error();
            return Ok(match e.kind() {
                io::ErrorKind::WouldBlock => DirectResult::Empty,
                io::ErrorKind::Interrupted => DirectResult::Ok,
                _ => DirectResult::Error(e),
            });
        }
        if n == 0 {
            return Ok(DirectResult::End);
        }

        self.pending.extend_from_slice(&buf[..n as usize]);
        trace!(conn = sock.id(), bytes = n, "echo direct");

        if self.send(sock)? == Flush::Destroyed {
            return Ok(DirectResult::Closed);
        }
        Ok(DirectResult::Ok)
    }

    fn on_buffered_closed(&mut self, sock: &mut BufferedSocket<S>) -> bool {
        // nothing more will arrive, so input held back by the output limit
        // is queued as well
        let rest = sock.available();
        if rest > 0 {
            self.pending.extend_from_slice(sock.read_buffer());
            sock.dispose_consumed(rest);
        }

        let mut pending = std::mem::take(&mut self.pending);
        let closing = output::close_when_flushed(sock, self, &mut pending);
        self.pending = pending;

        match closing {
            Closing::Closed => true,
            Closing::Lingering => {
                trace!(conn = sock.id(), pending = self.pending.len(), "lingering");
                self.closing = true;
                false
            }
            Closing::Gone => false,
        }
    }

    fn on_buffered_end(&mut self, sock: &mut BufferedSocket<S>) -> bool {
        output::release(sock);
        true
    }

    fn on_buffered_write(&mut self, sock: &mut BufferedSocket<S>) -> Result<bool, SocketError> {
        match self.send(sock)? {
            Flush::Destroyed => return Ok(false),
            Flush::Pending => return Ok(true),
            Flush::Done | Flush::Broken => {}
        }

        if self.closing {
            output::release(sock);
            return Ok(false);
        }

        sock.unschedule_write();
        if self.blocked {
            self.blocked = false;
            sock.defer_read(false);
        }
        Ok(true)
    }

    fn on_buffered_error(&mut self, sock: &mut BufferedSocket<S>, error: SocketError) {
        output::log_error(sock, &error);
        output::release(sock);
    }
}
