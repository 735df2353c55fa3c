//! Ping protocol handler.

use super::parser::{self, Command, ParseResult};
use crate::protocols::output::{self, Closing, Flush, OUTPUT_LIMIT};
use crate::runtime::{BufferedResult, BufferedSocket, BufferedSocketHandler, RawSocket, SocketError};
use bytes::BytesMut;
use tracing::trace;

/// Answers one line-based command per data callback.
pub struct PingHandler {
    pending: BytesMut,
    limit: usize,
    blocked: bool,
    /// `QUIT` was received or the peer closed; release the socket once the
    /// replies are out.
    closing: bool,
}

impl Default for PingHandler {
    fn default() -> Self {
        Self::with_limit(OUTPUT_LIMIT)
    }
}

impl PingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            limit,
            blocked: false,
            closing: false,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn send<S: RawSocket>(&mut self, sock: &mut BufferedSocket<S>) -> Result<Flush, SocketError> {
        let mut pending = std::mem::take(&mut self.pending);
        let result = output::flush(sock, self, &mut pending);
        self.pending = pending;
        result
    }

    /// Queue the reply to the command at the front of `input`.
    ///
    /// Returns the bytes consumed and whether the command was `QUIT`, or
    /// `None` while the line is incomplete.
    fn reply(&mut self, input: &[u8]) -> Option<(usize, bool)> {
        match parser::parse(input) {
            ParseResult::Incomplete => None,
            ParseResult::Complete(Command::Quit, consumed) => {
                parser::response_ok(&mut self.pending);
                Some((consumed, true))
            }
            ParseResult::Complete(Command::Ping, consumed) => {
                parser::response_pong(&mut self.pending);
                Some((consumed, false))
            }
            ParseResult::Complete(Command::PingMsg(msg), consumed) => {
                parser::response_pong_msg(msg, &mut self.pending);
                Some((consumed, false))
            }
            ParseResult::Error(consumed) => {
                parser::response_error(&mut self.pending);
                Some((consumed, false))
            }
        }
    }

    fn quit<S: RawSocket>(
        &mut self,
        sock: &mut BufferedSocket<S>,
    ) -> Result<BufferedResult, SocketError> {
        match self.send(sock)? {
            Flush::Pending => {
                self.closing = true;
                Ok(BufferedResult::Blocking)
            }
            Flush::Done | Flush::Broken => {
                output::release(sock);
                Ok(BufferedResult::Closed)
            }
            Flush::Destroyed => Ok(BufferedResult::Closed),
        }
    }
}

impl<S: RawSocket> BufferedSocketHandler<S> for PingHandler {
    fn on_buffered_data(
        &mut self,
        sock: &mut BufferedSocket<S>,
    ) -> Result<BufferedResult, SocketError> {
        if !sock.is_connected() {
            // replies can't be delivered any more
            sock.dispose_consumed(sock.available());
            return Ok(BufferedResult::Ok);
        }

        if self.pending.len() >= self.limit {
            self.blocked = true;
            return Ok(BufferedResult::Blocking);
        }

        let Some((consumed, quit)) = self.reply(sock.read_buffer()) else {
            return Ok(BufferedResult::More);
        };
        sock.dispose_consumed(consumed);
        trace!(conn = sock.id(), consumed, "ping");

        if quit {
            return self.quit(sock);
        }

        if self.send(sock)? == Flush::Destroyed {
            return Ok(BufferedResult::Closed);
        }

        if sock.is_empty() {
            Ok(BufferedResult::Ok)
        } else {
            Ok(BufferedResult::AgainOptional)
        }
    }

    fn on_buffered_closed(&mut self, sock: &mut BufferedSocket<S>) -> bool {
        // answer the complete lines that were held back, up to a QUIT
        let mut offset = 0;
        while let Some((consumed, quit)) = self.reply(&sock.read_buffer()[offset..]) {
            offset += consumed;
            if quit {
                break;
            }
        }

        // a partial line never completes now
        let rest = sock.available();
        if rest > 0 {
            sock.dispose_consumed(rest);
        }

        let mut pending = std::mem::take(&mut self.pending);
        let closing = output::close_when_flushed(sock, self, &mut pending);
        self.pending = pending;

        match closing {
            Closing::Closed => true,
            Closing::Lingering => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::{MockSocket, ReadStep, WriteStep};
    use crate::runtime::{DeferQueue, FdType, Readiness, SharedDeferQueue};

    fn connected(
        capacity: usize,
        reads: Vec<ReadStep>,
    ) -> (SharedDeferQueue, BufferedSocket<MockSocket>) {
        let defers = DeferQueue::shared();
        let mut sock = BufferedSocket::new(MockSocket::default(), &defers, 1, capacity);
        sock.init(3, FdType::Tcp, None);
        sock.socket_mut().reads.extend(reads);
        (defers, sock)
    }

    fn run_deferred(
        defers: &SharedDeferQueue,
        sock: &mut BufferedSocket<MockSocket>,
        h: &mut PingHandler,
    ) {
        let end = defers.borrow().batch_end();
        loop {
            let task = defers.borrow_mut().pop_ready(end);
            match task {
                Some(task) => sock.on_deferred(h, task.kind),
                None => return,
            }
        }
    }

    #[test]
    fn test_pipelined_commands() {
        let (_defers, mut sock) = connected(
            64,
            vec![ReadStep::Data(b"PING\r\nping hi\r\nFOO\r\nPI".to_vec())],
        );
        let mut h = PingHandler::new();

        assert!(sock.read(&mut h, false));
        assert_eq!(
            sock.socket().written,
            b"PONG\r\nPONG hi\r\nERROR unknown command\r\n"
        );
        // the partial line waits for more input
        assert_eq!(sock.read_buffer(), b"PI");
        assert!(sock.socket().read_scheduled);

        sock.socket_mut().reads.push_back(ReadStep::Data(b"NG\r\n".to_vec()));
        sock.on_ready(&mut h, Readiness::READABLE);
        assert!(sock.socket().written.ends_with(b"ERROR unknown command\r\nPONG\r\n"));
        assert!(sock.is_empty());
    }

    #[test]
    fn test_quit() {
        let (_defers, mut sock) = connected(64, vec![ReadStep::Data(b"QUIT\r\nPING\r\n".to_vec())]);
        let mut h = PingHandler::new();

        assert!(!sock.read(&mut h, false));
        assert_eq!(sock.socket().written, b"OK\r\n");
        assert!(sock.socket().closed);
        assert!(!sock.is_valid());
    }

    #[test]
    fn test_quit_waits_for_output() {
        let (_defers, mut sock) = connected(64, vec![ReadStep::Data(b"QUIT\r\n".to_vec())]);
        sock.socket_mut().writes.push_back(WriteStep::WouldBlock);
        let mut h = PingHandler::new();

        assert!(!sock.read(&mut h, false));
        assert!(sock.is_valid());
        assert!(sock.socket().write_scheduled);
        assert!(!sock.socket().read_scheduled);

        sock.on_ready(&mut h, Readiness::WRITABLE);
        assert_eq!(sock.socket().written, b"OK\r\n");
        assert!(!sock.is_valid());
    }

    #[test]
    fn test_line_too_long() {
        let (_defers, mut sock) = connected(16, vec![ReadStep::Data(vec![b'x'; 16])]);
        let mut h = PingHandler::new();

        assert!(!sock.read(&mut h, false));
        assert!(sock.socket().written.is_empty());
        assert!(!sock.is_valid());
    }

    #[test]
    fn test_partial_line_at_close() {
        let (_defers, mut sock) = connected(64, vec![ReadStep::Data(b"PIN".to_vec()), ReadStep::Eof]);
        let mut h = PingHandler::new();

        assert!(sock.read(&mut h, false));
        sock.on_ready(&mut h, Readiness::READABLE);
        assert!(sock.socket().written.is_empty());
        assert!(sock.socket().closed);
        assert!(!sock.is_valid());
    }

    #[test]
    fn test_replies_sent_after_peer_close() {
        let (_defers, mut sock) = connected(64, vec![ReadStep::Data(b"PING\r\n".to_vec()), ReadStep::Eof]);
        sock.socket_mut()
            .writes
            .extend([WriteStep::WouldBlock, WriteStep::WouldBlock]);
        let mut h = PingHandler::new();

        assert!(sock.read(&mut h, false));
        assert_eq!(h.pending(), 6);

        sock.on_ready(&mut h, Readiness::READABLE);
        assert!(sock.is_valid());
        assert!(sock.socket().write_scheduled);
        assert!(!sock.socket().read_scheduled);

        sock.on_ready(&mut h, Readiness::WRITABLE);
        assert_eq!(sock.socket().written, b"PONG\r\n");
        assert!(sock.socket().closed);
        assert!(!sock.is_valid());
    }

    #[test]
    fn test_held_back_commands_answered_at_close() {
        let (defers, mut sock) = connected(
            64,
            vec![
                ReadStep::Data(b"PING\r\nPING hi\r\nQUIT\r\nPING\r\nPI".to_vec()),
                ReadStep::Eof,
            ],
        );
        sock.socket_mut().writes.push_back(WriteStep::WouldBlock);
        let mut h = PingHandler::with_limit(6);

        assert!(!sock.read(&mut h, false));
        sock.on_ready(&mut h, Readiness::WRITABLE);
        assert_eq!(sock.socket().written, b"PONG\r\n");

        // the resumed read hits the close with three lines still buffered
        run_deferred(&defers, &mut sock, &mut h);
        assert_eq!(sock.socket().written, b"PONG\r\nPONG hi\r\nOK\r\n");
        assert!(sock.socket().closed);
        assert!(!sock.is_valid());
    }

    #[test]
    fn test_backpressure() {
        let (defers, mut sock) = connected(64, vec![ReadStep::Data(b"PING\r\nPING\r\n".to_vec())]);
        sock.socket_mut().writes.push_back(WriteStep::WouldBlock);
        let mut h = PingHandler::with_limit(6);

        assert!(!sock.read(&mut h, false));
        assert_eq!(h.pending(), 6);
        assert_eq!(sock.read_buffer(), b"PING\r\n");
        assert!(!sock.socket().read_scheduled);

        sock.on_ready(&mut h, Readiness::WRITABLE);
        assert_eq!(sock.socket().written, b"PONG\r\n");

        run_deferred(&defers, &mut sock, &mut h);
        assert_eq!(sock.socket().written, b"PONG\r\nPONG\r\n");
        assert!(sock.is_empty());
        assert!(sock.socket().read_scheduled);
    }
}
