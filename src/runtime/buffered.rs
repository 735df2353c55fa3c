//! Socket wrapper with input buffer management.
//!
//! `BufferedSocket` sits between a [`RawSocket`] and a protocol handler. It
//! reads into an [`InputBuffer`], hands the buffered bytes to the handler,
//! and interprets the handler's [`BufferedResult`] to decide whether to call
//! it again, wait for more data, wait for writability or stop.
//!
//! ## States
//!
//! - uninitialized (after [`new`](BufferedSocket::new) or
//!   [`destroy`](BufferedSocket::destroy))
//! - connected (after [`init`](BufferedSocket::init))
//! - disconnected (after [`close`](BufferedSocket::close) or
//!   [`abandon`](BufferedSocket::abandon)); remaining input is still
//!   delivered to the handler
//! - ended (the handler's end callback was invoked)
//! - destroyed (after [`destroy`](BufferedSocket::destroy))
//!
//! The handler is not stored here. Operations which may invoke callbacks
//! take it as a parameter, and every callback receives the socket back.

use crate::runtime::buffer::InputBuffer;
use crate::runtime::defer::{DeferEvent, DeferKind, DeferTask, SharedDeferQueue};
use crate::runtime::error::SocketError;
use crate::runtime::handler::{
    BrokenDisposition, BufferedResult, BufferedSocketHandler, DirectResult,
};
use crate::runtime::socket::{FdType, RawSocket, Readiness};
use std::io::{self, IoSlice};
use std::os::unix::io::RawFd;
use std::time::Duration;
use tracing::trace;

/// Input buffer capacity used when the caller has no preference.
pub const DEFAULT_INPUT_CAPACITY: usize = 8192;

/// Outcome of the write methods.
#[must_use]
#[derive(Debug)]
pub enum WriteResult {
    /// This many bytes were written; may be fewer than requested.
    Written(usize),
    /// The source descriptor of [`BufferedSocket::write_from`] reached end
    /// of file.
    SourceEof,
    /// The socket is not writable; the write event has been scheduled.
    Blocking,
    /// The socket is writable but the source descriptor of
    /// [`BufferedSocket::write_from`] would block.
    SourceBlocking,
    /// The socket was destroyed during the call.
    Destroyed,
    /// The peer stopped receiving; see
    /// [`BufferedSocketHandler::on_buffered_broken`].
    Broken,
    Error(io::Error),
}

/// Settled outcome of a data callback after resolving `Again*` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Submitted {
    Ok,
    More,
    Blocking,
    Closed,
}

#[cfg(debug_assertions)]
#[derive(Debug, Default)]
struct DebugState {
    /// Inside `try_read()`.
    reading: bool,
    ended: bool,
    last_result: Option<BufferedResult>,
}

pub struct BufferedSocket<S: RawSocket> {
    base: S,

    /// Connection identifier, for logging and deferred task addressing.
    id: usize,

    /// `None` disables the write timeout.
    write_timeout: Option<Duration>,

    /// Postponed `read()`, used instead of scheduling read readiness when
    /// data is already buffered.
    read_defer: DeferEvent,

    /// Postponed write callback, assuming the socket is already writable.
    /// Saves registering and unregistering write interest when the
    /// assumption holds.
    write_defer: DeferEvent,

    input: InputBuffer,

    /// Attempt direct transfers?
    direct: bool,

    /// Does the handler expect more data? Set by `read(true)`, by the read
    /// scheduling calls with `expect_more` and by the `More` result; restored
    /// after `Blocking`. Bookkeeping only; no branch depends on it.
    expect_more: bool,

    /// Set each time data was received from the socket.
    got_data: bool,

    /// Inside `on_buffered_data()`; lets `schedule_read()` skip the
    /// deferred read.
    in_data_handler: bool,

    destroyed: bool,

    #[cfg(debug_assertions)]
    debug: DebugState,
}

impl<S: RawSocket> BufferedSocket<S> {
    /// Create an uninitialized socket. Call [`init`](Self::init) before use.
    pub fn new(base: S, defers: &SharedDeferQueue, id: usize, input_capacity: usize) -> Self {
        Self {
            base,
            id,
            write_timeout: None,
            read_defer: DeferEvent::new(defers, DeferTask::new(id, DeferKind::Read)),
            write_defer: DeferEvent::new(defers, DeferTask::new(id, DeferKind::Write)),
            input: InputBuffer::new(input_capacity),
            direct: false,
            expect_more: false,
            got_data: false,
            in_data_handler: false,
            destroyed: true,
            #[cfg(debug_assertions)]
            debug: DebugState::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Attach a connected stream.
    pub fn init(&mut self, stream: S::Stream, fd_type: FdType, write_timeout: Option<Duration>) {
        debug_assert!(self.destroyed, "init() on a live socket");

        self.base.init(stream, fd_type);
        self.write_timeout = write_timeout;
        self.direct = false;
        self.expect_more = false;
        self.got_data = false;
        self.in_data_handler = false;
        self.destroyed = false;

        #[cfg(debug_assertions)]
        {
            self.debug = DebugState::default();
        }
    }

    /// Prepare a connected socket for a different handler.
    pub fn reinit(&mut self, write_timeout: Option<Duration>) {
        debug_assert!(!self.destroyed);
        debug_assert!(self.is_connected());
        debug_assert!(!self.expect_more);
        debug_assert!(!self.in_data_handler);

        self.write_timeout = write_timeout;
        self.direct = false;
    }

    pub fn shutdown(&mut self) {
        self.base.shutdown();
    }

    /// Close the descriptor but keep the input buffer; buffered data is
    /// still delivered. Call [`destroy`](Self::destroy) to release the rest.
    pub fn close(&mut self) {
        self.debug_assert_live();

        self.read_defer.cancel();
        self.write_defer.cancel();
        self.base.close();
    }

    /// Like [`close`](Self::close), but hand the stream to the caller
    /// instead of closing it.
    pub fn abandon(&mut self) -> Option<S::Stream> {
        self.debug_assert_live();

        self.read_defer.cancel();
        self.write_defer.cancel();
        self.base.abandon()
    }

    /// Release the input buffer. The socket must have been closed or
    /// abandoned before.
    pub fn destroy(&mut self) {
        debug_assert!(!self.base.is_valid(), "destroy() before close()/abandon()");
        debug_assert!(!self.destroyed);

        self.input.free();
        self.destroyed = true;
    }

    pub fn set_write_timeout(&mut self, write_timeout: Option<Duration>) {
        self.write_timeout = write_timeout;
    }

    /// Initialized and not yet destroyed? The descriptor may be closed
    /// already.
    pub fn is_valid(&self) -> bool {
        !self.destroyed
    }

    #[cfg(debug_assertions)]
    pub fn has_ended(&self) -> bool {
        self.debug.ended
    }

    /// Result of the most recent data callback.
    #[cfg(debug_assertions)]
    pub fn last_result(&self) -> Option<BufferedResult> {
        self.debug.last_result
    }

    /// Is the descriptor still open? This does not query the kernel; it
    /// only reports whether the socket is known to be closed.
    pub fn is_connected(&self) -> bool {
        self.base.is_valid()
    }

    /// The underlying socket. It may be used to send data, but receiving
    /// from it directly would bypass the input buffer.
    pub fn socket(&self) -> &S {
        &self.base
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.base
    }

    pub fn fd_type(&self) -> FdType {
        self.base.fd_type()
    }

    pub fn set_direct(&mut self, direct: bool) {
        self.direct = direct;
    }

    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// Did the current read attempt receive data from the socket?
    pub fn got_data(&self) -> bool {
        self.got_data
    }

    /// Abandon and destroy, handing the stream to the caller. Returns
    /// `None` and changes nothing if the input buffer is not empty.
    pub fn into_stream(&mut self) -> Option<S::Stream> {
        if !self.input.is_empty() {
            return None;
        }

        let stream = self.abandon();
        self.destroy();
        stream
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.input.is_full()
    }

    /// Number of bytes in the input buffer.
    pub fn available(&self) -> usize {
        self.input.len()
    }

    /// Unconsumed input.
    pub fn read_buffer(&self) -> &[u8] {
        self.input.read()
    }

    /// Remove `nbytes` from the front of the input buffer, releasing the
    /// buffer memory when it becomes empty.
    pub fn dispose_consumed(&mut self, nbytes: usize) {
        debug_assert!(nbytes > 0);

        self.input.consume(nbytes);
        self.input.free_if_empty();
        self.expect_more = false;
    }

    /// Like [`dispose_consumed`](Self::dispose_consumed), but keep the
    /// buffer memory.
    pub fn keep_consumed(&mut self, nbytes: usize) {
        debug_assert!(nbytes > 0);

        self.input.consume(nbytes);
        self.expect_more = false;
    }

    pub fn input_buffer(&self) -> &InputBuffer {
        &self.input
    }

    /// Direct access to the input buffer, e.g. to move its contents
    /// elsewhere.
    pub fn input_buffer_mut(&mut self) -> &mut InputBuffer {
        &mut self.input
    }

    /// Obtain more data for the handler.
    ///
    /// Results in one of: a data callback, a direct transfer callback, an
    /// error callback, or (if nothing is available yet) scheduled read
    /// readiness.
    ///
    /// With `expect_more`, calling this on a closed socket with an empty
    /// buffer is an error; without it, the previous expectation is kept.
    /// The stored flag itself never raises that error later: an empty
    /// buffer after the peer closed always goes to the end callback, and
    /// only a `More` result (or `AgainExpect` on an empty buffer) from a
    /// disconnected socket is reported as a premature close.
    ///
    /// Returns `false` if the socket must not be used by the caller any
    /// more in this call chain (closed, ended or blocked by the handler).
    pub fn read<H>(&mut self, handler: &mut H, expect_more: bool) -> bool
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        #[cfg(debug_assertions)]
        {
            debug_assert!(!self.debug.reading, "read() is not reentrant");
            debug_assert!(!self.debug.ended, "read() after end of stream");
        }
        debug_assert!(!self.destroyed);

        if expect_more {
            if !self.is_connected() && self.input.is_empty() {
                self.closed_prematurely(handler);
                return false;
            }

            self.expect_more = true;
        }

        self.try_read(handler)
    }

    /// The peer closed the socket and no more data can be received from it.
    /// The descriptor is still open at this point.
    pub fn closed_by_peer<H>(&mut self, handler: &mut H) -> bool
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        trace!(conn = self.id, remaining = self.input.len(), "closed by peer");

        if !handler.on_buffered_closed(self) {
            return false;
        }

        debug_assert!(
            !self.is_connected(),
            "on_buffered_closed() must close or abandon the socket"
        );

        // the close callback may have consumed input itself
        let remaining = self.input.len();
        if !handler.on_buffered_remaining(self, remaining) {
            return false;
        }
        debug_assert_eq!(remaining, self.input.len());

        if self.input.is_empty() {
            self.ended(handler);
            return false;
        }

        true
    }

    /// Write bypassing events and callbacks, e.g. to push a final message
    /// right before closing.
    pub fn direct_write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.base.write(data)
    }

    pub fn write<H>(&mut self, handler: &mut H, data: &[u8]) -> WriteResult
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        let result = self.base.write(data);
        self.finish_write(handler, result)
    }

    pub fn write_v<H>(&mut self, handler: &mut H, data: &[IoSlice<'_>]) -> WriteResult
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        let result = self.base.write_vectored(data);
        self.finish_write(handler, result)
    }

    /// Move up to `len` bytes from `src` into the socket.
    ///
    /// `offset` is the read position in `src` for files (advanced by the
    /// call); `None` reads from the current position.
    pub fn write_from<H>(
        &mut self,
        handler: &mut H,
        src: RawFd,
        src_type: FdType,
        mut offset: Option<&mut libc::off_t>,
        len: usize,
    ) -> WriteResult
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        let mut result = self
            .base
            .write_from(src, src_type, offset.as_deref_mut(), len);

        if matches!(&result, Err(e) if e.kind() == io::ErrorKind::WouldBlock) {
            if !self.base.is_ready_for_writing() {
                self.schedule_write();
                return WriteResult::Blocking;
            }

            // The socket became writable in between; try again.
            result = self
                .base
                .write_from(src, src_type, offset.as_deref_mut(), len);
            if matches!(&result, Err(e) if e.kind() == io::ErrorKind::WouldBlock) {
                return WriteResult::SourceBlocking;
            }
        }

        match result {
            Ok(0) => WriteResult::SourceEof,
            result => self.finish_write(handler, result),
        }
    }

    pub fn is_ready_for_writing(&self) -> bool {
        debug_assert!(!self.destroyed);

        self.base.is_ready_for_writing()
    }

    /// Call [`read`](Self::read) on the next loop iteration.
    pub fn defer_read(&mut self, expect_more: bool) {
        self.debug_assert_live();

        if expect_more {
            self.expect_more = true;
        }

        self.read_defer.schedule();
    }

    /// Wait for more data. Data already buffered is delivered on the next
    /// loop iteration.
    pub fn schedule_read(&mut self, expect_more: bool) {
        self.debug_assert_live();

        if expect_more {
            self.expect_more = true;
        }

        if !self.in_data_handler && !self.input.is_empty() {
            self.read_defer.schedule();
        } else {
            self.base.schedule_read();
        }
    }

    pub fn unschedule_read(&mut self) {
        self.base.unschedule_read();
        self.read_defer.cancel();
    }

    /// Invoke the write callback on the next loop iteration, assuming the
    /// socket is writable.
    pub fn defer_write(&mut self) {
        if !self.base.is_write_pending() {
            self.write_defer.schedule();
        }
    }

    pub fn schedule_write(&mut self) {
        self.debug_assert_live();

        self.write_defer.cancel();
        self.base.schedule_write(self.write_timeout);
    }

    pub fn unschedule_write(&mut self) {
        self.base.unschedule_write();
        self.write_defer.cancel();
    }

    /// Dispatch readiness reported by the event loop.
    pub fn on_ready<H>(&mut self, handler: &mut H, ready: Readiness)
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        if !self.is_live() {
            return;
        }

        if ready.error {
            if let Some(error) = self.base.take_error() {
                handler.on_buffered_error(self, SocketError::Socket(error));
                return;
            }
        }

        if ready.hangup && !handler.on_buffered_hangup(self) {
            return;
        }

        if ready.writable
            && self.is_live()
            && self.base.is_write_pending()
            && !self.invoke_write(handler)
        {
            return;
        }

        if ready.readable && self.is_live() && self.base.is_read_pending() {
            self.try_read(handler);
        }
    }

    /// The write timeout armed by [`schedule_write`](Self::schedule_write)
    /// expired. Returns `false` if the socket has been closed.
    pub fn on_write_timeout<H>(&mut self, handler: &mut H) -> bool
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        if !self.is_live() {
            return false;
        }

        trace!(conn = self.id, "write timeout");
        handler.on_buffered_timeout(self)
    }

    /// Run a deferred task addressed to this socket.
    pub fn on_deferred<H>(&mut self, handler: &mut H, kind: DeferKind)
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        if self.destroyed {
            return;
        }

        match kind {
            DeferKind::Read => {
                self.read(handler, false);
            }
            DeferKind::Write => {
                if self.is_live() {
                    self.invoke_write(handler);
                }
            }
            DeferKind::SocketReadable => self.on_ready(handler, Readiness::READABLE),
            DeferKind::SocketWritable => self.on_ready(handler, Readiness::WRITABLE),
        }
    }

    fn is_live(&self) -> bool {
        !self.destroyed && self.base.is_valid()
    }

    fn debug_assert_live(&self) {
        #[cfg(debug_assertions)]
        debug_assert!(!self.debug.ended, "socket used after end of stream");
        debug_assert!(!self.destroyed, "socket used after destroy()");
    }

    fn closed_prematurely<H>(&mut self, handler: &mut H)
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        trace!(conn = self.id, "closed prematurely");
        handler.on_buffered_error(self, SocketError::ClosedPrematurely);
    }

    fn ended<H>(&mut self, handler: &mut H)
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        debug_assert!(!self.is_connected());
        #[cfg(debug_assertions)]
        {
            debug_assert!(!self.debug.ended);
            self.debug.ended = true;
        }

        self.read_defer.cancel();
        self.write_defer.cancel();

        trace!(conn = self.id, "end of stream");
        if !handler.on_buffered_end(self) {
            self.closed_prematurely(handler);
        }
    }

    fn invoke_write<H>(&mut self, handler: &mut H) -> bool
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        match handler.on_buffered_write(self) {
            Ok(alive) => alive,
            Err(error) => {
                handler.on_buffered_error(self, error);
                false
            }
        }
    }

    /// Call the data handler, repeating while it asks to be invoked again
    /// and data remains.
    fn invoke_data<H>(&mut self, handler: &mut H) -> Submitted
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        debug_assert!(!self.input.is_empty());
        debug_assert!(!self.in_data_handler);

        loop {
            let before = self.input.len();

            self.in_data_handler = true;
            let result = handler.on_buffered_data(self);
            self.in_data_handler = false;

            let result = match result {
                Ok(result) => result,
                Err(error) => {
                    handler.on_buffered_error(self, error);
                    return Submitted::Closed;
                }
            };

            #[cfg(debug_assertions)]
            {
                self.debug.last_result = Some(result);
            }

            if self.destroyed {
                debug_assert_eq!(result, BufferedResult::Closed);
                return Submitted::Closed;
            }

            let exhausted = match result {
                BufferedResult::Ok => return Submitted::Ok,
                BufferedResult::More => return Submitted::More,
                BufferedResult::Blocking => return Submitted::Blocking,
                BufferedResult::Closed => return Submitted::Closed,
                BufferedResult::AgainOptional => Submitted::Ok,
                BufferedResult::AgainExpect => Submitted::More,
            };

            if self.input.is_empty() {
                return exhausted;
            }

            let progressed = self.input.len() < before;
            debug_assert!(progressed, "handler asked to be invoked again without consuming");
            if !progressed {
                return exhausted;
            }
        }
    }

    fn submit_from_buffer<H>(&mut self, handler: &mut H) -> bool
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        if self.input.is_empty() {
            return true;
        }

        let old_expect_more = self.expect_more;
        self.expect_more = false;

        match self.invoke_data(handler) {
            Submitted::Ok => {
                if self.input.is_empty() {
                    self.input.free();

                    if !self.is_connected() {
                        self.ended(handler);
                        return false;
                    }

                    if !self.base.is_read_pending() {
                        // refill the buffer now that it's empty
                        self.base.schedule_read();
                    }
                } else if !self.is_connected() {
                    // nothing will arrive from the socket; keep draining
                    self.read_defer.schedule();
                } else if self.input.is_full() {
                    // wait for somebody to request more data
                    self.base.unschedule_read();
                } else if !self.base.is_read_pending() {
                    self.base.schedule_read();
                }

                true
            }

            Submitted::More => {
                self.expect_more = true;

                if !self.is_connected() {
                    self.closed_prematurely(handler);
                    return false;
                }

                if self.input.is_full() {
                    trace!(conn = self.id, "input buffer full");
                    handler.on_buffered_error(self, SocketError::BufferFull);
                    return false;
                }

                self.input.free_if_empty();
                if !self.base.is_read_pending() {
                    self.base.schedule_read();
                }
                true
            }

            Submitted::Blocking => {
                self.expect_more = old_expect_more;

                // the handler calls read() once it's ready again
                if self.is_connected() {
                    self.base.unschedule_read();
                }
                self.read_defer.cancel();
                false
            }

            Submitted::Closed => false,
        }
    }

    fn submit_direct<H>(&mut self, handler: &mut H) -> bool
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        debug_assert!(self.is_connected());
        debug_assert!(self.input.is_empty());

        let Some(fd) = self.base.fd() else {
            return false;
        };
        let fd_type = self.base.fd_type();

        let old_expect_more = self.expect_more;
        self.expect_more = false;

        let result = match handler.on_buffered_direct(self, fd, fd_type) {
            Ok(result) => result,
            Err(error) => {
                handler.on_buffered_error(self, error);
                return false;
            }
        };

        if self.destroyed {
            debug_assert!(matches!(result, DirectResult::Closed));
            return false;
        }

        match result {
            DirectResult::Ok => {
                // some data was transferred; try again
                self.base.schedule_read();
                true
            }

            DirectResult::Blocking => {
                self.expect_more = old_expect_more;
                self.base.unschedule_read();
                false
            }

            DirectResult::Empty => {
                self.expect_more = old_expect_more;
                self.base.clear_read_readiness();
                if !self.base.is_read_pending() {
                    self.base.schedule_read();
                }
                true
            }

            DirectResult::End => self.closed_by_peer(handler),

            DirectResult::Closed => false,

            DirectResult::Error(error) => {
                handler.on_buffered_error(self, SocketError::Direct(error));
                false
            }
        }
    }

    fn fill_buffer<H>(&mut self, handler: &mut H) -> bool
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        debug_assert!(self.is_connected());

        let dst = self.input.write_slice();
        if dst.is_empty() {
            // input buffer is full
            self.base.unschedule_read();
            return true;
        }

        match self.base.read(dst) {
            Ok(0) => self.closed_by_peer(handler),

            Ok(nbytes) => {
                self.input.append(nbytes);
                self.got_data = true;
                true
            }

            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                self.input.free_if_empty();
                self.base.schedule_read();
                true
            }

            Err(e) => {
                self.input.free_if_empty();
                handler.on_buffered_error(self, SocketError::Receive(e));
                false
            }
        }
    }

    fn try_read2<H>(&mut self, handler: &mut H) -> bool
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        if !self.is_connected() {
            if self.input.is_empty() {
                self.ended(handler);
                return false;
            }

            self.submit_from_buffer(handler)
        } else if self.direct {
            // empty the buffer before doing direct transfers
            if !self.submit_from_buffer(handler) {
                return false;
            }

            if !self.input.is_empty() {
                // the handler isn't ready for the rest; stop here
                return true;
            }

            self.submit_direct(handler)
        } else {
            self.got_data = false;

            if !self.fill_buffer(handler) {
                return false;
            }

            self.submit_from_buffer(handler)
        }
    }

    fn try_read<H>(&mut self, handler: &mut H) -> bool
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        debug_assert!(!self.destroyed);

        #[cfg(debug_assertions)]
        {
            self.debug.reading = true;
        }

        let result = self.try_read2(handler);

        #[cfg(debug_assertions)]
        {
            self.debug.reading = false;
        }

        trace!(conn = self.id, got_data = self.got_data, result, "read attempt");
        result
    }

    fn finish_write<H>(&mut self, handler: &mut H, result: io::Result<usize>) -> WriteResult
    where
        H: BufferedSocketHandler<S> + ?Sized,
    {
        match result {
            Ok(nbytes) => WriteResult::Written(nbytes),

            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                self.schedule_write();
                WriteResult::Blocking
            }

            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
                ) =>
            {
                let disposition = handler.on_buffered_broken(self);
                if self.destroyed {
                    return WriteResult::Destroyed;
                }

                match disposition {
                    BrokenDisposition::Continue => {
                        self.unschedule_write();
                        WriteResult::Broken
                    }
                    BrokenDisposition::Destroyed => WriteResult::Destroyed,
                    BrokenDisposition::Error => WriteResult::Error(e),
                }
            }

            Err(e) => WriteResult::Error(e),
        }
    }
}
