//! `RawSocket` on top of a mio `TcpStream`.
//!
//! mio is edge-triggered: a readiness event is reported once and not again
//! until the socket returned `WouldBlock`. `BufferedSocket` expects level
//! semantics, so `MioSocket` remembers per-direction readiness hints and,
//! through [`MioSocket::rearm`], re-queues a synthetic readiness task while
//! the direction is scheduled and the hint is still set.

use crate::runtime::defer::{DeferEvent, DeferKind, DeferQueue, DeferTask, SharedDeferQueue};
use crate::runtime::socket::{FdType, RawSocket, Readiness};
use crate::runtime::timer::{SharedTimerQueue, TimerEvent, TimerQueue};
use mio::event::Event;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::io::{self, IoSlice, Read, Write};
use std::net::Shutdown;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-worker state shared by all sockets of one event loop.
pub struct Reactor {
    registry: Registry,
    defers: SharedDeferQueue,
    timers: SharedTimerQueue,
}

impl Reactor {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            defers: DeferQueue::shared(),
            timers: TimerQueue::shared(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn defers(&self) -> &SharedDeferQueue {
        &self.defers
    }

    pub fn timers(&self) -> &SharedTimerQueue {
        &self.timers
    }

    /// Register a freshly accepted stream for both directions. Interest is
    /// never changed afterwards; scheduling is tracked by `MioSocket`.
    pub fn register(&self, stream: &mut TcpStream, id: usize) -> io::Result<()> {
        self.registry
            .register(stream, Token(id), Interest::READABLE | Interest::WRITABLE)
    }
}

/// Translate a mio event.
pub fn readiness(event: &Event) -> Readiness {
    Readiness {
        readable: event.is_readable() || event.is_read_closed(),
        writable: event.is_writable() || event.is_write_closed(),
        hangup: event.is_read_closed(),
        error: event.is_error(),
    }
}

pub struct MioSocket {
    reactor: Rc<Reactor>,
    id: usize,
    stream: Option<TcpStream>,
    fd_type: FdType,

    read_scheduled: bool,
    write_scheduled: bool,

    /// Readable since the last `WouldBlock` from a read.
    read_ready: bool,
    /// Writable since the last `WouldBlock` from a write.
    write_ready: bool,

    read_wakeup: DeferEvent,
    write_wakeup: DeferEvent,
    write_timer: TimerEvent,
}

impl MioSocket {
    pub fn new(reactor: &Rc<Reactor>, id: usize) -> Self {
        Self {
            reactor: Rc::clone(reactor),
            id,
            stream: None,
            fd_type: FdType::Tcp,
            read_scheduled: false,
            write_scheduled: false,
            read_ready: false,
            write_ready: false,
            read_wakeup: DeferEvent::new(
                reactor.defers(),
                DeferTask::new(id, DeferKind::SocketReadable),
            ),
            write_wakeup: DeferEvent::new(
                reactor.defers(),
                DeferTask::new(id, DeferKind::SocketWritable),
            ),
            write_timer: TimerEvent::new(reactor.timers(), id),
        }
    }

    /// Record readiness reported by the poller.
    pub fn note_readiness(&mut self, ready: Readiness) {
        if ready.readable {
            self.read_ready = true;
        }
        if ready.writable {
            self.write_ready = true;
        }
    }

    /// Queue synthetic readiness for scheduled directions which have not
    /// hit `WouldBlock` yet. Called after each dispatch.
    pub fn rearm(&mut self) {
        if self.stream.is_none() {
            return;
        }
        if self.read_scheduled && self.read_ready {
            self.read_wakeup.schedule();
        }
        if self.write_scheduled && self.write_ready {
            self.write_wakeup.schedule();
        }
    }

    fn note_result<T>(result: &io::Result<T>, ready: &mut bool) {
        if matches!(result, Err(e) if e.kind() == io::ErrorKind::WouldBlock) {
            *ready = false;
        }
    }

    fn stream_mut(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn detach(&mut self) -> Option<TcpStream> {
        self.read_scheduled = false;
        self.write_scheduled = false;
        self.read_ready = false;
        self.write_ready = false;
        self.read_wakeup.cancel();
        self.write_wakeup.cancel();
        self.write_timer.cancel();

        let mut stream = self.stream.take()?;
        if let Err(e) = self.reactor.registry.deregister(&mut stream) {
            debug!(conn = self.id, error = %e, "deregister failed");
        }
        Some(stream)
    }
}

impl RawSocket for MioSocket {
    type Stream = TcpStream;

    /// The stream must already be registered under this socket's id, see
    /// [`Reactor::register`].
    fn init(&mut self, stream: TcpStream, fd_type: FdType) {
        self.stream = Some(stream);
        self.fd_type = fd_type;
        self.read_scheduled = false;
        self.write_scheduled = false;
        self.read_ready = false;
        self.write_ready = false;
    }

    fn is_valid(&self) -> bool {
        self.stream.is_some()
    }

    fn fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|s| s.as_raw_fd())
    }

    fn fd_type(&self) -> FdType {
        self.fd_type
    }

    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let result = self.stream_mut()?.read(dst);
        Self::note_result(&result, &mut self.read_ready);
        result
    }

    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        let result = self.stream_mut()?.write(src);
        Self::note_result(&result, &mut self.write_ready);
        result
    }

    fn write_vectored(&mut self, src: &[IoSlice<'_>]) -> io::Result<usize> {
        let result = self.stream_mut()?.write_vectored(src);
        Self::note_result(&result, &mut self.write_ready);
        result
    }

    fn write_from(
        &mut self,
        src: RawFd,
        src_type: FdType,
        offset: Option<&mut libc::off_t>,
        len: usize,
    ) -> io::Result<usize> {
        let dst = self.stream_mut()?.as_raw_fd();
        let result = transfer(dst, src, src_type, offset, len);
        Self::note_result(&result, &mut self.write_ready);
        result
    }

    fn is_ready_for_writing(&self) -> bool {
        let Some(fd) = self.fd() else {
            return false;
        };

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLOUT,
            revents: 0,
        };
        // SAFETY: one valid pollfd, zero timeout
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        n > 0 && pfd.revents & libc::POLLOUT != 0
    }

    fn take_error(&mut self) -> Option<io::Error> {
        match self.stream.as_ref()?.take_error() {
            Ok(error) => error,
            Err(e) => Some(e),
        }
    }

    fn shutdown(&mut self) {
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!(conn = self.id, error = %e, "shutdown failed");
            }
        }
    }

    fn close(&mut self) {
        // dropping the stream closes the descriptor
        drop(self.detach());
    }

    fn abandon(&mut self) -> Option<TcpStream> {
        self.detach()
    }

    fn schedule_read(&mut self) {
        if self.stream.is_none() {
            return;
        }
        self.read_scheduled = true;
        self.rearm();
    }

    fn unschedule_read(&mut self) {
        self.read_scheduled = false;
        self.read_wakeup.cancel();
    }

    fn is_read_pending(&self) -> bool {
        self.read_scheduled
    }

    fn schedule_write(&mut self, timeout: Option<Duration>) {
        if self.stream.is_none() {
            return;
        }
        self.write_scheduled = true;
        match timeout {
            Some(timeout) => self.write_timer.schedule(timeout),
            None => self.write_timer.cancel(),
        }
        self.rearm();
    }

    fn unschedule_write(&mut self) {
        self.write_scheduled = false;
        self.write_wakeup.cancel();
        self.write_timer.cancel();
    }

    fn is_write_pending(&self) -> bool {
        self.write_scheduled
    }

    fn clear_read_readiness(&mut self) {
        self.read_ready = false;
    }
}

fn cvt(n: isize) -> io::Result<usize> {
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

#[cfg(target_os = "linux")]
fn transfer(
    dst: RawFd,
    src: RawFd,
    src_type: FdType,
    offset: Option<&mut libc::off_t>,
    len: usize,
) -> io::Result<usize> {
    match src_type {
        FdType::File => {
            let offset = offset.map_or(std::ptr::null_mut(), |o| o as *mut libc::off_t);
            // SAFETY: valid descriptors; offset is null or points to a live off_t
            cvt(unsafe { libc::sendfile(dst, src, offset, len) })
        }
        FdType::Pipe => {
            // SAFETY: valid descriptors; pipes take no offsets
            cvt(unsafe {
                libc::splice(
                    src,
                    std::ptr::null_mut(),
                    dst,
                    std::ptr::null_mut(),
                    len,
                    libc::SPLICE_F_MOVE | libc::SPLICE_F_NONBLOCK,
                )
            })
        }
        _ => Err(io::ErrorKind::Unsupported.into()),
    }
}

#[cfg(not(target_os = "linux"))]
fn transfer(
    dst: RawFd,
    src: RawFd,
    src_type: FdType,
    offset: Option<&mut libc::off_t>,
    len: usize,
) -> io::Result<usize> {
    // Files only: pread() leaves the file position alone, so bytes the socket
    // did not accept are simply read again next time.
    let (FdType::File, Some(offset)) = (src_type, offset) else {
        return Err(io::ErrorKind::Unsupported.into());
    };

    let mut buf = [0u8; 16384];
    let want = len.min(buf.len());
    // SAFETY: buf is valid for `want` bytes
    let n = cvt(unsafe { libc::pread(src, buf.as_mut_ptr().cast(), want, *offset) })?;
    if n == 0 {
        return Ok(0);
    }

    // SAFETY: buf holds `n` initialized bytes
    let written = cvt(unsafe { libc::write(dst, buf.as_ptr().cast(), n) })?;
    *offset += written as libc::off_t;
    Ok(written)
}

impl Drop for MioSocket {
    fn drop(&mut self) {
        if self.stream.is_some() {
            warn!(conn = self.id, "socket dropped while still open");
            drop(self.detach());
        }
    }
}
