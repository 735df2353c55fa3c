//! Raw socket abstraction consumed by `BufferedSocket`.
//!
//! A raw socket is a nonblocking descriptor wrapper that also owns the
//! descriptor's registration with the event loop: it knows whether read or
//! write interest is currently scheduled and arms the write timeout.

use std::io::{self, IoSlice};
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Kind of descriptor, used to pick a transfer primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdType {
    File,
    Pipe,
    /// Any socket family other than TCP.
    Socket,
    Tcp,
    CharDev,
}

/// Readiness reported by the event loop for one socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// The peer shut down its sending side.
    pub hangup: bool,
    /// An error is pending on the socket.
    pub error: bool,
}

impl Readiness {
    pub const READABLE: Readiness = Readiness {
        readable: true,
        writable: false,
        hangup: false,
        error: false,
    };

    pub const WRITABLE: Readiness = Readiness {
        readable: false,
        writable: true,
        hangup: false,
        error: false,
    };
}

/// Nonblocking socket with event loop registration.
///
/// I/O methods follow `std::io` conventions: `Ok(0)` from [`read`] is end of
/// stream, `ErrorKind::WouldBlock` means "try again after readiness",
/// `BrokenPipe`/`ConnectionReset` from the write methods means the peer no
/// longer accepts data.
///
/// [`read`]: RawSocket::read
pub trait RawSocket {
    /// Owned descriptor type handed in by [`init`](RawSocket::init) and
    /// handed back by [`abandon`](RawSocket::abandon).
    type Stream;

    /// Attach a connected stream. Nothing is scheduled yet.
    fn init(&mut self, stream: Self::Stream, fd_type: FdType);

    /// Is a stream attached?
    fn is_valid(&self) -> bool;

    fn fd(&self) -> Option<RawFd>;

    fn fd_type(&self) -> FdType;

    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, src: &[u8]) -> io::Result<usize>;

    fn write_vectored(&mut self, src: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Move up to `len` bytes from `src` into the socket without copying
    /// through userspace where the platform allows it. `Ok(0)` means the
    /// source is at end of file.
    fn write_from(
        &mut self,
        src: RawFd,
        src_type: FdType,
        offset: Option<&mut libc::off_t>,
        len: usize,
    ) -> io::Result<usize>;

    /// Would a write succeed right now without blocking?
    fn is_ready_for_writing(&self) -> bool;

    /// Fetch and clear the pending socket error (`SO_ERROR`).
    fn take_error(&mut self) -> Option<io::Error>;

    fn shutdown(&mut self);

    /// Unregister and close the descriptor.
    fn close(&mut self);

    /// Unregister the descriptor and give up ownership without closing it.
    fn abandon(&mut self) -> Option<Self::Stream>;

    fn schedule_read(&mut self);

    fn unschedule_read(&mut self);

    fn is_read_pending(&self) -> bool;

    /// Wait for writability; `timeout` of `None` waits forever.
    fn schedule_write(&mut self, timeout: Option<Duration>);

    fn unschedule_write(&mut self);

    fn is_write_pending(&self) -> bool;

    /// Someone other than [`read`](RawSocket::read) observed `WouldBlock`
    /// on the descriptor (e.g. a direct transfer).
    fn clear_read_readiness(&mut self) {}
}
