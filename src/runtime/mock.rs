//! Scripted in-memory socket for unit tests.

use crate::runtime::socket::{FdType, RawSocket};
use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::os::unix::io::RawFd;
use std::time::Duration;

/// One scripted outcome of `read()`.
#[derive(Debug, Clone)]
pub(crate) enum ReadStep {
    Data(Vec<u8>),
    WouldBlock,
    Eof,
    Fail(io::ErrorKind),
}

/// One scripted outcome of a write call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteStep {
    /// Accept at most this many bytes.
    Accept(usize),
    WouldBlock,
    Broken,
}

#[derive(Debug)]
pub(crate) struct MockSocket {
    pub fd: Option<RawFd>,
    pub fd_type: FdType,
    pub reads: VecDeque<ReadStep>,
    /// Consumed in order; once empty, every write is accepted in full.
    pub writes: VecDeque<WriteStep>,
    pub written: Vec<u8>,
    /// Source descriptor outcomes for `write_from()`; `Eof` once empty.
    pub source: VecDeque<ReadStep>,
    pub read_calls: usize,
    pub read_scheduled: bool,
    pub write_scheduled: bool,
    pub write_timeout: Option<Duration>,
    pub writable: bool,
    pub pending_error: Option<io::ErrorKind>,
    pub shut_down: bool,
    pub closed: bool,
    pub abandoned: bool,
}

impl Default for MockSocket {
    fn default() -> Self {
        Self {
            fd: None,
            fd_type: FdType::Tcp,
            reads: VecDeque::new(),
            writes: VecDeque::new(),
            written: Vec::new(),
            source: VecDeque::new(),
            read_calls: 0,
            read_scheduled: false,
            write_scheduled: false,
            write_timeout: None,
            writable: true,
            pending_error: None,
            shut_down: false,
            closed: false,
            abandoned: false,
        }
    }
}

impl MockSocket {
    fn accept(&mut self, len: usize) -> io::Result<usize> {
        if self.fd.is_none() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        match self.writes.pop_front() {
            None => Ok(len),
            Some(WriteStep::Accept(max)) => Ok(len.min(max)),
            Some(WriteStep::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
            Some(WriteStep::Broken) => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    fn detach(&mut self) -> Option<RawFd> {
        self.read_scheduled = false;
        self.write_scheduled = false;
        self.fd.take()
    }
}

impl RawSocket for MockSocket {
    type Stream = RawFd;

    fn init(&mut self, stream: RawFd, fd_type: FdType) {
        self.fd = Some(stream);
        self.fd_type = fd_type;
    }

    fn is_valid(&self) -> bool {
        self.fd.is_some()
    }

    fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    fn fd_type(&self) -> FdType {
        self.fd_type
    }

    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if self.fd.is_none() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.read_calls += 1;
        match self.reads.pop_front() {
            None | Some(ReadStep::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadStep::Eof) => Ok(0),
            Some(ReadStep::Fail(kind)) => Err(kind.into()),
            Some(ReadStep::Data(mut data)) => {
                let n = dst.len().min(data.len());
                dst[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.reads.push_front(ReadStep::Data(data.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        let n = self.accept(src.len())?;
        self.written.extend_from_slice(&src[..n]);
        Ok(n)
    }

    fn write_vectored(&mut self, src: &[IoSlice<'_>]) -> io::Result<usize> {
        let flat: Vec<u8> = src.iter().flat_map(|s| s.iter().copied()).collect();
        self.write(&flat)
    }

    fn write_from(
        &mut self,
        _src: RawFd,
        _src_type: FdType,
        offset: Option<&mut libc::off_t>,
        len: usize,
    ) -> io::Result<usize> {
        let mut data = match self.source.pop_front() {
            None | Some(ReadStep::Eof) => return Ok(0),
            Some(ReadStep::WouldBlock) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadStep::Fail(kind)) => return Err(kind.into()),
            Some(ReadStep::Data(data)) => data,
        };

        let n = match self.accept(data.len().min(len)) {
            Ok(n) => n,
            Err(e) => {
                self.source.push_front(ReadStep::Data(data));
                return Err(e);
            }
        };
        self.written.extend_from_slice(&data[..n]);
        if n < data.len() {
            self.source.push_front(ReadStep::Data(data.split_off(n)));
        }
        if let Some(offset) = offset {
            *offset += n as libc::off_t;
        }
        Ok(n)
    }

    fn is_ready_for_writing(&self) -> bool {
        self.writable
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.pending_error.take().map(io::Error::from)
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
    }

    fn close(&mut self) {
        if self.detach().is_some() {
            self.closed = true;
        }
    }

    fn abandon(&mut self) -> Option<RawFd> {
        let fd = self.detach();
        self.abandoned = fd.is_some();
        fd
    }

    fn schedule_read(&mut self) {
        if self.fd.is_some() {
            self.read_scheduled = true;
        }
    }

    fn unschedule_read(&mut self) {
        self.read_scheduled = false;
    }

    fn is_read_pending(&self) -> bool {
        self.read_scheduled
    }

    fn schedule_write(&mut self, timeout: Option<Duration>) {
        if self.fd.is_some() {
            self.write_scheduled = true;
            self.write_timeout = timeout;
        }
    }

    fn unschedule_write(&mut self) {
        self.write_scheduled = false;
        self.write_timeout = None;
    }

    fn is_write_pending(&self) -> bool {
        self.write_scheduled
    }
}
