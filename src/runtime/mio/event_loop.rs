//! mio event loop implementation.
//!
//! One loop per worker thread. Each iteration:
//!
//! 1. polls (zero timeout while deferred tasks are queued, otherwise until
//!    the next write timeout),
//! 2. accepts new connections and dispatches socket readiness,
//! 3. fires expired write timers,
//! 4. runs the deferred tasks queued before this step began,
//! 5. releases connections whose handler destroyed the socket.
//!
//! Uses epoll on Linux, kqueue on macOS.

use crate::config::Config;
use crate::protocols;
use crate::runtime::buffered::BufferedSocket;
use crate::runtime::connection::{Connection, ConnectionRegistry};
use crate::runtime::defer::DeferTask;
use crate::runtime::mio::socket::{readiness, MioSocket, Reactor};
use crate::runtime::socket::FdType;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

type MioConnection = Connection<MioSocket>;

/// Run the server: one event loop per worker thread, all bound to the same
/// address with `SO_REUSEPORT`.
pub fn run(config: Config) -> io::Result<()> {
    let num_workers = if config.workers == 0 {
        num_cpus()
    } else {
        config.workers
    };

    let addr = parse_addr(&config.listen)?;

    info!(
        workers = num_workers,
        addr = %addr,
        protocol = ?config.protocol,
        "Starting mio runtime"
    );

    let mut handles = Vec::with_capacity(num_workers);

    for worker_id in 0..num_workers {
        let config = config.clone();

        let handle = thread::Builder::new()
            .name(format!("worker-{worker_id}"))
            .spawn(move || {
                let result = EventLoop::bind(worker_id, addr, &config).and_then(|mut el| el.run());
                if let Err(e) = result {
                    error!(worker = worker_id, error = %e, "Worker failed");
                }
            })?;

        handles.push(handle);
    }

    join_workers(handles);
    Ok(())
}

/// Wait for all workers. Returns how many of them panicked.
fn join_workers(handles: Vec<thread::JoinHandle<()>>) -> usize {
    let mut panicked = 0;
    for handle in handles {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if let Err(payload) = handle.join() {
            let message = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("unknown panic");
            error!(worker = %name, panic = message, "Worker panicked");
            panicked += 1;
        }
    }
    panicked
}

/// Single-threaded event loop serving one listener.
pub struct EventLoop {
    worker_id: usize,
    config: Config,
    poll: Poll,
    events: Events,
    listener: TcpListener,
    reactor: Rc<Reactor>,
    connections: ConnectionRegistry<MioConnection>,
    /// Connections found destroyed during this iteration.
    finished: Vec<usize>,
}

impl EventLoop {
    /// Create the poller and bind the listener.
    pub fn bind(worker_id: usize, addr: SocketAddr, config: &Config) -> io::Result<Self> {
        let poll = Poll::new()?;
        let events = Events::with_capacity(config.batch_size);

        // Create listener with SO_REUSEPORT for kernel load balancing
        let listener = create_listener_with_reuseport(addr)?;
        let mut listener = TcpListener::from_std(listener);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let reactor = Rc::new(Reactor::new(poll.registry().try_clone()?));

        info!(
            worker = worker_id,
            addr = %listener.local_addr()?,
            max_connections = config.max_connections,
            input_buffer_size = config.input_buffer_size,
            "Worker started"
        );

        Ok(Self {
            worker_id,
            config: config.clone(),
            poll,
            events,
            listener,
            reactor,
            connections: ConnectionRegistry::new(config.max_connections),
            finished: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn run(&mut self) -> io::Result<()> {
        loop {
            self.run_once(None)?;
        }
    }

    /// One loop iteration. `max_wait` caps the poll timeout.
    pub fn run_once(&mut self, max_wait: Option<Duration>) -> io::Result<()> {
        let timeout = self.poll_timeout(max_wait);

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => accept_connections(
                    &self.listener,
                    &self.reactor,
                    &mut self.connections,
                    &self.config,
                    self.worker_id,
                ),
                Token(conn_id) => {
                    let ready = readiness(event);
                    dispatch(&mut self.connections, &mut self.finished, conn_id, |conn| {
                        conn.sock.socket_mut().note_readiness(ready);
                        conn.on_ready(ready);
                    });
                }
            }
        }

        self.expire_timers();
        self.run_deferred();
        self.reap();

        Ok(())
    }

    fn poll_timeout(&self, max_wait: Option<Duration>) -> Option<Duration> {
        if !self.reactor.defers().borrow().is_empty() {
            return Some(Duration::ZERO);
        }

        let next_timer = self.reactor.timers().borrow().next_timeout(Instant::now());
        match (next_timer, max_wait) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn expire_timers(&mut self) {
        let now = Instant::now();
        while let Some(conn_id) = pop_expired_timer(&self.reactor, now) {
            debug!(conn_id, "write timeout");
            dispatch(&mut self.connections, &mut self.finished, conn_id, |conn| {
                conn.on_write_timeout();
            });
        }
    }

    fn run_deferred(&mut self) {
        // tasks scheduled from here on wait for the next iteration
        let batch_end = self.reactor.defers().borrow().batch_end();
        while let Some(task) = pop_deferred(&self.reactor, batch_end) {
            dispatch(&mut self.connections, &mut self.finished, task.conn, |conn| {
                conn.on_deferred(task.kind)
            });
        }
    }

    fn reap(&mut self) {
        for conn_id in self.finished.drain(..) {
            if self
                .connections
                .get(conn_id)
                .is_some_and(|conn| conn.is_finished())
            {
                self.connections.remove(conn_id);
                debug!(conn_id, "Connection closed");
            }
        }
    }
}

fn pop_expired_timer(reactor: &Reactor, now: Instant) -> Option<usize> {
    reactor.timers().borrow_mut().pop_expired(now)
}

fn pop_deferred(reactor: &Reactor, batch_end: u64) -> Option<DeferTask> {
    reactor.defers().borrow_mut().pop_ready(batch_end)
}

/// Run `f` on a live connection, then re-queue readiness it did not consume
/// and remember the connection if it is gone.
fn dispatch<F>(
    connections: &mut ConnectionRegistry<MioConnection>,
    finished: &mut Vec<usize>,
    conn_id: usize,
    f: F,
) where
    F: FnOnce(&mut MioConnection),
{
    let Some(conn) = connections.get_mut(conn_id) else {
        return;
    };
    if conn.is_finished() {
        return;
    }

    f(conn);

    if conn.is_finished() {
        finished.push(conn_id);
    } else {
        conn.sock.socket_mut().rearm();
    }
}

fn accept_connections(
    listener: &TcpListener,
    reactor: &Rc<Reactor>,
    connections: &mut ConnectionRegistry<MioConnection>,
    config: &Config,
    worker_id: usize,
) {
    loop {
        match listener.accept() {
            Ok((mut stream, peer_addr)) => {
                if connections.is_full() {
                    warn!(worker = worker_id, "Connection limit reached");
                    continue;
                }

                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "set_nodelay failed");
                }

                let conn_id = connections.next_id();
                if let Err(e) = reactor.register(&mut stream, conn_id) {
                    warn!(worker = worker_id, error = %e, "Failed to register connection");
                    continue;
                }

                let mut sock = BufferedSocket::new(
                    MioSocket::new(reactor, conn_id),
                    reactor.defers(),
                    conn_id,
                    config.input_buffer_size,
                );
                sock.init(stream, FdType::Tcp, config.write_timeout);
                sock.set_direct(config.direct && config.protocol.supports_direct());

                let mut conn = Connection::new(sock, protocols::new_handler(config.protocol));
                // the registration reports current readiness on the next poll
                conn.start();

                if connections.insert(conn).is_none() {
                    continue;
                }

                debug!(
                    worker = worker_id,
                    conn_id,
                    peer = %peer_addr,
                    "Accepted connection"
                );
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                error!("Accept error: {}", e);
                break;
            }
        }
    }
}

fn parse_addr(listen: &str) -> io::Result<SocketAddr> {
    listen
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Create a TCP listener with SO_REUSEPORT for kernel load balancing.
fn create_listener_with_reuseport(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_port(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
