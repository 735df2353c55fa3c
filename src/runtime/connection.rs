//! Connection = buffered socket + the handler driving it.
//!
//! The handler is stored next to the socket rather than inside it, so the
//! event loop can lend both to `BufferedSocket` methods at the same time.

use crate::runtime::buffered::BufferedSocket;
use crate::runtime::defer::DeferKind;
use crate::runtime::handler::BufferedSocketHandler;
use crate::runtime::socket::{RawSocket, Readiness};
use slab::Slab;

/// A single client connection.
pub struct Connection<S: RawSocket> {
    pub sock: BufferedSocket<S>,
    pub handler: Box<dyn BufferedSocketHandler<S>>,
}

impl<S: RawSocket> Connection<S> {
    pub fn new(sock: BufferedSocket<S>, handler: Box<dyn BufferedSocketHandler<S>>) -> Self {
        Self { sock, handler }
    }

    /// Start waiting for request data.
    pub fn start(&mut self) {
        self.sock.schedule_read(false);
    }

    pub fn on_ready(&mut self, ready: Readiness) {
        self.sock.on_ready(&mut *self.handler, ready);
    }

    pub fn on_deferred(&mut self, kind: DeferKind) {
        self.sock.on_deferred(&mut *self.handler, kind);
    }

    pub fn on_write_timeout(&mut self) -> bool {
        self.sock.on_write_timeout(&mut *self.handler)
    }

    /// Has the handler destroyed the socket? The slot can be released then.
    pub fn is_finished(&self) -> bool {
        !self.sock.is_valid()
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionRegistry<T> {
    connections: Slab<T>,
    max_connections: usize,
}

impl<T> ConnectionRegistry<T> {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Identifier the next [`insert`](Self::insert) will use.
    pub fn next_id(&self) -> usize {
        self.connections.vacant_key()
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: T) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    pub fn get(&self, id: usize) -> Option<&T> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.connections.get_mut(id)
    }

    pub fn remove(&mut self, id: usize) -> Option<T> {
        self.connections.try_remove(id)
    }

    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }

    /// Maximum number of connections allowed.
    pub fn capacity(&self) -> usize {
        self.max_connections
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.connections.iter()
    }
}
