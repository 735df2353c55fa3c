//! Per-connection input buffer.
//!
//! Holds bytes that were received from the socket but not yet consumed by
//! the handler. The storage is allocated lazily on the first read and grows
//! geometrically up to a fixed capacity; it can be released again whenever
//! the buffer becomes empty, so idle connections cost no buffer memory.
//!
//! ## Layout
//!
//! The buffer is a FIFO over a single allocation. Instead of wrapping around
//! like a classic ring, it compacts the unread bytes to the front when the
//! tail reaches the end of the allocation. This keeps the readable region
//! contiguous, which handlers rely on: a handler that answers "need more
//! data" must always be shown everything that has been received so far.

/// Smallest allocation made when the buffer first receives data.
const INITIAL_ALLOCATION: usize = 1024;

/// Error returned when appending would grow the buffer past its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("input buffer capacity exceeded: {requested} bytes requested, {available} free")]
pub struct CapacityError {
    /// Bytes that were offered.
    pub requested: usize,
    /// Bytes that were still free.
    pub available: usize,
}

/// Growable byte FIFO with a hard capacity limit.
#[derive(Debug)]
pub struct InputBuffer {
    /// Backing storage; empty while unallocated.
    data: Vec<u8>,
    /// Offset of the first unread byte.
    head: usize,
    /// Offset one past the last received byte.
    tail: usize,
    /// Upper bound for `data.len()`.
    capacity: usize,
}

impl InputBuffer {
    /// Create an unallocated buffer which may hold up to `capacity` bytes.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "input buffer capacity must be non-zero");
        Self {
            data: Vec::new(),
            head: 0,
            tail: 0,
            capacity,
        }
    }

    /// Maximum number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Is backing storage currently allocated?
    pub fn is_allocated(&self) -> bool {
        !self.data.is_empty()
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Is the buffer allocated and holding `capacity` unread bytes?
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Number of bytes that can still be appended.
    pub fn free_space(&self) -> usize {
        self.capacity - self.len()
    }

    /// Borrow all unread bytes.
    pub fn read(&self) -> &[u8] {
        &self.data[self.head..self.tail]
    }

    /// Get writable space at the end of the buffer, allocating, compacting
    /// or growing the storage as needed.
    ///
    /// Returns an empty slice if the buffer is full. Bytes written into the
    /// slice become readable after [`append`](Self::append).
    pub fn write_slice(&mut self) -> &mut [u8] {
        if self.tail == self.data.len() {
            if self.head > 0 {
                self.compact();
            } else if self.data.len() < self.capacity {
                self.grow();
            }
        }
        &mut self.data[self.tail..]
    }

    /// Mark `n` bytes of the slice returned by
    /// [`write_slice`](Self::write_slice) as received.
    ///
    /// # Panics
    /// Panics if `n` exceeds the writable space.
    pub fn append(&mut self, n: usize) {
        assert!(
            n <= self.data.len() - self.tail,
            "append of {n} bytes exceeds writable space"
        );
        self.tail += n;
    }

    /// Copy `src` into the buffer.
    ///
    /// Fails without modifying the buffer if `src` does not fit.
    pub fn push(&mut self, src: &[u8]) -> Result<(), CapacityError> {
        if src.len() > self.free_space() {
            return Err(CapacityError {
                requested: src.len(),
                available: self.free_space(),
            });
        }

        let mut offset = 0;
        while offset < src.len() {
            let dst = self.write_slice();
            let n = dst.len().min(src.len() - offset);
            dst[..n].copy_from_slice(&src[offset..offset + n]);
            self.append(n);
            offset += n;
        }
        Ok(())
    }

    /// Drop `n` bytes from the front of the buffer.
    ///
    /// # Panics
    /// Panics if `n` exceeds the number of unread bytes; a byte can only be
    /// consumed once.
    pub fn consume(&mut self, n: usize) {
        assert!(
            n <= self.len(),
            "consumed {n} bytes but only {} available",
            self.len()
        );
        self.head += n;
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        }
    }

    /// Release the storage if no unread bytes remain.
    pub fn free_if_empty(&mut self) {
        if self.is_empty() {
            self.free();
        }
    }

    /// Release the storage, discarding any unread bytes.
    pub fn free(&mut self) {
        self.data = Vec::new();
        self.head = 0;
        self.tail = 0;
    }

    fn compact(&mut self) {
        self.data.copy_within(self.head..self.tail, 0);
        self.tail -= self.head;
        self.head = 0;
    }

    fn grow(&mut self) {
        let new_len = if self.data.is_empty() {
            INITIAL_ALLOCATION.min(self.capacity)
        } else {
            (self.data.len() * 2).min(self.capacity)
        };
        self.data.resize(new_len, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lazy_allocation() {
        let mut buf = InputBuffer::new(4096);
        assert!(!buf.is_allocated());
        assert!(buf.is_empty());
        assert!(!buf.is_full());

        buf.push(b"hello").unwrap();
        assert!(buf.is_allocated());
        assert_eq!(buf.read(), b"hello");

        buf.consume(5);
        assert!(buf.is_empty());
        buf.free_if_empty();
        assert!(!buf.is_allocated());
    }

    #[test]
    fn test_grows_up_to_capacity() {
        let mut buf = InputBuffer::new(3000);
        let data: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        buf.push(&data).unwrap();

        assert!(buf.is_full());
        assert_eq!(buf.read(), &data[..]);
        assert!(buf.write_slice().is_empty());
    }

    #[test]
    fn test_push_past_capacity_fails() {
        let mut buf = InputBuffer::new(8);
        buf.push(b"12345").unwrap();

        let err = buf.push(b"6789").unwrap_err();
        assert_eq!(
            err,
            CapacityError {
                requested: 4,
                available: 3
            }
        );
        assert_eq!(
            err.to_string(),
            "input buffer capacity exceeded: 4 bytes requested, 3 free"
        );
        // Nothing was written
        assert_eq!(buf.read(), b"12345");
    }

    #[test]
    fn test_compacts_instead_of_wrapping() {
        let mut buf = InputBuffer::new(8);
        buf.push(b"abcdefgh").unwrap();
        buf.consume(6);

        buf.push(b"ijk").unwrap();
        assert_eq!(buf.read(), b"ghijk");
    }

    #[test]
    fn test_write_slice_and_append() {
        let mut buf = InputBuffer::new(16);
        let dst = buf.write_slice();
        assert_eq!(dst.len(), 16);
        dst[..3].copy_from_slice(b"xyz");
        buf.append(3);
        assert_eq!(buf.read(), b"xyz");
    }

    #[test]
    #[should_panic(expected = "only 2 available")]
    fn test_consume_more_than_available_panics() {
        let mut buf = InputBuffer::new(16);
        buf.push(b"ab").unwrap();
        buf.consume(3);
    }

    proptest! {
        #[test]
        fn prop_consume_never_exceeds_available(
            ops in proptest::collection::vec((0usize..64, 0usize..64), 1..64)
        ) {
            let mut buf = InputBuffer::new(128);
            let mut model: std::collections::VecDeque<u8> = Default::default();
            let mut next = 0u8;

            for (push, take) in ops {
                let push = push.min(buf.free_space());
                let chunk: Vec<u8> = (0..push).map(|_| { next = next.wrapping_add(1); next }).collect();
                buf.push(&chunk).unwrap();
                model.extend(chunk.iter().copied());

                let take = take.min(buf.len());
                let expected: Vec<u8> = model.drain(..take).collect();
                prop_assert_eq!(&buf.read()[..take], &expected[..]);
                buf.consume(take);

                prop_assert!(buf.len() <= buf.capacity());
                prop_assert_eq!(buf.len(), model.len());
            }
        }
    }
}
