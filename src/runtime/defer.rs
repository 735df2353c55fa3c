//! Deferred one-shot tasks.
//!
//! A [`DeferEvent`] schedules a task to run on the next event loop
//! iteration unless it is canceled first. The event loop owns the shared
//! [`DeferQueue`] and pops ready tasks one at a time, so canceling a task
//! from inside another task's callback still prevents it from running.
//!
//! Used to skip a subscribe/unsubscribe round trip when the outcome of a
//! readiness wait is already known (e.g. data is already buffered).

use slab::Slab;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// What a deferred task does when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferKind {
    /// Call `BufferedSocket::read()` without expecting more data.
    Read,
    /// Invoke the handler's write callback, assuming the socket is writable.
    Write,
    /// Re-deliver read readiness which has not been consumed yet.
    SocketReadable,
    /// Re-deliver write readiness which has not been consumed yet.
    SocketWritable,
}

/// Deferred task addressed to one connection of an event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferTask {
    pub conn: usize,
    pub kind: DeferKind,
}

impl DeferTask {
    pub fn new(conn: usize, kind: DeferKind) -> Self {
        Self { conn, kind }
    }
}

/// Queue shared between an event loop and the objects scheduling on it.
pub type SharedDeferQueue<T = DeferTask> = Rc<RefCell<DeferQueue<T>>>;

/// Identifies a queued task. The sequence number guards against slab slot
/// reuse after cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeferKey {
    slot: usize,
    seq: u64,
}

#[derive(Debug)]
struct Entry<T> {
    seq: u64,
    task: T,
}

/// FIFO of pending one-shot tasks with O(1) cancellation.
#[derive(Debug)]
pub struct DeferQueue<T> {
    entries: Slab<Entry<T>>,
    order: VecDeque<DeferKey>,
    next_seq: u64,
}

impl<T> Default for DeferQueue<T> {
    fn default() -> Self {
        Self {
            entries: Slab::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }
}

impl<T> DeferQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue wrapped for sharing on a single thread.
    pub fn shared() -> SharedDeferQueue<T> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marker separating the tasks queued so far from tasks queued later.
    ///
    /// Pass it to [`pop_ready`](Self::pop_ready) to run only the current
    /// batch; tasks scheduled while the batch runs wait for the next
    /// iteration.
    pub fn batch_end(&self) -> u64 {
        self.next_seq
    }

    /// Remove and return the oldest live task queued before `batch_end`.
    pub fn pop_ready(&mut self, batch_end: u64) -> Option<T> {
        while let Some(key) = self.order.front().copied() {
            if key.seq >= batch_end {
                return None;
            }
            self.order.pop_front();
            if self.contains(key) {
                return Some(self.entries.remove(key.slot).task);
            }
        }
        None
    }

    fn insert(&mut self, task: T) -> DeferKey {
        let seq = self.next_seq;
        self.next_seq += 1;
        let slot = self.entries.insert(Entry { seq, task });
        let key = DeferKey { slot, seq };
        self.order.push_back(key);
        key
    }

    fn cancel(&mut self, key: DeferKey) {
        if self.contains(key) {
            self.entries.remove(key.slot);
        }
    }

    fn contains(&self, key: DeferKey) -> bool {
        self.entries
            .get(key.slot)
            .is_some_and(|entry| entry.seq == key.seq)
    }
}

/// Handle for one reusable deferred task.
///
/// Scheduling an already pending event is a no-op. Dropping the handle
/// cancels the task.
pub struct DeferEvent<T = DeferTask> {
    queue: SharedDeferQueue<T>,
    task: T,
    key: Option<DeferKey>,
}

impl<T: Clone> DeferEvent<T> {
    pub fn new(queue: &SharedDeferQueue<T>, task: T) -> Self {
        Self {
            queue: Rc::clone(queue),
            task,
            key: None,
        }
    }

    /// Run the task on the next loop iteration.
    pub fn schedule(&mut self) {
        if self.is_pending() {
            return;
        }
        self.key = Some(self.queue.borrow_mut().insert(self.task.clone()));
    }

    pub fn cancel(&mut self) {
        if let Some(key) = self.key.take() {
            self.queue.borrow_mut().cancel(key);
        }
    }

    /// Is the task queued and not yet run?
    pub fn is_pending(&self) -> bool {
        self.key
            .is_some_and(|key| self.queue.borrow().contains(key))
    }
}

impl<T> Drop for DeferEvent<T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut queue) = self.queue.try_borrow_mut() {
                queue.cancel(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &SharedDeferQueue<u32>) -> Vec<u32> {
        let end = queue.borrow().batch_end();
        let mut out = Vec::new();
        loop {
            let task = queue.borrow_mut().pop_ready(end);
            match task {
                Some(task) => out.push(task),
                None => return out,
            }
        }
    }

    #[test]
    fn test_schedule_runs_once() {
        let queue = DeferQueue::shared();
        let mut event = DeferEvent::new(&queue, 7u32);

        event.schedule();
        event.schedule();
        assert!(event.is_pending());
        assert_eq!(queue.borrow().len(), 1);

        assert_eq!(drain(&queue), vec![7]);
        assert!(!event.is_pending());
        assert!(drain(&queue).is_empty());
    }

    #[test]
    fn test_cancel_before_run() {
        let queue = DeferQueue::shared();
        let mut a = DeferEvent::new(&queue, 1u32);
        let mut b = DeferEvent::new(&queue, 2u32);

        a.schedule();
        b.schedule();
        a.cancel();

        assert!(!a.is_pending());
        assert_eq!(drain(&queue), vec![2]);
    }

    #[test]
    fn test_fifo_order_and_batches() {
        let queue = DeferQueue::shared();
        let mut a = DeferEvent::new(&queue, 1u32);
        let mut b = DeferEvent::new(&queue, 2u32);

        b.schedule();
        a.schedule();

        let end = queue.borrow().batch_end();
        assert_eq!(queue.borrow_mut().pop_ready(end), Some(2));

        // Rescheduled during the batch: runs in the next one
        b.schedule();
        assert_eq!(queue.borrow_mut().pop_ready(end), Some(1));
        assert_eq!(queue.borrow_mut().pop_ready(end), None);

        assert_eq!(drain(&queue), vec![2]);
    }

    #[test]
    fn test_cancel_then_slot_reuse() {
        let queue = DeferQueue::shared();
        let mut a = DeferEvent::new(&queue, 1u32);
        let mut b = DeferEvent::new(&queue, 2u32);

        a.schedule();
        a.cancel();
        // Reuses the slab slot freed by `a`
        b.schedule();

        assert!(!a.is_pending());
        assert!(b.is_pending());
        assert_eq!(drain(&queue), vec![2]);
    }

    #[test]
    fn test_drop_cancels() {
        let queue = DeferQueue::shared();
        {
            let mut event = DeferEvent::new(&queue, 3u32);
            event.schedule();
        }
        assert!(queue.borrow().is_empty());
        assert!(drain(&queue).is_empty());
    }
}
