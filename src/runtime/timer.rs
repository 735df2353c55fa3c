//! One-shot timers for write timeouts.
//!
//! Deadlines are kept ordered in a `BTreeMap`; the event loop uses the
//! earliest one as its poll timeout and pops expired entries afterwards.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub type SharedTimerQueue<T = usize> = Rc<RefCell<TimerQueue<T>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
    deadline: Instant,
    seq: u64,
}

/// Deadline-ordered queue of pending timers.
#[derive(Debug)]
pub struct TimerQueue<T> {
    timers: BTreeMap<TimerKey, T>,
    next_seq: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            timers: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTimerQueue<T> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.keys().next().map(|key| key.deadline)
    }

    /// Time until the earliest deadline, zero if it has already passed.
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Remove and return one timer whose deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<T> {
        let key = *self.timers.keys().next()?;
        if key.deadline > now {
            return None;
        }
        self.timers.remove(&key)
    }

    fn insert(&mut self, deadline: Instant, task: T) -> TimerKey {
        let key = TimerKey {
            deadline,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.timers.insert(key, task);
        key
    }

    fn cancel(&mut self, key: TimerKey) {
        self.timers.remove(&key);
    }

    fn contains(&self, key: TimerKey) -> bool {
        self.timers.contains_key(&key)
    }
}

/// Handle for one re-armable timer.
pub struct TimerEvent<T = usize> {
    queue: SharedTimerQueue<T>,
    task: T,
    key: Option<TimerKey>,
}

impl<T: Clone> TimerEvent<T> {
    pub fn new(queue: &SharedTimerQueue<T>, task: T) -> Self {
        Self {
            queue: Rc::clone(queue),
            task,
            key: None,
        }
    }

    /// Arm the timer to fire after `timeout`, replacing any previous
    /// deadline.
    pub fn schedule(&mut self, timeout: Duration) {
        self.cancel();
        let deadline = Instant::now() + timeout;
        self.key = Some(self.queue.borrow_mut().insert(deadline, self.task.clone()));
    }

    pub fn cancel(&mut self) {
        if let Some(key) = self.key.take() {
            self.queue.borrow_mut().cancel(key);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.key.is_some_and(|key| self.queue.borrow().contains(key))
    }
}

impl<T> Drop for TimerEvent<T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut queue) = self.queue.try_borrow_mut() {
                queue.cancel(key);
            }
        }
    }
}
