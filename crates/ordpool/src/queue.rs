//! Bounded FIFO queues with an explicit closed state.
//!
//! A [`ClosableQueue`] is the only channel primitive in the pool. Producers
//! block while it is full, consumers block while it is empty, and once it is
//! closed consumers keep draining whatever is left before [`pop`] reports end
//! of stream with `None`. Nothing ever blocks forever on a closed queue.
//!
//! Queues can additionally be watched by a [`Notifier`], which is how
//! [`Select`](crate::Select) waits on several queues at once.
//!
//! [`pop`]: ClosableQueue::pop

use parking_lot::{Condvar, Mutex};
use std::{collections::VecDeque, sync::Arc};

/// Why an item could not be pushed. The item is handed back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushError<T> {
    Full(T),
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

/// Result of a non-blocking [`ClosableQueue::try_pop`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TryPop<T> {
    Item(T),
    /// Nothing queued, but more may arrive.
    Empty,
    /// Closed and drained; nothing will ever arrive.
    Closed,
}

/// A generation counter that wakes a waiter whenever any watched queue
/// changes.
///
/// Waiters read the [`epoch`](Self::epoch) *before* inspecting their queues
/// and then call [`wait_past`](Self::wait_past) with it, so a push that lands
/// between the inspection and the wait is never missed.
#[derive(Debug, Default)]
pub struct Notifier {
    epoch: Mutex<u64>,
    changed: Condvar,
}

impl Notifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    pub fn notify(&self) {
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        self.changed.notify_all();
    }

    /// Blocks until the epoch differs from `seen`.
    pub fn wait_past(&self, seen: u64) {
        let mut epoch = self.epoch.lock();
        while *epoch == seen {
            self.changed.wait(&mut epoch);
        }
    }
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    watchers: Vec<Arc<Notifier>>,
}

impl<T> State<T> {
    fn wake_watchers(&self) {
        for watcher in &self.watchers {
            watcher.notify();
        }
    }
}

/// A bounded, closable, multi-producer multi-consumer FIFO queue.
pub struct ClosableQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> ClosableQueue<T> {
    /// Creates an open queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                watchers: Vec::new(),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Registers `notifier` to be woken on every push and on close.
    pub fn watch(&self, notifier: Arc<Notifier>) {
        self.state.lock().watchers.push(notifier);
    }

    /// Appends `item`, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the queue is closed, including when it
    /// closes while this call is waiting for space.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PushError::Closed(item));
            }
            if state.items.len() < self.capacity {
                break;
            }
            self.not_full.wait(&mut state);
        }
        state.items.push_back(item);
        state.wake_watchers();
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends `item` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] at capacity and [`PushError::Closed`] once
    /// closed.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        state.items.push_back(item);
        state.wake_watchers();
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, blocking while the queue is empty and open.
    ///
    /// Returns `None` only once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    pub fn try_pop(&self) -> TryPop<T> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(item) => {
                drop(state);
                self.not_full.notify_one();
                TryPop::Item(item)
            }
            None if state.closed => TryPop::Closed,
            None => TryPop::Empty,
        }
    }

    /// Closes the queue. Items already queued can still be popped.
    ///
    /// Returns `false` if the queue was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.wake_watchers();
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        true
    }

    /// Closes the queue and discards everything still queued.
    ///
    /// Returns the number of discarded items.
    pub fn abort(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.items.len();
        state.items.clear();
        state.closed = true;
        state.wake_watchers();
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        discarded
    }
}

/// Type-erased shutdown handle, so owners of a queue of `T` can be torn down
/// by code that does not know `T`.
pub(crate) trait Shutdown: Send + Sync {
    fn close(&self) -> bool;
    fn abort(&self) -> usize;
}

impl<T: Send> Shutdown for ClosableQueue<T> {
    fn close(&self) -> bool {
        Self::close(self)
    }

    fn abort(&self) -> usize {
        Self::abort(self)
    }
}
