//! Sequence assignment and submission into the job queue.

use crate::{
    error::{Error, Result, SubmitError},
    job::{Event, Job},
    lifecycle::{Lifecycle, PoolState},
    queue::{ClosableQueue, PushError},
};
use std::sync::Arc;

/// Where the dispatcher announces the final job count.
pub(crate) trait Seal: Send + Sync {
    /// Returns `false` if the orderer is already gone.
    fn seal(&self, total: u64) -> bool;
}

impl<R: Send, E: Send> Seal for ClosableQueue<Event<R, E>> {
    fn seal(&self, total: u64) -> bool {
        self.push(Event::Sealed { total }).is_ok()
    }
}

/// The submitting half of a pool.
///
/// Assigns each payload the next sequence number and places it on the bounded
/// job queue. Because submission needs `&mut self`, sequence order and queue
/// order are always the same.
///
/// Dropping an unclosed dispatcher closes it.
pub struct Dispatcher<T> {
    jobs: Arc<ClosableQueue<Job<T>>>,
    sealer: Arc<dyn Seal>,
    lifecycle: Arc<Lifecycle>,
    next_sequence: u64,
    closed: bool,
}

impl<T> Dispatcher<T> {
    pub(crate) fn new(
        jobs: Arc<ClosableQueue<Job<T>>>,
        sealer: Arc<dyn Seal>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            jobs,
            sealer,
            lifecycle,
            next_sequence: 0,
            closed: false,
        }
    }

    /// Submits `payload`, blocking while the job queue is full.
    ///
    /// Returns the sequence number assigned to the job.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Closed`] with the payload if the dispatcher was
    /// closed or the pool aborted.
    pub fn submit(&mut self, payload: T) -> Result<u64, SubmitError<T>> {
        if self.closed {
            return Err(SubmitError::Closed(payload));
        }
        let sequence = self.next_sequence;
        match self.jobs.push(Job { sequence, payload }) {
            Ok(()) => Ok(self.accepted(sequence)),
            Err(e) => Err(SubmitError::Closed(e.into_inner().payload)),
        }
    }

    /// Submits `payload` without blocking.
    ///
    /// A rejected submission does not consume a sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Full`] while the job queue is at capacity and
    /// [`SubmitError::Closed`] once the dispatcher is closed.
    pub fn try_submit(&mut self, payload: T) -> Result<u64, SubmitError<T>> {
        if self.closed {
            return Err(SubmitError::Closed(payload));
        }
        let sequence = self.next_sequence;
        match self.jobs.try_push(Job { sequence, payload }) {
            Ok(()) => Ok(self.accepted(sequence)),
            Err(PushError::Full(job)) => Err(SubmitError::Full(job.payload)),
            Err(PushError::Closed(job)) => Err(SubmitError::Closed(job.payload)),
        }
    }

    fn accepted(&mut self, sequence: u64) -> u64 {
        self.next_sequence += 1;
        #[cfg(feature = "tracing")]
        tracing::trace!(sequence, "job submitted");
        sequence
    }

    /// Declares that no more jobs will be submitted.
    ///
    /// Returns the total number of jobs submitted, which is also announced to
    /// the orderer so it knows when the sequence ends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClosedDispatcher`] if called more than once.
    pub fn close(&mut self) -> Result<u64> {
        if self.closed {
            return Err(Error::ClosedDispatcher);
        }
        self.closed = true;
        let total = self.next_sequence;

        // The total must be queued before the job queue closes: workers only
        // exit once it is closed, and the last one to leave closes the
        // orderer's sources.
        if !self.sealer.seal(total) {
            #[cfg(feature = "tracing")]
            tracing::debug!(total, "orderer gone before dispatcher closed");
        }
        self.jobs.close();
        self.lifecycle.advance(PoolState::Draining);

        #[cfg(feature = "tracing")]
        tracing::debug!(total, "dispatcher closed");
        Ok(total)
    }

    /// Number of jobs accepted so far.
    pub const fn submitted(&self) -> u64 {
        self.next_sequence
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.jobs.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.jobs.capacity()
    }
}

impl<T> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}
