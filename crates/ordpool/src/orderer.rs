//! Restores submission order over results that complete in any order.
//!
//! [`Orderer`] is the pure reorder algorithm: a cursor plus a buffer of early
//! arrivals. [`OrderedResults`] drives it from the pool's result and control
//! queues and exposes the ordered output as an iterator.

use crate::{
    error::{Error, Result},
    job::{Event, JobResult},
    lifecycle::{Lifecycle, PoolState},
    pool::WorkerPool,
    queue::{ClosableQueue, Shutdown},
    select::Select,
    window::ReorderWindow,
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

/// Reorder buffer keyed by sequence number.
///
/// Items are accepted in any order and released strictly in ascending
/// sequence order starting at zero, with no gaps and no duplicates. The item
/// at the cursor is never buffered: it is released as soon as it arrives,
/// together with every consecutive buffered item behind it.
#[derive(Debug)]
pub struct Orderer<V> {
    next_expected: u64,
    pending: BTreeMap<u64, V>,
    ready: VecDeque<V>,
    max_pending: usize,
}

impl<V> Default for Orderer<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Orderer<V> {
    pub const fn new() -> Self {
        Self {
            next_expected: 0,
            pending: BTreeMap::new(),
            ready: VecDeque::new(),
            max_pending: 0,
        }
    }

    /// Accepts the item for `sequence`.
    ///
    /// # Errors
    ///
    /// - [`Error::StaleSequence`] if `sequence` was already released.
    /// - [`Error::DuplicateSequence`] if `sequence` is already buffered.
    pub fn insert(&mut self, sequence: u64, item: V) -> Result<()> {
        if sequence < self.next_expected {
            return Err(Error::StaleSequence {
                sequence,
                next_expected: self.next_expected,
            });
        }

        if sequence > self.next_expected {
            if self.pending.contains_key(&sequence) {
                return Err(Error::DuplicateSequence { sequence });
            }
            self.pending.insert(sequence, item);
            self.max_pending = self.max_pending.max(self.pending.len());
            return Ok(());
        }

        self.ready.push_back(item);
        self.next_expected += 1;
        while let Some(item) = self.pending.remove(&self.next_expected) {
            self.ready.push_back(item);
            self.next_expected += 1;
        }
        Ok(())
    }

    /// Takes the next released item, if any.
    pub fn pop_ready(&mut self) -> Option<V> {
        self.ready.pop_front()
    }

    /// The cursor: every sequence below it has been released.
    pub const fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Items waiting for an earlier sequence.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Largest [`buffered`](Self::buffered) count ever observed.
    pub const fn max_buffered(&self) -> usize {
        self.max_pending
    }
}

/// Tears a pool down from the consuming side: discards queued jobs,
/// releases workers waiting on the window and closes the orderer's sources.
///
/// Cloned into anything that can outlive or abandon the [`OrderedResults`],
/// such as the async stream adapter.
#[derive(Clone)]
pub(crate) struct Teardown {
    jobs: Arc<dyn Shutdown>,
    sources: [Arc<dyn Shutdown>; 2],
    window: Arc<ReorderWindow>,
}

impl Teardown {
    /// Returns the number of discarded jobs.
    pub(crate) fn run(&self) -> usize {
        let discarded = self.jobs.abort();
        self.window.abort();
        for source in &self.sources {
            source.close();
        }
        discarded
    }
}

/// Counters describing an [`OrderedResults`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrderStats {
    /// Results handed to the caller.
    pub emitted: u64,
    /// Results currently held back by the reorder buffer.
    pub buffered: usize,
    /// High-water mark of the reorder buffer.
    pub max_buffered: usize,
}

/// The ordered output of a pool.
///
/// Yields one `Ok(JobResult)` per submitted job in ascending sequence order,
/// then `None` once the dispatcher has been closed and every result was
/// emitted. A pool-level failure is yielded once as `Err`, after which the
/// pool is aborted and the iterator only returns `None`.
///
/// Dropping this before the end of the sequence aborts the pool: queued jobs
/// are discarded, workers exit, and later submissions fail.
pub struct OrderedResults<R, E> {
    orderer: Orderer<JobResult<R, E>>,
    sources: Select<Event<R, E>>,
    teardown: Teardown,
    window: Arc<ReorderWindow>,
    lifecycle: Arc<Lifecycle>,
    workers: Option<WorkerPool>,
    total: Option<u64>,
    emitted: u64,
    finished: bool,
}

impl<R, E> OrderedResults<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(
        results: Arc<ClosableQueue<Event<R, E>>>,
        control: Arc<ClosableQueue<Event<R, E>>>,
        jobs: Arc<dyn Shutdown>,
        window: Arc<ReorderWindow>,
        lifecycle: Arc<Lifecycle>,
        workers: WorkerPool,
    ) -> Self {
        let sources = Select::new(vec![Arc::clone(&results), Arc::clone(&control)]);
        let teardown = Teardown {
            jobs,
            sources: [results as Arc<dyn Shutdown>, control as Arc<dyn Shutdown>],
            window: Arc::clone(&window),
        };
        Self {
            orderer: Orderer::new(),
            sources,
            teardown,
            window,
            lifecycle,
            workers: Some(workers),
            total: None,
            emitted: 0,
            finished: false,
        }
    }
}

impl<R, E> OrderedResults<R, E> {
    #[cfg(feature = "async-tokio")]
    pub(crate) fn teardown(&self) -> Teardown {
        self.teardown.clone()
    }

    pub fn stats(&self) -> OrderStats {
        OrderStats {
            emitted: self.emitted,
            buffered: self.orderer.buffered(),
            max_buffered: self.orderer.max_buffered(),
        }
    }

    /// The total job count, once the dispatcher has closed.
    pub const fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn state(&self) -> PoolState {
        self.lifecycle.current()
    }

    fn accept(&mut self, result: JobResult<R, E>) -> Result<()> {
        if let Some(total) = self.total {
            if result.sequence >= total {
                return Err(Error::SequenceOutOfRange {
                    sequence: result.sequence,
                    total,
                });
            }
        }
        self.orderer.insert(result.sequence, result)?;
        self.window.advance(self.orderer.next_expected());
        Ok(())
    }

    fn seal(&mut self, total: u64) -> Result<()> {
        if let Some(sequence) = self.orderer.pending.keys().next_back().copied() {
            if sequence >= total {
                return Err(Error::SequenceOutOfRange { sequence, total });
            }
        }
        self.total = Some(total);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.total == Some(self.orderer.next_expected())
    }

    /// End of sequence: join the drained workers and settle in `Done`.
    fn finish(&mut self) {
        self.finished = true;
        if let Some(workers) = self.workers.take() {
            workers.join();
        }
        self.lifecycle.advance(PoolState::Done);

        #[cfg(feature = "tracing")]
        tracing::debug!(emitted = self.emitted, "ordered results complete");
    }

    /// Tears the pool down after a fatal error and hands the error back.
    fn fail(&mut self, err: Error) -> Error {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %err, next_expected = self.orderer.next_expected(), "ordering aborted");

        self.finished = true;
        self.shutdown();
        self.lifecycle.advance(PoolState::Done);
        err
    }

    fn shutdown(&self) {
        let _discarded = self.teardown.run();

        #[cfg(feature = "tracing")]
        if _discarded > 0 {
            tracing::debug!("Discarded {_discarded} queued jobs");
        }
    }
}

impl<R, E> Iterator for OrderedResults<R, E> {
    type Item = Result<JobResult<R, E>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(result) = self.orderer.pop_ready() {
                self.emitted += 1;
                return Some(Ok(result));
            }
            if self.is_complete() {
                self.finish();
                return None;
            }

            let step = match self.sources.recv() {
                Some((_, Event::Completed(result))) => self.accept(result),
                Some((_, Event::Sealed { total })) => self.seal(total),
                Some((_, Event::Fault { sequence, message })) => {
                    Err(Error::WorkerPanicked { sequence, message })
                }
                // Every worker exited. Anything still missing never arrives.
                None if self.is_complete() => Ok(()),
                None => Err(Error::MissingSequence {
                    sequence: self.orderer.next_expected(),
                }),
            };

            if let Err(err) = step {
                return Some(Err(self.fail(err)));
            }
        }
    }
}

impl<R, E> core::iter::FusedIterator for OrderedResults<R, E> {}

impl<R, E> Drop for OrderedResults<R, E> {
    fn drop(&mut self) {
        if !self.finished {
            #[cfg(feature = "tracing")]
            tracing::debug!("ordered results dropped early, aborting pool");
            self.shutdown();
            self.lifecycle.advance(PoolState::Done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{job::Job, queue::PushError};

    fn drain<V>(orderer: &mut Orderer<V>) -> Vec<V> {
        core::iter::from_fn(|| orderer.pop_ready()).collect()
    }

    #[test]
    fn in_order_arrivals_release_immediately() {
        let mut orderer = Orderer::new();
        for s in 0..3 {
            orderer.insert(s, s * 10).unwrap();
            assert_eq!(orderer.pop_ready(), Some(s * 10));
            assert_eq!(orderer.buffered(), 0);
        }
        assert_eq!(orderer.next_expected(), 3);
    }

    #[test]
    fn early_arrivals_wait_for_the_gap() {
        // fib over [5, 1, 4], completing as 1, 0, 2.
        let mut orderer = Orderer::new();
        orderer.insert(1, 1).unwrap();
        assert_eq!(orderer.pop_ready(), None);
        assert_eq!(orderer.buffered(), 1);

        orderer.insert(0, 5).unwrap();
        assert_eq!(drain(&mut orderer), vec![5, 1]);
        assert_eq!(orderer.buffered(), 0);

        orderer.insert(2, 3).unwrap();
        assert_eq!(drain(&mut orderer), vec![3]);
        assert_eq!(orderer.next_expected(), 3);
    }

    #[test]
    fn reversed_arrivals_release_in_one_burst() {
        let mut orderer = Orderer::new();
        for s in (1..5).rev() {
            orderer.insert(s, s).unwrap();
        }
        assert_eq!(orderer.max_buffered(), 4);
        orderer.insert(0, 0).unwrap();
        assert_eq!(drain(&mut orderer), vec![0, 1, 2, 3, 4]);
        assert_eq!(orderer.buffered(), 0);
    }

    #[test]
    fn drain_stops_at_the_next_gap() {
        let mut orderer = Orderer::new();
        orderer.insert(1, 'b').unwrap();
        orderer.insert(3, 'd').unwrap();
        orderer.insert(0, 'a').unwrap();
        assert_eq!(drain(&mut orderer), vec!['a', 'b']);
        assert_eq!(orderer.next_expected(), 2);
        assert_eq!(orderer.buffered(), 1);
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut orderer = Orderer::new();
        orderer.insert(2, ()).unwrap();
        assert_eq!(
            orderer.insert(2, ()),
            Err(Error::DuplicateSequence { sequence: 2 })
        );
    }

    #[test]
    fn stale_is_rejected() {
        let mut orderer = Orderer::new();
        orderer.insert(0, ()).unwrap();
        assert_eq!(
            orderer.insert(0, ()),
            Err(Error::StaleSequence {
                sequence: 0,
                next_expected: 1
            })
        );
    }

    type Events = ClosableQueue<Event<u32, ()>>;

    /// `OrderedResults` over hand-fed queues and no worker threads. One job
    /// sits in the job queue so teardown can be observed.
    struct Harness {
        results: Arc<Events>,
        control: Arc<Events>,
        jobs: Arc<ClosableQueue<Job<u32>>>,
        ordered: OrderedResults<u32, ()>,
    }

    impl Harness {
        fn new() -> Self {
            let results = Arc::new(Events::new(8));
            let control = Arc::new(Events::new(4));
            let jobs = Arc::new(ClosableQueue::new(4));
            jobs.push(Job {
                sequence: 7,
                payload: 7,
            })
            .unwrap();
            let ordered = OrderedResults::new(
                Arc::clone(&results),
                Arc::clone(&control),
                Arc::clone(&jobs) as Arc<dyn Shutdown>,
                Arc::new(ReorderWindow::new(4)),
                Arc::new(Lifecycle::new()),
                WorkerPool::empty(),
            );
            Self {
                results,
                control,
                jobs,
                ordered,
            }
        }

        fn complete(&self, sequence: u64) {
            let output = Ok(u32::try_from(sequence).unwrap());
            self.results
                .push(Event::Completed(JobResult { sequence, output }))
                .unwrap();
        }

        fn seal(&self, total: u64) {
            self.control.push(Event::Sealed { total }).unwrap();
        }

        fn ok(sequence: u64) -> Option<Result<JobResult<u32, ()>>> {
            Some(Ok(JobResult {
                sequence,
                output: Ok(u32::try_from(sequence).unwrap()),
            }))
        }

        /// `expected` is yielded exactly once, then the pool is torn down.
        fn assert_fatal(&mut self, expected: Error) {
            assert_eq!(self.ordered.next(), Some(Err(expected)));
            assert_eq!(self.ordered.next(), None);
            assert_eq!(self.ordered.next(), None);
            assert_eq!(self.ordered.state(), PoolState::Done);

            assert!(self.jobs.is_closed());
            assert!(self.jobs.is_empty());
            let late = Job {
                sequence: 8,
                payload: 8,
            };
            assert_eq!(self.jobs.push(late.clone()), Err(PushError::Closed(late)));
            assert!(self.results.is_closed());
            assert!(self.control.is_closed());
        }
    }

    #[test]
    fn hand_fed_results_end_cleanly() {
        let mut h = Harness::new();
        h.complete(1);
        h.complete(0);
        h.seal(2);
        assert_eq!(h.ordered.next(), Harness::ok(0));
        assert_eq!(h.ordered.next(), Harness::ok(1));
        assert_eq!(h.ordered.next(), None);
        assert_eq!(h.ordered.total(), Some(2));
        assert_eq!(h.ordered.state(), PoolState::Done);
    }

    #[test]
    fn duplicate_result_is_fatal() {
        let mut h = Harness::new();
        h.complete(2);
        h.complete(2);
        h.assert_fatal(Error::DuplicateSequence { sequence: 2 });
    }

    #[test]
    fn stale_result_is_fatal() {
        let mut h = Harness::new();
        h.complete(0);
        h.complete(0);
        assert_eq!(h.ordered.next(), Harness::ok(0));
        h.assert_fatal(Error::StaleSequence {
            sequence: 0,
            next_expected: 1,
        });
    }

    #[test]
    fn result_past_the_total_is_fatal() {
        let mut h = Harness::new();
        h.complete(0);
        h.complete(3);
        h.seal(2);
        assert_eq!(h.ordered.next(), Harness::ok(0));
        h.assert_fatal(Error::SequenceOutOfRange {
            sequence: 3,
            total: 2,
        });
    }

    #[test]
    fn buffered_result_past_the_total_is_fatal_at_seal() {
        let mut h = Harness::new();
        h.complete(5);
        h.seal(2);
        h.assert_fatal(Error::SequenceOutOfRange {
            sequence: 5,
            total: 2,
        });
    }

    #[test]
    fn sources_closing_early_report_the_missing_sequence() {
        let mut h = Harness::new();
        h.complete(1);
        h.seal(3);
        h.results.close();
        h.control.close();
        h.assert_fatal(Error::MissingSequence { sequence: 0 });
    }
}
