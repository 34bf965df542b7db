//! Pool construction and the caller-facing handle.

use crate::{
    config::PoolConfig,
    dispatcher::{Dispatcher, Seal},
    error::{Error, Result, SubmitError},
    job::{Compute, Event, JobResult},
    lifecycle::{Lifecycle, PoolState},
    orderer::OrderedResults,
    pool::{WorkerPool, worker::WorkerContext},
    queue::{ClosableQueue, Shutdown},
    window::ReorderWindow,
};
use portable_atomic::AtomicUsize;
use std::{sync::Arc, thread};

/// A running pool: the [`Dispatcher`] that accepts jobs and the
/// [`OrderedResults`] that emits them back in order.
///
/// Submitting and consuming from one thread works as long as fewer than
/// `queue_capacity + worker_count` results are outstanding. Beyond that,
/// split the handle with [`into_parts`](Self::into_parts) and consume on
/// another thread, or use [`map_ordered`].
pub struct PoolHandle<T, R, E> {
    dispatcher: Dispatcher<T>,
    results: OrderedResults<R, E>,
    lifecycle: Arc<Lifecycle>,
    worker_count: usize,
}

/// Starts `config.worker_count` workers applying `compute` and returns the
/// handle used to feed and drain them.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for a zero worker count or queue
/// capacity, and [`Error::Spawn`] if a worker thread cannot be started.
pub fn create_pool<T, C>(config: PoolConfig, compute: C) -> Result<PoolHandle<T, C::Output, C::Error>>
where
    T: Send + 'static,
    C: Compute<T>,
{
    config.validate()?;

    let jobs = Arc::new(ClosableQueue::new(config.queue_capacity));
    let results = Arc::new(ClosableQueue::<Event<C::Output, C::Error>>::new(
        config.worker_count,
    ));
    // Room for the seal plus one fault per worker, so neither ever blocks.
    let control = Arc::new(ClosableQueue::new(config.worker_count + 1));
    let window = Arc::new(ReorderWindow::new(config.worker_count));
    let lifecycle = Arc::new(Lifecycle::new());

    let ctx = WorkerContext {
        jobs: Arc::clone(&jobs),
        results: Arc::clone(&results),
        control: Arc::clone(&control),
        window: Arc::clone(&window),
        lifecycle: Arc::clone(&lifecycle),
        live: Arc::new(AtomicUsize::new(0)),
        panic_policy: config.panic_policy,
    };
    let workers = WorkerPool::spawn(config.worker_count, compute, &ctx)?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        workers = config.worker_count,
        queue_capacity = config.queue_capacity,
        panic_policy = %config.panic_policy,
        "pool started"
    );

    let dispatcher = Dispatcher::new(
        Arc::clone(&jobs),
        Arc::clone(&control) as Arc<dyn Seal>,
        Arc::clone(&lifecycle),
    );
    let results = OrderedResults::new(
        results,
        control,
        jobs as Arc<dyn Shutdown>,
        window,
        Arc::clone(&lifecycle),
        workers,
    );

    Ok(PoolHandle {
        dispatcher,
        results,
        lifecycle,
        worker_count: config.worker_count,
    })
}

impl<T, R, E> PoolHandle<T, R, E> {
    /// See [`Dispatcher::submit`].
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Closed`] after [`close`](Self::close).
    pub fn submit(&mut self, payload: T) -> Result<u64, SubmitError<T>> {
        self.dispatcher.submit(payload)
    }

    /// See [`Dispatcher::try_submit`].
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Full`] while the job queue is at capacity.
    pub fn try_submit(&mut self, payload: T) -> Result<u64, SubmitError<T>> {
        self.dispatcher.try_submit(payload)
    }

    /// See [`Dispatcher::close`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClosedDispatcher`] if already closed.
    pub fn close(&mut self) -> Result<u64> {
        self.dispatcher.close()
    }

    /// The ordered output, consumed until end of sequence.
    pub fn ordered_results(&mut self) -> &mut OrderedResults<R, E> {
        &mut self.results
    }

    pub fn state(&self) -> PoolState {
        self.lifecycle.current()
    }

    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Separates the submitting and consuming halves so they can live on
    /// different threads.
    pub fn into_parts(self) -> (Dispatcher<T>, OrderedResults<R, E>) {
        (self.dispatcher, self.results)
    }
}

/// Runs every payload through a fresh pool and collects the results in
/// submission order.
///
/// Payloads are fed from a scoped thread while the calling thread drains the
/// ordered results, so backpressure never stalls the run.
///
/// # Errors
///
/// Returns the first pool-level error. Per-job failures are returned inside
/// the collected [`JobResult`]s.
pub fn map_ordered<T, C, I>(
    config: PoolConfig,
    compute: C,
    payloads: I,
) -> Result<Vec<JobResult<C::Output, C::Error>>>
where
    T: Send + 'static,
    C: Compute<T>,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send,
{
    let (mut dispatcher, results) = create_pool(config, compute)?.into_parts();
    let payloads = payloads.into_iter();

    thread::scope(|s| {
        s.spawn(move || {
            for payload in payloads {
                // Only fails once the consumer aborted, which it reports.
                if dispatcher.submit(payload).is_err() {
                    break;
                }
            }
            let _ = dispatcher.close();
        });
        results.collect::<Result<Vec<_>, Error>>()
    })
}
