use crate::{
    config::PanicPolicy,
    job::{Compute, Event, Job, JobError, JobResult},
    lifecycle::{Lifecycle, PoolState},
    queue::ClosableQueue,
    window::ReorderWindow,
};
use core::any::Any;
use portable_atomic::{AtomicUsize, Ordering};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

/// Everything a worker shares with the rest of the pool.
pub(crate) struct WorkerContext<T, R, E> {
    pub(crate) jobs: Arc<ClosableQueue<Job<T>>>,
    pub(crate) results: Arc<ClosableQueue<Event<R, E>>>,
    pub(crate) control: Arc<ClosableQueue<Event<R, E>>>,
    pub(crate) window: Arc<ReorderWindow>,
    pub(crate) lifecycle: Arc<Lifecycle>,
    pub(crate) live: Arc<AtomicUsize>,
    pub(crate) panic_policy: PanicPolicy,
}

impl<T, R, E> Clone for WorkerContext<T, R, E> {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            results: Arc::clone(&self.results),
            control: Arc::clone(&self.control),
            window: Arc::clone(&self.window),
            lifecycle: Arc::clone(&self.lifecycle),
            live: Arc::clone(&self.live),
            panic_policy: self.panic_policy,
        }
    }
}

/// Marks a worker as gone when dropped. The last one out closes the
/// orderer's sources, which is how the orderer learns the pool drained.
struct Departure<'a, T, R, E> {
    ctx: &'a WorkerContext<T, R, E>,
}

impl<T, R, E> Drop for Departure<'_, T, R, E> {
    fn drop(&mut self) {
        if self.ctx.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.ctx.results.close();
            self.ctx.control.close();
            self.ctx.lifecycle.advance(PoolState::Flushing);

            #[cfg(feature = "tracing")]
            tracing::debug!("last worker exited, pool drained");
        }
    }
}

/// Body of one worker thread.
///
/// Pulls jobs until the job queue is closed and drained, waits for each job
/// to fall inside the reorder window, computes it and pushes the tagged
/// result. A failing or panicking job never ends the loop unless the panic
/// policy says to abort the pool.
pub(crate) fn worker_loop<T, C>(
    _worker_id: usize,
    ctx: WorkerContext<T, C::Output, C::Error>,
    compute: Arc<C>,
) where
    C: Compute<T>,
{
    let _departure = Departure { ctx: &ctx };

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} started");

    while let Some(Job { sequence, payload }) = ctx.jobs.pop() {
        if !ctx.window.admit(sequence) {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {_worker_id} released by abort before sequence {sequence}");
            break;
        }

        let output = match catch_unwind(AssertUnwindSafe(|| compute.compute(payload))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(JobError::Failed(e)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                match ctx.panic_policy {
                    PanicPolicy::IsolateAndReport => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Worker {_worker_id} isolated panic on sequence {sequence}: {message}");
                        Err(JobError::Panicked(message))
                    }
                    PanicPolicy::PropagateAndAbort => {
                        #[cfg(feature = "tracing")]
                        tracing::error!("Worker {_worker_id} panicked on sequence {sequence}, aborting pool: {message}");
                        abort_pool(&ctx, sequence, message);
                        break;
                    }
                }
            }
        };

        if ctx
            .results
            .push(Event::Completed(JobResult { sequence, output }))
            .is_err()
        {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {_worker_id} exiting, orderer gone");
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} stopped");
}

fn abort_pool<T, R, E>(ctx: &WorkerContext<T, R, E>, sequence: u64, message: String) {
    // Report first: once the job queue is aborted the remaining workers start
    // leaving and the last one closes the control queue.
    let _ = ctx.control.push(Event::Fault { sequence, message });
    let _discarded = ctx.jobs.abort();
    ctx.window.abort();

    #[cfg(feature = "tracing")]
    tracing::debug!("Discarded {_discarded} queued jobs");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages_are_extracted() {
        let static_str = catch_unwind(|| -> u8 { panic!("static") }).unwrap_err();
        assert_eq!(panic_message(static_str.as_ref()), "static");

        let formatted = catch_unwind(|| -> u8 { panic!("code {}", 7) }).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "code 7");

        let other = catch_unwind(|| -> u8 { std::panic::panic_any(42_u8) }).unwrap_err();
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
