use super::worker::{WorkerContext, worker_loop};
use crate::{error::Error, job::Compute};
use portable_atomic::Ordering;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

/// Handles of the worker threads backing a pool.
///
/// The worker count is fixed at spawn time. Workers exit on their own once
/// the job queue is closed and drained (or aborted); [`join`](Self::join)
/// only waits for that to happen.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `count` named worker threads sharing `compute`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the OS refuses a thread. Workers that did
    /// start are shut down and joined before returning.
    pub(crate) fn spawn<T, C>(
        count: usize,
        compute: C,
        ctx: &WorkerContext<T, C::Output, C::Error>,
    ) -> Result<Self, Error>
    where
        T: Send + 'static,
        C: Compute<T>,
    {
        let compute = Arc::new(compute);
        let mut handles = Vec::with_capacity(count);

        // Every slot counts as live up front so an early exit cannot close
        // the orderer's sources while later workers are still starting.
        ctx.live.store(count, Ordering::Release);

        for worker_id in 0..count {
            let worker_ctx = ctx.clone();
            let compute = Arc::clone(&compute);
            let spawned = thread::Builder::new()
                .name(format!("ordpool-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, worker_ctx, compute));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Failed to spawn worker {worker_id}: {e}");

                    ctx.jobs.abort();
                    ctx.window.abort();
                    ctx.results.close();
                    ctx.control.close();
                    ctx.live.fetch_sub(count - worker_id, Ordering::AcqRel);
                    Self { handles }.join();
                    return Err(Error::Spawn(e.to_string()));
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Spawned {count} workers");

        Ok(Self { handles })
    }

    /// A pool with no threads, for driving the orderer by hand.
    #[cfg(test)]
    pub(crate) const fn empty() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker thread to exit.
    ///
    /// Returns the number of threads that terminated abnormally. Compute
    /// panics are caught inside the worker, so this is zero unless the pool
    /// plumbing itself failed.
    pub fn join(self) -> usize {
        let mut abnormal = 0;
        for (_i, handle) in self.handles.into_iter().enumerate() {
            if handle.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("Worker {_i} terminated abnormally");
                abnormal += 1;
            }
        }
        abnormal
    }
}
