use crate::{
    error::Result,
    job::JobResult,
    orderer::{OrderedResults, Teardown},
};
use core::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// The ordered results of a pool as a [`Stream`], returned by
/// [`OrderedResults::into_stream`].
///
/// Dropping it aborts the pool right away, even while the driver is parked
/// waiting for the next result: queued jobs are discarded, workers exit and
/// later submissions fail with `Closed`.
pub struct OrderedStream<R, E> {
    inner: ReceiverStream<Result<JobResult<R, E>>>,
    teardown: Teardown,
}

impl<R, E> Stream for OrderedStream<R, E> {
    type Item = Result<JobResult<R, E>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<R, E> Drop for OrderedStream<R, E> {
    fn drop(&mut self) {
        // A no-op once the sequence ended: the job queue is already drained.
        let _discarded = self.teardown.run();

        #[cfg(feature = "tracing")]
        if _discarded > 0 {
            tracing::debug!("ordered stream dropped, discarded {_discarded} queued jobs");
        }
    }
}

impl<R, E> OrderedResults<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    /// Drives the ordered results from a blocking tokio task and exposes them
    /// as a [`Stream`].
    ///
    /// At most `buffer` results (minimum 1) wait between the blocking driver
    /// and the stream consumer. Dropping the stream aborts the pool, which
    /// also wakes and ends the driver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn into_stream(self, buffer: usize) -> OrderedStream<R, E> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let teardown = self.teardown();

        tokio::task::spawn_blocking(move || {
            for item in self {
                if tx.blocking_send(item).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("ordered stream dropped, stopping driver");
                    break;
                }
            }
        });

        OrderedStream {
            inner: ReceiverStream::new(rx),
            teardown,
        }
    }
}
