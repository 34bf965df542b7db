use core::fmt;

/// A unit of work tagged with its submission-order sequence number.
///
/// Sequences are assigned by the [`Dispatcher`](crate::Dispatcher), start at
/// zero, and are never reused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job<T> {
    pub sequence: u64,
    pub payload: T,
}

/// Why a single job produced no value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobError<E> {
    /// The compute function returned an error.
    Failed(E),
    /// The compute function panicked and the panic was isolated to this job.
    Panicked(String),
}

impl<E: fmt::Display> fmt::Display for JobError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "job failed: {e}"),
            Self::Panicked(msg) => write!(f, "job panicked: {msg}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for JobError<E> {}

/// The outcome of exactly one [`Job`], carrying the job's sequence unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobResult<R, E> {
    pub sequence: u64,
    pub output: Result<R, JobError<E>>,
}

impl<R, E> JobResult<R, E> {
    pub const fn is_ok(&self) -> bool {
        self.output.is_ok()
    }

    pub const fn is_err(&self) -> bool {
        self.output.is_err()
    }

    /// Returns the value, discarding the sequence.
    pub fn into_output(self) -> Result<R, JobError<E>> {
        self.output
    }
}

/// The computation applied by every worker.
///
/// Any `Fn(T) -> Result<R, E>` closure that can be shared across threads
/// implements this trait. Implement it directly when the computation carries
/// state that is awkward to capture in a closure.
pub trait Compute<T>: Send + Sync + 'static {
    type Output: Send + 'static;
    type Error: Send + 'static;

    /// Computes the output for a single payload.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload cannot be processed. The error is
    /// delivered in order as [`JobError::Failed`]; it never stops the pool.
    fn compute(&self, payload: T) -> Result<Self::Output, Self::Error>;
}

impl<T, F, R, E> Compute<T> for F
where
    F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    type Output = R;
    type Error = E;

    fn compute(&self, payload: T) -> Result<R, E> {
        self(payload)
    }
}

/// Messages delivered to the orderer.
#[derive(Debug)]
pub(crate) enum Event<R, E> {
    /// A worker finished a job.
    Completed(JobResult<R, E>),
    /// The dispatcher closed after accepting `total` jobs.
    Sealed { total: u64 },
    /// A compute function panicked and the pool is aborting.
    Fault { sequence: u64, message: String },
}
