use crate::error::{Error, Result};
use core::{fmt, str::FromStr};

/// What a worker does when the compute function panics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PanicPolicy {
    /// Catch the panic, report it as [`JobError::Panicked`] for that job and
    /// keep the worker running.
    ///
    /// [`JobError::Panicked`]: crate::JobError::Panicked
    #[default]
    IsolateAndReport,
    /// Catch the panic, abort the whole pool and surface
    /// [`Error::WorkerPanicked`] through the ordered results.
    PropagateAndAbort,
}

impl fmt::Display for PanicPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsolateAndReport => f.write_str("isolate"),
            Self::PropagateAndAbort => f.write_str("abort"),
        }
    }
}

impl FromStr for PanicPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "isolate" | "isolate-and-report" => Ok(Self::IsolateAndReport),
            "abort" | "propagate" | "propagate-and-abort" => Ok(Self::PropagateAndAbort),
            other => Err(Error::InvalidConfig {
                reason: format!("unknown panic policy `{other}` (expected `isolate` or `abort`)"),
            }),
        }
    }
}

/// Sizing and failure policy for a pool.
///
/// `Default` sizes the pool to the machine: one worker per logical CPU and a
/// job queue twice that deep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads. Fixed for the lifetime of the pool.
    pub worker_count: usize,
    /// Capacity of the job queue. `submit` blocks once this many jobs are
    /// waiting for a worker.
    pub queue_capacity: usize,
    pub panic_policy: PanicPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::with_workers(num_cpus::get().max(1))
    }
}

impl PoolConfig {
    /// A config with `worker_count` workers and the default queue capacity
    /// of `worker_count * 2`.
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            queue_capacity: worker_count.saturating_mul(2),
            panic_policy: PanicPolicy::default(),
        }
    }

    #[must_use]
    pub const fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    #[must_use]
    pub const fn panic_policy(mut self, panic_policy: PanicPolicy) -> Self {
        self.panic_policy = panic_policy;
        self
    }

    /// Checks the config before any thread is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either the worker count or the
    /// queue capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::InvalidConfig {
                reason: "worker_count must be greater than 0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig {
                reason: "queue_capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_twice_the_workers() {
        let config = PoolConfig::default();
        assert!(config.worker_count >= 1);
        assert_eq!(config.queue_capacity, config.worker_count * 2);
        assert_eq!(config.panic_policy, PanicPolicy::IsolateAndReport);
    }

    #[test]
    fn builder_overrides() {
        let config = PoolConfig::with_workers(3)
            .queue_capacity(1)
            .panic_policy(PanicPolicy::PropagateAndAbort);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.panic_policy, PanicPolicy::PropagateAndAbort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(matches!(
            PoolConfig::with_workers(0).validate(),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            PoolConfig::with_workers(2).queue_capacity(0).validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn panic_policy_parses_and_displays() {
        assert_eq!("isolate".parse::<PanicPolicy>(), Ok(PanicPolicy::IsolateAndReport));
        assert_eq!("ABORT".parse::<PanicPolicy>(), Ok(PanicPolicy::PropagateAndAbort));
        assert!("retry".parse::<PanicPolicy>().is_err());
        for policy in [PanicPolicy::IsolateAndReport, PanicPolicy::PropagateAndAbort] {
            assert_eq!(policy.to_string().parse::<PanicPolicy>(), Ok(policy));
        }
    }
}
