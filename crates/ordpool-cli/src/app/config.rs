use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use ordpool::{PanicPolicy, PoolConfig};

/// Runtime configuration for the `ordpool` binary.
///
/// These settings control the size of the worker pool, how much work may
/// queue up in front of it, and how the run shuts down. Every value can come
/// from a CLI flag or an environment variable (a `.env` file is honoured).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ordpool",
    version,
    about = "Compute fib(n) for a batch of integers on a worker pool, printing results in input order"
)]
pub struct CliArgs {
    /// Number of worker threads.
    ///
    /// Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `ORDPOOL_WORKERS`
    #[arg(long, env = "ORDPOOL_WORKERS")]
    pub workers: Option<usize>,

    /// Capacity of the job queue in front of the workers.
    ///
    /// Submission blocks once this many jobs are waiting. Defaults to twice
    /// the worker count.
    ///
    /// Environment variable: `ORDPOOL_QUEUE_CAPACITY`
    #[arg(long, env = "ORDPOOL_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// What to do when a job panics: `isolate` reports the panic in that
    /// job's slot, `abort` stops the whole run.
    ///
    /// Environment variable: `ORDPOOL_PANIC_POLICY`
    #[arg(long, env = "ORDPOOL_PANIC_POLICY", default_value = "isolate")]
    pub panic_policy: PanicPolicy,

    /// Capacity of the buffer between the ordered results and the printer.
    ///
    /// Environment variable: `ORDPOOL_STREAM_BUFFER`
    #[arg(long, env = "ORDPOOL_STREAM_BUFFER", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to keep draining in-flight jobs after Ctrl+C or SIGTERM before
    /// giving up on them.
    ///
    /// Environment variable: `ORDPOOL_DRAIN_TIMEOUT`
    #[arg(long, env = "ORDPOOL_DRAIN_TIMEOUT", default_value_t = 3)]
    pub drain_timeout: u64,

    /// Comma separated inputs, e.g. `--jobs 5,1,4`. When omitted, inputs are
    /// read from stdin, one or more per line.
    ///
    /// Environment variable: `ORDPOOL_JOBS`
    #[arg(long, env = "ORDPOOL_JOBS", value_delimiter = ',')]
    pub jobs: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub stream_buffer_size: usize,
    pub drain_timeout: Duration,
    pub jobs: Option<Vec<u32>>,
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let mut pool = match args.workers {
            Some(0) => bail!("ORDPOOL_WORKERS must be greater than 0"),
            Some(workers) => PoolConfig::with_workers(workers),
            None => PoolConfig::default(),
        };

        if let Some(capacity) = args.queue_capacity {
            if capacity == 0 {
                bail!("ORDPOOL_QUEUE_CAPACITY must be greater than 0");
            }
            pool = pool.queue_capacity(capacity);
        }

        if args.stream_buffer_size == 0 {
            bail!("ORDPOOL_STREAM_BUFFER must be greater than 0");
        }

        let pool = pool.panic_policy(args.panic_policy);
        pool.validate()?;

        Ok(Self {
            pool,
            stream_buffer_size: args.stream_buffer_size,
            drain_timeout: Duration::from_secs(args.drain_timeout),
            jobs: (!args.jobs.is_empty()).then_some(args.jobs),
        })
    }
}
