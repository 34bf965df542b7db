//! Feeds a batch through the pool and prints the ordered results.
//!
//! Submission runs on a blocking task so backpressure never stalls the
//! runtime; the ordered results arrive as a stream on the async side. A
//! shutdown signal cancels the feeder, which then closes the dispatcher, and
//! the printer keeps draining in-flight jobs for up to the drain timeout.

use super::{
    config::AppConfig,
    fib::{FibError, fib},
    telemetry::{
        increment_jobs_completed, increment_jobs_failed, increment_jobs_submitted,
        record_run_duration,
    },
};
use anyhow::Context;
use core::{future::Future, pin::pin};
use futures::StreamExt;
use ordpool::{Dispatcher, JobResult, create_pool};
use std::io::{BufRead, Write};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// What a run did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Jobs accepted by the dispatcher.
    pub submitted: u64,
    /// Results printed, in order.
    pub emitted: u64,
    /// Printed results that carried an error.
    pub failed: u64,
    /// A shutdown signal stopped submission early.
    pub interrupted: bool,
}

/// Parses whitespace or comma separated `u32` inputs. Blank lines and lines
/// starting with `#` are skipped.
///
/// # Errors
///
/// Fails on unreadable input or on any token that is not a `u32`.
pub fn read_payloads(reader: impl BufRead) -> anyhow::Result<Vec<u32>> {
    let mut payloads = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for token in line.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            let payload = token
                .parse()
                .with_context(|| format!("line {}: `{token}` is not a valid input", index + 1))?;
            payloads.push(payload);
        }
    }
    Ok(payloads)
}

/// Submits `payloads` until done or cancelled, then closes the dispatcher.
///
/// Returns the number of jobs submitted.
fn feed(mut dispatcher: Dispatcher<u32>, payloads: Vec<u32>, token: &CancellationToken) -> u64 {
    for payload in payloads {
        if token.is_cancelled() {
            #[cfg(feature = "tracing")]
            tracing::info!("Submission cancelled after {} jobs", dispatcher.submitted());
            break;
        }
        if dispatcher.submit(payload).is_err() {
            // The consumer is gone and has reported why.
            break;
        }
        increment_jobs_submitted();
    }
    let _ = dispatcher.close();
    dispatcher.submitted()
}

fn write_result(
    out: &mut impl Write,
    input: Option<u32>,
    result: &JobResult<u64, FibError>,
) -> std::io::Result<()> {
    let input = input.map_or_else(|| "?".to_string(), |n| n.to_string());
    match &result.output {
        Ok(value) => writeln!(out, "{}\t{input}\t{value}", result.sequence),
        Err(e) => writeln!(out, "{}\t{input}\terror: {e}", result.sequence),
    }
}

/// Computes `fib` for every payload on the pool and writes one line per
/// result to `out`, in input order: `sequence<TAB>input<TAB>value`.
///
/// # Errors
///
/// Returns pool-level failures (including a propagated panic) and output
/// errors. Per-job failures are written in place and counted instead.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(jobs = payloads.len())))]
pub async fn run<W, S>(
    config: &AppConfig,
    payloads: Vec<u32>,
    out: &mut W,
    shutdown: S,
) -> anyhow::Result<RunSummary>
where
    W: Write,
    S: Future<Output = ()>,
{
    let start = std::time::Instant::now();
    let inputs = payloads.clone();
    let (dispatcher, results) = create_pool(config.pool.clone(), fib)?.into_parts();

    let token = CancellationToken::new();
    let feeder = {
        let token = token.clone();
        tokio::task::spawn_blocking(move || feed(dispatcher, payloads, &token))
    };

    let mut summary = RunSummary::default();
    let mut stream = pin!(results.into_stream(config.stream_buffer_size));
    let mut shutdown = pin!(shutdown);
    let mut drain_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(result)) => {
                    let input = usize::try_from(result.sequence)
                        .ok()
                        .and_then(|i| inputs.get(i).copied());
                    write_result(out, input, &result).context("failed to write result")?;
                    summary.emitted += 1;
                    increment_jobs_completed();
                    if result.is_err() {
                        summary.failed += 1;
                        increment_jobs_failed();
                    }
                }
                Some(Err(e)) => {
                    token.cancel();
                    return Err(e).context("pool aborted");
                }
                None => break,
            },
            () = &mut shutdown, if drain_deadline.is_none() => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    "Shutdown requested, draining in-flight jobs for up to {:?}",
                    config.drain_timeout
                );
                token.cancel();
                summary.interrupted = true;
                drain_deadline = Some(Instant::now() + config.drain_timeout);
            },
            () = sleep_until(drain_deadline.unwrap_or_else(Instant::now)), if drain_deadline.is_some() => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Drain timed out after {} results, abandoning the rest", summary.emitted);
                break;
            },
        }
    }

    // Stops the pool if the drain timed out; a no-op after end of sequence.
    drop(stream);
    out.flush().context("failed to flush output")?;
    summary.submitted = feeder.await.context("feeder task failed")?;

    record_run_duration(start.elapsed().as_secs_f64() * 1_000.0);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use ordpool::{PanicPolicy, PoolConfig};

    fn config(workers: usize) -> AppConfig {
        AppConfig {
            pool: PoolConfig::with_workers(workers),
            stream_buffer_size: 4,
            drain_timeout: Duration::from_secs(5),
            jobs: None,
        }
    }

    fn lines(out: &[u8]) -> Vec<String> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn payloads_parse_across_separators() {
        let input = "5, 1\n# comment\n\n4 7,,8\n";
        assert_eq!(read_payloads(input.as_bytes()).unwrap(), vec![5, 1, 4, 7, 8]);
    }

    #[test]
    fn bad_payload_names_the_line() {
        let err = read_payloads("1\n2\nabc\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn prints_results_in_input_order() {
        let mut out = Vec::new();
        let summary = run(&config(3), vec![5, 1, 4], &mut out, std::future::pending())
            .await
            .unwrap();

        assert_eq!(lines(&out), vec!["0\t5\t5", "1\t1\t1", "2\t4\t3"]);
        assert_eq!(
            summary,
            RunSummary {
                submitted: 3,
                emitted: 3,
                failed: 0,
                interrupted: false,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failures_are_printed_in_place() {
        let mut out = Vec::new();
        let summary = run(&config(2), vec![10, 200, 3], &mut out, std::future::pending())
            .await
            .unwrap();

        let lines = lines(&out);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "0\t10\t55");
        assert!(lines[1].starts_with("1\t200\terror: job failed: fib(200) overflows u64"));
        assert_eq!(lines[2], "2\t3\t2");
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_batch_prints_nothing() {
        let mut out = Vec::new();
        let summary = run(&config(2), Vec::new(), &mut out, std::future::pending())
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_drains_what_was_submitted() {
        let mut out = Vec::new();
        let payloads: Vec<u32> = (0..50_000).map(|n| n % 90).collect();
        let summary = run(&config(2), payloads, &mut out, std::future::ready(()))
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.emitted, summary.submitted);
        let sequences: Vec<u64> = lines(&out)
            .iter()
            .map(|line| line.split('\t').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(sequences, (0..summary.emitted).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abort_policy_leaves_clean_runs_intact() {
        let mut config = config(2);
        config.pool = config.pool.panic_policy(PanicPolicy::PropagateAndAbort);
        let mut out = Vec::new();
        let summary = run(&config, vec![1, 2], &mut out, std::future::pending())
            .await
            .unwrap();
        assert_eq!(summary.emitted, 2);
    }
}
