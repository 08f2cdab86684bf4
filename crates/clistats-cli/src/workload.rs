//! Simulated batch processor feeding the statistics registry.

use std::time::Duration;

use anyhow::Result;
use clistats_core::{FieldValue, Statistics, StatsView, callbacks};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const REQUESTS: &str = "requests";
pub const ERRORS: &str = "errors";
pub const STARTED_AT: &str = "startedAt";
pub const TOTAL: &str = "total";
pub const RPS: &str = "rps";
pub const ELAPSED: &str = "elapsed";
pub const PROGRESS: &str = "progress";

#[derive(Debug, Clone)]
pub struct WorkloadOptions {
    pub workers: u64,
    pub requests_per_worker: u64,
    pub latency: Duration,
    /// Every Nth request of a worker fails; 0 disables failures.
    pub fail_every: u64,
}

impl WorkloadOptions {
    pub fn total(&self) -> u64 {
        self.workers.saturating_mul(self.requests_per_worker)
    }
}

/// Registers every field the display reads. Must run before `start`.
pub fn register_fields(stats: &Statistics, options: &WorkloadOptions) -> Result<()> {
    stats.add_counter(REQUESTS, "Requests completed")?;
    stats.add_counter(ERRORS, "Requests failed")?;
    stats.add_static(STARTED_AT, "Start time", FieldValue::now())?;
    stats.add_static(TOTAL, "Requests planned", options.total())?;
    stats.add_dynamic(
        RPS,
        "Requests per second",
        callbacks::requests_per_second(STARTED_AT, REQUESTS),
    )?;
    stats.add_dynamic(ELAPSED, "Time since start", callbacks::elapsed(STARTED_AT))?;
    stats.add_dynamic(PROGRESS, "Percent of planned requests done", progress)?;
    Ok(())
}

fn progress(view: &StatsView<'_>) -> FieldValue {
    let done = view.get_counter(REQUESTS).unwrap_or(0);
    let total = view
        .get_static(TOTAL)
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    if total == 0 {
        return FieldValue::Float(100.0);
    }
    FieldValue::Float(done as f64 * 100.0 / total as f64)
}

/// Runs all workers to completion or until `cancel` fires.
pub async fn run(stats: &Statistics, options: &WorkloadOptions, cancel: &CancellationToken) {
    let mut workers = JoinSet::new();
    for worker in 0..options.workers {
        let stats = stats.clone();
        let options = options.clone();
        let cancel = cancel.clone();
        workers.spawn(async move { run_worker(worker, &stats, &options, &cancel).await });
    }

    while let Some(result) = workers.join_next().await {
        if let Err(err) = result {
            warn!(%err, "worker task failed");
        }
    }
}

async fn run_worker(
    worker: u64,
    stats: &Statistics,
    options: &WorkloadOptions,
    cancel: &CancellationToken,
) {
    for n in 1..=options.requests_per_worker {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(worker, done = n - 1, "worker cancelled");
                return;
            }
            () = tokio::time::sleep(options.latency) => {}
        }
        stats.increment_counter(REQUESTS, 1);
        if options.fail_every > 0 && n % options.fail_every == 0 {
            stats.increment_counter(ERRORS, 1);
        }
    }
    debug!(worker, "worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(workers: u64, requests: u64, fail_every: u64) -> WorkloadOptions {
        WorkloadOptions {
            workers,
            requests_per_worker: requests,
            latency: Duration::from_millis(10),
            fail_every,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_workload_counts_requests_and_errors() {
        let stats = Statistics::new();
        let options = options(3, 10, 4);
        register_fields(&stats, &options).unwrap();

        run(&stats, &options, &CancellationToken::new()).await;

        assert_eq!(stats.get_counter(REQUESTS), Some(30));
        // Requests 4 and 8 of each worker fail.
        assert_eq!(stats.get_counter(ERRORS), Some(6));
        assert_eq!(stats.evaluate_dynamic(PROGRESS), Some(FieldValue::Float(100.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_workload_stops_early() {
        let stats = Statistics::new();
        let options = options(2, 1000, 0);
        register_fields(&stats, &options).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        run(&stats, &options, &cancel).await;

        assert_eq!(stats.get_counter(REQUESTS), Some(0));
        assert_eq!(stats.get_counter(ERRORS), Some(0));
    }

    #[test]
    fn test_progress_with_nothing_planned() {
        let stats = Statistics::new();
        register_fields(&stats, &options(0, 10, 0)).unwrap();
        assert_eq!(stats.evaluate_dynamic(PROGRESS), Some(FieldValue::Float(100.0)));
    }
}
