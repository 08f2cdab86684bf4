//! CLI entry and dispatch.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use clistats_core::{InputMode, Statistics, StatsConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::render::{self, FrameFormat};
use crate::{logging, workload};

#[derive(Parser)]
#[command(name = "clistats")]
#[command(version)]
#[command(about = "Simulated batch processor with a live statistics line")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, env = "CLISTATS_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Refresh interval in milliseconds (0 = refresh on keypress only)
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Refresh on every keypress (puts the terminal in raw mode)
    #[arg(long)]
    keyboard: bool,

    /// Number of concurrent workers
    #[arg(long, default_value_t = 4)]
    workers: u64,

    /// Requests performed by each worker
    #[arg(long, default_value_t = 25)]
    requests: u64,

    /// Simulated latency of one request in milliseconds
    #[arg(long, default_value_t = 40, value_name = "MS")]
    latency_ms: u64,

    /// Every Nth request fails (0 = never)
    #[arg(long, default_value_t = 7, value_name = "N")]
    fail_every: u64,

    /// Print JSON snapshots instead of a status line
    #[arg(long)]
    json: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn stats_config(&self) -> Result<StatsConfig> {
        let mut config = match &self.config {
            Some(path) => StatsConfig::load_from(path)?,
            None => StatsConfig::default(),
        };
        if let Some(interval_ms) = self.interval_ms {
            config.refresh_interval_ms = interval_ms;
        }
        if self.keyboard {
            config.input = InputMode::Keyboard;
        }
        Ok(config)
    }

    fn workload(&self) -> workload::WorkloadOptions {
        workload::WorkloadOptions {
            workers: self.workers,
            requests_per_worker: self.requests,
            latency: std::time::Duration::from_millis(self.latency_ms),
            fail_every: self.fail_every,
        }
    }
}

/// Returned when the run was cut short by Ctrl+C.
#[derive(Debug)]
pub struct InterruptedError;

impl fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interrupted")
    }
}

impl std::error::Error for InterruptedError {}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.log_file.as_deref())?;

    let config = cli.stats_config()?;
    debug!(?config, "resolved configuration");

    let cancel = CancellationToken::new();
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            cancel.cancel();
        })
        .context("Error setting Ctrl+C handler")?;
    }

    let options = cli.workload();
    let stats = Statistics::from_config(&config);
    workload::register_fields(&stats, &options)?;

    let format = if cli.json {
        FrameFormat::Json
    } else {
        FrameFormat::Line
    };
    stats
        .start(render::printer(format), config.refresh_interval())
        .context("Failed to start statistics display")?;
    info!(workers = options.workers, "workload started");

    while_running(&stats, || {
        // one tokio runtime for the workers
        let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
        rt.block_on(workload::run(&stats, &options, &cancel));
        Ok(())
    })?;
    render::print_summary(&stats.view(), format).context("Failed to print summary")?;

    if interrupted.load(Ordering::SeqCst) {
        return Err(InterruptedError.into());
    }
    Ok(())
}

/// Runs `body` and stops the display afterwards, whether or not `body`
/// failed, so the terminal is restored before the error is reported.
fn while_running<T>(stats: &Statistics, body: impl FnOnce() -> Result<T>) -> Result<T> {
    let outcome = body();
    stats.stop()?;
    outcome
}
