//! Refresh pulses for the event loop.

use std::future;
use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Produces the loop's refresh pulses.
///
/// Must be created inside a tokio runtime with the time driver enabled.
#[derive(Debug)]
pub enum TickSource {
    /// Fires once per period. The first pulse comes one period after
    /// creation; pulses missed while a render overruns are skipped, not
    /// queued.
    Periodic(Interval),
    /// Never fires. Rendering is driven by input events alone.
    Manual,
}

impl TickSource {
    /// A zero interval selects manual refresh.
    pub fn from_interval(interval: Duration) -> Self {
        if interval.is_zero() {
            TickSource::Manual
        } else {
            TickSource::periodic(interval)
        }
    }

    /// # Panics
    /// Panics if `period` is zero.
    pub fn periodic(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        TickSource::Periodic(interval)
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, TickSource::Manual)
    }

    pub fn period(&self) -> Option<Duration> {
        match self {
            TickSource::Periodic(interval) => Some(interval.period()),
            TickSource::Manual => None,
        }
    }

    /// Waits for the next pulse. Cancel-safe.
    pub async fn tick(&mut self) {
        match self {
            TickSource::Periodic(interval) => {
                interval.tick().await;
            }
            TickSource::Manual => future::pending().await,
        }
    }
}
