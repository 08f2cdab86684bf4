//! The refresh loop.
//!
//! One task multiplexes three sources: cancellation, tick pulses and input
//! events. Each iteration services exactly one ready source and checks
//! cancellation first, so a flood of ticks or keypresses cannot delay a stop
//! by more than one render.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::input::InputStream;
use crate::registry::{Inner, StatsView};
use crate::tick::TickSource;

/// What caused a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Tick,
    Input,
}

/// Runs until `cancel` fires, the registry is dropped, or `render` panics.
/// A panic also moves the registry back to idle.
///
/// The input stream and tick source are owned by the loop and released
/// when it returns.
pub(crate) async fn run<F>(
    registry: Weak<Inner>,
    mut render: F,
    interval: Duration,
    mut input: InputStream,
    cancel: CancellationToken,
) where
    F: FnMut(&StatsView<'_>),
{
    let mut ticks = TickSource::from_interval(interval);
    let mut input_open = true;
    let mut renders: u64 = 0;
    debug!(
        interval_ms = interval.as_millis() as u64,
        manual = ticks.is_manual(),
        "stats loop started"
    );

    loop {
        let trigger = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = ticks.tick() => Trigger::Tick,
            event = input.recv(), if input_open => match event {
                Some(event) => {
                    trace!(?event, "input event");
                    Trigger::Input
                }
                None => {
                    debug!("input stream closed; refreshing on ticks only");
                    input_open = false;
                    continue;
                }
            },
        };

        let Some(inner) = registry.upgrade() else {
            debug!("registry dropped; stats loop exiting");
            break;
        };
        let view = StatsView::new(&inner);
        if panic::catch_unwind(AssertUnwindSafe(|| render(&view))).is_err() {
            error!(renders, "render callback panicked; stats loop exiting");
            // The registry must not keep reporting Running for a dead loop.
            inner.lock_lifecycle().retire_current();
            break;
        }
        renders += 1;
        trace!(?trigger, renders, "rendered");
    }

    debug!(renders, "stats loop exited");
}
