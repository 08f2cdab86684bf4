//! Start/stop state machine for the refresh loop.
//!
//! `Idle -> Running` on `start`, `Running -> Idle` on `stop`. Starting while
//! running fails with `AlreadyStarted`; stopping while idle is a no-op.
//! A registry can be started again after it was stopped.

use std::sync::{Arc, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{StatsError, StatsResult};
use crate::event_loop;
use crate::registry::{Statistics, StatsView};

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
}

/// Thread running one event loop.
pub(crate) struct LoopHandle {
    cancel: CancellationToken,
    thread: JoinHandle<()>,
}

impl LoopHandle {
    fn thread_id(&self) -> ThreadId {
        self.thread.thread().id()
    }

    fn is_current_thread(&self) -> bool {
        self.thread_id() == thread::current().id()
    }

    /// Waits for the loop thread to exit. Never joins the calling thread.
    fn join(self) {
        if self.is_current_thread() {
            return;
        }
        if self.thread.join().is_err() {
            error!("stats loop thread panicked");
        }
    }
}

/// At most one of `running`, `retired` and `joining` is set at a time, so a
/// cancelled loop stays visible until its thread has exited.
#[derive(Default)]
pub(crate) struct Lifecycle {
    running: Option<LoopHandle>,
    /// A loop cancelled from its own thread. It may still be finishing the
    /// render that stopped it; the next `start` or `stop` joins it.
    retired: Option<LoopHandle>,
    /// Thread of a cancelled loop that is being joined with the lock released.
    joining: Option<ThreadId>,
}

impl Lifecycle {
    pub(crate) fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub(crate) fn cancel_all(&mut self) {
        for handle in self.running.iter().chain(self.retired.iter()) {
            handle.cancel.cancel();
        }
    }

    /// Cancels the running loop and parks it as retired, when called from
    /// that loop's thread. Returns whether anything changed.
    pub(crate) fn retire_current(&mut self) -> bool {
        if !self.running.as_ref().is_some_and(LoopHandle::is_current_thread) {
            return false;
        }
        if let Some(handle) = self.running.take() {
            handle.cancel.cancel();
            self.retired = Some(handle);
        }
        true
    }

    fn is_draining(&self, thread: ThreadId) -> bool {
        self.joining == Some(thread)
            || self.retired.as_ref().is_some_and(|handle| handle.thread_id() == thread)
    }
}

impl Statistics {
    pub fn state(&self) -> LifecycleState {
        if self.is_running() {
            LifecycleState::Running
        } else {
            LifecycleState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_lifecycle().is_running()
    }

    /// Starts the refresh loop on a dedicated thread.
    ///
    /// `render` is called on that thread once per tick and once per input
    /// event. A non-zero `interval` ticks at that period, the first tick one
    /// interval after start; a zero `interval` disables ticks so only input
    /// events refresh. Ticks missed while `render` overruns are dropped.
    ///
    /// If a previous loop is still shutting down, this waits for its thread
    /// to exit before spawning the new one.
    ///
    /// Fields must be registered before calling this; `add_*` fails until
    /// `stop` is called.
    ///
    /// # Errors
    /// - `AlreadyStarted` if the loop is running, or if called from a loop
    ///   that is being stopped. The existing loop is untouched.
    /// - `EventSourceUnavailable` if the input source cannot be acquired.
    /// - `Runtime` if the loop thread cannot be created.
    ///
    /// On error the registry stays idle and nothing is left running.
    pub fn start<F>(&self, render: F, interval: Duration) -> StatsResult<()>
    where
        F: FnMut(&StatsView<'_>) + Send + 'static,
    {
        let Some(mut lifecycle) = self.settle() else {
            debug!("start rejected: called from a stopping stats loop");
            return Err(StatsError::AlreadyStarted);
        };
        if lifecycle.is_running() {
            debug!("start rejected: stats loop already running");
            return Err(StatsError::AlreadyStarted);
        }

        let input = self.inner.input.acquire().inspect_err(|err| {
            warn!(source = self.inner.input.name(), %err, "failed to acquire input source");
        })?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|err| StatsError::Runtime(err.to_string()))?;

        let cancel = CancellationToken::new();
        let registry = Arc::downgrade(&self.inner);
        let loop_cancel = cancel.clone();
        let thread = thread::Builder::new()
            .name("clistats-loop".to_string())
            .spawn(move || {
                runtime.block_on(event_loop::run(registry, render, interval, input, loop_cancel));
            })
            .map_err(|err| StatsError::Runtime(err.to_string()))?;

        lifecycle.running = Some(LoopHandle { cancel, thread });
        debug!(
            interval_ms = interval.as_millis() as u64,
            input = self.inner.input.name(),
            "stats loop spawned"
        );
        Ok(())
    }

    /// Stops the refresh loop.
    ///
    /// Called from outside the loop, this waits for the loop thread to exit,
    /// so no render starts after it returns. Called from inside a render
    /// callback, it only signals cancellation and returns; the loop exits
    /// once that callback returns.
    ///
    /// Stopping an idle registry does nothing beyond waiting out a loop that
    /// is still shutting down.
    ///
    /// # Errors
    /// Currently infallible; the `Result` mirrors `start`.
    pub fn stop(&self) -> StatsResult<()> {
        let mut lifecycle = self.inner.lock_lifecycle();
        let Some(handle) = lifecycle.running.take() else {
            drop(lifecycle);
            if self.settle().is_none() {
                debug!("stop called from a stopping stats loop");
            }
            return Ok(());
        };
        handle.cancel.cancel();
        if handle.is_current_thread() {
            debug!("stats loop stopped from its own callback");
            lifecycle.retired = Some(handle);
            return Ok(());
        }
        drop(self.join_unlocked(lifecycle, handle));
        debug!("stats loop stopped");
        Ok(())
    }

    /// Waits until no cancelled loop can still render and returns the lock.
    ///
    /// Returns `None` when called from the thread of such a loop, which
    /// cannot wait for itself.
    fn settle(&self) -> Option<MutexGuard<'_, Lifecycle>> {
        let current = thread::current().id();
        let mut lifecycle = self.inner.lock_lifecycle();
        loop {
            if lifecycle.is_draining(current) {
                return None;
            }
            if lifecycle.joining.is_some() {
                lifecycle = self.inner.wait_lifecycle(lifecycle);
                continue;
            }
            let Some(retired) = lifecycle.retired.take() else {
                return Some(lifecycle);
            };
            lifecycle = self.join_unlocked(lifecycle, retired);
        }
    }

    /// Joins `handle` with the lock released. The thread stays recorded in
    /// `joining` meanwhile, so concurrent `start` and `stop` calls wait.
    fn join_unlocked<'a>(
        &'a self,
        mut lifecycle: MutexGuard<'a, Lifecycle>,
        handle: LoopHandle,
    ) -> MutexGuard<'a, Lifecycle> {
        lifecycle.joining = Some(handle.thread_id());
        drop(lifecycle);
        // The loop's callback may still call into the registry.
        handle.join();
        let mut lifecycle = self.inner.lock_lifecycle();
        lifecycle.joining = None;
        self.inner.notify_lifecycle();
        lifecycle
    }
}
