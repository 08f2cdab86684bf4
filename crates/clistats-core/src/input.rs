//! Input-event sources that request a refresh outside the tick schedule.
//!
//! A source is acquired on every `start` and released when the loop exits.
//! Three sources ship with the crate:
//! - `NoInput`: tick-only refresh
//! - `ChannelInput`: refresh requested programmatically via `RefreshTrigger`
//! - `KeyboardInput`: refresh on any keypress in a raw-mode terminal

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

use crate::error::{StatsError, StatsResult};
use crate::interrupt;

/// A single "refresh requested" signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A key was pressed.
    Keypress,
    /// Refresh requested from code.
    Requested,
}

/// Events from an acquired source. Dropping the stream releases the source.
pub struct InputStream {
    events: Option<UnboundedReceiver<InputEvent>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl InputStream {
    pub fn new(events: UnboundedReceiver<InputEvent>) -> Self {
        Self {
            events: Some(events),
            release: None,
        }
    }

    /// A stream whose `release` hook runs when the stream is dropped.
    pub fn with_release<F>(events: UnboundedReceiver<InputEvent>, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            events: Some(events),
            release: Some(Box::new(release)),
        }
    }

    /// A stream that never yields.
    pub fn idle() -> Self {
        Self {
            events: None,
            release: None,
        }
    }

    /// Next event, or `None` once every sender is gone. An idle stream stays
    /// pending forever.
    pub async fn recv(&mut self) -> Option<InputEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => std::future::pending().await,
        }
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputStream")
            .field("idle", &self.events.is_none())
            .finish_non_exhaustive()
    }
}

/// Provider of refresh events for the event loop.
pub trait InputSource: Send + Sync {
    /// Acquires a fresh stream. Called once per `start`.
    ///
    /// # Errors
    /// Returns `StatsError::EventSourceUnavailable` if the underlying device
    /// cannot be used.
    fn acquire(&self) -> StatsResult<InputStream>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// No input events; refresh happens on ticks only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn acquire(&self) -> StatsResult<InputStream> {
        Ok(InputStream::idle())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

type SenderSlot = Arc<Mutex<Option<UnboundedSender<InputEvent>>>>;

/// Input source fed by a `RefreshTrigger`.
#[derive(Debug, Clone, Default)]
pub struct ChannelInput {
    slot: SenderSlot,
}

/// Requests refreshes from any thread while the loop is running.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    slot: SenderSlot,
}

impl ChannelInput {
    pub fn new() -> (Self, RefreshTrigger) {
        let input = Self::default();
        let trigger = RefreshTrigger {
            slot: Arc::clone(&input.slot),
        };
        (input, trigger)
    }
}

impl InputSource for ChannelInput {
    fn acquire(&self) -> StatsResult<InputStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(tx.clone());

        let owned = Arc::clone(&self.slot);
        Ok(InputStream::with_release(rx, move || {
            let mut slot = owned.lock().unwrap_or_else(PoisonError::into_inner);
            // A later acquire may already own the slot.
            if slot.as_ref().is_some_and(|current| current.same_channel(&tx)) {
                *slot = None;
            }
        }))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

impl RefreshTrigger {
    /// Requests one refresh. Returns false when no loop is listening.
    pub fn request_refresh(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .is_some_and(|tx| tx.send(InputEvent::Requested).is_ok())
    }

    pub fn is_connected(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// How often the keyboard reader re-checks its stop flag.
pub const KEY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Refreshes on every keypress in the controlling terminal.
///
/// Acquiring puts the terminal in raw mode; releasing restores it. Raw mode
/// swallows the terminal's own SIGINT, so Ctrl+C is turned into a
/// self-interrupt instead of a refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyboardInput;

impl InputSource for KeyboardInput {
    fn acquire(&self) -> StatsResult<InputStream> {
        terminal::enable_raw_mode().map_err(StatsError::event_source)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let reader_stop = Arc::clone(&stop);
        let reader = thread::Builder::new()
            .name("clistats-keys".to_string())
            .spawn(move || read_keys(&tx, &reader_stop))
            .map_err(|err| {
                restore_terminal();
                StatsError::event_source(err)
            })?;

        Ok(InputStream::with_release(rx, move || {
            stop.store(true, Ordering::SeqCst);
            if reader.join().is_err() {
                warn!("keyboard reader panicked");
            }
            restore_terminal();
            debug!("keyboard input released");
        }))
    }

    fn name(&self) -> &'static str {
        "keyboard"
    }
}

fn restore_terminal() {
    if let Err(err) = terminal::disable_raw_mode() {
        warn!(%err, "failed to restore terminal mode");
    }
}

fn is_ctrl_c(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c'))
}

fn read_keys(tx: &UnboundedSender<InputEvent>, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match event::poll(KEY_POLL_INTERVAL) {
            Ok(false) => {}
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if is_ctrl_c(&key) {
                        debug!("ctrl+c in raw mode; interrupting self");
                        if let Err(err) = interrupt::interrupt_self() {
                            warn!(%err, "failed to deliver interrupt");
                        }
                        continue;
                    }
                    trace!(code = ?key.code, "keypress");
                    if tx.send(InputEvent::Keypress).is_err() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "keyboard read failed");
                    return;
                }
            },
            Err(err) => {
                warn!(%err, "keyboard poll failed");
                return;
            }
        }
    }
}
