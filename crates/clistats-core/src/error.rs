//! Error types for registry and lifecycle operations.

use std::fmt;

/// Errors returned synchronously by registry and lifecycle operations.
///
/// Absent field IDs are never errors: lookups return `None` and increments
/// on unknown counters are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// The event loop is running. Returned by every `add_*` call and by a
    /// second `start` without an intervening `stop`.
    AlreadyStarted,
    /// The input-event source could not be acquired at start.
    EventSourceUnavailable(String),
    /// The loop runtime or its thread could not be created.
    Runtime(String),
}

impl StatsError {
    /// Creates an input-acquisition error from any displayable cause.
    pub fn event_source(cause: impl fmt::Display) -> Self {
        StatsError::EventSourceUnavailable(cause.to_string())
    }

    /// Returns true for the start-gate rejection.
    pub fn is_already_started(&self) -> bool {
        matches!(self, StatsError::AlreadyStarted)
    }
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::AlreadyStarted => write!(f, "statistics event loop already started"),
            StatsError::EventSourceUnavailable(cause) => {
                write!(f, "input event source unavailable: {cause}")
            }
            StatsError::Runtime(cause) => write!(f, "failed to start event loop: {cause}"),
        }
    }
}

impl std::error::Error for StatsError {}

/// Result type for registry and lifecycle operations.
pub type StatsResult<T> = std::result::Result<T, StatsError>;
