//! The three field kinds held by the registry.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::registry::StatsView;
use crate::value::FieldValue;

/// Computes the current value of a dynamic field.
///
/// Callbacks run inline on the render path. They must only read from the
/// view they are given, perform no side effects, and return quickly.
pub type DynamicCallback = Arc<dyn Fn(&StatsView<'_>) -> FieldValue + Send + Sync>;

/// A 64-bit counter updated with atomic operations.
///
/// Increments take a signed delta and saturate: the value never wraps below
/// zero or above `u64::MAX`.
#[derive(Debug)]
pub struct CounterField {
    value: AtomicU64,
    description: String,
}

impl CounterField {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            value: AtomicU64::new(0),
            description: description.into(),
        }
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Adds `delta` and returns the new value.
    pub fn increment(&self, delta: i64) -> u64 {
        let previous = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add_signed(delta))
            })
            // The closure always returns Some.
            .unwrap_or_else(|current| current);
        previous.saturating_add_signed(delta)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A value fixed at registration time.
#[derive(Debug, Clone)]
pub struct StaticField {
    value: FieldValue,
    description: String,
}

impl StaticField {
    pub fn new(description: impl Into<String>, value: FieldValue) -> Self {
        Self {
            value,
            description: description.into(),
        }
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A value derived from the registry each time it is read.
#[derive(Clone)]
pub struct DynamicField {
    compute: DynamicCallback,
    description: String,
}

impl DynamicField {
    pub fn new(description: impl Into<String>, compute: DynamicCallback) -> Self {
        Self {
            compute,
            description: description.into(),
        }
    }

    pub fn callback(&self) -> DynamicCallback {
        Arc::clone(&self.compute)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for DynamicField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicField")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
