//! Field registry.
//!
//! `Statistics` is a cheap, clonable handle to the registry. Counters,
//! statics and dynamics live in three independent namespaces; an ID may be
//! registered as both a counter and a static.
//!
//! Structural changes (`add_*`) are gated on the lifecycle: they succeed
//! only while the event loop is idle. Counter increments and every read are
//! allowed at any time.

use std::collections::HashMap;
use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::config::StatsConfig;
use crate::error::{StatsError, StatsResult};
use crate::fields::{CounterField, DynamicCallback, DynamicField, StaticField};
use crate::input::{InputSource, NoInput};
use crate::lifecycle::Lifecycle;
use crate::snapshot::StatsSnapshot;
use crate::value::FieldValue;

/// Handle to a statistics registry and its refresh loop.
#[derive(Clone)]
pub struct Statistics {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    counters: RwLock<HashMap<String, Arc<CounterField>>>,
    statics: RwLock<HashMap<String, StaticField>>,
    dynamics: RwLock<HashMap<String, DynamicField>>,
    pub(crate) lifecycle: Mutex<Lifecycle>,
    /// Signalled when a stopped loop has been joined.
    lifecycle_changed: Condvar,
    pub(crate) input: Box<dyn InputSource>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    pub(crate) fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait_lifecycle<'a>(
        &self,
        guard: MutexGuard<'a, Lifecycle>,
    ) -> MutexGuard<'a, Lifecycle> {
        self.lifecycle_changed.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_lifecycle(&self) {
        self.lifecycle_changed.notify_all();
    }

    /// Runs `insert` with the lifecycle lock held, so a concurrent `start`
    /// cannot slip in between the idle check and the write.
    fn gated<F: FnOnce(&Self)>(&self, insert: F) -> StatsResult<()> {
        let lifecycle = self.lock_lifecycle();
        if lifecycle.is_running() {
            return Err(StatsError::AlreadyStarted);
        }
        insert(self);
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // The loop only holds a weak reference; make sure it does not
        // outlive the last handle.
        self.lock_lifecycle().cancel_all();
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    /// Creates an empty registry refreshed by ticks only.
    pub fn new() -> Self {
        Self::with_input(NoInput)
    }

    /// Creates an empty registry that also refreshes on events from `input`.
    pub fn with_input(input: impl InputSource + 'static) -> Self {
        Self::with_boxed_input(Box::new(input))
    }

    pub fn with_boxed_input(input: Box<dyn InputSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                counters: RwLock::new(HashMap::new()),
                statics: RwLock::new(HashMap::new()),
                dynamics: RwLock::new(HashMap::new()),
                lifecycle: Mutex::new(Lifecycle::default()),
                lifecycle_changed: Condvar::new(),
                input,
            }),
        }
    }

    /// Creates an empty registry with the input source selected by `config`.
    pub fn from_config(config: &StatsConfig) -> Self {
        Self::with_boxed_input(config.input_source())
    }

    /// Read-only view over the registry, the same one passed to render and
    /// dynamic callbacks.
    pub fn view(&self) -> StatsView<'_> {
        StatsView::new(&self.inner)
    }

    /// Registers (or replaces) a counter starting at zero.
    ///
    /// A counter tracks an increasing quantity such as requests or errors.
    ///
    /// # Errors
    /// Returns `StatsError::AlreadyStarted` while the event loop is running.
    pub fn add_counter(
        &self,
        id: impl Into<String>,
        description: impl Into<String>,
    ) -> StatsResult<()> {
        let (id, description): (String, String) = (id.into(), description.into());
        self.inner.gated(|inner| {
            write(&inner.counters).insert(id, Arc::new(CounterField::new(description)));
        })
    }

    /// Adds `delta` to a counter. Unknown IDs are ignored.
    ///
    /// The stored value saturates at zero and `u64::MAX`.
    pub fn increment_counter(&self, id: &str, delta: i64) {
        let counter = read(&self.inner.counters).get(id).map(Arc::clone);
        if let Some(counter) = counter {
            counter.increment(delta);
        }
    }

    pub fn get_counter(&self, id: &str) -> Option<u64> {
        self.view().get_counter(id)
    }

    /// Registers (or replaces) a static field.
    ///
    /// The value keeps its `FieldValue` variant and is returned unchanged by
    /// `get_static`.
    ///
    /// # Errors
    /// Returns `StatsError::AlreadyStarted` while the event loop is running.
    pub fn add_static(
        &self,
        id: impl Into<String>,
        description: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> StatsResult<()> {
        let id: String = id.into();
        let field = StaticField::new(description, value.into());
        self.inner.gated(|inner| {
            write(&inner.statics).insert(id, field);
        })
    }

    pub fn get_static(&self, id: &str) -> Option<FieldValue> {
        self.view().get_static(id)
    }

    /// Registers (or replaces) a dynamic field computed by `compute`.
    ///
    /// Typical uses are requests per second or elapsed time. The callback
    /// receives a read-only view and must not have side effects.
    ///
    /// # Errors
    /// Returns `StatsError::AlreadyStarted` while the event loop is running.
    pub fn add_dynamic<F>(
        &self,
        id: impl Into<String>,
        description: impl Into<String>,
        compute: F,
    ) -> StatsResult<()>
    where
        F: Fn(&StatsView<'_>) -> FieldValue + Send + Sync + 'static,
    {
        let id: String = id.into();
        let field = DynamicField::new(description, Arc::new(compute));
        self.inner.gated(|inner| {
            write(&inner.dynamics).insert(id, field);
        })
    }

    pub fn get_dynamic(&self, id: &str) -> Option<DynamicCallback> {
        self.view().get_dynamic(id)
    }

    pub fn evaluate_dynamic(&self, id: &str) -> Option<FieldValue> {
        self.view().evaluate_dynamic(id)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.view().snapshot()
    }
}

/// Read-only access to a registry.
///
/// Handed to render callbacks and dynamic callbacks. Every method is safe to
/// call concurrently and from inside those callbacks.
#[derive(Clone, Copy)]
pub struct StatsView<'a> {
    inner: &'a Inner,
}

impl<'a> StatsView<'a> {
    pub(crate) fn new(inner: &'a Inner) -> Self {
        Self { inner }
    }

    pub fn get_counter(&self, id: &str) -> Option<u64> {
        read(&self.inner.counters).get(id).map(|c| c.get())
    }

    pub fn get_static(&self, id: &str) -> Option<FieldValue> {
        read(&self.inner.statics).get(id).map(|s| s.value().clone())
    }

    /// Returns the callback of a dynamic field without invoking it.
    pub fn get_dynamic(&self, id: &str) -> Option<DynamicCallback> {
        read(&self.inner.dynamics).get(id).map(DynamicField::callback)
    }

    /// Invokes a dynamic field's callback against this view.
    pub fn evaluate_dynamic(&self, id: &str) -> Option<FieldValue> {
        // Clone the callback out first: no lock is held while it runs.
        let compute = self.get_dynamic(id)?;
        Some(compute(self))
    }

    pub fn counter_description(&self, id: &str) -> Option<String> {
        read(&self.inner.counters)
            .get(id)
            .map(|c| c.description().to_string())
    }

    pub fn static_description(&self, id: &str) -> Option<String> {
        read(&self.inner.statics)
            .get(id)
            .map(|s| s.description().to_string())
    }

    pub fn dynamic_description(&self, id: &str) -> Option<String> {
        read(&self.inner.dynamics)
            .get(id)
            .map(|d| d.description().to_string())
    }

    /// Counter IDs in sorted order.
    pub fn counter_ids(&self) -> Vec<String> {
        sorted_keys(&read(&self.inner.counters))
    }

    pub fn static_ids(&self) -> Vec<String> {
        sorted_keys(&read(&self.inner.statics))
    }

    pub fn dynamic_ids(&self) -> Vec<String> {
        sorted_keys(&read(&self.inner.dynamics))
    }

    /// Captures every field, evaluating dynamics against this view.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::capture(self)
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}
