//! Point-in-time copy of every field, for formatters and JSON output.

use serde::Serialize;
use serde_json::{Value, json};

use crate::registry::StatsView;
use crate::value::FieldValue;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterEntry {
    pub id: String,
    pub description: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueEntry {
    pub id: String,
    pub description: String,
    pub kind: &'static str,
    pub value: Value,
    /// Human-readable rendering of `value`.
    pub display: String,
}

impl CounterEntry {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "description": self.description,
            "value": self.value,
        })
    }
}

impl ValueEntry {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "description": self.description,
            "kind": self.kind,
            "value": self.value,
            "display": self.display,
        })
    }

    fn new(id: String, description: String, value: &FieldValue) -> Self {
        Self {
            id,
            description,
            kind: value.kind(),
            value: value.to_json(),
            display: value.to_string(),
        }
    }
}

/// All fields of a registry, each list sorted by ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub counters: Vec<CounterEntry>,
    pub statics: Vec<ValueEntry>,
    /// Dynamics evaluated at capture time.
    pub dynamics: Vec<ValueEntry>,
}

impl StatsSnapshot {
    pub(crate) fn capture(view: &StatsView<'_>) -> Self {
        let counters = view
            .counter_ids()
            .into_iter()
            .filter_map(|id| {
                let value = view.get_counter(&id)?;
                let description = view.counter_description(&id)?;
                Some(CounterEntry {
                    id,
                    description,
                    value,
                })
            })
            .collect();

        let statics = view
            .static_ids()
            .into_iter()
            .filter_map(|id| {
                let value = view.get_static(&id)?;
                let description = view.static_description(&id)?;
                Some(ValueEntry::new(id, description, &value))
            })
            .collect();

        let dynamics = view
            .dynamic_ids()
            .into_iter()
            .filter_map(|id| {
                let value = view.evaluate_dynamic(&id)?;
                let description = view.dynamic_description(&id)?;
                Some(ValueEntry::new(id, description, &value))
            })
            .collect();

        Self {
            counters,
            statics,
            dynamics,
        }
    }

    pub fn counter(&self, id: &str) -> Option<u64> {
        self.counters.iter().find(|c| c.id == id).map(|c| c.value)
    }

    /// Same shape as the `Serialize` output, built without a fallible
    /// serializer.
    pub fn to_json(&self) -> Value {
        json!({
            "counters": self.counters.iter().map(CounterEntry::to_json).collect::<Vec<_>>(),
            "statics": self.statics.iter().map(ValueEntry::to_json).collect::<Vec<_>>(),
            "dynamics": self.dynamics.iter().map(ValueEntry::to_json).collect::<Vec<_>>(),
        })
    }
}
