//! Values stored in static fields and produced by dynamic fields.
//!
//! `FieldValue` is a closed set of kinds so a static field can be read back
//! with the type it was stored with. Anything that does not fit one of the
//! scalar kinds can be carried as `Json`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde_json::{Value, json};

/// Format used when displaying `FieldValue::Time`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Time(DateTime<Local>),
    Duration(Duration),
    /// Arbitrary serializable payload.
    Json(Value),
}

impl FieldValue {
    /// Captures the current local time, the usual value for a "started at"
    /// static field.
    pub fn now() -> Self {
        FieldValue::Time(Local::now())
    }

    /// Wraps any serializable value.
    ///
    /// # Errors
    /// Returns an error if `value` fails to serialize.
    pub fn json<T: serde::Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(FieldValue::Json)
    }

    /// Short name of the variant, used in snapshots and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::UInt(_) => "uint",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Time(_) => "time",
            FieldValue::Duration(_) => "duration",
            FieldValue::Json(_) => "json",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Local>> {
        match self {
            FieldValue::Time(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            FieldValue::Duration(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FieldValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view across the three number kinds.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::UInt(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Converts the value into JSON for snapshots.
    ///
    /// Times become RFC 3339 strings and durations fractional seconds.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(v) => json!(v),
            FieldValue::Int(v) => json!(v),
            FieldValue::UInt(v) => json!(v),
            FieldValue::Float(v) => json!(v),
            FieldValue::Text(v) => json!(v),
            FieldValue::Time(v) => json!(v.to_rfc3339()),
            FieldValue::Duration(v) => json!(v.as_secs_f64()),
            FieldValue::Json(v) => v.clone(),
        }
    }
}

/// Formats a duration the way a progress line wants it: `1h2m3s`, `45s`,
/// or `350ms` below one second.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v:.2}"),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Time(v) => write!(f, "{}", v.format(TIME_FORMAT)),
            FieldValue::Duration(v) => f.write_str(&format_duration(*v)),
            FieldValue::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::UInt(u64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::UInt(v as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<DateTime<Local>> for FieldValue {
    fn from(v: DateTime<Local>) -> Self {
        FieldValue::Time(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Time(v.with_timezone(&Local))
    }
}

impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self {
        FieldValue::Duration(v)
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Json(v)
    }
}
