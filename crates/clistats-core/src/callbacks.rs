//! Ready-made dynamic field callbacks.
//!
//! Both read a `FieldValue::Time` static holding the moment work started,
//! usually registered with `FieldValue::now()`.

use std::time::Duration;

use chrono::Local;

use crate::registry::StatsView;
use crate::value::FieldValue;

fn since_start(view: &StatsView<'_>, start_field: &str) -> Option<Duration> {
    let started = view.get_static(start_field)?.as_time()?;
    (Local::now() - started).to_std().ok()
}

/// Counter rate since start, as `FieldValue::Float`.
///
/// Yields `0.0` until any time has elapsed or when either field is missing.
pub fn requests_per_second(
    start_field: impl Into<String>,
    counter_id: impl Into<String>,
) -> impl Fn(&StatsView<'_>) -> FieldValue + Send + Sync + 'static {
    let (start_field, counter_id) = (start_field.into(), counter_id.into());
    move |view: &StatsView<'_>| {
        let requests = view.get_counter(&counter_id).unwrap_or(0);
        let rate = since_start(view, &start_field)
            .map(|elapsed| elapsed.as_secs_f64())
            .filter(|secs| *secs > 0.0)
            .map_or(0.0, |secs| requests as f64 / secs);
        FieldValue::Float(rate)
    }
}

/// Time since start, as `FieldValue::Duration`. Zero if the field is missing.
pub fn elapsed(
    start_field: impl Into<String>,
) -> impl Fn(&StatsView<'_>) -> FieldValue + Send + Sync + 'static {
    let start_field = start_field.into();
    move |view: &StatsView<'_>| {
        FieldValue::Duration(since_start(view, &start_field).unwrap_or_default())
    }
}
