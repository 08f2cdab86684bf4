//! Frame formatting for the demo display.

use std::io::{self, Write};

use clistats_core::{FieldValue, StatsView};
use crossterm::queue;
use crossterm::style::Print;
use tracing::warn;

use crate::workload::{ELAPSED, ERRORS, PROGRESS, REQUESTS, RPS, TOTAL};

/// How each frame is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// One human-readable status line
    Line,
    /// One JSON snapshot per line
    Json,
}

fn dynamic(view: &StatsView<'_>, id: &str) -> String {
    view.evaluate_dynamic(id)
        .map(|value| value.to_string())
        .unwrap_or_default()
}

/// Builds the status line, e.g.
/// `[12s] Requests: [40/100] (40.00%) Errors: 3 RPS: 3.33`.
pub fn format_line(view: &StatsView<'_>) -> String {
    let requests = view.get_counter(REQUESTS).unwrap_or(0);
    let errors = view.get_counter(ERRORS).unwrap_or(0);
    let total = view
        .get_static(TOTAL)
        .as_ref()
        .and_then(FieldValue::as_u64)
        .unwrap_or(0);
    format!(
        "[{}] Requests: [{requests}/{total}] ({}%) Errors: {errors} RPS: {}",
        dynamic(view, ELAPSED),
        dynamic(view, PROGRESS),
        dynamic(view, RPS),
    )
}

pub fn format_frame(view: &StatsView<'_>, format: FrameFormat) -> String {
    match format {
        FrameFormat::Line => format_line(view),
        FrameFormat::Json => view.snapshot().to_json().to_string(),
    }
}

/// Writes one frame. Lines end in `\r\n` so output stays aligned when the
/// terminal is in raw mode.
fn write_frame(out: &mut impl Write, frame: &str) -> io::Result<()> {
    queue!(out, Print(frame), Print("\r\n"))?;
    out.flush()
}

/// Render callback for `Statistics::start`.
pub fn printer(format: FrameFormat) -> impl FnMut(&StatsView<'_>) + Send + 'static {
    move |view: &StatsView<'_>| {
        let frame = format_frame(view, format);
        if let Err(err) = write_frame(&mut io::stdout().lock(), &frame) {
            warn!(%err, "failed to print statistics frame");
        }
    }
}

/// Prints the final frame after the loop has stopped.
pub fn print_summary(view: &StatsView<'_>, format: FrameFormat) -> io::Result<()> {
    write_frame(&mut io::stdout().lock(), &format_frame(view, format))
}
