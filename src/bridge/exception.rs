//! Exception translator
//!
//! Turns the guest's pending exception into host-displayable text. The guest
//! formats its own traceback; the bridge reorders it newest-first and drops
//! the banner line, since the host prints its own call context around it.
//! A failure while formatting is never propagated: the text is replaced by a
//! fixed sentinel naming the step that failed.

use tracing::{debug, warn};

use crate::runtime::{GuestRuntime, RawException};

/// Normalizing the pending exception raised
pub const NORMALIZE_FAILED: &str = "[TB01] could not normalize the pending exception";
/// The guest traceback formatter could not be loaded
pub const FORMATTER_UNAVAILABLE: &str = "[TB02] traceback formatter unavailable";
/// The guest traceback formatter raised
pub const FORMATTER_RAISED: &str = "[TB03] traceback formatter raised";
/// The formatter returned something other than a sequence
pub const FORMAT_NOT_SEQUENCE: &str = "[TB04] formatted traceback is not a sequence";
/// A formatted frame was not text
pub const FRAME_NOT_TEXT: &str = "[TB05] formatted traceback frame is not text";

/// A captured guest exception
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRecord {
    /// Exception type name
    pub kind: String,
    /// Displayable payload
    pub value: String,
    /// Formatted frames, newest first, banner removed
    pub frames: Vec<String>,
    /// Final error text: the joined frames, or a sentinel
    pub formatted: String,
}

/// Capture and format the pending guest exception.
///
/// Returns `None` when nothing is pending. The guest error state is clear
/// when this returns, whatever happened while formatting.
pub fn capture<G: GuestRuntime>(guest: &G) -> Option<ExceptionRecord> {
    let mut exc = guest.take_exception()?;
    let normalized = guest.normalize_exception(&mut exc).is_ok();
    guest.clear_exception();

    let kind = type_label(guest, &exc);
    let value = guest.display(&exc.value).unwrap_or_default();
    guest.clear_exception();

    let frames = if normalized {
        format_frames(guest, &exc)
    } else {
        Err(NORMALIZE_FAILED)
    };
    guest.clear_exception();

    let record = match frames {
        Ok(frames) => ExceptionRecord {
            formatted: frames.concat(),
            kind,
            value,
            frames,
        },
        Err(sentinel) => {
            warn!(sentinel, "guest traceback formatting failed");
            ExceptionRecord {
                kind,
                value,
                frames: Vec::new(),
                formatted: sentinel.to_string(),
            }
        }
    };
    debug!(kind = %record.kind, "captured guest exception");
    Some(record)
}

/// The formatted text of the pending guest exception, if any
pub fn capture_and_format<G: GuestRuntime>(guest: &G) -> Option<String> {
    capture(guest).map(|record| record.formatted)
}

fn type_label<G: GuestRuntime>(
    guest: &G,
    exc: &RawException<G::Value>,
) -> String {
    guest
        .get_attr(&exc.kind, "__name__")
        .ok()
        .and_then(|name| guest.as_text(&name))
        .unwrap_or_else(|| guest.type_name(&exc.kind))
}

fn format_frames<G: GuestRuntime>(
    guest: &G,
    exc: &RawException<G::Value>,
) -> Result<Vec<String>, &'static str> {
    let module = guest
        .traceback_formatter()
        .map_err(|_| FORMATTER_UNAVAILABLE)?;
    let (function, args) = match &exc.traceback {
        Some(tb) => (
            "format_exception",
            vec![exc.kind.clone(), exc.value.clone(), tb.clone()],
        ),
        None => (
            "format_exception_only",
            vec![exc.kind.clone(), exc.value.clone()],
        ),
    };
    let formatter = guest
        .get_attr(&module, function)
        .map_err(|_| FORMATTER_UNAVAILABLE)?;
    let output = guest.call(&formatter, args).map_err(|_| FORMATTER_RAISED)?;
    let items = guest
        .sequence_items(&output)
        .ok()
        .flatten()
        .ok_or(FORMAT_NOT_SEQUENCE)?;
    let mut frames = items
        .iter()
        .map(|item| guest.as_text(item).ok_or(FRAME_NOT_TEXT))
        .collect::<Result<Vec<_>, _>>()?;
    frames.reverse();
    if frames.len() > 1 {
        // the banner is the oldest line, now last
        frames.pop();
    }
    Ok(frames)
}
