//! UTC clock, broken-down time, and local offset primitives.
//!
//! Kept as a narrow, directly-testable module rather than scattering
//! `chrono` calls through the rest of the crate.

use chrono::{Datelike, TimeZone, Timelike, Utc};

/// Integer division that rounds to nearest rather than truncating, matching
/// `ROUNDED_DIV(a, b) = (a + b/2) / b` from the reference implementation.
pub fn rounded_div(a: i64, b: i64) -> i64 {
    if b == 0 {
        return 0;
    }
    if (a >= 0) == (b >= 0) {
        (a + b / 2) / b
    } else {
        (a - b / 2) / b
    }
}

pub fn now_ms_utc() -> i64 {
    Utc::now().timestamp_millis()
}

/// Microseconds-of-day component of the current wall clock, used by the
/// background worker to align its sleep to a quarter-second boundary.
pub fn now_microseconds() -> u64 {
    let now = Utc::now();
    now.timestamp_subsec_micros() as u64 + now.timestamp() as u64 * 1_000_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GmBrokenDown {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub min: u32,
    pub sec: u32,
}

/// UTC broken-down time for an epoch-seconds value (no timezone lookup: the
/// caller is responsible for adding a local offset first if it wants local
/// fields, matching the reference implementation's `gmTime`-on-adjusted-epoch
/// approach rather than consulting the OS timezone database).
pub fn gm_time(epoch_s: i64) -> GmBrokenDown {
    let dt = Utc.timestamp_opt(epoch_s, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    GmBrokenDown {
        year: dt.year(),
        month: dt.month(),
        day: dt.day(),
        hour: dt.hour(),
        min: dt.minute(),
        sec: dt.second(),
    }
}

/// Seconds east of UTC for the system's local timezone, as of now. A
/// process-wide `UTC` flag forces this to `0` rather than calling through
/// here (see `cli::Settings::use_utc`).
pub fn local_time_offset_seconds() -> i32 {
    chrono::Local::now().offset().local_minus_utc()
}

/// Formats `"HH:MM:SS to HH:MM:SS (UTC±H[:MM])"`, the stable per-file log
/// line emitted after every autosave write or append. The printed clock is
/// local time (`epoch + offset_seconds`), matching the `(UTC±H[:MM])` label
/// that follows it.
pub fn format_file_time_range(start_epoch_s: i64, stop_epoch_s: i64, offset_seconds: i32) -> String {
    let local = offset_seconds as i64;
    let start = gm_time(start_epoch_s + local);
    let stop = gm_time(stop_epoch_s + local);
    format!(
        "{:02}:{:02}:{:02} to {:02}:{:02}:{:02} ({})",
        start.hour, start.min, start.sec, stop.hour, stop.min, stop.sec,
        format_utc_offset(offset_seconds),
    )
}

/// Renders `offset_seconds` as `"UTC±H"` or `"UTC±H:MM"`. Zero-hour,
/// non-zero-minute offsets take their sign from the minutes component (the
/// reference implementation special-cases `"+0"`/`"-0"` this way rather than
/// always showing a plus sign for a zero hour).
fn format_utc_offset(offset_seconds: i32) -> String {
    let total_minutes = offset_seconds / 60;
    let hours = total_minutes / 60;
    let minutes = (total_minutes % 60).abs();

    let sign = if hours != 0 {
        if hours > 0 { '+' } else { '-' }
    } else if minutes != 0 {
        if total_minutes > 0 { '+' } else { '-' }
    } else {
        '+'
    };

    if minutes == 0 {
        format!("UTC{sign}{}", hours.abs())
    } else {
        format!("UTC{sign}{}:{:02}", hours.abs(), minutes)
    }
}
