//! The autosave writer (§4.5): a non-realtime background worker that turns
//! autosave lifecycle events plus the ring buffer's write frontier into
//! minute-aligned WAV files, appending across consecutive minutes when the
//! previous file ended at a point this crate's continuity rule recognizes.

use crate::audio::ring_buffer::RingBuffer;
use crate::audio::supervisor;
use crate::audio::wav::{self, WavError};
use crate::constants::{DEVICE_CHECK_INTERVAL_MICROS, RING_BUFFER_CAPACITY};
use crate::events::{AutosaveEvent, AutosaveEventKind, AutosaveEventReceiver};
use crate::state::SharedState;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const N: i64 = RING_BUFFER_CAPACITY as i64;

/// No minute transition pending.
const NO_TARGET: i64 = i64::MAX;

/// `(file_start_time_s, file_start_index, file_start_count, file_sample_rate,
/// input_device_comment_name, target_count)` plus the append-continuity
/// bookkeeping from the previously written file.
pub struct AutosaveWriter {
    destination: PathBuf,
    autosave_duration_minutes: u32,
    use_utc: bool,

    waiting_for_start: bool,
    file_start_time_s: i64,
    file_start_index: u32,
    file_start_count: i64,
    file_sample_rate: u32,
    input_device_comment_name: String,
    target_count: i64,

    previous_path: Option<PathBuf>,
    previous_stop_time_s: Option<i64>,
    previous_local_offset_s: Option<i32>,
}

impl AutosaveWriter {
    pub fn new(destination: PathBuf, autosave_duration_minutes: u32, use_utc: bool) -> Self {
        Self {
            destination,
            autosave_duration_minutes,
            use_utc,
            waiting_for_start: true,
            file_start_time_s: 0,
            file_start_index: 0,
            file_start_count: 0,
            file_sample_rate: 0,
            input_device_comment_name: String::new(),
            target_count: NO_TARGET,
            previous_path: None,
            previous_stop_time_s: None,
            previous_local_offset_s: None,
        }
    }

    fn local_offset(&self) -> i32 {
        if self.use_utc {
            0
        } else {
            crate::time::local_time_offset_seconds()
        }
    }

    /// §4.5.1: given the millisecond remainder of a file's true start time,
    /// advances the cursor to the next whole second and computes
    /// `target_count` for the following wall-clock minute boundary.
    fn update_for_ms_offset(&mut self, ms: i64) {
        if ms > 0 {
            let sample_offset = crate::time::rounded_div(self.file_sample_rate as i64 * (1000 - ms), 1000);
            self.file_start_count += sample_offset;
            self.file_start_index = ((self.file_start_index as i64 + sample_offset).rem_euclid(N)) as u32;
            self.file_start_time_s += 1;
        }
        let bd = crate::time::gm_time(self.file_start_time_s);
        self.target_count = self.file_start_count + (60 - bd.sec as i64) * self.file_sample_rate as i64;
    }

    fn handle_start(&mut self, event: &AutosaveEvent) {
        if !self.waiting_for_start {
            return;
        }
        self.file_sample_rate = event.sample_rate;
        self.input_device_comment_name = event.input_device_comment_name.clone();

        let elapsed_ms = crate::time::rounded_div(
            1000 * (event.current_count - event.start_count),
            self.file_sample_rate.max(1) as i64,
        );
        let effective_start_ms = event.start_time_ms + elapsed_ms;
        self.file_start_time_s = effective_start_ms.div_euclid(1000);
        let ms = effective_start_ms.rem_euclid(1000);

        self.file_start_count = event.current_count;
        self.file_start_index = event.current_index;
        self.update_for_ms_offset(ms);
        self.waiting_for_start = false;
    }

    fn handle_restart(&mut self, ring: &RingBuffer, event: &AutosaveEvent) {
        self.flush(ring, event.start_count);

        self.file_sample_rate = event.sample_rate;
        self.input_device_comment_name = event.input_device_comment_name.clone();
        self.file_start_time_s = event.start_time_ms.div_euclid(1000);
        let ms = event.start_time_ms.rem_euclid(1000);
        self.file_start_count = event.start_count;

        let delta = event.current_count - event.start_count;
        self.file_start_index = ((event.current_index as i64 - delta).rem_euclid(N)) as u32;
        self.update_for_ms_offset(ms);
    }

    fn handle_stop(&mut self, ring: &RingBuffer, event: &AutosaveEvent) {
        self.flush(ring, event.current_count);
        self.waiting_for_start = true;
        self.target_count = NO_TARGET;
    }

    fn handle_shutdown(&mut self, state: &SharedState, event: &AutosaveEvent) {
        if !self.waiting_for_start {
            // A failure here is logged but must not fail the shutdown
            // sequence; the flush has already run (or is running) and the
            // process does not wait indefinitely for a stuck disk.
            self.flush(&state.ring, event.current_count);
        }
        *state.shutdown_completed.lock() = true;
        self.waiting_for_start = true;
        self.target_count = NO_TARGET;
    }

    /// Flushes `[file_start_count, stop_count)` and advances the append
    /// bookkeeping.
    fn flush(&mut self, ring: &RingBuffer, stop_count: i64) {
        let count = (stop_count - self.file_start_count).max(0) as u32;
        if count == 0 || self.file_sample_rate == 0 {
            return;
        }
        let duration_s = crate::time::rounded_div(count as i64, self.file_sample_rate as i64);
        let stop_time_s = self.file_start_time_s + duration_s;
        self.write_range(ring, count, stop_time_s);
    }

    /// §4.5.2: emits one minute-aligned file and rolls the cursor forward to
    /// the next minute boundary.
    fn make_minute_transition_recording(&mut self, ring: &RingBuffer) {
        let duration_s = (self.target_count - self.file_start_count) / self.file_sample_rate.max(1) as i64;
        let count = (duration_s * self.file_sample_rate as i64) as u32;
        let stop_time_s = self.file_start_time_s + duration_s;

        self.write_range(ring, count, stop_time_s);

        self.file_start_time_s += duration_s;
        self.file_start_index = ((self.file_start_index as i64 + count as i64).rem_euclid(N)) as u32;
        self.file_start_count = self.target_count;
        self.target_count += 60 * self.file_sample_rate as i64;
    }

    /// §4.5.3's literal, intentionally-asymmetric appending condition: the
    /// previous file must have ended exactly at a `:00` second that is
    /// *not* itself an autosave-period boundary.
    fn append_eligible(&self, new_start_s: i64, new_offset: i32) -> bool {
        let (Some(prev_stop), Some(prev_offset)) = (self.previous_stop_time_s, self.previous_local_offset_s) else {
            return false;
        };
        if prev_offset != new_offset || new_start_s != prev_stop {
            return false;
        }
        let bd = crate::time::gm_time(prev_stop);
        bd.sec == 0 && (bd.min % self.autosave_duration_minutes.max(1)) > 0
    }

    fn write_range(&mut self, ring: &RingBuffer, count: u32, stop_time_s: i64) {
        let (range_a, range_b) = ring.slice(self.file_start_index, count);
        let offset = self.local_offset();

        if self.append_eligible(self.file_start_time_s, offset) {
            if let Some(path) = self.previous_path.clone() {
                match wav::append_file(&path, &range_a, &range_b) {
                    Ok(()) => {
                        crate::console::autosave(&format!(
                            "Appended to {}: {}",
                            path.display(),
                            crate::time::format_file_time_range(self.file_start_time_s, stop_time_s, offset)
                        ));
                        self.previous_stop_time_s = Some(stop_time_s);
                        self.previous_local_offset_s = Some(offset);
                        return;
                    }
                    Err(err) => {
                        tracing::warn!("append failed, falling back to a fresh file: {}", err);
                    }
                }
            }
        }

        if let Err(err) = self.write_fresh_file(&range_a, &range_b, offset, stop_time_s) {
            crate::console::error(&format!("Could not write WAV file: {err}"));
            self.previous_path = None;
            self.previous_stop_time_s = None;
            self.previous_local_offset_s = None;
            return;
        }

        self.previous_stop_time_s = Some(stop_time_s);
        self.previous_local_offset_s = Some(offset);
    }

    fn write_fresh_file(
        &mut self,
        range_a: &[i16],
        range_b: &[i16],
        offset: i32,
        stop_time_s: i64,
    ) -> Result<(), WavError> {
        let filename = wav::filename_for(self.file_start_time_s, offset);
        let comment = wav::comment_for(self.file_start_time_s, offset, &self.input_device_comment_name);
        let path = self.destination.join(&filename);
        wav::write_file(&path, self.file_sample_rate, &comment, range_a, range_b)?;

        crate::console::autosave(&format!(
            "Wrote {}: {}",
            path.display(),
            crate::time::format_file_time_range(self.file_start_time_s, stop_time_s, offset)
        ));
        self.previous_path = Some(path);
        Ok(())
    }

    /// Drains `events` in order, applying §4.5 step 3, then performs the
    /// final post-drain minute-transition check from step 4.
    fn process_events(&mut self, state: &SharedState, events: Vec<AutosaveEvent>, current_sample_count: i64) {
        for event in events {
            if current_sample_count >= self.target_count && self.target_count < event.current_count {
                self.make_minute_transition_recording(&state.ring);
            }
            match event.kind {
                AutosaveEventKind::Start => self.handle_start(&event),
                AutosaveEventKind::Restart => self.handle_restart(&state.ring, &event),
                AutosaveEventKind::Stop => self.handle_stop(&state.ring, &event),
                AutosaveEventKind::Shutdown => self.handle_shutdown(state, &event),
            }
        }
        if current_sample_count >= self.target_count {
            self.make_minute_transition_recording(&state.ring);
        }
    }
}

/// Sleeps until the next quarter-second wall-clock boundary, always less
/// than `DEVICE_CHECK_INTERVAL_MICROS`.
fn sleep_to_next_boundary() {
    let now_us = crate::time::now_microseconds();
    let remainder = now_us % DEVICE_CHECK_INTERVAL_MICROS;
    let sleep_us = DEVICE_CHECK_INTERVAL_MICROS - remainder;
    std::thread::sleep(Duration::from_micros(sleep_us));
}

/// Runs the background worker loop (§4.5) until `keep_running` is cleared.
/// Intended to be the body of a dedicated non-realtime thread.
pub fn run(
    state: Arc<SharedState>,
    receiver: AutosaveEventReceiver,
    mut writer: AutosaveWriter,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::Relaxed) {
        let now_s = crate::time::now_ms_utc() / 1000;
        if let Err(err) = supervisor::poll_once(&state, now_s) {
            tracing::warn!("device enumeration failed: {}", err);
        }

        let current_sample_count = state.clock.lock().current_sample_count;
        let events = receiver.drain();
        writer.process_events(&state, events, current_sample_count);

        sleep_to_next_boundary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AutosaveEventKind;

    fn sample_event(kind: AutosaveEventKind, current_count: i64) -> AutosaveEvent {
        AutosaveEvent {
            kind,
            sample_rate: 48_000,
            current_count,
            current_index: (current_count.rem_euclid(N)) as u32,
            start_time_ms: 1_704_067_200_000,
            start_count: 0,
            input_device_comment_name: "the 48kHz default input".into(),
        }
    }

    #[test]
    fn start_event_is_ignored_unless_waiting() {
        let mut writer = AutosaveWriter::new(PathBuf::from("."), 1, true);
        writer.waiting_for_start = false;
        let before = writer.file_start_count;
        writer.handle_start(&sample_event(AutosaveEventKind::Start, 1000));
        assert_eq!(writer.file_start_count, before);
    }

    #[test]
    fn start_event_seeds_cursor_and_clears_waiting() {
        let mut writer = AutosaveWriter::new(PathBuf::from("."), 1, true);
        let event = sample_event(AutosaveEventKind::Start, 0);
        writer.handle_start(&event);

        assert!(!writer.waiting_for_start);
        assert_eq!(writer.file_sample_rate, 48_000);
        assert!(writer.target_count > writer.file_start_count);
    }

    #[test]
    fn target_count_is_a_multiple_of_sample_rate_above_start() {
        let mut writer = AutosaveWriter::new(PathBuf::from("."), 1, true);
        writer.file_sample_rate = 48_000;
        writer.file_start_count = 0;
        writer.file_start_time_s = 1_704_067_230; // 30s into the minute
        writer.update_for_ms_offset(0);

        let delta = writer.target_count - writer.file_start_count;
        assert!(delta > 0);
        assert_eq!(delta % 48_000, 0);
        assert!(delta <= 60 * 48_000);
    }

    #[test]
    fn minute_transition_advances_cursor_by_exactly_one_period() {
        let ring = RingBuffer::new();
        let mut writer = AutosaveWriter::new(PathBuf::from("/nonexistent"), 1, true);
        writer.file_sample_rate = 48_000;
        writer.file_start_time_s = 1_704_067_200;
        writer.file_start_count = 0;
        writer.file_start_index = 0;
        writer.target_count = 60 * 48_000;

        writer.make_minute_transition_recording(&ring);

        assert_eq!(writer.file_start_time_s, 1_704_067_260);
        assert_eq!(writer.file_start_count, 60 * 48_000);
        assert_eq!(writer.target_count, 120 * 48_000);
    }

    #[test]
    fn append_eligible_requires_exact_literal_clause() {
        let mut writer = AutosaveWriter::new(PathBuf::from("."), 5, true);
        writer.previous_stop_time_s = Some(1_704_067_260); // :00 of minute 1
        writer.previous_local_offset_s = Some(0);
        // minute 1 % autosave_duration(5) == 1 > 0, sec == 0: eligible.
        assert!(writer.append_eligible(1_704_067_260, 0));

        writer.previous_stop_time_s = Some(1_704_067_200); // minute 0, :00, 0 % 5 == 0
        assert!(!writer.append_eligible(1_704_067_200, 0));

        // A non-hour-aligned offset (UTC+5:30) must not shift the bookkeeping
        // check: eligibility is decided on bare UTC `prev_stop`, the local
        // offset is only used for the filename/comment layer.
        let half_hour = 5 * 3600 + 30 * 60;
        writer.previous_stop_time_s = Some(1_704_067_260); // still :00 of UTC minute 1
        writer.previous_local_offset_s = Some(half_hour);
        assert!(writer.append_eligible(1_704_067_260, half_hour));
    }

    #[test]
    fn draining_no_events_leaves_cursor_untouched() {
        let state = SharedState::new();
        let mut writer = AutosaveWriter::new(PathBuf::from("."), 1, true);
        let before = writer.file_start_count;
        writer.process_events(&state, Vec::new(), 0);
        assert_eq!(writer.file_start_count, before);
    }
}
