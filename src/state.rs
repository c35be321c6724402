//! The process-lifetime shared state singleton.
//!
//! Global mutable state is legitimate here (§9): the realtime callback
//! threads are owned by the audio backend and cannot carry user context, so
//! everything they touch across thread boundaries lives behind one of the
//! five locks below. Unlike the Tauri command handlers this crate's audio
//! code was adapted from, there is exactly one controller thread that
//! constructs this struct, so it is built once in `main` and shared via
//! `Arc` rather than a lazily-initialized global.

use crate::audio::device::EnumerationResult;
use crate::audio::ring_buffer::{RingBuffer, StreamClock};
use parking_lot::Mutex;

/// Guards `started`/`stopped` notification flags (`stop_start_mutex`).
#[derive(Debug, Default)]
pub struct StopStartFlags {
    pub started: bool,
    pub stopped: bool,
}

/// Findings published by the device supervisor (`background_mutex`).
#[derive(Debug, Clone, Default)]
pub struct SupervisorFindings {
    pub result: EnumerationResult,
    pub last_check_time_s: i64,
}

pub struct SharedState {
    pub ring: RingBuffer,
    /// `audio_buffer_mutex`: guards `current_sample_count` and the stream
    /// start timestamp/sample-count pair. `write_index` is published
    /// separately, lock-free, through the ring buffer's atomic (§5).
    pub clock: Mutex<StreamClock>,
    /// `stop_start_mutex`.
    pub stop_start: Mutex<StopStartFlags>,
    /// `background_mutex`.
    pub supervisor: Mutex<SupervisorFindings>,
    /// `device_check_mutex`: serializes enumeration with capture device
    /// init/uninit.
    pub device_check: Mutex<()>,
    /// `autosave_mutex`: guards `shutdown_completed`.
    pub shutdown_completed: Mutex<bool>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
            clock: Mutex::new(StreamClock::default()),
            stop_start: Mutex::new(StopStartFlags::default()),
            supervisor: Mutex::new(SupervisorFindings::default()),
            device_check: Mutex::new(()),
            shutdown_completed: Mutex::new(false),
        }
    }

    pub fn is_started(&self) -> bool {
        self.stop_start.lock().started
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_start.lock().stopped
    }

    pub fn set_started(&self, value: bool) {
        self.stop_start.lock().started = value;
    }

    pub fn set_stopped(&self, value: bool) {
        self.stop_start.lock().stopped = value;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_stopped_flags_round_trip() {
        let state = SharedState::new();
        assert!(!state.is_started());
        state.set_started(true);
        assert!(state.is_started());
        state.set_stopped(true);
        assert!(state.is_stopped());
    }
}
