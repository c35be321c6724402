//! The capture resampler (§4.2): converts device-rate frames to the
//! user-requested rate and appends them to the ring buffer, timestamping
//! the stream on (re)start.

use super::resample::BoxFilterResampler;
use crate::state::SharedState;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("unsupported input sample format: {0:?}")]
    UnsupportedFormat(SampleFormat),
}

/// Owns the per-stream resampler state. Lives entirely on the realtime
/// callback thread; `cpal` guarantees a single calling thread per stream, so
/// no synchronization is needed here beyond what `SharedState` already
/// provides for cross-thread publication.
struct CaptureResampler {
    resampler: BoxFilterResampler,
    r_out: u32,
    scratch: Vec<i16>,
}

impl CaptureResampler {
    fn new(r_in: u32, r_out: u32) -> Self {
        Self {
            resampler: BoxFilterResampler::new(r_in, r_out),
            r_out,
            scratch: Vec::with_capacity(4096),
        }
    }

    /// Processes one block of mono input samples, appending emitted output
    /// to the ring buffer and updating the shared stream clock. Implements
    /// the restart-detection/timestamping sequence from §4.2.
    fn process_block(&mut self, input: &[f32], state: &SharedState) {
        let restarting = !state.is_started();
        let start_time_ms = if restarting {
            let t = crate::time::now_ms_utc();
            self.resampler.reset();
            t
        } else {
            0
        };

        self.scratch.clear();
        for &s in input {
            let scaled = s as f64 * i16::MAX as f64;
            self.resampler.push_sample(scaled, |x| x, &mut self.scratch);
        }
        let increment = self.scratch.len() as i64;

        state.ring.append(&self.scratch);

        {
            let mut clock = state.clock.lock();
            if restarting {
                clock.start_time_ms_utc = start_time_ms;
                clock.start_sample_count = clock.current_sample_count;
            }
            clock.current_sample_count += increment;
        }

        if restarting {
            // Set only after the buffer lock is released, so a concurrent
            // reader of `started` never observes it true mid-publication.
            state.set_started(true);
        }
    }

    #[cfg(test)]
    fn r_out(&self) -> u32 {
        self.r_out
    }
}

/// Builds and starts an input stream at `r_in` (the device's native rate),
/// producing `r_out = min(requested, r_in)` into `state`'s ring buffer.
pub fn start_capture_stream(
    device: &cpal::Device,
    r_in: u32,
    r_out: u32,
    channels: u16,
    state: Arc<SharedState>,
) -> Result<cpal::Stream, CaptureError> {
    let config = StreamConfig {
        channels,
        sample_rate: r_in,
        buffer_size: cpal::BufferSize::Default,
    };

    let mut resampler = CaptureResampler::new(r_in, r_out);
    let channels = channels as usize;

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if channels <= 1 {
                resampler.process_block(data, &state);
            } else {
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                    .collect();
                resampler.process_block(&mono, &state);
            }
        },
        |err| {
            tracing::error!("capture stream error: {}", err);
        },
        None,
    )?;

    stream.play()?;
    tracing::info!("capture stream started: {} Hz in -> {} Hz out", r_in, r_out);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_block_captures_start_timestamp_and_marks_started() {
        let state = SharedState::new();
        let mut resampler = CaptureResampler::new(48_000, 48_000);
        assert!(!state.is_started());

        let input = vec![0.0f32; 480];
        resampler.process_block(&input, &state);

        assert!(state.is_started());
        let clock = state.clock.lock();
        assert!(clock.start_time_ms_utc > 0);
        assert_eq!(clock.start_sample_count, 0);
    }

    #[test]
    fn current_sample_count_is_monotonically_non_decreasing() {
        let state = SharedState::new();
        let mut resampler = CaptureResampler::new(48_000, 48_000);

        let mut previous = 0i64;
        for _ in 0..20 {
            let input = vec![0.1f32; 480];
            resampler.process_block(&input, &state);
            let current = state.clock.lock().current_sample_count;
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn write_index_advances_by_exactly_what_was_emitted() {
        let state = SharedState::new();
        let mut resampler = CaptureResampler::new(48_000, 48_000);

        let before = state.ring.snapshot_write_index();
        let input = vec![0.2f32; 480];
        resampler.process_block(&input, &state);
        let after = state.ring.snapshot_write_index();

        let emitted = (after as i64 - before as i64).rem_euclid(state.ring.capacity() as i64);
        let current = state.clock.lock().current_sample_count;
        assert_eq!(emitted, current);
    }

    #[test]
    fn identity_rate_resampler_reports_r_out() {
        let resampler = CaptureResampler::new(48_000, 48_000);
        assert_eq!(resampler.r_out(), 48_000);
    }
}
