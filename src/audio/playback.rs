//! The playback resampler and heterodyne demodulator (§4.3): reads from the
//! ring buffer at the capture rate and resamples up to the fixed playback
//! rate, applying the lag policy that keeps the reader from falling behind
//! (or racing ahead of) the capture producer.

use super::heterodyne::Heterodyne;
use super::resample::BoxFilterResampler;
use crate::constants::{
    CALLBACKS_PER_SECOND, MAX_LAG_CALLBACKS, MAX_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE, TARGET_LAG_CALLBACKS,
};
use crate::state::SharedState;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

pub struct PlaybackResampler {
    read_index: u32,
    waiting: bool,
    resampler: BoxFilterResampler,
    heterodyne: Option<Heterodyne>,
    pending: VecDeque<i16>,
    scratch: Vec<i16>,
}

impl PlaybackResampler {
    pub fn new(r_out: u32, heterodyne: Option<Heterodyne>) -> Self {
        // §4.3 fixes the playback divider at MAX_SAMPLE_RATE/PLAYBACK_SAMPLE_RATE
        // regardless of the requested capture rate, not `ceil(r_out/PLAYBACK_SAMPLE_RATE)`
        // as the generic §4.2 formula would give (which collapses to divider=1,
        // step=1.0 — no averaging at all — for the common r_out=48000 case).
        let divider = MAX_SAMPLE_RATE / PLAYBACK_SAMPLE_RATE;
        let step = r_out as f64 / MAX_SAMPLE_RATE as f64;
        Self {
            read_index: 0,
            waiting: true,
            resampler: BoxFilterResampler::with_divider_and_step(divider, step),
            heterodyne,
            pending: VecDeque::new(),
            scratch: Vec::with_capacity(64),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Fills `out` (f32, `[-1.0, 1.0]`) per the §4.3 lag policy.
    pub fn fill(&mut self, out: &mut [f32], state: &SharedState, r_out: u32) {
        let capacity = state.ring.capacity() as u32;
        let write_index = state.ring.snapshot_write_index();
        let sample_lag = (capacity + write_index - self.read_index) % capacity;
        let buffer_lag = sample_lag as f64 * CALLBACKS_PER_SECOND as f64 / r_out as f64;

        if buffer_lag > MAX_LAG_CALLBACKS {
            self.read_index = write_index;
            self.waiting = true;
        }

        let starvation = (sample_lag as usize) < out.len();
        if self.waiting || starvation {
            out.fill(0.0);
        } else {
            if let Some(h) = self.heterodyne.as_mut() {
                h.normalise();
            }

            let Self {
                resampler,
                heterodyne,
                scratch,
                pending,
                read_index,
                ..
            } = self;

            while pending.len() < out.len() {
                let (a, _) = state.ring.slice(*read_index, 1);
                let sample = a[0] as f64;
                *read_index = (*read_index + 1) % capacity;

                scratch.clear();
                resampler.push_sample(
                    sample,
                    |x| heterodyne.as_mut().map(|h| h.next_output(x)).unwrap_or(x),
                    scratch,
                );
                pending.extend(scratch.iter().copied());
            }

            for slot in out.iter_mut() {
                let sample = pending.pop_front().unwrap_or(0);
                *slot = sample as f32 / i16::MAX as f32;
            }
        }

        if buffer_lag > TARGET_LAG_CALLBACKS {
            self.waiting = false;
        }
    }
}

/// Builds and starts an output stream at `PLAYBACK_SAMPLE_RATE`, consuming
/// from `state`'s ring buffer via `resampler`.
pub fn start_playback_stream(
    device: &cpal::Device,
    r_out: u32,
    channels: u16,
    state: Arc<SharedState>,
    mut resampler: PlaybackResampler,
) -> Result<cpal::Stream, PlaybackError> {
    let config = StreamConfig {
        channels,
        sample_rate: PLAYBACK_SAMPLE_RATE,
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = channels as usize;
    let mut mono_scratch = Vec::new();

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if channels <= 1 {
                resampler.fill(data, &state, r_out);
            } else {
                let frames = data.len() / channels;
                mono_scratch.resize(frames, 0.0);
                resampler.fill(&mut mono_scratch, &state, r_out);
                for (frame, &sample) in data.chunks_mut(channels).zip(mono_scratch.iter()) {
                    frame.fill(sample);
                }
            }
        },
        |err| {
            tracing::error!("playback stream error: {}", err);
        },
        None,
    )?;

    stream.play()?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starvation_emits_silence_without_consuming_ring() {
        let state = SharedState::new();
        let mut playback = PlaybackResampler::new(48_000, None);
        let mut out = vec![1.0f32; 480];
        playback.fill(&mut out, &state, 48_000);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn waiting_clears_once_lag_drops_below_target() {
        let state = SharedState::new();
        let samples = vec![100i16; state.ring.capacity()];
        state.ring.append(&samples);

        let mut playback = PlaybackResampler::new(48_000, None);
        assert!(playback.is_waiting());

        let mut out = vec![0.0f32; 480];
        playback.fill(&mut out, &state, 48_000);
        // First fill should leap to the write frontier and start draining lag.
        assert!(out.iter().all(|&s| s == 0.0) || !playback.is_waiting());
    }

    #[test]
    fn excessive_lag_forces_read_index_to_write_frontier() {
        let state = SharedState::new();
        let samples = vec![5i16; state.ring.capacity() - 1];
        state.ring.append(&samples);

        let mut playback = PlaybackResampler::new(48_000, None);
        let mut out = vec![0.0f32; 10];
        playback.fill(&mut out, &state, 48_000);
        assert_eq!(playback.read_index, state.ring.snapshot_write_index());
    }
}
