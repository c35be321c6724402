//! Fixed-capacity circular store of mono 16-bit samples.
//!
//! Single producer (the capture resampler), multiple independent readers
//! (the playback resampler and the autosave writer), each tracking its own
//! read cursor. The producer never blocks: readers that fall behind by more
//! than [`RING_BUFFER_CAPACITY`] samples observe corrupted data and must
//! resynchronize to the current write frontier.

use crate::constants::RING_BUFFER_CAPACITY;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

const N: usize = RING_BUFFER_CAPACITY;

/// The circular sample store itself. Does not own any notion of "current
/// time" or sample counters — see [`StreamClock`] for that.
pub struct RingBuffer {
    buffer: UnsafeCell<Box<[i16; N]>>,
    write_index: AtomicU32,
}

// Safety: `buffer` is only ever mutated by `append`, and the caller contract
// (single producer) guarantees at most one thread calls `append` at a time.
// Readers only ever read through `slice`, which reads committed bytes behind
// the already-advanced `write_index`.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    pub fn new() -> Self {
        Self {
            buffer: UnsafeCell::new(vec![0i16; N].into_boxed_slice().try_into().unwrap()),
            write_index: AtomicU32::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Writes `samples` starting at the current write index, wrapping
    /// modulo `N`, then publishes the new write index. Returns the new
    /// write index.
    pub fn append(&self, samples: &[i16]) -> u32 {
        debug_assert!(samples.len() <= N, "a single append cannot exceed capacity");

        let start = self.write_index.load(Ordering::Relaxed) as usize % N;
        let buf = unsafe { &mut *self.buffer.get() };

        let first_len = samples.len().min(N - start);
        buf[start..start + first_len].copy_from_slice(&samples[..first_len]);
        if first_len < samples.len() {
            let remaining = samples.len() - first_len;
            buf[..remaining].copy_from_slice(&samples[first_len..]);
        }

        let new_index = (start + samples.len()) % N;
        self.write_index.store(new_index as u32, Ordering::Release);
        new_index as u32
    }

    /// Lock-free atomic read of the current write index. Tolerates staleness:
    /// the physical bytes behind any previously observed index are always
    /// valid, since the producer only ever writes ahead of its last publish.
    pub fn snapshot_write_index(&self) -> u32 {
        self.write_index.load(Ordering::Acquire)
    }

    /// Returns up to two contiguous ranges covering `[start, start+len) mod N`.
    /// The second range is empty unless the request wraps past the end of
    /// the physical buffer.
    pub fn slice(&self, start: u32, len: u32) -> (Vec<i16>, Vec<i16>) {
        let start = start as usize % N;
        let len = len as usize;
        debug_assert!(len <= N, "a single slice cannot exceed capacity");

        let buf = unsafe { &*self.buffer.get() };
        let first_len = len.min(N - start);
        let a = buf[start..start + first_len].to_vec();
        let b = if first_len < len {
            buf[..len - first_len].to_vec()
        } else {
            Vec::new()
        };
        (a, b)
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// The `(start_time_ms_utc, start_sample_count, current_sample_count)`
/// triple, updated atomically under a lock whenever the capture device
/// restarts and on every capture callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamClock {
    pub start_time_ms_utc: i64,
    pub start_sample_count: i64,
    pub current_sample_count: i64,
}

impl StreamClock {
    /// `audio_time_ms_utc = start_time_ms_utc + round(1000 * (current - start) / sample_rate)`
    pub fn audio_time_ms_utc(&self, sample_rate: u32) -> i64 {
        let elapsed_samples = self.current_sample_count - self.start_sample_count;
        let elapsed_ms = crate::time::rounded_div(elapsed_samples * 1000, sample_rate as i64);
        self.start_time_ms_utc + elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed() {
        let rb = RingBuffer::new();
        assert_eq!(rb.capacity(), N);
        assert_eq!(rb.snapshot_write_index(), 0);
    }

    #[test]
    fn append_advances_write_index_by_len() {
        let rb = RingBuffer::new();
        let samples = [1i16, 2, 3, 4, 5];
        let idx = rb.append(&samples);
        assert_eq!(idx, 5);
        assert_eq!(rb.snapshot_write_index(), 5);
    }

    #[test]
    fn slice_reads_back_what_was_written() {
        let rb = RingBuffer::new();
        let samples: Vec<i16> = (0..100).collect();
        rb.append(&samples);
        let (a, b) = rb.slice(0, 100);
        assert_eq!(a, samples);
        assert!(b.is_empty());
    }

    #[test]
    fn wraparound_splits_into_two_ranges() {
        let rb = RingBuffer::new();
        // Force the write index near the end of the buffer.
        let filler = vec![0i16; N - 10];
        rb.append(&filler);
        assert_eq!(rb.snapshot_write_index() as usize, N - 10);

        let wrap_samples: Vec<i16> = (1..=20).collect();
        rb.append(&wrap_samples);
        assert_eq!(rb.snapshot_write_index(), 10);

        let (a, b) = rb.slice((N - 10) as u32, 20);
        assert_eq!(a.len(), 10);
        assert_eq!(b.len(), 10);
        let mut combined = a;
        combined.extend(b);
        assert_eq!(combined, wrap_samples);
    }

    #[test]
    fn append_overwrites_stale_data_without_backpressure() {
        let rb = RingBuffer::new();
        let first = vec![7i16; N];
        rb.append(&first);
        assert_eq!(rb.snapshot_write_index(), 0);

        let second = [9i16, 9, 9];
        rb.append(&second);
        let (a, _) = rb.slice(0, 3);
        assert_eq!(a, vec![9, 9, 9]);
    }

    #[test]
    fn audio_time_tracks_elapsed_samples() {
        let clock = StreamClock {
            start_time_ms_utc: 1_000,
            start_sample_count: 0,
            current_sample_count: 48_000,
        };
        assert_eq!(clock.audio_time_ms_utc(48_000), 2_000);
    }
}
