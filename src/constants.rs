//! Fixed constants shared across the capture pipeline.
//!
//! Values are carried over verbatim from the reference implementation this
//! crate ports; changing any of them changes on-disk file boundaries.

/// Ring buffer capacity, in samples. `2^25` samples at the maximum supported
/// sample rate is roughly 87 seconds, comfortably longer than a minute.
pub const RING_BUFFER_CAPACITY: usize = 1 << 25;

/// Audio callbacks requested per second from the capture/playback backend.
pub const CALLBACKS_PER_SECOND: u32 = 10;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;
pub const PLAYBACK_SAMPLE_RATE: u32 = 48_000;

pub const VALID_SAMPLE_RATES: [u32; 8] = [
    8_000, 16_000, 32_000, 48_000, 96_000, 192_000, 250_000, 384_000,
];

pub const VALID_AUTOSAVE_DURATIONS: [u32; 5] = [0, 1, 5, 10, 60];

/// Capacity of the bounded autosave event queue.
pub const AUTOSAVE_EVENT_QUEUE_SIZE: usize = 16;

/// Minimum carrier frequency accepted for heterodyne demodulation.
pub const MINIMUM_HETERODYNE_FREQUENCY: u32 = 12_000;

/// Maximum divergence, in milliseconds, between sample-derived audio time
/// and wall-clock UTC before a capture restart is forced.
pub const TIME_MISMATCH_LIMIT_MS: i64 = 2_000;

/// How long the lifecycle controller waits for a capture device to report
/// `started` before giving up.
pub const DEVICE_STOP_START_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// How long the lifecycle controller waits for the autosave worker to flush
/// and report `shutdown_completed` during shutdown.
pub const DEVICE_SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Minimum time a device must have been running before the supervisor's
/// enumeration findings are allowed to trigger a restart.
pub const DEVICE_CHANGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Background worker's polling cadence, in microseconds; also the alignment
/// boundary it sleeps to.
pub const DEVICE_CHECK_INTERVAL_MICROS: u64 = 250_000;

/// Maximum acceptable playback buffer lag, expressed in callback periods,
/// above which the playback reader leaps to the write frontier and emits
/// silence until the lag drains back below `TARGET_LAG_CALLBACKS`.
#[cfg(target_os = "windows")]
pub const MAX_LAG_CALLBACKS: f64 = CALLBACKS_PER_SECOND as f64 / 2.0;
#[cfg(not(target_os = "windows"))]
pub const MAX_LAG_CALLBACKS: f64 = CALLBACKS_PER_SECOND as f64 / 4.0;

#[cfg(target_os = "windows")]
pub const TARGET_LAG_CALLBACKS: f64 = CALLBACKS_PER_SECOND as f64 / 10.0;
#[cfg(not(target_os = "windows"))]
pub const TARGET_LAG_CALLBACKS: f64 = CALLBACKS_PER_SECOND as f64 / 20.0;
