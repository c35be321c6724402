//! The lifecycle controller (§4.7): top-level orchestrator driving
//! `INIT -> STARTING -> RUNNING -> RESTARTING -> SHUTTING_DOWN -> DONE`.
//!
//! Runs entirely on the main thread. Never blocks the realtime callback
//! threads; every wait here is a bounded, polled timeout, matching the
//! reference implementation's busy-wait-with-sleep loops rather than a
//! condvar (§9: the realtime constraint binds only the callback threads).

use crate::audio::heterodyne::{self, Heterodyne};
use crate::audio::playback::PlaybackResampler;
use crate::audio::supervisor::FirmwareWarningLatch;
use crate::audio::{capture, device, playback, supervisor};
use crate::cli::Settings;
use crate::constants::{
    CALLBACKS_PER_SECOND, DEVICE_CHANGE_INTERVAL, DEVICE_SHUTDOWN_TIMEOUT, DEVICE_STOP_START_TIMEOUT,
    TIME_MISMATCH_LIMIT_MS,
};
use crate::events::{self, AutosaveEvent, AutosaveEventKind, AutosaveEventSender};
use crate::state::SharedState;
use anyhow::{bail, Context};
use cpal::traits::DeviceTrait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct OpenedDevice {
    device: cpal::Device,
    name: String,
    native_rate: u32,
    is_audiomoth: bool,
}

fn choose_capture_device(settings: &Settings) -> anyhow::Result<OpenedDevice> {
    let enumeration = device::enumerate_input_devices().context("enumerating input devices")?;
    if let Some(name) = enumeration.audiomoth_device_name {
        let found = device::find_input_device_by_name(&name)?;
        if let Some(dev) = found {
            return Ok(OpenedDevice {
                device: dev,
                name: name.clone(),
                native_rate: enumeration.audiomoth_sample_rate.unwrap_or(settings.default_capture_rate()),
                is_audiomoth: true,
            });
        }
    }
    let dev = device::default_input_device().context("opening default input device")?;
    let name = dev.name().unwrap_or_else(|_| "default input".to_string());
    Ok(OpenedDevice {
        device: dev,
        name,
        native_rate: settings.default_capture_rate(),
        is_audiomoth: false,
    })
}

fn wait_until(predicate: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn emit_event(sender: &AutosaveEventSender, kind: AutosaveEventKind, state: &SharedState, name: &str, rate: u32) {
    let clock = *state.clock.lock();
    let write_index = state.ring.snapshot_write_index();
    sender.push(AutosaveEvent {
        kind,
        sample_rate: rate,
        current_count: clock.current_sample_count,
        current_index: write_index,
        start_time_ms: clock.start_time_ms_utc,
        start_count: clock.start_sample_count,
        input_device_comment_name: name.to_string(),
    });
}

/// Owns the two realtime streams and the state needed to restart them.
struct Session {
    capture_stream: Option<cpal::Stream>,
    playback_stream: Option<cpal::Stream>,
    sample_rate: u32,
    device_name: String,
    using_audiomoth: bool,
    started_at: Instant,
}

pub fn run(settings: Settings) -> anyhow::Result<()> {
    if settings.has_nothing_to_do() {
        return Ok(());
    }

    let state = Arc::new(SharedState::new());
    let (events_tx, events_rx) = events::channel();
    let autosave_enabled = settings.autosave_duration_minutes > 0;

    let worker_running = Arc::new(AtomicBool::new(true));
    let worker_handle = if autosave_enabled {
        let writer =
            crate::autosave::AutosaveWriter::new(settings.destination.clone(), settings.autosave_duration_minutes, settings.use_utc);
        let worker_state = state.clone();
        let worker_keep_running = worker_running.clone();
        Some(std::thread::spawn(move || {
            crate::autosave::run(worker_state, events_rx, writer, worker_keep_running);
        }))
    } else {
        None
    };

    let firmware_latch = FirmwareWarningLatch::new();
    let mut session = start_capture(&settings, &state, &events_tx, autosave_enabled)?;

    let running = crate::signal::install().context("installing signal handler")?;

    let result = run_loop(
        &settings,
        &state,
        &events_tx,
        &mut session,
        &firmware_latch,
        &running,
    );

    if autosave_enabled {
        emit_event(&events_tx, AutosaveEventKind::Shutdown, &state, &session.device_name, session.sample_rate);
        wait_until(|| *state.shutdown_completed.lock(), DEVICE_SHUTDOWN_TIMEOUT);
    }
    worker_running.store(false, Ordering::Relaxed);
    if let Some(handle) = worker_handle {
        let _ = handle.join();
    }

    result
}

fn start_capture(
    settings: &Settings,
    state: &Arc<SharedState>,
    events_tx: &AutosaveEventSender,
    autosave_enabled: bool,
) -> anyhow::Result<Session> {
    let chosen = choose_capture_device(settings)?;
    let r_in = chosen.native_rate;
    let r_out = settings.requested_sample_rate.unwrap_or(chosen.native_rate).min(r_in);

    if let Some(hz) = settings.heterodyne_hz {
        if !heterodyne::validate_carrier_frequency(hz, r_out) {
            crate::console::error("Could not set requested heterodyne frequency.");
            bail!("invalid heterodyne frequency");
        }
    }

    state.set_started(false);
    let capture_stream = capture::start_capture_stream(&chosen.device, r_in, r_out, 1, state.clone())
        .context("starting capture stream")?;

    if !wait_until(|| state.is_started(), DEVICE_STOP_START_TIMEOUT) {
        crate::console::error("Timed out waiting for device to start.");
        bail!("capture device did not start");
    }

    if autosave_enabled {
        emit_event(events_tx, AutosaveEventKind::Start, state, &chosen.name, r_out);
    }

    let playback_stream = if settings.monitor || settings.heterodyne_hz.is_some() {
        let heterodyne = settings.heterodyne_hz.map(|hz| Heterodyne::new(r_out, hz));
        let resampler = PlaybackResampler::new(r_out, heterodyne);
        match device::default_output_device() {
            Some(out_device) => match playback::start_playback_stream(&out_device, r_out, 1, state.clone(), resampler) {
                Ok(stream) => Some(stream),
                Err(err) => {
                    tracing::warn!("failed to start playback stream: {}", err);
                    None
                }
            },
            None => {
                tracing::warn!("monitor/heterodyne requested but no output device is available");
                None
            }
        }
    } else {
        None
    };

    crate::console::banner(&format!(
        "Connected to {} with sample rate of {}kHz.\nCtrl-C to exit.",
        chosen.name,
        r_out / 1000
    ));

    Ok(Session {
        capture_stream: Some(capture_stream),
        playback_stream,
        sample_rate: r_out,
        device_name: chosen.name,
        using_audiomoth: chosen.is_audiomoth,
        started_at: Instant::now(),
    })
}

fn run_loop(
    settings: &Settings,
    state: &Arc<SharedState>,
    events_tx: &AutosaveEventSender,
    session: &mut Session,
    firmware_latch: &FirmwareWarningLatch,
    running: &Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let autosave_enabled = settings.autosave_duration_minutes > 0;
    let period = Duration::from_millis(1000 / CALLBACKS_PER_SECOND as u64);

    loop {
        std::thread::sleep(period);
        if !running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let audio_time = {
            let clock = *state.clock.lock();
            clock.audio_time_ms_utc(session.sample_rate)
        };
        let time_mismatch = (audio_time - crate::time::now_ms_utc()).abs() > TIME_MISMATCH_LIMIT_MS;

        let mut device_change = false;
        if session.started_at.elapsed() >= DEVICE_CHANGE_INTERVAL {
            let now_s = crate::time::now_ms_utc() / 1000;
            if let Ok(findings) = supervisor::poll_once(state, now_s) {
                if findings.audiomoth_found != session.using_audiomoth {
                    device_change = true;
                }
                if firmware_latch.observe(findings.old_firmware_found) {
                    crate::console::warning("Detected AudioMoth running old firmware.");
                }
            }
        }

        if time_mismatch || device_change {
            if time_mismatch {
                crate::console::warning("Clock drift detected, restarting capture device.");
            }
            restart_capture(settings, state, events_tx, session, autosave_enabled)?;
        }
    }
}

fn restart_capture(
    settings: &Settings,
    state: &Arc<SharedState>,
    events_tx: &AutosaveEventSender,
    session: &mut Session,
    autosave_enabled: bool,
) -> anyhow::Result<()> {
    state.set_stopped(false);
    if let Some(stream) = session.capture_stream.take() {
        drop(stream);
        // `cpal`'s `Stream` drop blocks until the backend has torn the
        // stream down, so the notification this crate tracks as `stopped`
        // is already true by the time `drop` returns.
        state.set_stopped(true);
    }
    wait_until(|| state.is_stopped(), DEVICE_STOP_START_TIMEOUT);

    state.set_started(false);
    let chosen = choose_capture_device(settings)?;
    let r_in = chosen.native_rate;
    let r_out = settings.requested_sample_rate.unwrap_or(chosen.native_rate).min(r_in);

    let capture_stream = capture::start_capture_stream(&chosen.device, r_in, r_out, 1, state.clone())
        .context("restarting capture stream")?;

    crate::console::banner(&format!(
        "Connected to {} with sample rate of {}kHz.\nCtrl-C to exit.",
        chosen.name,
        r_out / 1000
    ));

    let started = wait_until(|| state.is_started(), DEVICE_STOP_START_TIMEOUT);
    if started && autosave_enabled {
        emit_event(events_tx, AutosaveEventKind::Restart, state, &chosen.name, r_out);
    }

    session.capture_stream = Some(capture_stream);
    session.sample_rate = r_out;
    session.device_name = chosen.name;
    session.using_audiomoth = chosen.is_audiomoth;
    session.started_at = Instant::now();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_until_returns_true_immediately_when_already_satisfied() {
        assert!(wait_until(|| true, Duration::from_millis(50)));
    }

    #[test]
    fn wait_until_times_out_on_a_permanently_false_predicate() {
        let start = Instant::now();
        let result = wait_until(|| false, Duration::from_millis(30));
        assert!(!result);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
