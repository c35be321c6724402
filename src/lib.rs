//! AudioMoth-Live — continuous acoustic capture with autosave, speaker
//! monitoring and heterodyne demodulation.

pub mod audio;
pub mod autosave;
pub mod cli;
pub mod console;
pub mod constants;
pub mod events;
pub mod lifecycle;
pub mod signal;
pub mod state;
pub mod time;

/// Installs the global `tracing` subscriber (§1A.1): `EnvFilter` defaulting
/// to `info`, overridable with `RUST_LOG`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
