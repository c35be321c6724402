//! Interrupt handling (§6 Signal interface): a single `ctrlc::set_handler`
//! call covers `SIGINT`/`SIGTERM`/`SIGHUP` on Unix and the console control
//! event on Windows, collapsing what the reference implementation does with
//! five separate Unix `signal()` registrations plus a `SetConsoleCtrlHandler`
//! branch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[error("failed to install signal handler: {0}")]
pub struct SignalError(#[from] ctrlc::Error);

/// Installs the interrupt handler. The returned flag starts `true` and is
/// cleared exactly once, on the first interrupt; the lifecycle controller's
/// `RUNNING` loop polls `!running.load(Relaxed)` as its shutdown trigger.
pub fn install() -> Result<Arc<AtomicBool>, SignalError> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::Relaxed);
    })?;
    Ok(running)
}
