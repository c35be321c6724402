//! The bounded FIFO of autosave lifecycle events flowing from the capture
//! side (lifecycle controller, capture resampler) to the autosave worker.

use crate::constants::AUTOSAVE_EVENT_QUEUE_SIZE;
use crossbeam_channel::{Receiver, Sender, TrySendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveEventKind {
    Start,
    Restart,
    Stop,
    Shutdown,
}

/// Immutable snapshot of stream state at the moment a lifecycle transition
/// was observed.
#[derive(Debug, Clone)]
pub struct AutosaveEvent {
    pub kind: AutosaveEventKind,
    pub sample_rate: u32,
    pub current_count: i64,
    pub current_index: u32,
    pub start_time_ms: i64,
    pub start_count: i64,
    pub input_device_comment_name: String,
}

pub fn channel() -> (AutosaveEventSender, AutosaveEventReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(AUTOSAVE_EVENT_QUEUE_SIZE);
    (AutosaveEventSender(tx), AutosaveEventReceiver(rx))
}

#[derive(Clone)]
pub struct AutosaveEventSender(Sender<AutosaveEvent>);

impl AutosaveEventSender {
    /// Never blocks: the event rate is pathologically low (≤1/s), so a full
    /// queue means something is badly wrong upstream. The event is dropped
    /// and the failure logged rather than stalling a thread that must not
    /// block.
    pub fn push(&self, event: AutosaveEvent) {
        if let Err(TrySendError::Full(_)) = self.0.try_send(event) {
            tracing::error!("autosave event queue full, dropping event");
        }
    }
}

pub struct AutosaveEventReceiver(Receiver<AutosaveEvent>);

impl AutosaveEventReceiver {
    pub fn has_events(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn pop(&self) -> Option<AutosaveEvent> {
        self.0.try_recv().ok()
    }

    /// Drains every currently pending event, preserving FIFO order.
    pub fn drain(&self) -> Vec<AutosaveEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.pop() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(kind: AutosaveEventKind) -> AutosaveEvent {
        AutosaveEvent {
            kind,
            sample_rate: 48_000,
            current_count: 0,
            current_index: 0,
            start_time_ms: 0,
            start_count: 0,
            input_device_comment_name: "the 48kHz default input".into(),
        }
    }

    #[test]
    fn draining_empty_queue_is_a_no_op() {
        let (_tx, rx) = channel();
        assert!(!rx.has_events());
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn events_drain_in_fifo_order() {
        let (tx, rx) = channel();
        tx.push(sample_event(AutosaveEventKind::Start));
        tx.push(sample_event(AutosaveEventKind::Restart));
        tx.push(sample_event(AutosaveEventKind::Stop));

        let drained = rx.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].kind, AutosaveEventKind::Start);
        assert_eq!(drained[1].kind, AutosaveEventKind::Restart);
        assert_eq!(drained[2].kind, AutosaveEventKind::Stop);
    }

    #[test]
    fn queue_overflow_drops_events_without_blocking() {
        let (tx, rx) = channel();
        for _ in 0..AUTOSAVE_EVENT_QUEUE_SIZE + 5 {
            tx.push(sample_event(AutosaveEventKind::Restart));
        }
        assert_eq!(rx.drain().len(), AUTOSAVE_EVENT_QUEUE_SIZE);
    }
}
