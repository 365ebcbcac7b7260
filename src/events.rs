// src/events.rs
//
// Notifications pushed to collaborators (progress bars, item cards, ...).
// Sinks are called after the engine lock is released and may be called from
// codec worker threads, so they must be cheap and must not call back into the
// converter synchronously.

use crate::tracker::{ItemStatus, Progress};
use std::sync::mpsc::Sender;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    StatusChanged {
        position: usize,
        name: String,
        status: ItemStatus,
    },
    Progress(Progress),
    BatchFinished {
        has_any_success: bool,
        cancelled: bool,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Forward events into a channel. A dropped receiver silently ends delivery.
impl EventSink for Sender<EngineEvent> {
    fn emit(&self, event: EngineEvent) {
        let _ = self.send(event);
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: EngineEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn channel_sink_forwards_and_tolerates_closed_receiver() {
        let (tx, rx) = mpsc::channel();
        tx.emit(EngineEvent::Progress(Progress::new(2, 1, 0)));
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::Progress(Progress::new(2, 1, 0))
        );
        drop(rx);
        tx.emit(EngineEvent::BatchFinished {
            has_any_success: false,
            cancelled: true,
        });
    }
}
