//! Tagged event emission from the daemon handle to the supervisor

use tokio::sync::mpsc;

use hivekeeper_core::prelude::*;
use hivekeeper_core::ServiceEvent;

/// A translated daemon event, tagged with the launch it belongs to.
///
/// Every `start()` gets a new generation so the supervisor can tell a late
/// event from a previous process apart from the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSignal {
    pub generation: u64,
    pub event: ServiceEvent,
}

/// Sends events for one launch generation
#[derive(Debug, Clone)]
pub struct SignalEmitter {
    generation: u64,
    tx: mpsc::UnboundedSender<DaemonSignal>,
}

impl SignalEmitter {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<DaemonSignal>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue `event` for the supervisor. A closed channel means the
    /// supervisor is gone, which is only worth a debug line.
    pub fn emit(&self, event: ServiceEvent) {
        trace!(
            "Emitting {} (generation {})",
            event.event_type(),
            self.generation
        );
        if self
            .tx
            .send(DaemonSignal {
                generation: self.generation,
                event,
            })
            .is_err()
        {
            debug!("Supervisor event channel closed, dropping daemon event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = SignalEmitter::new(7, tx);

        emitter.emit(ServiceEvent::ServiceStarted);

        assert_eq!(
            rx.try_recv().unwrap(),
            DaemonSignal {
                generation: 7,
                event: ServiceEvent::ServiceStarted
            }
        );
    }

    #[test]
    fn test_emit_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        SignalEmitter::new(1, tx).emit(ServiceEvent::ServiceFailed);
    }
}
