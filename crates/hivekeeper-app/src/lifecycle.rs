//! Lifecycle state machine
//!
//! Holds the single authoritative [`LifecycleState`] in an atomic cell.
//! Every event is committed and then handed to the broadcaster while the
//! commit lock is held, so observers see events in commit order and any
//! query made from an observer already returns the new state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use hivekeeper_core::prelude::*;
use hivekeeper_core::{LifecycleState, ServiceEvent};

use crate::broadcaster::EventBroadcaster;

/// Result of committing one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// True when this commit moved the state into `Started`
    pub fn entered_started(&self) -> bool {
        self.changed() && self.to == LifecycleState::Started
    }
}

pub struct LifecycleMachine {
    state: AtomicU8,
    commit_lock: Mutex<()>,
    broadcaster: Arc<EventBroadcaster>,
}

impl LifecycleMachine {
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Idle.as_u8()),
            commit_lock: Mutex::new(()),
            broadcaster,
        }
    }

    /// Lock-free snapshot of the current state
    pub fn current_state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Commit `event` and broadcast it. Never fails; delivery problems are
    /// logged by the broadcaster.
    pub(crate) fn on_event(&self, event: ServiceEvent) -> Transition {
        let _guard = match self.commit_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let from = self.current_state();
        let to = from.after(&event);
        self.state.store(to.as_u8(), Ordering::Release);

        let transition = Transition { from, to };
        if transition.changed() {
            info!("Lifecycle {} -> {}: {}", from, to, event.summary());
        } else {
            debug!("Lifecycle stays {} on {}", from, event.event_type());
        }

        self.broadcaster.broadcast(&event);
        transition
    }
}
