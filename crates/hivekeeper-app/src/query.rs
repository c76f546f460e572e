//! Control-plane query responder
//!
//! Answers "is the daemon started?" and "what is its status?" from the
//! lifecycle state cell. Queries never wait on the daemon.

use std::sync::Arc;

use serde::Serialize;

use hivekeeper_core::LifecycleState;

use crate::lifecycle::LifecycleMachine;

/// Channel name for [`Query::IsStarted`]
pub const IS_STARTED_CHANNEL: &str = "is-service-started";

/// Channel name for [`Query::Status`]
pub const STATUS_CHANNEL: &str = "get-service-status";

/// A control-plane request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    IsStarted,
    Status,
}

impl Query {
    /// Map a request channel name to a query
    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            IS_STARTED_CHANNEL => Some(Query::IsStarted),
            STATUS_CHANNEL => Some(Query::Status),
            _ => None,
        }
    }

    pub fn channel(&self) -> &'static str {
        match self {
            Query::IsStarted => IS_STARTED_CHANNEL,
            Query::Status => STATUS_CHANNEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    IsStarted(bool),
    Status(LifecycleState),
}

/// Cheap, cloneable view over the lifecycle state
#[derive(Clone)]
pub struct QueryResponder {
    lifecycle: Arc<LifecycleMachine>,
}

impl QueryResponder {
    pub fn new(lifecycle: Arc<LifecycleMachine>) -> Self {
        Self { lifecycle }
    }

    pub fn is_started(&self) -> bool {
        self.status() == LifecycleState::Started
    }

    pub fn status(&self) -> LifecycleState {
        self.lifecycle.current_state()
    }

    pub fn answer(&self, query: Query) -> QueryResponse {
        match query {
            Query::IsStarted => QueryResponse::IsStarted(self.is_started()),
            Query::Status => QueryResponse::Status(self.status()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::EventBroadcaster;
    use hivekeeper_core::ServiceEvent;

    fn responder() -> (Arc<LifecycleMachine>, QueryResponder) {
        let machine = Arc::new(LifecycleMachine::new(Arc::new(EventBroadcaster::new())));
        (Arc::clone(&machine), QueryResponder::new(machine))
    }

    #[test]
    fn test_before_first_start() {
        let (_, queries) = responder();
        assert!(!queries.is_started());
        assert_eq!(queries.status(), LifecycleState::Idle);
    }

    #[test]
    fn test_is_started_tracks_status() {
        let (machine, queries) = responder();
        for event in [
            ServiceEvent::ServiceStarting,
            ServiceEvent::ServiceStarted,
            ServiceEvent::status(LifecycleState::Stopping),
            ServiceEvent::ServiceStarted,
            ServiceEvent::ServiceFailed,
        ] {
            machine.on_event(event);
            assert_eq!(
                queries.is_started(),
                queries.status() == LifecycleState::Started
            );
        }
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(Query::from_channel("is-service-started"), Some(Query::IsStarted));
        assert_eq!(Query::from_channel("get-service-status"), Some(Query::Status));
        assert_eq!(Query::from_channel("get-peers"), None);
        assert_eq!(Query::Status.channel(), STATUS_CHANNEL);
    }

    #[test]
    fn test_answer_serializes_plainly() {
        let (machine, queries) = responder();
        machine.on_event(ServiceEvent::ServiceStarted);

        assert_eq!(
            serde_json::to_string(&queries.answer(Query::IsStarted)).unwrap(),
            "true"
        );
        assert_eq!(
            serde_json::to_string(&queries.answer(Query::Status)).unwrap(),
            "\"started\""
        );
    }
}
