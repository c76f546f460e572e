//! Remote client: the consumer side of the supervisor
//!
//! A remote client never owns the daemon. It learns about the daemon only
//! through the event stream and hands out the RPC handle only while the
//! stream says the daemon is started.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use hivekeeper_core::prelude::*;
use hivekeeper_core::{LifecycleState, ServiceEvent};
use hivekeeper_daemon::rpc::DaemonRpc;

use crate::broadcaster::{EventBroadcaster, ObserverToken};
use crate::observers::ChannelObserver;
use crate::query::QueryResponder;
use crate::supervisor::HostSupervisor;

pub struct RemoteClient<R> {
    events: mpsc::UnboundedReceiver<ServiceEvent>,
    queries: QueryResponder,
    rpc: Arc<R>,
    ready: bool,
    token: ObserverToken,
    broadcaster: Weak<EventBroadcaster>,
}

impl<R> RemoteClient<R>
where
    R: DaemonRpc + Sync + 'static,
{
    /// Subscribe to `supervisor`'s events.
    ///
    /// A client attached while the daemon is already started is ready
    /// immediately, since the `ServiceStarted` it would wait for is gone.
    pub fn attach(supervisor: &HostSupervisor<R>) -> Self {
        let (observer, events) = ChannelObserver::new("remote-client");
        let token = supervisor.register(Arc::new(observer));
        let queries = supervisor.queries();

        Self {
            events,
            ready: queries.is_started(),
            queries,
            rpc: supervisor.rpc(),
            token,
            broadcaster: Arc::downgrade(supervisor.broadcaster()),
        }
    }

    /// Next lifecycle event, or `None` once the supervisor is gone
    pub async fn next_event(&mut self) -> Option<ServiceEvent> {
        let event = self.events.recv().await?;
        self.observe(&event);
        Some(event)
    }

    /// Non-blocking variant of [`next_event`](Self::next_event)
    pub fn try_next_event(&mut self) -> Option<ServiceEvent> {
        let event = self.events.try_recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    fn observe(&mut self, event: &ServiceEvent) {
        let ready = match event {
            ServiceEvent::ServiceStarted => true,
            ServiceEvent::ServiceStarting
            | ServiceEvent::UpgradingBinary
            | ServiceEvent::ServiceStopping
            | ServiceEvent::ServiceFailed => false,
            ServiceEvent::StatusUpdate { state } => *state == LifecycleState::Started,
            ServiceEvent::DownloadProgress(_) | ServiceEvent::DownloadError { .. } => self.ready,
        };
        if ready != self.ready {
            debug!(
                "Remote client RPC {}",
                if ready { "available" } else { "withdrawn" }
            );
        }
        self.ready = ready;
    }

    /// RPC handle, only while the daemon is known to be started
    pub fn rpc(&self) -> Option<Arc<R>> {
        self.ready.then(|| Arc::clone(&self.rpc))
    }

    pub fn is_started(&self) -> bool {
        self.queries.is_started()
    }

    pub fn status(&self) -> LifecycleState {
        self.queries.status()
    }
}

impl<R> Drop for RemoteClient<R> {
    fn drop(&mut self) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.unregister(self.token);
            debug!("Remote client detached (observer #{})", self.token.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivekeeper_daemon::test_utils::MockRpc;
    use hivekeeper_daemon::DaemonSignal;

    // Drive the supervisor's event path without a daemon process.
    fn push(supervisor: &HostSupervisor<MockRpc>, event: ServiceEvent) {
        supervisor.dispatch_for_test(DaemonSignal {
            generation: 0,
            event,
        });
    }

    #[tokio::test]
    async fn test_rpc_only_between_started_and_next_lifecycle_event() {
        let supervisor = HostSupervisor::new(MockRpc::new());
        let mut client = RemoteClient::attach(&supervisor);
        assert!(client.rpc().is_none());

        push(&supervisor, ServiceEvent::ServiceStarting);
        assert_eq!(client.next_event().await, Some(ServiceEvent::ServiceStarting));
        assert!(client.rpc().is_none());

        push(&supervisor, ServiceEvent::ServiceStarted);
        client.next_event().await;
        assert!(client.rpc().is_some());
        assert!(client.is_started());

        push(&supervisor, ServiceEvent::download_error("upgrade failed"));
        client.next_event().await;
        assert!(client.rpc().is_some());

        push(&supervisor, ServiceEvent::ServiceFailed);
        client.next_event().await;
        assert!(client.rpc().is_none());
        assert_eq!(client.status(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_attach_while_started_is_ready() {
        let supervisor = HostSupervisor::new(MockRpc::new());
        push(&supervisor, ServiceEvent::ServiceStarted);

        let mut client = RemoteClient::attach(&supervisor);
        assert!(client.rpc().is_some());
        assert!(client.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let supervisor = HostSupervisor::new(MockRpc::new());
        let client = RemoteClient::attach(&supervisor);
        assert_eq!(supervisor.broadcaster().len(), 1);

        drop(client);
        assert!(supervisor.broadcaster().is_empty());
    }
}
