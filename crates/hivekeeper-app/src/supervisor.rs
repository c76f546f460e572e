//! Host supervisor: owns the daemon handle and the lifecycle
//!
//! The supervisor is the only thing that commits lifecycle state. Events
//! from the daemon handle arrive on a channel and are applied by a pump
//! task; `start()` and `stop()` commit their own events synchronously.
//! Both paths go through the same dispatch lock, and every event carries the
//! generation of the run that produced it so late events from an earlier
//! run are dropped instead of overwriting the current state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use hivekeeper_core::prelude::*;
use hivekeeper_core::{LifecycleState, ServiceEvent};
use hivekeeper_daemon::config::{BootstrapConfig, ServiceConfig};
use hivekeeper_daemon::rpc::{DaemonRpc, HttpRpcClient};
use hivekeeper_daemon::{DaemonHandle, DaemonSignal};

use crate::bootstrap::{BootstrapReport, Bootstrapper};
use crate::broadcaster::{EventBroadcaster, Observer, ObserverToken};
use crate::config::Settings;
use crate::lifecycle::LifecycleMachine;
use crate::query::QueryResponder;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// State shared between the supervisor and its pump task
struct Shared<R> {
    lifecycle: Arc<LifecycleMachine>,
    rpc: Arc<R>,
    /// Generation of the run whose events are currently accepted
    generation: AtomicU64,
    dispatch_lock: Mutex<()>,
    bootstrap_config: Mutex<Option<BootstrapConfig>>,
    last_bootstrap: Mutex<Option<JoinHandle<BootstrapReport>>>,
}

impl<R> Shared<R>
where
    R: DaemonRpc + Sync + 'static,
{
    fn dispatch(&self, signal: DaemonSignal) {
        let _dispatch = lock(&self.dispatch_lock);

        let current = self.generation.load(Ordering::Acquire);
        if signal.generation != current {
            debug!(
                "Discarding {} from run {} (current run {})",
                signal.event.event_type(),
                signal.generation,
                current
            );
            return;
        }

        let transition = self.lifecycle.on_event(signal.event);
        if transition.entered_started() {
            self.spawn_bootstrap();
        }
    }

    fn spawn_bootstrap(&self) {
        let config = lock(&self.bootstrap_config).clone().unwrap_or_default();
        let task = Bootstrapper::new(Arc::clone(&self.rpc), config).spawn();
        if let Some(previous) = lock(&self.last_bootstrap).replace(task) {
            if !previous.is_finished() {
                debug!("Previous relay bootstrap still running, leaving it to finish");
            }
        }
    }

    /// Invalidate every event from runs started so far
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Supervises one daemon: configuration, start/stop, event fan-out,
/// relay bootstrap and state queries.
///
/// Must be created and driven inside a tokio runtime.
pub struct HostSupervisor<R = HttpRpcClient>
where
    R: DaemonRpc + Sync + 'static,
{
    shared: Arc<Shared<R>>,
    broadcaster: Arc<EventBroadcaster>,
    handle: Mutex<DaemonHandle>,
    pump: JoinHandle<()>,
}

impl HostSupervisor<HttpRpcClient> {
    /// Build a supervisor talking HTTP to the daemon, configured from `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let rpc = HttpRpcClient::new(settings.api_url()?, settings.rpc_timeout())?;
        let supervisor = Self::new(rpc);
        supervisor.configure(settings.service_config()?)?;
        Ok(supervisor)
    }
}

impl<R> HostSupervisor<R>
where
    R: DaemonRpc + Sync + 'static,
{
    pub fn new(rpc: R) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let lifecycle = Arc::new(LifecycleMachine::new(Arc::clone(&broadcaster)));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            lifecycle,
            rpc: Arc::new(rpc),
            generation: AtomicU64::new(0),
            dispatch_lock: Mutex::new(()),
            bootstrap_config: Mutex::new(None),
            last_bootstrap: Mutex::new(None),
        });

        let pump = tokio::spawn(Self::pump(Arc::clone(&shared), signal_rx));

        Self {
            shared,
            broadcaster,
            handle: Mutex::new(DaemonHandle::new(signal_tx)),
            pump,
        }
    }

    async fn pump(shared: Arc<Shared<R>>, mut signal_rx: mpsc::UnboundedReceiver<DaemonSignal>) {
        while let Some(signal) = signal_rx.recv().await {
            shared.dispatch(signal);
        }
        debug!("Daemon signal channel closed, pump exiting");
    }

    /// Validate and store the configuration used by the next `start()`.
    ///
    /// Rejected while a daemon run is still in progress.
    pub fn configure(&self, config: ServiceConfig) -> Result<()> {
        let mut handle = lock(&self.handle);
        let bootstrap = config.bootstrap.clone();
        handle.configure(config)?;
        *lock(&self.shared.bootstrap_config) = Some(bootstrap);
        debug!("Supervisor configured");
        Ok(())
    }

    /// Begin launching the daemon.
    ///
    /// Commits `ServiceStarting` before returning. Everything after that is
    /// reported through events; the only errors are configuration errors
    /// (not configured, already running, previous process still exiting).
    pub fn start(&self) -> Result<()> {
        let mut handle = lock(&self.handle);
        let _dispatch = lock(&self.shared.dispatch_lock);

        let state = self.shared.lifecycle.current_state();
        if !state.accepts_start() {
            return Err(Error::configuration(format!(
                "daemon cannot be started while {}",
                state
            )));
        }
        if handle.config().is_none() {
            return Err(Error::configuration("supervisor is not configured"));
        }
        if handle.is_busy() {
            return Err(Error::configuration(
                "previous daemon process has not exited yet",
            ));
        }

        let generation = self.shared.next_generation();
        handle.launch(generation)?;
        info!("Starting daemon (run {})", generation);
        self.shared.lifecycle.on_event(ServiceEvent::ServiceStarting);
        Ok(())
    }

    /// Ask the daemon to stop. Advisory and idempotent.
    ///
    /// Commits `ServiceStopping` if the daemon is active; otherwise does
    /// nothing. Later events from the stopped run are discarded.
    pub fn stop(&self) {
        let handle = lock(&self.handle);
        {
            let _dispatch = lock(&self.shared.dispatch_lock);
            let state = self.shared.lifecycle.current_state();
            if !state.is_active() {
                debug!("stop() ignored while {}", state);
                return;
            }
            let generation = self.shared.next_generation();
            debug!("Stopping daemon, accepting events from run {} only", generation);
            self.shared.lifecycle.on_event(ServiceEvent::ServiceStopping);
        }
        handle.request_stop();
    }

    pub fn register(&self, observer: Arc<dyn Observer>) -> ObserverToken {
        self.broadcaster.register(observer)
    }

    pub fn unregister(&self, token: ObserverToken) -> bool {
        self.broadcaster.unregister(token)
    }

    pub fn queries(&self) -> QueryResponder {
        QueryResponder::new(Arc::clone(&self.shared.lifecycle))
    }

    pub fn current_state(&self) -> LifecycleState {
        self.shared.lifecycle.current_state()
    }

    pub fn is_started(&self) -> bool {
        self.current_state() == LifecycleState::Started
    }

    pub fn status(&self) -> LifecycleState {
        self.current_state()
    }

    pub fn rpc(&self) -> Arc<R> {
        Arc::clone(&self.shared.rpc)
    }

    /// Whether a daemon run (download, init, or process) is in progress
    pub fn is_running(&self) -> bool {
        lock(&self.handle).is_busy()
    }

    /// Resolve once the current daemon run has fully ended
    pub async fn wait_for_exit(&self) {
        let waiter = lock(&self.handle).idle_waiter();
        waiter.wait().await;
    }

    /// Wait for the most recent relay bootstrap pass, if one was started
    pub async fn wait_for_bootstrap(&self) -> Option<BootstrapReport> {
        let task = lock(&self.shared.last_bootstrap).take()?;
        match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Relay bootstrap task failed: {}", e);
                None
            }
        }
    }

    pub(crate) fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    #[cfg(test)]
    pub(crate) fn dispatch_for_test(&self, signal: DaemonSignal) {
        self.shared.dispatch(signal);
    }
}

impl<R> Drop for HostSupervisor<R>
where
    R: DaemonRpc + Sync + 'static,
{
    fn drop(&mut self) {
        lock(&self.handle).kill();
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observers::ChannelObserver;
    use hivekeeper_daemon::test_utils::MockRpc;

    fn signal(generation: u64, event: ServiceEvent) -> DaemonSignal {
        DaemonSignal { generation, event }
    }

    #[tokio::test]
    async fn test_start_requires_configuration() {
        let supervisor = HostSupervisor::new(MockRpc::new());
        assert!(matches!(
            supervisor.start(),
            Err(Error::Configuration { .. })
        ));
        assert_eq!(supervisor.status(), LifecycleState::Idle);
        assert!(!supervisor.is_started());
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_config() {
        let supervisor = HostSupervisor::new(MockRpc::new());
        let cfg = ServiceConfig::new("/opt/hive", "/tmp/node1").with_args(Vec::<String>::new());
        assert!(supervisor.configure(cfg).is_err());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_a_no_op() {
        let supervisor = HostSupervisor::new(MockRpc::new());
        let (observer, mut rx) = ChannelObserver::new("test");
        supervisor.register(Arc::new(observer));

        supervisor.stop();

        assert_eq!(supervisor.status(), LifecycleState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_discards_stale_generation() {
        let supervisor = HostSupervisor::new(MockRpc::new());
        let shared = &supervisor.shared;

        shared.generation.store(2, Ordering::Release);
        shared.dispatch(signal(1, ServiceEvent::ServiceStarted));
        assert_eq!(supervisor.status(), LifecycleState::Idle);

        shared.dispatch(signal(2, ServiceEvent::ServiceStarted));
        assert_eq!(supervisor.status(), LifecycleState::Started);
    }

    #[tokio::test]
    async fn test_entering_started_runs_bootstrap_once() {
        let supervisor = HostSupervisor::new(MockRpc::new().with_relays(["addrA", "addrB"]));
        let shared = &supervisor.shared;
        shared.generation.store(1, Ordering::Release);

        shared.dispatch(signal(1, ServiceEvent::ServiceStarting));
        shared.dispatch(signal(1, ServiceEvent::ServiceStarted));
        let report = supervisor.wait_for_bootstrap().await.unwrap();
        assert_eq!(report.attempted, 2);

        // Still Started: no second pass.
        shared.dispatch(signal(1, ServiceEvent::ServiceStarted));
        assert!(supervisor.wait_for_bootstrap().await.is_none());
        assert_eq!(supervisor.rpc().connect_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_bootstrap_does_not_change_state() {
        let supervisor = HostSupervisor::new(
            MockRpc::new()
                .with_relays(["a", "b"])
                .failing("a")
                .failing("b"),
        );
        let shared = &supervisor.shared;
        shared.generation.store(1, Ordering::Release);

        shared.dispatch(signal(1, ServiceEvent::ServiceStarted));
        let report = supervisor.wait_for_bootstrap().await.unwrap();

        assert_eq!(report.failed.len(), 2);
        assert_eq!(supervisor.status(), LifecycleState::Started);
    }

    #[tokio::test]
    async fn test_observers_registered_through_supervisor_receive_events() {
        let supervisor = HostSupervisor::new(MockRpc::new());
        let (first, mut first_rx) = ChannelObserver::new("first");
        let (second, mut second_rx) = ChannelObserver::new("second");
        supervisor.register(Arc::new(first));
        let token = supervisor.register(Arc::new(second));
        supervisor.shared.generation.store(1, Ordering::Release);

        supervisor
            .shared
            .dispatch(signal(1, ServiceEvent::ServiceFailed));
        assert!(supervisor.unregister(token));
        supervisor
            .shared
            .dispatch(signal(1, ServiceEvent::download_error("late")));

        assert_eq!(first_rx.try_recv().unwrap(), ServiceEvent::ServiceFailed);
        assert!(matches!(
            first_rx.try_recv().unwrap(),
            ServiceEvent::DownloadError { .. }
        ));
        assert_eq!(second_rx.try_recv().unwrap(), ServiceEvent::ServiceFailed);
        assert!(second_rx.try_recv().is_err());
        assert_eq!(supervisor.broadcaster().len(), 1);
    }
}
