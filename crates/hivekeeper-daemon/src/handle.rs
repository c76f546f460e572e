//! Daemon handle: owns one daemon run from binary preparation to exit
//!
//! The handle turns the raw process into lifecycle events. It never touches
//! the lifecycle state itself; everything it learns is sent to the
//! supervisor as a [`DaemonSignal`] tagged with the launch generation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};

use hivekeeper_core::prelude::*;
use hivekeeper_core::{LifecycleState, ServiceEvent};

use crate::binary;
use crate::config::ServiceConfig;
use crate::emitter::{DaemonSignal, SignalEmitter};
use crate::process::{DaemonProcess, LaunchSpec, ProcessOutput};
use crate::protocol::{classify_line, DaemonOutput};
use crate::repo;

/// Buffer between the process readers and the output loop
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct ProcessSlot {
    process: Option<DaemonProcess>,
    stop_requested: bool,
}

/// Launches and stops the daemon for the supervisor
pub struct DaemonHandle {
    config: Option<Arc<ServiceConfig>>,
    slot: Arc<Mutex<ProcessSlot>>,
    /// True from `launch()` until the run task has cleaned up
    busy: Arc<AtomicBool>,
    idle_notify: Arc<Notify>,
    signal_tx: mpsc::UnboundedSender<DaemonSignal>,
}

impl DaemonHandle {
    pub fn new(signal_tx: mpsc::UnboundedSender<DaemonSignal>) -> Self {
        Self {
            config: None,
            slot: Arc::new(Mutex::new(ProcessSlot::default())),
            busy: Arc::new(AtomicBool::new(false)),
            idle_notify: Arc::new(Notify::new()),
            signal_tx,
        }
    }

    /// Validate and store the configuration for the next launch
    pub fn configure(&mut self, config: ServiceConfig) -> Result<()> {
        if self.is_busy() {
            return Err(Error::configuration(
                "cannot reconfigure while the daemon is running",
            ));
        }
        config.validate()?;
        self.config = Some(Arc::new(config));
        Ok(())
    }

    pub fn config(&self) -> Option<&Arc<ServiceConfig>> {
        self.config.as_ref()
    }

    /// Begin a daemon run in the background.
    ///
    /// Fails only when unconfigured or when a previous run has not finished;
    /// everything after this point is reported as events.
    pub fn launch(&mut self, generation: u64) -> Result<()> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| Error::configuration("daemon handle is not configured"))?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::configuration(
                "previous daemon process has not exited yet",
            ));
        }

        match self.slot.lock() {
            Ok(mut slot) => *slot = ProcessSlot::default(),
            Err(_) => {
                self.busy.store(false, Ordering::Release);
                return Err(Error::daemon_process("process slot poisoned"));
            }
        }

        let run = DaemonRun {
            config,
            emitter: SignalEmitter::new(generation, self.signal_tx.clone()),
            slot: Arc::clone(&self.slot),
        };
        let busy = Arc::clone(&self.busy);
        let idle_notify = Arc::clone(&self.idle_notify);

        tokio::spawn(async move {
            let terminal = run.drive().await;

            if let Ok(mut slot) = run.slot.lock() {
                slot.process = None;
            }
            busy.store(false, Ordering::Release);
            idle_notify.notify_waiters();

            // Sent after the handle is free so a restart triggered by this
            // event is not rejected as busy.
            if let Some(event) = terminal {
                run.emitter.emit(event);
            }
            debug!("Daemon run {} finished", run.emitter.generation());
        });

        Ok(())
    }

    /// Ask the current run to end. Advisory: returns immediately.
    ///
    /// Before the process exists this cancels the launch; afterwards it
    /// interrupts the daemon. The eventual exit produces no further event.
    pub fn request_stop(&self) {
        let Ok(mut slot) = self.slot.lock() else {
            warn!("Process slot poisoned, cannot request stop");
            return;
        };
        slot.stop_requested = true;
        match slot.process.as_mut() {
            Some(process) => {
                if let Err(e) = process.interrupt() {
                    warn!("Failed to interrupt daemon: {}", e);
                }
            }
            None => debug!("Stop requested before the daemon process exists"),
        }
    }

    /// Like [`request_stop`](Self::request_stop) but force-kills the process
    pub fn kill(&self) {
        let Ok(mut slot) = self.slot.lock() else {
            return;
        };
        slot.stop_requested = true;
        if let Some(process) = slot.process.as_mut() {
            let _ = process.force_kill();
        }
    }

    /// Whether a run is in progress (including binary download and repo init)
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Resolve once no run is in progress
    pub async fn wait_until_idle(&self) {
        let notified = self.idle_notify.notified();
        if !self.is_busy() {
            return;
        }
        notified.await;
    }

    /// Cloneable waiter usable without borrowing the handle
    pub fn idle_waiter(&self) -> IdleWaiter {
        IdleWaiter {
            busy: Arc::clone(&self.busy),
            idle_notify: Arc::clone(&self.idle_notify),
        }
    }
}

/// Waits for a [`DaemonHandle`] to become idle
#[derive(Clone)]
pub struct IdleWaiter {
    busy: Arc<AtomicBool>,
    idle_notify: Arc<Notify>,
}

impl IdleWaiter {
    pub async fn wait(&self) {
        let notified = self.idle_notify.notified();
        if !self.busy.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }
}

/// State owned by one background run
struct DaemonRun {
    config: Arc<ServiceConfig>,
    emitter: SignalEmitter,
    slot: Arc<Mutex<ProcessSlot>>,
}

impl DaemonRun {
    fn stop_requested(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.stop_requested)
            .unwrap_or(true)
    }

    /// Run the daemon to completion, returning the event to emit once the
    /// handle is idle again (if any)
    async fn drive(&self) -> Option<ServiceEvent> {
        let binary = match binary::prepare(&self.config, &self.emitter).await {
            Ok(path) => path,
            Err(e) => {
                error!("Daemon binary unavailable: {}", e);
                return Some(ServiceEvent::ServiceFailed);
            }
        };

        if self.stop_requested() {
            info!("Stop requested during binary preparation, not launching");
            return None;
        }

        if let Err(e) = repo::ensure_initialized(&binary, &self.config).await {
            error!("{}", e);
            return Some(ServiceEvent::ServiceFailed);
        }

        let spec = LaunchSpec {
            binary,
            args: self.config.command_args(),
            repo_env: (
                self.config.repo_env_var.clone(),
                self.config.repo_dir.clone(),
            ),
        };

        let (output_tx, mut output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

        {
            let Ok(mut slot) = self.slot.lock() else {
                error!("Process slot poisoned, not launching");
                return Some(ServiceEvent::ServiceFailed);
            };
            if slot.stop_requested {
                info!("Stop requested during repository setup, not launching");
                return None;
            }
            match DaemonProcess::spawn(&spec, output_tx) {
                Ok(process) => slot.process = Some(process),
                Err(e) => {
                    error!("Failed to launch daemon: {}", e);
                    return Some(ServiceEvent::ServiceFailed);
                }
            }
        }

        self.watch_output(&mut output_rx).await
    }

    async fn watch_output(
        &self,
        output_rx: &mut mpsc::Receiver<ProcessOutput>,
    ) -> Option<ServiceEvent> {
        let mut ready = false;
        let mut shutting_down = false;
        let mut failure_reason: Option<String> = None;
        let mut exit_code: Option<i32> = None;

        while let Some(output) = output_rx.recv().await {
            let line = match output {
                ProcessOutput::Stdout(line) | ProcessOutput::Stderr(line) => line,
                ProcessOutput::Exited { code } => {
                    exit_code = code;
                    break;
                }
            };

            match classify_line(&line, &self.config.ready_marker) {
                DaemonOutput::Ready => {
                    if !ready {
                        ready = true;
                        info!("Daemon reported ready");
                        self.emitter.emit(ServiceEvent::ServiceStarted);
                    }
                }
                DaemonOutput::Initializing => {
                    if !ready {
                        self.emitter.emit(ServiceEvent::StatusUpdate {
                            state: LifecycleState::Starting,
                        });
                    }
                }
                DaemonOutput::ShuttingDown => {
                    info!("Daemon is shutting down");
                    shutting_down = true;
                    self.emitter.emit(ServiceEvent::StatusUpdate {
                        state: LifecycleState::Stopping,
                    });
                }
                DaemonOutput::Error(message) => {
                    warn!("Daemon error: {}", message);
                    failure_reason = Some(message);
                }
                DaemonOutput::Listening { service, address } => {
                    info!("Daemon {} listening on {}", service, address);
                }
                DaemonOutput::Other => trace!("daemon: {}", line),
            }
        }

        if self.stop_requested() || shutting_down {
            info!("Daemon exited after shutdown (code {:?})", exit_code);
            return None;
        }

        match failure_reason {
            Some(reason) => error!("Daemon exited unexpectedly (code {:?}): {}", exit_code, reason),
            None => error!("{}", Error::ProcessExit { code: exit_code }),
        }
        Some(ServiceEvent::ServiceFailed)
    }
}
