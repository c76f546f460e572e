//! Daemon process management

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use hivekeeper_core::prelude::*;

/// How long the wait task lets the readers flush after the child is reaped
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Raw output of the daemon process, consumed by the daemon handle only
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutput {
    Stdout(String),
    Stderr(String),
    /// Emitted exactly once, after the child has been reaped
    Exited { code: Option<i32> },
}

/// What to launch and where
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Environment variable pointing the daemon at its repository
    pub repo_env: (String, PathBuf),
}

/// Manages a running daemon child process.
///
/// The `Child` is moved into a dedicated `wait_for_exit` task so the real
/// exit code is captured and reported as `ProcessOutput::Exited`.
/// `DaemonProcess` keeps the PID for signalling, a kill channel for
/// force-kill, and an atomic exit flag plus [`Notify`] for synchronous and
/// async exit checks.
pub struct DaemonProcess {
    pid: Option<u32>,
    /// Consumed on first use (or on drop)
    kill_tx: Option<oneshot::Sender<()>>,
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
}

impl DaemonProcess {
    /// Spawn the daemon and start its reader and wait tasks
    pub fn spawn(spec: &LaunchSpec, output_tx: mpsc::Sender<ProcessOutput>) -> Result<Self> {
        info!(
            "Spawning daemon: {} {}",
            spec.binary.display(),
            spec.args.join(" ")
        );

        let (env_key, env_value) = &spec.repo_env;
        let mut child = Command::new(&spec.binary)
            .args(&spec.args)
            .env(env_key, env_value)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::binary_not_found(
                        spec.binary
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        spec.binary.parent().unwrap_or(Path::new("")),
                    )
                } else {
                    Error::process_spawn(e.to_string())
                }
            })?;

        let pid = child.id();
        info!("Daemon process started with PID: {:?}", pid);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::process_spawn("stdout was not captured"))?;
        let stdout_task = tokio::spawn(Self::stdout_reader(stdout, output_tx.clone()));

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::process_spawn("stderr was not captured"))?;
        let stderr_task = tokio::spawn(Self::stderr_reader(stderr, output_tx.clone()));

        Ok(Self::watch(child, pid, vec![stdout_task, stderr_task], output_tx))
    }

    /// Hand `child` to a wait task and build the controlling handle
    fn watch(
        child: Child,
        pid: Option<u32>,
        readers: Vec<JoinHandle<()>>,
        output_tx: mpsc::Sender<ProcessOutput>,
    ) -> Self {
        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            readers,
            output_tx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Self {
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        }
    }

    /// Background task: owns `child`, waits for it to exit, emits `ProcessOutput::Exited`.
    ///
    /// Ends either when the daemon exits on its own (including after SIGINT)
    /// or when `kill_rx` fires and the child is force-killed. Reader output is
    /// drained first so `Exited` is the last thing the handle sees.
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        readers: Vec<JoinHandle<()>>,
        output_tx: mpsc::Sender<ProcessOutput>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Daemon process exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for daemon process: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, force-killing daemon process");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill daemon process: {}", e);
                }
                match child.wait().await {
                    Ok(status) => {
                        info!("Daemon process killed, exit status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        let drained = tokio::time::timeout(READER_DRAIN_TIMEOUT, async {
            for reader in readers {
                let _ = reader.await;
            }
        })
        .await;
        if drained.is_err() {
            debug!("Output readers still open after exit, not waiting for them");
        }

        // has_exited() must be true before anyone observes the Exited output.
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        debug!("Sending ProcessOutput::Exited {{ code: {:?} }}", code);
        let _ = output_tx.send(ProcessOutput::Exited { code }).await;
    }

    async fn stdout_reader(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<ProcessOutput>) {
        read_lines(stdout, "stdout", tx, ProcessOutput::Stdout).await;
    }

    async fn stderr_reader(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<ProcessOutput>) {
        read_lines(stderr, "stderr", tx, ProcessOutput::Stderr).await;
    }

    /// Ask the daemon to shut down gracefully.
    ///
    /// Sends SIGINT on unix, which the daemon handles by closing its
    /// repository and exiting. Elsewhere this falls back to a force-kill.
    /// Returns immediately; exit is reported through `ProcessOutput::Exited`.
    pub fn interrupt(&mut self) -> Result<()> {
        if self.has_exited() {
            debug!("Daemon already exited, nothing to interrupt");
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let Some(pid) = self.pid else {
                warn!("Daemon PID unknown, force killing instead of SIGINT");
                return self.force_kill();
            };

            info!("Sending SIGINT to daemon (PID: {})", pid);
            let raw = i32::try_from(pid)
                .map_err(|_| Error::daemon_process(format!("PID {} out of range", pid)))?;
            kill(Pid::from_raw(raw), Signal::SIGINT)
                .map_err(|e| Error::daemon_process(format!("Failed to send SIGINT: {}", e)))
        }

        #[cfg(not(unix))]
        {
            warn!("Graceful interrupt not supported on this platform, force killing");
            self.force_kill()
        }
    }

    /// Force kill the process by signalling the wait task.
    pub fn force_kill(&mut self) -> Result<()> {
        warn!("Force killing daemon process via kill channel");
        if let Some(tx) = self.kill_tx.take() {
            // The wait task may already be gone.
            let _ = tx.send(());
        }
        Ok(())
    }

    /// Wait until the wait task has reaped the child
    pub async fn wait(&self) {
        // Create the future before checking the flag so a notification
        // between the check and the await is not lost.
        let notified = self.exit_notify.notified();
        if self.has_exited() {
            return;
        }
        notified.await;
    }

    /// Non-blocking check backed by the flag the wait task sets
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }
}

/// Forward every line of `stream` until EOF.
///
/// Lines are split on raw `\n` bytes and decoded lossily, so output that is
/// not valid UTF-8 (a Latin-1 path, say) is still delivered and the pipe is
/// never abandoned while the daemon is writing to it.
async fn read_lines<S>(
    stream: S,
    name: &'static str,
    tx: mpsc::Sender<ProcessOutput>,
    wrap: fn(String) -> ProcessOutput,
) where
    S: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read daemon {}: {}", name, e);
                break;
            }
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        trace!("{}: {}", name, line);

        if tx.send(wrap(line)).await.is_err() {
            debug!("{} channel closed", name);
            break;
        }
    }

    debug!("{} reader finished", name);
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("DaemonProcess dropped while process may still be running");
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) on the Child is the final safety net.
        debug!("DaemonProcess dropped");
    }
}
