//! Headless mode runner - supervise the daemon until told to stop
//!
//! Starts the daemon, streams its lifecycle events to stdout, answers
//! queries typed on stdin, and on SIGINT/SIGTERM stops the daemon and waits
//! for it to exit. A second signal while waiting kills it outright.

use std::sync::Arc;

use tokio::sync::mpsc;

use hivekeeper_app::config::Settings;
use hivekeeper_app::{spawn_signal_handler, HostSupervisor, Query, ShutdownSignal};
use hivekeeper_core::prelude::*;

use super::{HeadlessEvent, NdjsonObserver};

/// Commands accepted on stdin, one per line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessCommand {
    Query(Query),
    Start,
    Stop,
    Quit,
}

impl HeadlessCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(query) = Query::from_channel(line) {
            return Some(HeadlessCommand::Query(query));
        }
        match line {
            "status" => Some(HeadlessCommand::Query(Query::Status)),
            "started" => Some(HeadlessCommand::Query(Query::IsStarted)),
            "start" => Some(HeadlessCommand::Start),
            "stop" => Some(HeadlessCommand::Stop),
            "q" | "quit" => Some(HeadlessCommand::Quit),
            _ => None,
        }
    }
}

/// Run in headless mode until a shutdown signal or `quit`
pub async fn run_headless(settings: Settings) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("hivekeeper starting in HEADLESS mode");
    info!("Daemon repository: {}", settings.repo_dir().display());
    info!("═══════════════════════════════════════════════════════");

    let supervisor = HostSupervisor::from_settings(&settings)?;
    supervisor.register(Arc::new(NdjsonObserver::stdout()));

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<HeadlessCommand>(16);
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(cmd_tx);
    });

    let (signal_tx, mut signal_rx) = mpsc::channel::<ShutdownSignal>(1);
    spawn_signal_handler(signal_tx);

    supervisor.start()?;

    let mut stdin_open = true;
    loop {
        tokio::select! {
            Some(signal) = signal_rx.recv() => {
                info!("Shutting down on {:?}", signal);
                break;
            }
            command = cmd_rx.recv(), if stdin_open => {
                match command {
                    Some(HeadlessCommand::Quit) => break,
                    Some(command) => handle_command(&supervisor, command),
                    None => {
                        debug!("Stdin closed, commands disabled");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    shutdown(&supervisor).await;
    info!("hivekeeper headless mode exiting");
    Ok(())
}

fn handle_command(supervisor: &HostSupervisor, command: HeadlessCommand) {
    match command {
        HeadlessCommand::Query(query) => {
            let answer = supervisor.queries().answer(query);
            HeadlessEvent::query_response(query.channel(), answer).emit();
        }
        HeadlessCommand::Start => {
            if let Err(e) = supervisor.start() {
                warn!("Start rejected: {}", e);
                HeadlessEvent::error(e.to_string(), e.is_fatal()).emit();
            }
        }
        HeadlessCommand::Stop => supervisor.stop(),
        HeadlessCommand::Quit => {}
    }
}

/// Stop the daemon and wait for the process to end
async fn shutdown(supervisor: &HostSupervisor) {
    supervisor.stop();

    if !supervisor.is_running() {
        return;
    }

    info!("Waiting for daemon to exit");
    let (signal_tx, mut signal_rx) = mpsc::channel::<ShutdownSignal>(1);
    spawn_signal_handler(signal_tx);

    tokio::select! {
        _ = supervisor.wait_for_exit() => info!("Daemon exited"),
        Some(_) = signal_rx.recv() => {
            // Dropping the supervisor force-kills the process.
            warn!("Second shutdown signal, killing daemon");
        }
    }
}

/// Read stdin commands and forward them (blocking; runs on its own thread)
fn spawn_stdin_reader_blocking(cmd_tx: mpsc::Sender<HeadlessCommand>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match HeadlessCommand::parse(trimmed) {
                    Some(command) => {
                        info!("Stdin: {:?}", command);
                        if cmd_tx.blocking_send(command).is_err() {
                            break;
                        }
                        if command == HeadlessCommand::Quit {
                            break;
                        }
                    }
                    None => warn!("Unknown stdin command: {}", trimmed),
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}
