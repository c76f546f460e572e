//! Daemon console output classification
//!
//! The daemon has no machine-readable output mode, so its stdout/stderr lines
//! are matched against the handful of messages that carry lifecycle meaning.
//! Everything else is only logged.

use std::sync::LazyLock;

use regex::Regex;

/// Printed while the daemon loads its repository
const INITIALIZING_MARKER: &str = "Initializing daemon";

/// Printed when the daemon receives SIGINT and begins shutting down
const SHUTDOWN_MARKER: &str = "Received interrupt signal, shutting down";

/// Meaningful classes of daemon output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonOutput {
    /// Repository loading has begun
    Initializing,
    /// The daemon is serving its API
    Ready,
    /// The daemon announced the address of a listener (`API`, `Gateway`, `WebUI`, ...)
    Listening { service: String, address: String },
    /// The daemon began a graceful shutdown on its own
    ShuttingDown,
    /// An error line (`Error: ...`), kept as the failure reason
    Error(String),
    /// Anything else
    Other,
}

static LISTENING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<service>[A-Za-z ]+?) (?:server )?listening on (?P<address>\S+)")
        .expect("Invalid listening pattern regex")
});

static ERROR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:error):\s*(?P<message>.+)$").expect("Invalid error pattern regex")
});

/// Classify a single line of daemon output.
///
/// `ready_marker` is configurable because daemon versions word it differently.
pub fn classify_line(line: &str, ready_marker: &str) -> DaemonOutput {
    let line = line.trim();

    if line.is_empty() {
        return DaemonOutput::Other;
    }

    if line.contains(ready_marker) {
        return DaemonOutput::Ready;
    }

    if line.starts_with(INITIALIZING_MARKER) {
        return DaemonOutput::Initializing;
    }

    if line.contains(SHUTDOWN_MARKER) {
        return DaemonOutput::ShuttingDown;
    }

    if let Some(caps) = ERROR_REGEX.captures(line) {
        return DaemonOutput::Error(caps["message"].trim().to_string());
    }

    if let Some(caps) = LISTENING_REGEX.captures(line) {
        return DaemonOutput::Listening {
            service: caps["service"].trim().to_string(),
            address: caps["address"].to_string(),
        };
    }

    DaemonOutput::Other
}
