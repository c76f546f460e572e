//! Domain event definitions

use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────
// Lifecycle State
// ─────────────────────────────────────────────────────────

/// Supervised phase of the daemon's life.
///
/// `Idle` is the only initial state. `Stopping` and `Failed` are terminal
/// until the next `start()`; there is no separate "stopped" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    #[default]
    Idle = 0,
    Starting = 1,
    Started = 2,
    Upgrading = 3,
    Stopping = 4,
    Failed = 5,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 6] = [
        LifecycleState::Idle,
        LifecycleState::Starting,
        LifecycleState::Started,
        LifecycleState::Upgrading,
        LifecycleState::Stopping,
        LifecycleState::Failed,
    ];

    /// Encode for storage in an atomic cell
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode from an atomic cell. Unknown values map to `Failed`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Idle,
            1 => LifecycleState::Starting,
            2 => LifecycleState::Started,
            3 => LifecycleState::Upgrading,
            4 => LifecycleState::Stopping,
            _ => LifecycleState::Failed,
        }
    }

    /// State reached after `event` is committed while in `self`.
    ///
    /// Total over every (state, event) pair: lifecycle events move to a
    /// fixed state regardless of the current one, `StatusUpdate` carries its
    /// own target, and download reports leave the state untouched.
    pub fn after(self, event: &ServiceEvent) -> LifecycleState {
        match event {
            ServiceEvent::ServiceStarting => LifecycleState::Starting,
            ServiceEvent::ServiceStarted => LifecycleState::Started,
            ServiceEvent::UpgradingBinary => LifecycleState::Upgrading,
            ServiceEvent::ServiceStopping => LifecycleState::Stopping,
            ServiceEvent::ServiceFailed => LifecycleState::Failed,
            ServiceEvent::StatusUpdate { state } => *state,
            ServiceEvent::DownloadProgress(_) | ServiceEvent::DownloadError { .. } => self,
        }
    }

    /// Whether a fresh `start()` may be accepted from this state
    pub fn accepts_start(self) -> bool {
        matches!(
            self,
            LifecycleState::Idle | LifecycleState::Failed | LifecycleState::Stopping
        )
    }

    /// Whether the daemon process is expected to be alive in this state
    pub fn is_active(self) -> bool {
        matches!(
            self,
            LifecycleState::Starting | LifecycleState::Started | LifecycleState::Upgrading
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Started => "started",
            LifecycleState::Upgrading => "upgrading",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────
// Download Progress
// ─────────────────────────────────────────────────────────

/// Bytes fetched so far while downloading the daemon binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub completed: u64,
    /// Zero when the server did not announce a content length
    pub total: u64,
}

impl DownloadProgress {
    pub fn new(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }
}

// ─────────────────────────────────────────────────────────
// Service Event
// ─────────────────────────────────────────────────────────

/// Lifecycle and progress notifications pushed to observers.
///
/// Raw daemon output never reaches observers; the daemon handle translates
/// everything into one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServiceEvent {
    ServiceStarting,
    ServiceStarted,
    UpgradingBinary,
    ServiceStopping,
    ServiceFailed,
    StatusUpdate { state: LifecycleState },
    DownloadProgress(DownloadProgress),
    DownloadError { message: String },
}

impl ServiceEvent {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarting => "service_starting",
            Self::ServiceStarted => "service_started",
            Self::UpgradingBinary => "upgrading_binary",
            Self::ServiceStopping => "service_stopping",
            Self::ServiceFailed => "service_failed",
            Self::StatusUpdate { .. } => "status_update",
            Self::DownloadProgress(_) => "download_progress",
            Self::DownloadError { .. } => "download_error",
        }
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        match self {
            Self::ServiceStarting => "Daemon starting".to_string(),
            Self::ServiceStarted => "Daemon started".to_string(),
            Self::UpgradingBinary => "Daemon binary upgrading".to_string(),
            Self::ServiceStopping => "Daemon stopping".to_string(),
            Self::ServiceFailed => "Daemon failed".to_string(),
            Self::StatusUpdate { state } => format!("Daemon status: {}", state),
            Self::DownloadProgress(p) => {
                format!("Daemon download progress: {} / {}", p.completed, p.total)
            }
            Self::DownloadError { message } => format!("Daemon download error: {}", message),
        }
    }

    pub fn download_error(message: impl Into<String>) -> Self {
        Self::DownloadError {
            message: message.into(),
        }
    }

    pub fn status(state: LifecycleState) -> Self {
        Self::StatusUpdate { state }
    }
}
