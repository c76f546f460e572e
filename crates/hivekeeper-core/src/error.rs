//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
///
/// Only configuration-time errors are returned to callers of the supervisor.
/// Everything that happens after `start()` is reported through the lifecycle
/// event stream or swallowed with a log line.
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ─────────────────────────────────────────────────────────────
    // Daemon Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Daemon binary '{name}' not found in {dir} or on PATH")]
    BinaryNotFound { name: String, dir: PathBuf },

    #[error("Failed to spawn daemon process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Daemon process error: {message}")]
    DaemonProcess { message: String },

    #[error("Daemon process exited unexpectedly with code: {code:?}")]
    ProcessExit { code: Option<i32> },

    #[error("Repository initialization failed: {message}")]
    RepoInit { message: String },

    // ─────────────────────────────────────────────────────────────
    // Binary Download Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Download error: {message}")]
    Download { message: String },

    // ─────────────────────────────────────────────────────────────
    // Daemon RPC Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Daemon RPC error: {message}")]
    Rpc { message: String },

    // ─────────────────────────────────────────────────────────────
    // Observer/Signal Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Observer delivery failed: {message}")]
    ObserverDelivery { message: String },

    #[error("Signal handling error: {message}")]
    Signal { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn binary_not_found(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self::BinaryNotFound {
            name: name.into(),
            dir: dir.into(),
        }
    }

    pub fn process_spawn(reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            reason: reason.into(),
        }
    }

    pub fn daemon_process(message: impl Into<String>) -> Self {
        Self::DaemonProcess {
            message: message.into(),
        }
    }

    pub fn repo_init(message: impl Into<String>) -> Self {
        Self::RepoInit {
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
        }
    }

    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    pub fn observer_delivery(message: impl Into<String>) -> Self {
        Self::ObserverDelivery {
            message: message.into(),
        }
    }

    pub fn signal(message: impl Into<String>) -> Self {
        Self::Signal {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors are handled where they occur (logged, turned into
    /// an event) and never abort the supervisor.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Download { .. } | Error::Rpc { .. } | Error::ObserverDelivery { .. }
        )
    }

    /// Check if this error should be surfaced synchronously to the caller
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
