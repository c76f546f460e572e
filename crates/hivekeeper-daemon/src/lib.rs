//! # hivekeeper-daemon - Daemon Process Management
//!
//! Everything that touches the daemon itself: resolving or downloading its
//! binary, initialising its repository, spawning and signalling the process,
//! translating its console output into lifecycle events, and talking to its
//! RPC API once it is serving.
//!
//! Depends on [`hivekeeper_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Configuration
//! - [`ServiceConfig`] - Immutable launch configuration
//! - [`BootstrapConfig`], [`DownloadSource`] - Relay and download settings
//!
//! ### Process Management
//! - [`DaemonHandle`] - Launch, stop and watch one daemon run
//! - [`DaemonProcess`] - Spawned child with reader and wait tasks
//! - [`DaemonSignal`] / [`SignalEmitter`] - Generation-tagged events for the supervisor
//!
//! ### Output Parsing
//! - [`classify_line()`] - Classify a line of daemon console output
//!
//! ### RPC
//! - [`DaemonRpc`] - Config read and peer connect against a running daemon
//! - [`HttpRpcClient`] - HTTP implementation
//! - [`relay_list()`] / [`parse_relay_list()`] - Relay list decoding

pub mod binary;
pub mod config;
pub mod emitter;
pub mod handle;
pub mod process;
pub mod protocol;
pub mod repo;
pub mod rpc;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use binary::BinaryPlan;
pub use config::{BootstrapConfig, DownloadSource, ServiceConfig};
pub use emitter::{DaemonSignal, SignalEmitter};
pub use handle::{DaemonHandle, IdleWaiter};
pub use process::{DaemonProcess, LaunchSpec, ProcessOutput};
pub use protocol::{classify_line, DaemonOutput};
pub use rpc::{parse_relay_list, relay_list, DaemonRpc, HttpRpcClient, LocalDaemonRpc};
