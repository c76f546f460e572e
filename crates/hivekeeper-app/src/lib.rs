//! # hivekeeper-app - Lifecycle Supervision
//!
//! Everything above the daemon process: the lifecycle state machine, event
//! fan-out to observers, relay bootstrap, control-plane queries, and the
//! [`HostSupervisor`] that ties them to a [`hivekeeper_daemon::DaemonHandle`].
//!
//! ## Public API
//!
//! ### Supervision
//! - [`HostSupervisor`] - Configure, start and stop the daemon; register observers
//! - [`RemoteClient`] - Event-stream consumer with an RPC handle gated on readiness
//! - [`QueryResponder`] / [`Query`] - `is-service-started` and `get-service-status`
//!
//! ### Events
//! - [`Observer`] - Receives every committed [`hivekeeper_core::ServiceEvent`]
//! - [`ChannelObserver`], [`FnObserver`] - Ready-made observers
//!
//! ### Bootstrap
//! - [`Bootstrapper`] / [`BootstrapReport`] - One concurrent pass over the relay list
//!
//! ### Configuration
//! - [`config::Settings`] - `config.toml` contents
//! - [`config::load_user_settings()`], [`config::init_config_file()`]

pub mod bootstrap;
pub mod broadcaster;
pub mod config;
pub mod lifecycle;
pub mod observers;
pub mod query;
pub mod remote;
pub mod signals;
pub mod supervisor;

pub use bootstrap::{BootstrapReport, Bootstrapper};
pub use broadcaster::{EventBroadcaster, Observer, ObserverToken};
pub use lifecycle::{LifecycleMachine, Transition};
pub use observers::{ChannelObserver, FnObserver};
pub use query::{Query, QueryResponder, QueryResponse};
pub use remote::RemoteClient;
pub use signals::{spawn_signal_handler, ShutdownSignal};
pub use supervisor::HostSupervisor;
