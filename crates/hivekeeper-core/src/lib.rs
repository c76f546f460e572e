//! # hivekeeper-core - Core Domain Types
//!
//! Foundation crate for hivekeeper. Provides the lifecycle state, the event
//! vocabulary pushed to observers, error handling, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Events (`events`)
//! - [`LifecycleState`] - Supervised daemon phase (Idle, Starting, Started, ...)
//! - [`ServiceEvent`] - Tagged union of lifecycle and download notifications
//! - [`DownloadProgress`] - Bytes completed / total while fetching the binary
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use hivekeeper_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{DownloadProgress, LifecycleState, ServiceEvent};
