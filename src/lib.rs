//! hivekeeper library
//!
//! The binary's headless front end. Supervision itself lives in
//! `hivekeeper-app`; daemon process handling in `hivekeeper-daemon`.

pub mod headless;

pub use headless::runner::run_headless;
