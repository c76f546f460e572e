//! Configuration file parsing for hivekeeper
//!
//! Supports `<config_dir>/hivekeeper/config.toml` or an explicit path.

pub mod settings;
pub mod types;

pub use settings::{default_config_path, init_config_file, load_settings, load_user_settings};
pub use types::*;
