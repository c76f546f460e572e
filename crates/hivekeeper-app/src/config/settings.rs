//! Settings loader for `<config_dir>/hivekeeper/config.toml`

use std::path::{Path, PathBuf};

use super::types::{Settings, APP_DIR};
use hivekeeper_core::prelude::*;

const CONFIG_FILENAME: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"# hivekeeper configuration
#
# Every key is optional; removing a line restores its default.

[daemon]
binary_name = "ipfs"
# Directory holding the daemon binary (default: <data dir>/hivekeeper)
# bin_dir = "/opt/hivekeeper"
# Daemon repository (default: <bin_dir>/repo)
# repo_dir = "/tmp/node1"
args = ["daemon"]
api_url = "http://127.0.0.1:5001"
rpc_timeout_ms = 30000
repo_env_var = "IPFS_PATH"
init_args = ["init"]
ready_marker = "Daemon is ready"

# Each enabled feature is passed as --enable-<name>
[daemon.features]
pubsub-experiment = true
namesys-pubsub = true

[download]
# Fetch the daemon binary when it is missing or its version differs
# url = "https://dist.example.org/ipfs/v0.20.0/ipfs"
# version = "v0.20.0"

[bootstrap]
# Daemon config key holding the relay list
config_key = "Bootstrap"
# Relays tried in addition to the daemon's own list
extra_relays = []
connect_timeout_ms = 10000
"#;

/// Default location: `<config_dir>/hivekeeper/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILENAME))
}

/// Load settings from `config_path`, falling back to defaults when the file
/// is missing or unreadable
pub fn load_settings(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Load from the explicit path if given, else from the default location
pub fn load_user_settings(explicit: Option<&Path>) -> Settings {
    match explicit {
        Some(path) => load_settings(path),
        None => match default_config_path() {
            Some(path) => load_settings(&path),
            None => {
                debug!("No platform config directory, using defaults");
                Settings::default()
            }
        },
    }
}

/// Write a commented default config to `config_path` unless one exists.
///
/// Returns whether a file was written.
pub fn init_config_file(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        debug!("Config already present at {:?}", config_path);
        return Ok(false);
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::configuration(format!("Failed to create {}: {}", dir.display(), e))
        })?;
    }

    std::fs::write(config_path, DEFAULT_CONFIG)
        .map_err(|e| Error::configuration(format!("Failed to write config.toml: {}", e)))?;

    info!("Wrote default config to {:?}", config_path);
    Ok(true)
}
