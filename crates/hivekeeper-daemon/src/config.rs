//! Immutable service configuration handed to the daemon handle
//!
//! A `ServiceConfig` is built once (usually from `Settings` in the app crate),
//! validated, and then shared behind an `Arc` for the lifetime of one daemon
//! run. Restarting with different values means building a new one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hivekeeper_core::prelude::*;

/// Binary name used when none is configured
pub const DEFAULT_BINARY_NAME: &str = "ipfs";

/// Environment variable the daemon reads its repository location from
pub const DEFAULT_REPO_ENV_VAR: &str = "IPFS_PATH";

/// Line the daemon prints once its API is serving requests
pub const DEFAULT_READY_MARKER: &str = "Daemon is ready";

/// Daemon config key holding the relay address list
pub const DEFAULT_RELAY_CONFIG_KEY: &str = "Bootstrap";

/// Where to fetch the daemon binary from, and which version that is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSource {
    pub url: String,
    pub version: String,
}

/// Relay bootstrap settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Key passed to the daemon's `config` RPC to obtain the relay list
    pub config_key: String,
    /// Additional relays tried after the daemon-provided ones
    pub extra_relays: Vec<String>,
    /// Upper bound for a single relay connect call
    pub connect_timeout: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            config_key: DEFAULT_RELAY_CONFIG_KEY.to_string(),
            extra_relays: Vec::new(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Everything the daemon handle needs to launch the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Directory holding (or receiving) the daemon binary
    pub bin_dir: PathBuf,
    pub binary_name: String,
    /// Daemon data repository
    pub repo_dir: PathBuf,
    pub repo_env_var: String,
    /// Launch arguments, passed verbatim and in order
    pub args: Vec<String>,
    /// Named feature toggles, rendered as `--enable-<name>` when enabled
    pub features: BTreeMap<String, bool>,
    /// Arguments used to initialise a fresh repository
    pub init_args: Vec<String>,
    pub ready_marker: String,
    pub download: Option<DownloadSource>,
    pub bootstrap: BootstrapConfig,
}

impl ServiceConfig {
    pub fn new(bin_dir: impl Into<PathBuf>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            repo_dir: repo_dir.into(),
            repo_env_var: DEFAULT_REPO_ENV_VAR.to_string(),
            args: vec!["daemon".to_string()],
            features: BTreeMap::new(),
            init_args: vec!["init".to_string()],
            ready_marker: DEFAULT_READY_MARKER.to_string(),
            download: None,
            bootstrap: BootstrapConfig::default(),
        }
    }

    pub fn with_binary_name(mut self, name: impl Into<String>) -> Self {
        self.binary_name = name.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_feature(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.features.insert(name.into(), enabled);
        self
    }

    pub fn with_init_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.init_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ready_marker(mut self, marker: impl Into<String>) -> Self {
        self.ready_marker = marker.into();
        self
    }

    pub fn with_download(mut self, url: impl Into<String>, version: impl Into<String>) -> Self {
        self.download = Some(DownloadSource {
            url: url.into(),
            version: version.into(),
        });
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Full path of the managed binary inside `bin_dir`
    pub fn binary_path(&self) -> PathBuf {
        let file = if cfg!(windows) {
            format!("{}.exe", self.binary_name)
        } else {
            self.binary_name.clone()
        };
        self.bin_dir.join(file)
    }

    /// Launch arguments followed by one `--enable-<name>` per enabled feature
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(
            self.features
                .iter()
                .filter(|(_, enabled)| **enabled)
                .map(|(name, _)| format!("--enable-{}", name)),
        );
        args
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Reject configurations the handle could never launch
    pub fn validate(&self) -> Result<()> {
        if self.binary_name.trim().is_empty() {
            return Err(Error::configuration("binary name must not be empty"));
        }
        if self.binary_name.contains(|c: char| c == '/' || c == '\\') {
            return Err(Error::configuration(format!(
                "binary name '{}' must be a file name, not a path",
                self.binary_name
            )));
        }
        if self.args.is_empty() {
            return Err(Error::configuration(
                "daemon argument list must not be empty",
            ));
        }
        if !self.repo_dir.is_absolute() {
            return Err(Error::configuration(format!(
                "repository directory must be absolute: {}",
                self.repo_dir.display()
            )));
        }
        if self.repo_env_var.trim().is_empty() {
            return Err(Error::configuration(
                "repository environment variable must not be empty",
            ));
        }
        if self.ready_marker.trim().is_empty() {
            return Err(Error::configuration("ready marker must not be empty"));
        }
        if let Some(name) = self.features.keys().find(|name| name.trim().is_empty()) {
            return Err(Error::configuration(format!(
                "feature flag name must not be empty (got {:?})",
                name
            )));
        }
        if let Some(download) = &self.download {
            url::Url::parse(&download.url).map_err(|e| {
                Error::configuration(format!("invalid download url '{}': {}", download.url, e))
            })?;
            if download.version.trim().is_empty() {
                return Err(Error::configuration(
                    "download version must not be empty",
                ));
            }
        }
        if self.bootstrap.config_key.trim().is_empty() {
            return Err(Error::configuration(
                "relay config key must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServiceConfig {
        ServiceConfig::new("/opt/hive", "/tmp/node1")
    }

    #[test]
    fn test_defaults() {
        let cfg = config();
        assert_eq!(cfg.binary_name, "ipfs");
        assert_eq!(cfg.args, vec!["daemon"]);
        assert_eq!(cfg.init_args, vec!["init"]);
        assert_eq!(cfg.bootstrap.config_key, "Bootstrap");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_command_args_renders_enabled_features_in_order() {
        let cfg = config()
            .with_feature("pubsub-experiment", true)
            .with_feature("namesys-pubsub", true)
            .with_feature("gc", false);

        assert_eq!(
            cfg.command_args(),
            vec![
                "daemon",
                "--enable-namesys-pubsub",
                "--enable-pubsub-experiment"
            ]
        );
    }

    #[test]
    fn test_args_are_kept_verbatim() {
        let cfg = config().with_args(["daemon", "--migrate", "--routing=dht"]);
        assert_eq!(cfg.command_args(), vec!["daemon", "--migrate", "--routing=dht"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_binary_path() {
        let cfg = config().with_binary_name("kubo");
        assert_eq!(cfg.binary_path(), PathBuf::from("/opt/hive/kubo"));
    }

    #[test]
    fn test_validate_rejects_empty_args() {
        let cfg = config().with_args(Vec::<String>::new());
        assert!(matches!(
            cfg.validate(),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_relative_repo() {
        let cfg = ServiceConfig::new("/opt/hive", "relative/repo");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[test]
    fn test_validate_rejects_binary_path_as_name() {
        let cfg = config().with_binary_name("bin/ipfs");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_download_url() {
        let cfg = config().with_download("not a url", "0.20.0");
        assert!(cfg.validate().is_err());

        let cfg = config().with_download("https://example.org/ipfs", "  ");
        assert!(cfg.validate().is_err());

        let cfg = config().with_download("https://example.org/ipfs", "0.20.0");
        assert!(cfg.validate().is_ok());
    }
}
