//! hivekeeper - lifecycle supervisor for a peer-to-peer network daemon
//!
//! This is the binary entry point. All logic lives in the libraries.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;

use hivekeeper_app::config::{default_config_path, init_config_file, load_user_settings};
use hivekeeper_core::prelude::*;

/// hivekeeper - keeps a peer-to-peer daemon running and reports its lifecycle
#[derive(Parser, Debug)]
#[command(name = "hivekeeper")]
#[command(about = "Lifecycle supervisor for a peer-to-peer network daemon", long_about = None)]
struct Args {
    /// Path to config.toml (default: <config dir>/hivekeeper/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon and stream lifecycle events to stdout as NDJSON
    Run {
        /// Daemon repository directory
        #[arg(long, value_name = "DIR")]
        repo: Option<PathBuf>,

        /// Directory holding the daemon binary
        #[arg(long, value_name = "DIR")]
        bin_dir: Option<PathBuf>,

        /// Daemon HTTP API address
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
    },

    /// Write a commented default config file if none exists
    InitConfig,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);

    match args.command.unwrap_or(Command::Run {
        repo: None,
        bin_dir: None,
        api_url: None,
    }) {
        Command::InitConfig => {
            let Some(path) = config_path else {
                return Err(eyre!("No platform config directory; pass --config explicitly"));
            };
            if init_config_file(&path)? {
                eprintln!("Wrote {}", path.display());
            } else {
                eprintln!("Config already exists at {}", path.display());
            }
            Ok(())
        }
        Command::Run {
            repo,
            bin_dir,
            api_url,
        } => {
            hivekeeper_core::logging::init()?;

            let mut settings = load_user_settings(config_path.as_deref());
            if let Some(repo) = repo {
                settings.daemon.repo_dir = Some(repo);
            }
            if let Some(bin_dir) = bin_dir {
                settings.daemon.bin_dir = Some(bin_dir);
            }
            if let Some(api_url) = api_url {
                settings.daemon.api_url = api_url;
            }

            if let Err(e) = hivekeeper::run_headless(settings).await {
                error!("Headless run failed: {}", e);
                return Err(e.into());
            }
            Ok(())
        }
    }
}
