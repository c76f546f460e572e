//! Daemon binary resolution, download and upgrade
//!
//! The managed binary lives at `<bin_dir>/<binary_name>` with its version
//! recorded next to it in `<binary_name>.version`. When a download source is
//! configured the handle installs or upgrades the binary before launching;
//! without one it falls back to whatever is on `PATH`.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use hivekeeper_core::prelude::*;
use hivekeeper_core::{DownloadProgress, ServiceEvent};

use crate::config::{DownloadSource, ServiceConfig};
use crate::emitter::SignalEmitter;

/// What has to happen before the daemon can be launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryPlan {
    /// Managed binary present and current
    Ready(PathBuf),
    /// No managed binary yet; fetch it
    Install { path: PathBuf, source: DownloadSource },
    /// Managed binary present but its recorded version differs
    Upgrade {
        path: PathBuf,
        source: DownloadSource,
        installed: Option<String>,
    },
    /// No managed binary and nothing to download; found on PATH
    OnPath(PathBuf),
}

/// Path of the version marker written next to `binary`
pub fn version_marker_path(binary: &Path) -> PathBuf {
    let mut name = binary
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".version");
    binary.with_file_name(name)
}

/// Version recorded for `binary`, if any
pub fn installed_version(binary: &Path) -> Option<String> {
    std::fs::read_to_string(version_marker_path(binary))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn write_version_marker(binary: &Path, version: &str) -> Result<()> {
    std::fs::write(version_marker_path(binary), format!("{}\n", version))?;
    Ok(())
}

/// Decide how to obtain the binary without touching the network
pub fn plan(config: &ServiceConfig) -> Result<BinaryPlan> {
    let path = config.binary_path();

    if path.is_file() {
        if let Some(source) = &config.download {
            let installed = installed_version(&path);
            if installed.as_deref() != Some(source.version.as_str()) {
                return Ok(BinaryPlan::Upgrade {
                    path,
                    source: source.clone(),
                    installed,
                });
            }
        }
        return Ok(BinaryPlan::Ready(path));
    }

    if let Some(source) = &config.download {
        return Ok(BinaryPlan::Install {
            path,
            source: source.clone(),
        });
    }

    match which::which(&config.binary_name) {
        Ok(found) => Ok(BinaryPlan::OnPath(found)),
        Err(e) => {
            debug!("'{}' not on PATH: {}", config.binary_name, e);
            Err(Error::binary_not_found(
                config.binary_name.clone(),
                config.bin_dir.clone(),
            ))
        }
    }
}

/// Make sure a launchable binary exists, emitting upgrade and download events.
///
/// A failed first install is an error (nothing to launch). A failed upgrade
/// only emits `DownloadError`; the existing binary is kept.
pub async fn prepare(config: &ServiceConfig, emitter: &SignalEmitter) -> Result<PathBuf> {
    match plan(config)? {
        BinaryPlan::Ready(path) => {
            debug!("Using managed daemon binary {}", path.display());
            Ok(path)
        }
        BinaryPlan::OnPath(path) => {
            info!("Using daemon binary from PATH: {}", path.display());
            Ok(path)
        }
        BinaryPlan::Install { path, source } => {
            info!(
                "Daemon binary missing, downloading {} from {}",
                source.version, source.url
            );
            match install(&source, &path, emitter).await {
                Ok(()) => Ok(path),
                Err(e) => {
                    emitter.emit(ServiceEvent::download_error(e.to_string()));
                    Err(e)
                }
            }
        }
        BinaryPlan::Upgrade {
            path,
            source,
            installed,
        } => {
            info!(
                "Upgrading daemon binary from {} to {}",
                installed.as_deref().unwrap_or("unknown version"),
                source.version
            );
            emitter.emit(ServiceEvent::UpgradingBinary);
            if let Err(e) = install(&source, &path, emitter).await {
                warn!("Upgrade failed, keeping existing binary: {}", e);
                emitter.emit(ServiceEvent::download_error(e.to_string()));
            }
            Ok(path)
        }
    }
}

async fn install(source: &DownloadSource, dest: &Path, emitter: &SignalEmitter) -> Result<()> {
    let bytes = download_binary(&source.url, dest, |progress| {
        emitter.emit(ServiceEvent::DownloadProgress(progress))
    })
    .await?;
    write_version_marker(dest, &source.version)
        .with_context(|| format!("Failed to record daemon version {}", source.version))?;
    info!(
        "Installed daemon {} ({} bytes) at {}",
        source.version,
        bytes,
        dunce::simplified(dest).display()
    );
    Ok(())
}

/// Stream `url` into `dest`, reporting progress after every chunk.
///
/// The body goes to a sibling `.download` file that is renamed into place
/// only once complete, so an interrupted download never leaves a truncated
/// binary behind. Returns the number of bytes written.
pub async fn download_binary<F>(url: &str, dest: &Path, mut on_progress: F) -> Result<u64>
where
    F: FnMut(DownloadProgress),
{
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| Error::download(format!("request to {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::download(format!("{} returned HTTP {}", url, status)));
    }

    let total = response.content_length().unwrap_or(0);
    let partial = {
        let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".download");
        dest.with_file_name(name)
    };

    let completed = match write_partial(response, &partial, total, &mut on_progress).await {
        Ok(completed) => completed,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    tokio::fs::rename(&partial, dest).await?;
    Ok(completed)
}

/// Write the response body to `partial`, leaving it executable once complete
async fn write_partial<F>(
    response: reqwest::Response,
    partial: &Path,
    total: u64,
    on_progress: &mut F,
) -> Result<u64>
where
    F: FnMut(DownloadProgress),
{
    let write_error =
        |e: std::io::Error| Error::download(format!("writing {} failed: {}", partial.display(), e));

    let mut file = tokio::fs::File::create(partial).await.map_err(write_error)?;
    let mut completed: u64 = 0;
    on_progress(DownloadProgress::new(completed, total));

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::download(format!("reading body failed: {}", e)))?;
        file.write_all(&chunk).await.map_err(write_error)?;
        completed += chunk.len() as u64;
        on_progress(DownloadProgress::new(completed, total));
    }

    // tokio reports a failed write on the next operation, so flush before trusting it.
    file.flush().await.map_err(write_error)?;
    drop(file);

    if total != 0 && completed != total {
        return Err(Error::download(format!(
            "incomplete download: {} of {} bytes",
            completed, total
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(partial, std::fs::Permissions::from_mode(0o755)).await?;
    }

    Ok(completed)
}
