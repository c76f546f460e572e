//! Daemon repository initialisation

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use hivekeeper_core::prelude::*;

use crate::config::ServiceConfig;

/// A repository is usable once the daemon has written its config file
pub fn is_initialized(repo_dir: &Path) -> bool {
    repo_dir.join("config").is_file()
}

/// Initialise the repository if it has never been initialised.
///
/// Runs `<binary> <init_args...>` with the repository environment variable
/// set. An existing repository is left untouched.
pub async fn ensure_initialized(binary: &Path, config: &ServiceConfig) -> Result<()> {
    let repo_dir = config.repo_dir();

    if is_initialized(repo_dir) {
        debug!("Repository already initialised at {}", repo_dir.display());
        return Ok(());
    }

    tokio::fs::create_dir_all(repo_dir)
        .await
        .with_context(|| format!("Failed to create repository {}", repo_dir.display()))?;
    info!("Initialising daemon repository at {}", repo_dir.display());

    let output = Command::new(binary)
        .args(&config.init_args)
        .env(&config.repo_env_var, repo_dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::repo_init(format!("could not run {}: {}", binary.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        return Err(Error::repo_init(if stderr.is_empty() {
            format!("init exited with {}", output.status)
        } else {
            stderr.to_string()
        }));
    }

    debug!(
        "Repository init output: {}",
        String::from_utf8_lossy(&output.stdout).trim()
    );
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("ipfs");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_existing_repo_is_not_reinitialised() {
        let temp = tempdir().unwrap();
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("config"), "{}").unwrap();
        // Would fail if it ran.
        let binary = write_script(temp.path(), "exit 1");
        let cfg = ServiceConfig::new(temp.path(), &repo);

        ensure_initialized(&binary, &cfg).await.unwrap();
    }

    #[tokio::test]
    async fn test_init_runs_with_repo_env() {
        let temp = tempdir().unwrap();
        let repo = temp.path().join("repo");
        let binary = write_script(temp.path(), r#"[ "$1" = "init" ] && echo '{}' > "$IPFS_PATH/config""#);
        let cfg = ServiceConfig::new(temp.path(), &repo);

        assert!(!is_initialized(&repo));
        ensure_initialized(&binary, &cfg).await.unwrap();
        assert!(is_initialized(&repo));
    }

    #[tokio::test]
    async fn test_init_failure_carries_stderr() {
        let temp = tempdir().unwrap();
        let binary = write_script(temp.path(), "echo 'permission denied' >&2; exit 1");
        let cfg = ServiceConfig::new(temp.path(), temp.path().join("repo"));

        let err = ensure_initialized(&binary, &cfg).await.unwrap_err();
        assert!(matches!(err, Error::RepoInit { .. }));
        assert!(err.to_string().contains("permission denied"));
    }
}
