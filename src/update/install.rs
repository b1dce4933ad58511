//! Atomic replacement of the running executable
//!
//! ```text
//! <exe>       ──rename──► <exe>.old   (backup)
//! <download>  ──rename──► <exe>       (restore backup if this fails)
//! <exe>.old   ──remove──► after the grace delay, on its own task
//! ```
//!
//! A download outside the executable's directory is first copied into a
//! staging file next to it, so both renames stay on one filesystem.

use super::download::{PendingUpdate, TEMP_PREFIX};
use super::error::{Result, UpdateError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;
use tokio::task::{self, JoinHandle};
use tracing::{info, warn};

pub const BACKUP_SUFFIX: &str = ".old";
pub const BACKUP_GRACE: Duration = Duration::from_secs(5);
const WRITE_TEST_PREFIX: &str = ".mac2mqtt-write-test-";

#[derive(Debug, Clone)]
enum Target {
    RunningExecutable,
    Path(PathBuf),
}

/// Result of a successful installation
#[derive(Debug)]
pub struct InstallReport {
    pub target: PathBuf,
    pub backup: PathBuf,
    /// Removes the backup once the grace delay has passed
    pub cleanup: JoinHandle<()>,
}

#[derive(Debug, Clone)]
pub struct Installer {
    target: Target,
    grace: Duration,
}

impl Installer {
    /// Replaces whatever binary this process was started from
    pub fn for_running_executable() -> Self {
        Self {
            target: Target::RunningExecutable,
            grace: BACKUP_GRACE,
        }
    }

    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::Path(path.into()),
            grace: BACKUP_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Absolute target path with symlinks resolved
    pub fn resolve_target(&self) -> Result<PathBuf> {
        let path = match &self.target {
            Target::RunningExecutable => std::env::current_exe().map_err(UpdateError::Executable)?,
            Target::Path(path) => path.clone(),
        };
        std::fs::canonicalize(&path).map_err(UpdateError::Executable)
    }

    pub async fn install(&self, pending: PendingUpdate) -> Result<InstallReport> {
        let target = self.resolve_target()?;
        let backup = backup_path(&target);
        info!("Replacing binary at {}", target.display());

        let blocking_target = target.clone();
        let blocking_backup = backup.clone();
        task::spawn_blocking(move || replace(pending, &blocking_target, &blocking_backup))
            .await??;

        info!(
            "Binary replaced successfully, backup saved to {}",
            backup.display()
        );

        let cleanup = tokio::spawn(remove_backup(backup.clone(), self.grace));
        Ok(InstallReport {
            target,
            backup,
            cleanup,
        })
    }
}

/// `<path>.old`, appended to the full file name
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> Result<&Path> {
    path.parent().ok_or_else(|| {
        UpdateError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ))
    })
}

pub fn check_write_permission(dir: &Path) -> Result<()> {
    tempfile::Builder::new()
        .prefix(WRITE_TEST_PREFIX)
        .tempfile_in(dir)
        .map(drop)
        .map_err(|source| UpdateError::Permission {
            dir: dir.to_path_buf(),
            source,
        })
}

/// Copies the download next to `target` unless it already lives there.
fn stage(pending: PendingUpdate, target_dir: &Path) -> Result<TempPath> {
    let same_dir = pending
        .path()
        .parent()
        .and_then(|p| std::fs::canonicalize(p).ok())
        .is_some_and(|p| p == target_dir);
    if same_dir {
        return Ok(pending.into_temp_path());
    }

    let staged = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(target_dir)?
        .into_temp_path();
    std::fs::copy(pending.path(), &staged)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&staged, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(staged)
}

fn replace(pending: PendingUpdate, target: &Path, backup: &Path) -> Result<()> {
    let target_dir = parent_dir(target)?;
    check_write_permission(target_dir)?;
    let staged = stage(pending, target_dir)?;

    std::fs::rename(target, backup).map_err(UpdateError::Backup)?;

    if let Err(e) = staged.persist(target) {
        warn!("Failed to move new binary, restoring backup: {}", e.error);
        return match std::fs::rename(backup, target) {
            Ok(()) => Err(UpdateError::Install(e.error)),
            Err(restore) => Err(UpdateError::Restore {
                source: e.error,
                restore,
            }),
        };
    }
    Ok(())
}

async fn remove_backup(backup: PathBuf, grace: Duration) {
    tokio::time::sleep(grace).await;
    match tokio::fs::remove_file(&backup).await {
        Ok(()) => info!("Cleaned up backup file {}", backup.display()),
        Err(e) => info!(
            "Note: Could not remove backup file {}: {}",
            backup.display(),
            e
        ),
    }
}
