// ─── Update With Rollback ───
// Back up the installed instance, reinstall in place, and restore the backup
// if anything fails.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::pipeline::{ArchiveSource, ModpackInstaller, BACKUP_PREFIX};
use crate::core::error::{InstallError, InstallResult, InstallStep, LauncherError, LauncherResult};
use crate::core::modpack::ModpackDescriptor;
use crate::core::progress::ProgressReporter;
use crate::core::state::copy_dir_recursive;

/// A fresh `.backup-<dir>-<uuid>` next to the instance. Instance directory
/// names never start with a dot, so this cannot collide with one.
pub fn backup_path(install_path: &Path) -> PathBuf {
    let dir = install_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    install_path.with_file_name(format!(
        "{}{}-{}",
        BACKUP_PREFIX,
        dir,
        uuid::Uuid::new_v4().simple()
    ))
}

impl ModpackInstaller {
    /// Replace `installed` with `target`.
    ///
    /// On failure the instance directory is byte-for-byte what it was before
    /// and the error is [`InstallError::UpdateRolledBack`]. If even the
    /// restore fails the backup is left on disk and
    /// [`InstallError::RollbackFailed`] names it.
    pub async fn update(
        &self,
        installed: &ModpackDescriptor,
        target: &ModpackDescriptor,
        source: ArchiveSource,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> InstallResult<ModpackDescriptor> {
        let _guard = self.lock.try_acquire(&installed.id)?;
        let install_path = installed
            .install_path
            .clone()
            .filter(|p| p.is_dir())
            .ok_or_else(|| InstallError::NotInstalled(installed.id.clone()))?;
        let backup = backup_path(&install_path);

        info!(
            "Updating {} from {} to {}",
            installed.id, installed.version, target.version
        );
        progress.report(0.0, "Backing up current installation...");
        create_backup(&install_path, &backup)
            .await
            .map_err(InstallError::at(InstallStep::Backup))?;

        let result = match tokio::fs::remove_dir_all(&install_path).await {
            Ok(()) => {
                self.run_pipeline(target, source, &install_path, progress, cancel)
                    .await
            }
            Err(e) => Err(InstallError::at(InstallStep::Backup)(LauncherError::io(
                &install_path,
                e,
            ))),
        };

        match result {
            Ok(updated) => {
                if let Err(e) = tokio::fs::remove_dir_all(&backup).await {
                    warn!("Could not remove backup {:?}: {}", backup, e);
                }
                info!("Updated {} to {}", updated.id, updated.version);
                Ok(updated)
            }
            Err(cause) => {
                warn!("Update of {} failed, restoring backup: {}", installed.id, cause);
                if let Err(source) = restore_backup(&backup, &install_path).await {
                    error!("Rollback of {} failed: {}", installed.id, source);
                    return Err(InstallError::RollbackFailed { backup, source });
                }
                info!("Restored {} from backup", installed.id);
                Err(InstallError::UpdateRolledBack {
                    original: Box::new(installed.clone()),
                    cause: Box::new(cause),
                })
            }
        }
    }
}

async fn create_backup(install_path: &Path, backup: &Path) -> LauncherResult<()> {
    let src = install_path.to_path_buf();
    let dst = backup.to_path_buf();
    let copied = tokio::task::spawn_blocking(move || copy_dir_recursive(&src, &dst))
        .await
        .map_err(|e| LauncherError::Other(format!("backup task failed: {}", e)))?;
    if let Err(e) = copied {
        let _ = tokio::fs::remove_dir_all(backup).await;
        return Err(LauncherError::io(backup, e));
    }
    Ok(())
}

/// Drop whatever the failed attempt left and move the backup into place.
async fn restore_backup(backup: &Path, install_path: &Path) -> LauncherResult<()> {
    if tokio::fs::try_exists(install_path).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(install_path)
            .await
            .map_err(|e| LauncherError::io(install_path, e))?;
    }
    tokio::fs::rename(backup, install_path)
        .await
        .map_err(|e| LauncherError::io(install_path, e))
}
