// ─── Install Pipeline ───
// ExtractArchive → ReadManifest → InstallBaseGameVersion → InstallModLoader
// → MaterializeFiles → WriteManifest → Commit, built in a staging directory
// and moved into place with one rename.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::archive::extract_archive;
use super::lock::InstallLock;
use crate::core::downloader::{scan_archive, DownloadEntry, Downloader, ExpectedHash};
use crate::core::error::{InstallError, InstallResult, InstallStep, LauncherError, LauncherResult};
use crate::core::loaders::{GameProvisioner, GameTarget};
use crate::core::modpack::{find_manifest, read_manifest, write_manifest, ModpackDescriptor, MANIFEST_FILE};
use crate::core::progress::ProgressReporter;
use crate::core::state::copy_dir_recursive;

/// Content folders copied from the archive into the instance.
pub const CONTENT_DIRS: [&str; 3] = ["mods", "config", "resourcepacks"];
pub const STAGING_PREFIX: &str = ".staging-";
pub const BACKUP_PREFIX: &str = ".backup-";

/// Where the modpack archive comes from.
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    Remote {
        url: String,
        bearer_token: Option<String>,
    },
    /// An archive already on disk; it is left in place.
    Local(PathBuf),
}

/// Runs the install pipeline and owns the per-modpack lock.
pub struct ModpackInstaller {
    pub(super) instances_dir: PathBuf,
    pub(super) downloads_dir: PathBuf,
    pub(super) downloader: Arc<Downloader>,
    pub(super) provisioner: Arc<dyn GameProvisioner>,
    pub(super) lock: InstallLock,
}

/// Directory name for a modpack id: anything outside `[A-Za-z0-9._-]`
/// becomes `_` and leading dots are dropped, so no id can land on a
/// staging or backup directory.
pub fn instance_dir_name(modpack_id: &str) -> String {
    let cleaned: String = modpack_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "modpack".into()
    } else {
        cleaned.to_string()
    }
}

impl ModpackInstaller {
    pub fn new(
        instances_dir: PathBuf,
        downloads_dir: PathBuf,
        downloader: Arc<Downloader>,
        provisioner: Arc<dyn GameProvisioner>,
    ) -> Self {
        Self {
            instances_dir,
            downloads_dir,
            downloader,
            provisioner,
            lock: InstallLock::new(),
        }
    }

    pub fn lock(&self) -> &InstallLock {
        &self.lock
    }

    pub fn instances_dir(&self) -> &Path {
        &self.instances_dir
    }

    pub fn instance_dir(&self, modpack_id: &str) -> PathBuf {
        self.instances_dir.join(instance_dir_name(modpack_id))
    }

    /// Install `descriptor` as a new instance under `instances/<id>`.
    ///
    /// Nothing appears at the final path unless every step succeeds.
    pub async fn install(
        &self,
        descriptor: &ModpackDescriptor,
        source: ArchiveSource,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> InstallResult<ModpackDescriptor> {
        let _guard = self.lock.try_acquire(&descriptor.id)?;
        let final_dir = self.instance_dir(&descriptor.id);
        if final_dir.exists() {
            return Err(InstallError::at(InstallStep::Commit)(
                LauncherError::InstanceAlreadyExists(descriptor.id.clone()),
            ));
        }

        info!("Installing modpack {} {}", descriptor.id, descriptor.version);
        let installed = self
            .run_pipeline(descriptor, source, &final_dir, progress, cancel)
            .await?;
        info!("Modpack {} installed at {:?}", installed.id, final_dir);
        Ok(installed)
    }

    /// The pipeline proper, without locking. `final_dir` must not exist.
    pub(super) async fn run_pipeline(
        &self,
        descriptor: &ModpackDescriptor,
        source: ArchiveSource,
        final_dir: &Path,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> InstallResult<ModpackDescriptor> {
        let staging = self.instances_dir.join(format!(
            "{}{}-{}",
            STAGING_PREFIX,
            instance_dir_name(&descriptor.id),
            uuid::Uuid::new_v4().simple()
        ));

        let (archive, downloaded) = match &source {
            ArchiveSource::Local(path) => (path.clone(), false),
            ArchiveSource::Remote { .. } => (
                self.downloads_dir.join(format!(
                    "{}-{}.zip",
                    instance_dir_name(&descriptor.id),
                    instance_dir_name(&descriptor.version)
                )),
                true,
            ),
        };

        let result = self
            .run_steps(descriptor, &source, &archive, &staging, final_dir, progress, cancel)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove staging dir {:?}: {}", staging, e);
            }
        }
        if downloaded {
            let _ = tokio::fs::remove_file(&archive).await;
        }

        match &result {
            Ok(_) => progress.report(1.0, "Installation complete"),
            Err(e) => warn!("Install of {} failed: {}", descriptor.id, e),
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_steps(
        &self,
        descriptor: &ModpackDescriptor,
        source: &ArchiveSource,
        archive: &Path,
        staging: &Path,
        final_dir: &Path,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> InstallResult<ModpackDescriptor> {
        use InstallStep::*;

        // ── DownloadArchive ──
        check_cancel(cancel)?;
        let expected = descriptor
            .file_hash
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .map(ExpectedHash::parse)
            .transpose()
            .map_err(InstallError::at(DownloadArchive))?;
        match source {
            ArchiveSource::Remote { url, bearer_token } => {
                progress.report(0.0, &format!("Downloading {}", descriptor.name));
                let entry = DownloadEntry::new(&descriptor.id, url, archive)
                    .with_hash(expected)
                    .with_bearer(bearer_token.clone());
                self.downloader
                    .fetch(&entry, &progress.scoped(0.0, 0.1))
                    .await
                    .map_err(InstallError::at(DownloadArchive))?;
            }
            ArchiveSource::Local(path) => {
                if let Some(expected) = &expected {
                    verify_local_archive(path, expected)
                        .await
                        .map_err(InstallError::at(DownloadArchive))?;
                }
            }
        }

        // ── ScanArchive ──
        check_cancel(cancel)?;
        scan_archive(archive)
            .await
            .and_then(|verdict| verdict.into_result(archive))
            .map_err(InstallError::at(ScanArchive))?;

        // ── ExtractArchive ──
        check_cancel(cancel)?;
        progress.report(0.1, "Extracting modpack...");
        let extracted = staging.join("extracted");
        extract_archive(archive, &extracted)
            .await
            .map_err(InstallError::at(ExtractArchive))?;

        // ── ReadManifest ──
        check_cancel(cancel)?;
        progress.report(0.2, "Reading manifest...");
        let manifest_path = find_manifest(&extracted).ok_or_else(|| {
            InstallError::at(ReadManifest)(LauncherError::InvalidManifest(
                "no manifest.json in archive".into(),
            ))
        })?;
        let mut manifest = read_manifest(&manifest_path)
            .await
            .map(|m| reconcile(m, descriptor))
            .map_err(InstallError::at(ReadManifest))?;
        let content_root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| extracted.clone());
        let target = GameTarget::from_descriptor(&manifest).map_err(InstallError::at(ReadManifest))?;

        // ── InstallBaseGameVersion ──
        check_cancel(cancel)?;
        progress.report(0.3, &format!("Installing Minecraft {}...", target.minecraft_version));
        self.provisioner
            .install_base_game(&target, &progress.scoped(0.3, 0.6), cancel)
            .await
            .map_err(InstallError::at(InstallBaseGameVersion))?;

        // ── InstallModLoader ──
        check_cancel(cancel)?;
        progress.report(0.6, &format!("Installing {}...", target.loader));
        let loader = self
            .provisioner
            .install_mod_loader(&target, &progress.scoped(0.6, 0.8), cancel)
            .await
            .map_err(InstallError::at(InstallModLoader))?;
        if let Some(loader) = loader {
            if manifest.loader_version.is_none() {
                manifest.loader_version = loader.loader_version;
            }
        }

        // ── MaterializeFiles ──
        check_cancel(cancel)?;
        progress.report(0.8, "Installing modpack files...");
        let instance = staging.join("instance");
        let has_icon = copy_content(&content_root, &extracted, &instance)
            .await
            .map_err(InstallError::at(MaterializeFiles))?;
        self.download_mods(&manifest, &instance, &progress.scoped(0.8, 0.95), cancel)
            .await
            .map_err(InstallError::at(MaterializeFiles))?;

        // ── WriteManifest ──
        check_cancel(cancel)?;
        manifest.install_path = Some(final_dir.to_path_buf());
        manifest.icon_path =
            has_icon.then(|| final_dir.join("icon.png").to_string_lossy().into_owned());
        write_manifest(&instance.join(MANIFEST_FILE), &manifest)
            .await
            .map_err(InstallError::at(WriteManifest))?;

        // ── Commit ──
        check_cancel(cancel)?;
        tokio::fs::rename(&instance, final_dir)
            .await
            .map_err(|e| InstallError::at(Commit)(LauncherError::io(final_dir, e)))?;

        Ok(manifest)
    }

    /// Fetch every mod entry with a download URL into `mods/`. Files the
    /// archive already shipped are kept when they match (or carry no hash).
    async fn download_mods(
        &self,
        manifest: &ModpackDescriptor,
        instance: &Path,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let mods_dir = instance.join("mods");
        let mut entries = Vec::new();
        for m in &manifest.mod_entries {
            if m.download_url.trim().is_empty() {
                continue;
            }
            let dest = mods_dir.join(m.resolved_file_name());
            let expected = match m.file_hash.as_deref() {
                Some(h) => Some(ExpectedHash::parse(h)?),
                None if dest.is_file() => {
                    debug!("Mod {} shipped in archive, skipping download", m.id);
                    continue;
                }
                None => None,
            };
            entries.push(DownloadEntry::new(&m.id, m.download_url.trim(), dest).with_hash(expected));
        }

        if entries.is_empty() {
            return Ok(());
        }
        info!("Downloading {} mods for {}", entries.len(), manifest.id);
        self.downloader.download_all(entries, progress, cancel).await
    }
}

fn check_cancel(cancel: &CancellationToken) -> InstallResult<()> {
    if cancel.is_cancelled() {
        Err(InstallError::Cancelled)
    } else {
        Ok(())
    }
}

async fn verify_local_archive(path: &Path, expected: &ExpectedHash) -> LauncherResult<()> {
    let actual = crate::core::downloader::hash_file(path, expected.algorithm).await?;
    if expected.matches(&actual) {
        Ok(())
    } else {
        Err(LauncherError::HashMismatch {
            path: path.to_path_buf(),
            expected: expected.hex.clone(),
            actual,
        })
    }
}

/// The archive's manifest describes the content; identity and provenance
/// come from the descriptor that was asked for.
fn reconcile(mut manifest: ModpackDescriptor, requested: &ModpackDescriptor) -> ModpackDescriptor {
    if manifest.id != requested.id {
        debug!(
            "Archive manifest id {} differs from requested {}, keeping requested",
            manifest.id, requested.id
        );
        manifest.id = requested.id.clone();
    }
    if manifest.minecraft_versions.is_empty() {
        manifest.minecraft_versions = requested.minecraft_versions.clone();
    }
    manifest.repository_id = requested.repository_id.clone().or(manifest.repository_id);
    manifest.download_url = requested.download_url.clone().or(manifest.download_url);
    manifest.file_hash = requested.file_hash.clone().or(manifest.file_hash);
    manifest.file_size_bytes = requested.file_size_bytes.or(manifest.file_size_bytes);
    manifest.install_path = None;
    manifest
}

/// Copy `mods/`, `config/`, `resourcepacks/` and an icon into `instance`.
/// Returns whether an icon was copied.
async fn copy_content(content_root: &Path, extracted: &Path, instance: &Path) -> LauncherResult<bool> {
    let content_root = content_root.to_path_buf();
    let extracted = extracted.to_path_buf();
    let instance = instance.to_path_buf();

    tokio::task::spawn_blocking(move || -> LauncherResult<bool> {
        for dir in CONTENT_DIRS {
            let src = content_root.join(dir);
            let dst = instance.join(dir);
            if src.is_dir() {
                copy_dir_recursive(&src, &dst).map_err(|e| LauncherError::io(&src, e))?;
            } else {
                std::fs::create_dir_all(&dst).map_err(|e| LauncherError::io(&dst, e))?;
            }
        }

        match find_icon(&content_root).or_else(|| find_icon(&extracted)) {
            Some(icon) => {
                let dst = instance.join("icon.png");
                std::fs::copy(&icon, &dst).map_err(|e| LauncherError::io(&dst, e))?;
                Ok(true)
            }
            None => Ok(false),
        }
    })
    .await
    .map_err(|e| LauncherError::Other(format!("copy task failed: {}", e)))?
}

fn find_icon(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            name.contains("icon")
                && (name.ends_with(".png") || name.ends_with(".jpg") || name.ends_with(".jpeg"))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}
