use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::core::downloader::{DownloadEntry, Downloader, ExpectedHash};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::{export_directory, instance_dir_name, BACKUP_PREFIX, STAGING_PREFIX};
use crate::core::modpack::{read_manifest, write_manifest, ModEntry, ModpackDescriptor, MANIFEST_FILE};
use crate::core::progress::ProgressReporter;
use crate::core::repository::model::slugify;

/// Installed modpack instances on disk.
///
/// Each instance lives in `instances/<id>/` with its `manifest.json` and the
/// `mods/`, `config/` and `resourcepacks/` folders.
pub struct InstanceManager {
    instances_dir: PathBuf,
    downloader: Arc<Downloader>,
}

impl InstanceManager {
    pub fn new(instances_dir: PathBuf, downloader: Arc<Downloader>) -> Self {
        Self {
            instances_dir,
            downloader,
        }
    }

    pub fn instances_dir(&self) -> &Path {
        &self.instances_dir
    }

    /// Every instance with a readable manifest, sorted by name. Staging
    /// and backup directories are skipped, as are corrupt manifests.
    pub async fn list_installed(&self) -> LauncherResult<Vec<ModpackDescriptor>> {
        let mut installed = Vec::new();
        if !self.instances_dir.exists() {
            return Ok(installed);
        }

        let mut entries = tokio::fs::read_dir(&self.instances_dir)
            .await
            .map_err(|e| LauncherError::io(&self.instances_dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LauncherError::io(&self.instances_dir, e))?
        {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !path.is_dir() || name.starts_with(STAGING_PREFIX) || name.starts_with(BACKUP_PREFIX) {
                continue;
            }

            let manifest_path = path.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }
            match read_manifest(&manifest_path).await {
                Ok(mut pack) => {
                    pack.install_path = Some(path);
                    installed.push(pack);
                }
                Err(e) => warn!("Skipping instance with bad manifest {:?}: {}", manifest_path, e),
            }
        }

        installed.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(installed)
    }

    pub async fn find_installed(&self, modpack_id: &str) -> LauncherResult<Option<ModpackDescriptor>> {
        Ok(self
            .list_installed()
            .await?
            .into_iter()
            .find(|p| p.id == modpack_id))
    }

    /// Delete the instance directory. `Ok(false)` when there was nothing to
    /// delete. Paths outside `instances/` are never touched.
    pub async fn uninstall(&self, descriptor: &ModpackDescriptor) -> LauncherResult<bool> {
        let dir = descriptor
            .install_path
            .clone()
            .unwrap_or_else(|| self.instances_dir.join(instance_dir_name(&descriptor.id)));

        if !dir.is_dir() {
            info!("Modpack {} was not installed", descriptor.id);
            return Ok(false);
        }
        if dir.parent() != Some(self.instances_dir.as_path()) {
            warn!("Refusing to delete {:?}: not inside {:?}", dir, self.instances_dir);
            return Ok(false);
        }

        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| LauncherError::io(&dir, e))?;
        info!("Uninstalled modpack {} from {:?}", descriptor.id, dir);
        Ok(true)
    }

    /// A new vanilla instance with no content yet. The id is the slugified
    /// name followed by a timestamp.
    pub async fn create_empty(
        &self,
        name: &str,
        version: &str,
        minecraft_versions: Vec<String>,
    ) -> LauncherResult<ModpackDescriptor> {
        let id = format!("{}_{}", slugify(name), Utc::now().timestamp());
        let dir = self.instances_dir.join(instance_dir_name(&id));
        if dir.exists() {
            return Err(LauncherError::InstanceAlreadyExists(id));
        }

        for sub in ["mods", "config", "resourcepacks"] {
            let path = dir.join(sub);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| LauncherError::io(&path, e))?;
        }

        let mut pack = ModpackDescriptor::new(id, name, version);
        pack.minecraft_versions = minecraft_versions;
        pack.install_path = Some(dir.clone());
        write_manifest(&dir.join(MANIFEST_FILE), &pack).await?;

        info!("Created empty instance {} at {:?}", pack.id, dir);
        Ok(pack)
    }

    /// Zip the whole instance directory. Returns the number of files added.
    pub async fn export(&self, descriptor: &ModpackDescriptor, zip_path: &Path) -> LauncherResult<usize> {
        let dir = installed_dir(descriptor)?;
        let count = export_directory(&dir, zip_path).await?;
        info!("Exported {} ({} files) to {:?}", descriptor.id, count, zip_path);
        Ok(count)
    }

    /// Download `mod_entry` into `mods/`, verify it, and record it in the
    /// manifest. A mod id already in the pack is refused.
    pub async fn add_mod(
        &self,
        descriptor: &ModpackDescriptor,
        mod_entry: ModEntry,
        progress: &ProgressReporter,
    ) -> LauncherResult<ModpackDescriptor> {
        let dir = installed_dir(descriptor)?;
        let manifest_path = dir.join(MANIFEST_FILE);
        let mut pack = read_manifest(&manifest_path).await?;

        if pack.find_mod(&mod_entry.id).is_some() {
            return Err(LauncherError::Other(format!(
                "mod {} is already part of {}",
                mod_entry.id, pack.id
            )));
        }
        if mod_entry.download_url.trim().is_empty() {
            return Err(LauncherError::InvalidManifest(format!(
                "mod {} has no download URL",
                mod_entry.id
            )));
        }

        let expected = mod_entry
            .file_hash
            .as_deref()
            .map(ExpectedHash::parse)
            .transpose()?;
        let dest = dir.join("mods").join(mod_entry.resolved_file_name());
        let entry = DownloadEntry::new(&mod_entry.id, mod_entry.download_url.trim(), dest)
            .with_hash(expected);
        self.downloader.fetch(&entry, progress).await?;

        info!("Added mod {} to {}", mod_entry.id, pack.id);
        pack.mod_entries.push(mod_entry);
        pack.install_path = Some(dir);
        write_manifest(&manifest_path, &pack).await?;
        Ok(pack)
    }

    /// Remove a mod's file and its manifest entry.
    pub async fn remove_mod(
        &self,
        descriptor: &ModpackDescriptor,
        mod_id: &str,
    ) -> LauncherResult<ModpackDescriptor> {
        let dir = installed_dir(descriptor)?;
        let manifest_path = dir.join(MANIFEST_FILE);
        let mut pack = read_manifest(&manifest_path).await?;

        let Some(index) = pack.mod_entries.iter().position(|m| m.id == mod_id) else {
            return Err(LauncherError::Other(format!("mod {} is not part of {}", mod_id, pack.id)));
        };
        let removed = pack.mod_entries.remove(index);

        let file = dir.join("mods").join(removed.resolved_file_name());
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(LauncherError::io(&file, e)),
        }

        pack.install_path = Some(dir);
        write_manifest(&manifest_path, &pack).await?;
        info!("Removed mod {} from {}", mod_id, pack.id);
        Ok(pack)
    }
}

/// Dependencies of `mod_entry` that no entry in `installed` provides.
pub fn missing_dependencies(mod_entry: &ModEntry, installed: &[ModEntry]) -> Vec<String> {
    mod_entry
        .dependencies
        .iter()
        .filter(|dep| !installed.iter().any(|m| &m.id == *dep))
        .cloned()
        .collect()
}

fn installed_dir(descriptor: &ModpackDescriptor) -> LauncherResult<PathBuf> {
    descriptor
        .install_path
        .clone()
        .filter(|p| p.is_dir())
        .ok_or_else(|| LauncherError::ModpackNotFound(descriptor.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(root: &Path) -> InstanceManager {
        InstanceManager::new(
            root.join("instances"),
            Arc::new(Downloader::new(reqwest::Client::new())),
        )
    }

    fn mod_entry(id: &str, url: &str, deps: &[&str]) -> ModEntry {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": id,
            "downloadURL": url,
            "dependencies": deps,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn list_skips_staging_backup_and_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        let good = mgr
            .create_empty("Beta Pack", "1.0", vec!["1.20.1".into()])
            .await
            .unwrap();

        let instances = tmp.path().join("instances");
        for (name, manifest) in [
            (".staging-x-1", r#"{"id":"staged"}"#),
            (".backup-x-1", r#"{"id":"backed_up"}"#),
            ("broken", "{not json"),
            ("zeta_backup", r#"{"id":"zeta_backup","name":"Zeta"}"#),
        ] {
            std::fs::create_dir_all(instances.join(name)).unwrap();
            std::fs::write(instances.join(name).join(MANIFEST_FILE), manifest).unwrap();
        }

        let listed = mgr.list_installed().await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![good.id.as_str(), "zeta_backup"]);
        assert!(listed[0].is_installed());
        assert!(good.id.starts_with("beta_pack_"));
    }

    #[tokio::test]
    async fn uninstall_twice_reports_false_second_time() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        let pack = mgr.create_empty("P", "1.0", Vec::new()).await.unwrap();

        assert!(mgr.uninstall(&pack).await.unwrap());
        assert!(!pack.is_installed());
        assert!(!mgr.uninstall(&pack).await.unwrap());
    }

    #[tokio::test]
    async fn uninstall_ignores_paths_outside_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("elsewhere");
        std::fs::create_dir_all(&outside).unwrap();

        let mut pack = ModpackDescriptor::new("p", "P", "1");
        pack.install_path = Some(outside.clone());
        assert!(!manager(tmp.path()).uninstall(&pack).await.unwrap());
        assert!(outside.is_dir());
    }

    #[tokio::test]
    async fn add_and_remove_mod_rewrite_manifest() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/files/sodium.jar")
            .with_body("jar-bytes")
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        let pack = mgr.create_empty("P", "1.0", Vec::new()).await.unwrap();
        let dir = pack.install_path.clone().unwrap();

        let entry = mod_entry("sodium", &format!("{}/files/sodium.jar", server.url()), &[]);
        let pack = mgr
            .add_mod(&pack, entry.clone(), &ProgressReporter::silent())
            .await
            .unwrap();
        assert_eq!(std::fs::read(dir.join("mods/sodium.jar")).unwrap(), b"jar-bytes");
        assert_eq!(
            read_manifest(&dir.join(MANIFEST_FILE)).await.unwrap().mod_entries.len(),
            1
        );

        let dup = mgr.add_mod(&pack, entry, &ProgressReporter::silent()).await;
        assert!(dup.is_err());

        let pack = mgr.remove_mod(&pack, "sodium").await.unwrap();
        assert!(pack.mod_entries.is_empty());
        assert!(!dir.join("mods/sodium.jar").exists());
    }

    #[tokio::test]
    async fn export_requires_installed_pack() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        let ghost = ModpackDescriptor::new("ghost", "Ghost", "1");
        let err = mgr.export(&ghost, &tmp.path().join("g.zip")).await.unwrap_err();
        assert!(matches!(err, LauncherError::ModpackNotFound(_)));

        let pack = mgr.create_empty("P", "1.0", Vec::new()).await.unwrap();
        let count = mgr.export(&pack, &tmp.path().join("p.zip")).await.unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn missing_dependencies_lists_absent_ids() {
        let installed = vec![mod_entry("fabric-api", "http://x/a.jar", &[])];
        let m = mod_entry("sodium", "http://x/s.jar", &["fabric-api", "indium"]);
        assert_eq!(missing_dependencies(&m, &installed), vec!["indium".to_string()]);
    }
}
