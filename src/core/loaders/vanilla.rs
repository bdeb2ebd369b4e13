use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::error::LauncherResult;
use crate::core::version::{VersionJson, VersionManifest};

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};

/// Installs a base game version: version JSON, client jar and the libraries
/// allowed on this OS, all into the shared directories.
pub struct VanillaInstaller;

impl VanillaInstaller {
    async fn resolve_version_json(&self, ctx: &InstallContext<'_>) -> LauncherResult<VersionJson> {
        let id = ctx.minecraft_version;

        if let Some(saved) = VersionJson::load_saved(ctx.versions_dir, id).await? {
            debug!("Using saved version JSON for {}", id);
            return Ok(saved);
        }

        let manifest = VersionManifest::fetch(ctx.http_client, &ctx.endpoints.version_manifest).await?;
        let entry = manifest.require_version(id)?;
        let (version_json, raw_json) = VersionJson::fetch(ctx.http_client, &entry.url).await?;
        VersionJson::save_to(&raw_json, ctx.versions_dir, id).await?;
        Ok(version_json)
    }
}

#[async_trait]
impl LoaderInstaller for VanillaInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        let id = ctx.minecraft_version;
        info!("Installing Minecraft {}", id);
        ctx.progress.report(0.0, &format!("Resolving Minecraft {}", id));

        let version_json = self.resolve_version_json(ctx).await?;

        let mut downloads = Vec::new();
        downloads.extend(version_json.client_download(ctx.versions_dir, id));
        downloads.extend(version_json.library_downloads(ctx.libs_dir));

        // Present files with a matching sha1 are skipped by the downloader.
        ctx.downloader
            .download_all(downloads, ctx.progress, ctx.cancel)
            .await?;

        info!("Minecraft {} installed", id);
        Ok(LoaderInstallResult {
            version_id: id.to_string(),
            libraries: version_json.library_names(),
            main_class: version_json.main_class,
            loader_version: None,
        })
    }
}
