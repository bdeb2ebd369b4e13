use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;
use crate::core::version::VersionJson;

/// Launch profile served by Fabric Meta. It inherits from the vanilla
/// version, so only loader libraries are listed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricProfile {
    pub id: Option<String>,
    pub main_class: String,
    #[serde(default)]
    pub libraries: Vec<FabricLibrary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FabricLibrary {
    pub name: String,
    pub url: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
}

/// One row of `/versions/loader/{mc}`.
#[derive(Debug, Deserialize)]
struct LoaderListing {
    loader: LoaderVersion,
}

#[derive(Debug, Deserialize)]
struct LoaderVersion {
    version: String,
    #[serde(default)]
    stable: bool,
}

pub struct FabricInstaller;

impl FabricInstaller {
    async fn get_json<T: serde::de::DeserializeOwned>(
        ctx: &InstallContext<'_>,
        url: &str,
    ) -> LauncherResult<(T, String)> {
        let resp = ctx.http_client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(LauncherError::LoaderApi(format!(
                "Fabric Meta returned {} for {}",
                resp.status(),
                url
            )));
        }
        let raw = resp.text().await?;
        Ok((serde_json::from_str(&raw)?, raw))
    }

    /// The requested loader version, or the newest stable one Fabric Meta
    /// lists for this game version (the first listed if none is stable).
    async fn resolve_loader_version(ctx: &InstallContext<'_>) -> LauncherResult<String> {
        if let Some(v) = ctx.loader_version.filter(|v| !v.trim().is_empty()) {
            return Ok(v.trim().to_string());
        }

        let url = format!(
            "{}/versions/loader/{}",
            ctx.endpoints.fabric_meta, ctx.minecraft_version
        );
        let (listing, _) = Self::get_json::<Vec<LoaderListing>>(ctx, &url).await?;
        let chosen = listing
            .iter()
            .find(|l| l.loader.stable)
            .or_else(|| listing.first())
            .map(|l| l.loader.version.clone())
            .ok_or_else(|| {
                LauncherError::Loader(format!(
                    "No Fabric loader available for Minecraft {}",
                    ctx.minecraft_version
                ))
            })?;

        info!("Using Fabric loader {} (latest stable)", chosen);
        Ok(chosen)
    }

    fn ensure_loader_artifact(libraries: &mut Vec<String>, loader_version: &str) {
        let loader_coord = format!("net.fabricmc:fabric-loader:{}", loader_version);
        if libraries.iter().any(|lib| lib == &loader_coord) {
            return;
        }
        libraries.push(loader_coord);
    }
}

#[async_trait]
impl LoaderInstaller for FabricInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        let loader_version = Self::resolve_loader_version(ctx).await?;
        info!(
            "Installing Fabric {} for Minecraft {}",
            loader_version, ctx.minecraft_version
        );
        ctx.progress.report(0.0, &format!("Installing Fabric {}", loader_version));

        let url = format!(
            "{}/versions/loader/{}/{}/profile/json",
            ctx.endpoints.fabric_meta, ctx.minecraft_version, loader_version
        );
        let (profile, raw) = Self::get_json::<FabricProfile>(ctx, &url).await?;
        if profile.main_class.is_empty() {
            return Err(LauncherError::LoaderApi(
                "Fabric profile missing mainClass".into(),
            ));
        }

        let version_id = profile.id.clone().unwrap_or_else(|| {
            format!("fabric-loader-{}-{}", loader_version, ctx.minecraft_version)
        });
        VersionJson::save_to(&raw, ctx.versions_dir, &version_id).await?;

        let mut downloads = Vec::new();
        let mut libraries = Vec::new();
        for lib in &profile.libraries {
            let artifact = match MavenArtifact::parse(&lib.name) {
                Ok(a) => a,
                Err(e) => {
                    warn!("Skipping Fabric library: {}", e);
                    continue;
                }
            };
            let repo = lib.url.as_deref().unwrap_or(&ctx.endpoints.fabric_maven);
            downloads.push(artifact.download_entry(repo, ctx.libs_dir, lib.sha1.as_deref()));
            libraries.push(lib.name.clone());
        }
        Self::ensure_loader_artifact(&mut libraries, &loader_version);

        ctx.downloader
            .download_all(downloads, ctx.progress, ctx.cancel)
            .await?;

        info!("Fabric {} installed as {}", loader_version, version_id);
        Ok(LoaderInstallResult {
            version_id,
            main_class: profile.main_class,
            loader_version: Some(loader_version),
            libraries,
        })
    }
}
