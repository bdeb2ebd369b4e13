use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::context::{InstallContext, MetaEndpoints};
use super::installer::{Installer, LoaderInstallResult};
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::modpack::{LoaderType, ModpackDescriptor};
use crate::core::progress::ProgressReporter;

/// The game version and loader a modpack runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameTarget {
    pub minecraft_version: String,
    pub loader: LoaderType,
    pub loader_version: Option<String>,
}

impl GameTarget {
    pub fn from_descriptor(descriptor: &ModpackDescriptor) -> LauncherResult<Self> {
        let minecraft_version = descriptor
            .primary_minecraft_version()
            .map(str::to_string)
            .ok_or_else(|| {
                LauncherError::InvalidManifest(format!(
                    "modpack {} lists no Minecraft version",
                    descriptor.id
                ))
            })?;
        Ok(Self {
            minecraft_version,
            loader: descriptor.loader_type,
            loader_version: descriptor.loader_version.clone(),
        })
    }
}

/// Puts the base game and mod loader a modpack needs in place.
#[async_trait]
pub trait GameProvisioner: Send + Sync {
    async fn install_base_game(
        &self,
        target: &GameTarget,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> LauncherResult<LoaderInstallResult>;

    /// `Ok(None)` for vanilla packs.
    async fn install_mod_loader(
        &self,
        target: &GameTarget,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> LauncherResult<Option<LoaderInstallResult>>;
}

/// Provisions from Mojang, Fabric Meta and the Forge Maven into the shared
/// `versions/` and `libraries/` directories.
pub struct MojangProvisioner {
    http: reqwest::Client,
    downloader: Arc<Downloader>,
    versions_dir: PathBuf,
    libs_dir: PathBuf,
    endpoints: MetaEndpoints,
}

impl MojangProvisioner {
    pub fn new(
        http: reqwest::Client,
        downloader: Arc<Downloader>,
        versions_dir: PathBuf,
        libs_dir: PathBuf,
    ) -> Self {
        Self {
            http,
            downloader,
            versions_dir,
            libs_dir,
            endpoints: MetaEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: MetaEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn context<'a>(
        &'a self,
        target: &'a GameTarget,
        progress: &'a ProgressReporter,
        cancel: &'a CancellationToken,
    ) -> InstallContext<'a> {
        InstallContext {
            minecraft_version: &target.minecraft_version,
            loader_version: target.loader_version.as_deref(),
            versions_dir: &self.versions_dir,
            libs_dir: &self.libs_dir,
            downloader: &self.downloader,
            http_client: &self.http,
            endpoints: &self.endpoints,
            progress,
            cancel,
        }
    }
}

#[async_trait]
impl GameProvisioner for MojangProvisioner {
    async fn install_base_game(
        &self,
        target: &GameTarget,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> LauncherResult<LoaderInstallResult> {
        let ctx = self.context(target, progress, cancel);
        Installer::new(LoaderType::Vanilla).install(&ctx).await
    }

    async fn install_mod_loader(
        &self,
        target: &GameTarget,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> LauncherResult<Option<LoaderInstallResult>> {
        if target.loader == LoaderType::Vanilla {
            debug!("No mod loader for {}", target.minecraft_version);
            return Ok(None);
        }
        let ctx = self.context(target, progress, cancel);
        Installer::new(target.loader).install(&ctx).await.map(Some)
    }
}
