use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::LauncherResult;
use crate::core::modpack::LoaderType;

use super::{
    context::InstallContext, fabric::FabricInstaller, forge::ForgeInstaller,
    vanilla::VanillaInstaller,
};

/// What an installer left in the shared `versions/` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderInstallResult {
    /// Directory name under `versions/` holding the version JSON.
    pub version_id: String,
    pub main_class: String,
    /// Resolved loader version, `None` for vanilla.
    pub loader_version: Option<String>,
    pub libraries: Vec<String>,
}

#[async_trait]
pub trait LoaderInstaller: Send + Sync {
    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<LoaderInstallResult>;
}

/// Static dispatch over the supported loaders.
pub enum Installer {
    Vanilla(VanillaInstaller),
    Fabric(FabricInstaller),
    Forge(ForgeInstaller),
}

impl Installer {
    pub fn new(loader: LoaderType) -> Self {
        match loader {
            LoaderType::Vanilla => Self::Vanilla(VanillaInstaller),
            LoaderType::Fabric => Self::Fabric(FabricInstaller),
            LoaderType::Forge => Self::Forge(ForgeInstaller),
        }
    }

    pub async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        match self {
            Installer::Vanilla(i) => i.install(ctx).await,
            Installer::Fabric(i) => i.install(ctx).await,
            Installer::Forge(i) => i.install(ctx).await,
        }
    }
}
