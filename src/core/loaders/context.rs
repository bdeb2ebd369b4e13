use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::core::downloader::Downloader;
use crate::core::maven::{FABRIC_MAVEN, FORGE_MAVEN};
use crate::core::progress::ProgressReporter;
use crate::core::version::VERSION_MANIFEST_URL;

const FABRIC_META_BASE: &str = "https://meta.fabricmc.net/v2";
const FORGE_PROMOTIONS_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";

/// Where game and loader metadata is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEndpoints {
    pub version_manifest: String,
    pub fabric_meta: String,
    pub fabric_maven: String,
    pub forge_maven: String,
    pub forge_promotions: String,
}

impl Default for MetaEndpoints {
    fn default() -> Self {
        Self {
            version_manifest: VERSION_MANIFEST_URL.to_string(),
            fabric_meta: FABRIC_META_BASE.to_string(),
            fabric_maven: FABRIC_MAVEN.to_string(),
            forge_maven: FORGE_MAVEN.to_string(),
            forge_promotions: FORGE_PROMOTIONS_URL.to_string(),
        }
    }
}

impl MetaEndpoints {
    /// Every endpoint under one host, for mirrors and local test servers.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            version_manifest: format!("{}/mc/game/version_manifest_v2.json", base),
            fabric_meta: format!("{}/fabric/v2", base),
            fabric_maven: format!("{}/maven/fabric", base),
            forge_maven: format!("{}/maven/forge", base),
            forge_promotions: format!("{}/forge/promotions_slim.json", base),
        }
    }
}

/// Everything a loader installer needs for one run.
pub struct InstallContext<'a> {
    pub minecraft_version: &'a str,
    /// `None` means "pick the recommended one".
    pub loader_version: Option<&'a str>,
    pub versions_dir: &'a Path,
    pub libs_dir: &'a Path,
    pub downloader: &'a Downloader,
    pub http_client: &'a reqwest::Client,
    pub endpoints: &'a MetaEndpoints,
    pub progress: &'a ProgressReporter,
    pub cancel: &'a CancellationToken,
}
