// ─── Version Manifest ───
// Fetches the Mojang version manifest v2 and looks up game versions in it.

use serde::Deserialize;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Top-level Mojang version manifest.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub latest: Option<LatestVersions>,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(default)]
    pub release_time: Option<String>,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    /// Fetch the manifest from `url` (normally [`VERSION_MANIFEST_URL`]).
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<Self> {
        info!("Fetching Minecraft version manifest...");

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LauncherError::LoaderApi(format!(
                "Version manifest returned HTTP {}",
                response.status()
            )));
        }
        let manifest: VersionManifest = response.json().await?;

        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Like [`find_version`](Self::find_version) but an unknown id is an error.
    pub fn require_version(&self, id: &str) -> LauncherResult<&VersionEntry> {
        self.find_version(id).ok_or_else(|| {
            LauncherError::Loader(format!("Minecraft version {} not found in manifest", id))
        })
    }

    pub fn releases(&self) -> impl Iterator<Item = &VersionEntry> {
        self.versions.iter().filter(|v| v.version_type == "release")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "latest": { "release": "1.20.4", "snapshot": "24w03a" },
        "versions": [
            { "id": "24w03a", "type": "snapshot", "url": "https://example.com/24w03a.json" },
            {
                "id": "1.20.4",
                "type": "release",
                "releaseTime": "2023-12-07T08:00:00+00:00",
                "url": "https://example.com/1.20.4.json",
                "sha1": "abc123"
            }
        ]
    }"#;

    #[test]
    fn deserialize_manifest() {
        let manifest: VersionManifest = serde_json::from_str(MANIFEST).unwrap();
        let entry = manifest.find_version("1.20.4").unwrap();
        assert_eq!(entry.version_type, "release");
        assert_eq!(
            entry.release_time.as_deref(),
            Some("2023-12-07T08:00:00+00:00")
        );
        assert_eq!(manifest.releases().count(), 1);
        assert_eq!(manifest.latest.unwrap().release, "1.20.4");
    }

    #[test]
    fn unknown_version_is_a_loader_error() {
        let manifest: VersionManifest = serde_json::from_str(MANIFEST).unwrap();
        let err = manifest.require_version("0.0.1").unwrap_err();
        assert!(matches!(err, LauncherError::Loader(_)));
    }
}
