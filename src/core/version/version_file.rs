// ─── Version File ───
// Parses a Mojang-style version JSON, evaluates OS rules for libraries and
// turns what the current platform needs into download entries.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::core::downloader::{DownloadEntry, ExpectedHash};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::modpack::manifest::write_atomic;

/// A parsed version JSON. Vanilla, Fabric profiles and Forge's embedded
/// `version.json` all share this shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionJson {
    pub id: Option<String>,
    #[serde(default)]
    pub main_class: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
}

#[derive(Debug, Deserialize)]
pub struct VersionDownloads {
    pub client: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    pub sha1: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}

// ─── Library Entry with Rules ───

#[derive(Debug, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<LibraryRule>>,
    #[serde(default)]
    pub natives: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct LibraryDownloads {
    pub artifact: Option<LibDownloadArtifact>,
    #[serde(default)]
    pub classifiers: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct LibDownloadArtifact {
    pub path: String,
    #[serde(default)]
    pub sha1: Option<String>,
    /// Forge leaves this empty for artifacts its processors generate.
    #[serde(default)]
    pub url: String,
}

// ─── OS Rule Evaluation ───

#[derive(Debug, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
}

impl LibraryEntry {
    /// Evaluate whether this library should be included for the current OS.
    ///
    /// Rules are processed top to bottom starting from "disallowed"; every
    /// rule whose OS matches (or that names no OS) overwrites the verdict.
    /// A library without rules is always allowed.
    pub fn is_allowed_for_current_os(&self) -> bool {
        let rules = match &self.rules {
            Some(r) => r,
            None => return true,
        };

        let current_os = current_os_name();
        let mut allowed = false;

        for rule in rules {
            let os_matches = match rule.os.as_ref().and_then(|os| os.name.as_deref()) {
                None => true,
                Some(name) => name == current_os,
            };

            if os_matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }

        allowed
    }

    /// Native classifier key for the current OS (`natives-linux`, ...).
    pub fn native_classifier_for_current_os(&self) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let os = current_os_name();
        natives.as_object()?.get(os)?.as_str().map(|s| {
            let arch = if cfg!(target_pointer_width = "64") {
                "64"
            } else {
                "32"
            };
            s.replace("${arch}", arch)
        })
    }

    /// Downloads this library needs on this platform: the main artifact and
    /// the matching native classifier, each checked against its sha1.
    fn download_entries(&self, libs_dir: &Path) -> Vec<DownloadEntry> {
        let mut entries = Vec::new();
        let Some(downloads) = &self.downloads else {
            return entries;
        };

        if let Some(artifact) = &downloads.artifact {
            if artifact.url.is_empty() {
                debug!("Library {} has no download url, skipping", self.name);
            } else {
                entries.push(
                    DownloadEntry::new(
                        artifact.path.clone(),
                        artifact.url.clone(),
                        libs_dir.join(&artifact.path),
                    )
                    .with_hash(artifact.sha1.clone().map(ExpectedHash::sha1)),
                );
            }
        }

        let native = self
            .native_classifier_for_current_os()
            .and_then(|key| downloads.classifiers.as_ref()?.get(&key).cloned());
        if let Some(native) = native {
            if let (Some(url), Some(path)) = (
                native.get("url").and_then(|v| v.as_str()),
                native.get("path").and_then(|v| v.as_str()),
            ) {
                let sha1 = native
                    .get("sha1")
                    .and_then(|v| v.as_str())
                    .map(ExpectedHash::sha1);
                entries.push(DownloadEntry::new(path, url, libs_dir.join(path)).with_hash(sha1));
            }
        }

        entries
    }
}

/// Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

/// `versions/<id>/`
pub fn version_dir(versions_dir: &Path, id: &str) -> PathBuf {
    versions_dir.join(id)
}

/// `versions/<id>/<id>.json`
pub fn version_json_path(versions_dir: &Path, id: &str) -> PathBuf {
    version_dir(versions_dir, id).join(format!("{}.json", id))
}

/// `versions/<id>/<id>.jar`
pub fn client_jar_path(versions_dir: &Path, id: &str) -> PathBuf {
    version_dir(versions_dir, id).join(format!("{}.jar", id))
}

impl VersionJson {
    /// Fetch and parse a version JSON, keeping the raw text for saving.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<(Self, String)> {
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let raw = response.text().await?;
        let version_json: VersionJson = serde_json::from_str(&raw)?;
        Ok((version_json, raw))
    }

    /// Read a previously saved version JSON, if there is one.
    pub async fn load_saved(versions_dir: &Path, id: &str) -> LauncherResult<Option<Self>> {
        let path = version_json_path(versions_dir, id);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LauncherError::io(path, e)),
        }
    }

    /// Save the raw version JSON as `versions/<id>/<id>.json`.
    pub async fn save_to(raw_json: &str, versions_dir: &Path, id: &str) -> LauncherResult<()> {
        write_atomic(&version_json_path(versions_dir, id), raw_json.as_bytes()).await
    }

    /// The client jar download, stored as `versions/<id>/<id>.jar`.
    pub fn client_download(&self, versions_dir: &Path, id: &str) -> Option<DownloadEntry> {
        let client = self.downloads.as_ref()?.client.as_ref()?;
        Some(
            DownloadEntry::new(
                format!("{}.jar", id),
                client.url.clone(),
                client_jar_path(versions_dir, id),
            )
            .with_hash(Some(ExpectedHash::sha1(client.sha1.clone()))),
        )
    }

    /// Downloads for every library allowed on this OS.
    pub fn library_downloads(&self, libs_dir: &Path) -> Vec<DownloadEntry> {
        let mut entries = Vec::new();
        for lib in &self.libraries {
            if !lib.is_allowed_for_current_os() {
                debug!("Skipping library (OS rule): {}", lib.name);
                continue;
            }
            entries.extend(lib.download_entries(libs_dir));
        }
        entries
    }

    /// Maven coordinates of the libraries allowed on this OS.
    pub fn library_names(&self) -> Vec<String> {
        self.libraries
            .iter()
            .filter(|lib| lib.is_allowed_for_current_os())
            .map(|lib| lib.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib(rules: Option<Vec<LibraryRule>>) -> LibraryEntry {
        LibraryEntry {
            name: "test:lib:1.0".into(),
            downloads: None,
            rules,
            natives: None,
        }
    }

    fn os_rule(action: RuleAction, name: Option<&str>) -> LibraryRule {
        LibraryRule {
            action,
            os: name.map(|n| OsRule {
                name: Some(n.to_string()),
            }),
        }
    }

    #[test]
    fn no_rules_means_allowed() {
        assert!(lib(None).is_allowed_for_current_os());
    }

    #[test]
    fn allow_only_current_os() {
        let entry = lib(Some(vec![os_rule(RuleAction::Allow, Some(current_os_name()))]));
        assert!(entry.is_allowed_for_current_os());

        let other = if current_os_name() == "linux" { "windows" } else { "linux" };
        let entry = lib(Some(vec![os_rule(RuleAction::Allow, Some(other))]));
        assert!(!entry.is_allowed_for_current_os());
    }

    #[test]
    fn disallow_current_os() {
        let entry = lib(Some(vec![
            os_rule(RuleAction::Allow, None),
            os_rule(RuleAction::Disallow, Some(current_os_name())),
        ]));
        assert!(!entry.is_allowed_for_current_os());
    }

    #[test]
    fn library_downloads_skip_urlless_and_filtered_artifacts() {
        let parsed: VersionJson = serde_json::from_value(serde_json::json!({
            "id": "1.20.1-forge-47.2.0",
            "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
            "inheritsFrom": "1.20.1",
            "libraries": [
                {
                    "name": "org.ow2.asm:asm:9.5",
                    "downloads": { "artifact": {
                        "path": "org/ow2/asm/asm/9.5/asm-9.5.jar",
                        "sha1": "dc6ea1875f4d64fbc85e1691c95b96a3d8569c90",
                        "url": "https://maven.minecraftforge.net/org/ow2/asm/asm/9.5/asm-9.5.jar"
                    }}
                },
                {
                    "name": "net.minecraftforge:forge:1.20.1-47.2.0:client",
                    "downloads": { "artifact": {
                        "path": "net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-client.jar",
                        "url": ""
                    }}
                },
                {
                    "name": "never:here:1.0",
                    "rules": [{ "action": "allow", "os": { "name": "no-such-os" } }],
                    "downloads": { "artifact": {
                        "path": "never/here/1.0/here-1.0.jar",
                        "url": "https://example.com/here.jar"
                    }}
                }
            ]
        }))
        .unwrap();

        let libs = Path::new("/libs");
        let entries = parsed.library_downloads(libs);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dest, libs.join("org/ow2/asm/asm/9.5/asm-9.5.jar"));
        assert_eq!(
            entries[0].expected_hash.as_ref().unwrap().hex,
            "dc6ea1875f4d64fbc85e1691c95b96a3d8569c90"
        );
        assert_eq!(parsed.library_names().len(), 2);
        assert!(parsed.client_download(Path::new("/versions"), "x").is_none());
    }

    #[test]
    fn client_jar_goes_to_shared_versions_dir() {
        let parsed: VersionJson = serde_json::from_value(serde_json::json!({
            "id": "1.20.4",
            "mainClass": "net.minecraft.client.main.Main",
            "downloads": { "client": { "sha1": "aa", "size": 1, "url": "https://example.com/client.jar" } }
        }))
        .unwrap();

        let entry = parsed.client_download(Path::new("/v"), "1.20.4").unwrap();
        assert_eq!(entry.dest, PathBuf::from("/v/1.20.4/1.20.4.jar"));
        assert_eq!(entry.url, "https://example.com/client.jar");
    }
}
