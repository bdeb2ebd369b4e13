use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Mod loader a modpack runs on. Parsed case-insensitively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LoaderType {
    #[default]
    Vanilla,
    Forge,
    Fabric,
}

impl std::fmt::Display for LoaderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderType::Vanilla => write!(f, "vanilla"),
            LoaderType::Forge => write!(f, "forge"),
            LoaderType::Fabric => write!(f, "fabric"),
        }
    }
}

impl FromStr for LoaderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "vanilla" | "none" => Ok(LoaderType::Vanilla),
            "forge" | "minecraftforge" => Ok(LoaderType::Forge),
            "fabric" => Ok(LoaderType::Fabric),
            other => Err(format!("unknown mod loader '{}'", other)),
        }
    }
}

impl Serialize for LoaderType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LoaderType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(LoaderType::Vanilla),
            Some(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A modpack as seen by the launcher.
///
/// Two provenances share this shape: a catalog entry from a repository
/// (`install_path` is `None`) and an installed instance reconstructed from
/// its `manifest.json` (`install_path` points at the instance directory).
///
/// Server and legacy manifests spell several fields differently
/// (`mc_versions`, `modloader`, `download_url`, ...); the aliases below fold
/// them into this single shape when parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModpackDescriptor {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version", deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(
        default,
        alias = "mc_versions",
        alias = "minecraft_versions",
        alias = "mcVersions"
    )]
    pub minecraft_versions: Vec<String>,
    #[serde(default, alias = "loader_type", alias = "modloader", alias = "modLoader")]
    pub loader_type: LoaderType,
    #[serde(
        default,
        alias = "loader_version",
        alias = "modloader_version",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub loader_version: Option<String>,
    #[serde(default, alias = "mods", alias = "mod_entries")]
    pub mod_entries: Vec<ModEntry>,
    #[serde(
        default,
        rename = "downloadURL",
        alias = "download_url",
        alias = "downloadUrl",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,
    #[serde(
        default,
        alias = "file_hash",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_hash: Option<String>,
    #[serde(
        default,
        alias = "file_size",
        alias = "fileSize",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_size_bytes: Option<u64>,
    #[serde(default, alias = "icon_path", skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    #[serde(default, alias = "install_path", skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
    /// Catalog this descriptor came from, set by repository sync.
    #[serde(default, alias = "repository_id", skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
}

fn default_name() -> String {
    "Unknown Pack".into()
}

fn default_version() -> String {
    "1.0.0".into()
}

impl ModpackDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            author: String::new(),
            description: String::new(),
            minecraft_versions: Vec::new(),
            loader_type: LoaderType::Vanilla,
            loader_version: None,
            mod_entries: Vec::new(),
            download_url: None,
            file_hash: None,
            file_size_bytes: None,
            icon_path: None,
            install_path: None,
            repository_id: None,
        }
    }

    /// `true` only when `install_path` is set and that directory exists.
    pub fn is_installed(&self) -> bool {
        self.install_path
            .as_deref()
            .map(|p| p.is_dir())
            .unwrap_or(false)
    }

    /// The game version the pack is installed against: the first listed one.
    pub fn primary_minecraft_version(&self) -> Option<&str> {
        self.minecraft_versions.first().map(String::as_str)
    }

    pub fn supports_minecraft_version(&self, version: &str) -> bool {
        self.minecraft_versions.iter().any(|v| v == version)
    }

    /// Case-insensitive substring match over name, description and author.
    /// An empty query matches everything.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
            || self.author.to_lowercase().contains(&query)
    }

    pub fn find_mod(&self, mod_id: &str) -> Option<&ModEntry> {
        self.mod_entries.iter().find(|m| m.id == mod_id)
    }
}

/// A single mod referenced by a modpack manifest.
///
/// Older manifests only list `{name, filename, version, mc_versions}` for
/// jars shipped inside the archive; those parse with an empty download URL
/// and an id taken from the name or file stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawModEntry")]
pub struct ModEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    pub compatible_minecraft_versions: Vec<String>,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    pub dependencies: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModEntry {
    #[serde(default, deserialize_with = "string_or_number_or_empty")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "string_or_number_or_empty")]
    version: String,
    #[serde(
        default,
        alias = "mc_versions",
        alias = "compatible_minecraft_versions",
        alias = "minecraftVersions"
    )]
    compatible_minecraft_versions: Vec<String>,
    #[serde(
        default,
        rename = "downloadURL",
        alias = "download_url",
        alias = "downloadUrl",
        deserialize_with = "string_or_number_or_empty"
    )]
    download_url: String,
    #[serde(
        default,
        alias = "file_name",
        alias = "filename",
        deserialize_with = "empty_as_none"
    )]
    file_name: Option<String>,
    #[serde(default, alias = "file_hash", deserialize_with = "empty_as_none")]
    file_hash: Option<String>,
    #[serde(default, alias = "file_size")]
    file_size_bytes: Option<u64>,
    #[serde(default)]
    dependencies: Vec<String>,
}

impl TryFrom<RawModEntry> for ModEntry {
    type Error = String;

    fn try_from(raw: RawModEntry) -> Result<Self, Self::Error> {
        let file_stem = raw
            .file_name
            .as_deref()
            .and_then(|f| Path::new(f).file_stem())
            .map(|s| s.to_string_lossy().into_owned());
        let id = [Some(raw.id), Some(raw.name.clone()), file_stem]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
            .ok_or("mod entry has no id, name or file name")?;

        Ok(ModEntry {
            name: if raw.name.trim().is_empty() { id.clone() } else { raw.name },
            id,
            version: raw.version,
            compatible_minecraft_versions: raw.compatible_minecraft_versions,
            download_url: raw.download_url,
            file_name: raw.file_name,
            file_hash: raw.file_hash,
            file_size_bytes: raw.file_size_bytes,
            dependencies: raw.dependencies,
        })
    }
}

impl ModEntry {
    pub fn is_compatible_with(&self, minecraft_version: &str) -> bool {
        self.compatible_minecraft_versions
            .iter()
            .any(|v| v == minecraft_version)
    }

    /// File name inside `mods/`: the declared one, else the last URL path
    /// segment, else `<id>.jar`. Never contains a path separator.
    pub fn resolved_file_name(&self) -> String {
        let candidate = self.file_name.clone().unwrap_or_else(|| {
            let without_query = self.download_url.split(['?', '#']).next().unwrap_or("");
            without_query
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        });

        let base = candidate
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        if base.is_empty() || base == "." || base == ".." {
            format!("{}.jar", self.id)
        } else {
            base
        }
    }
}

// ── Field normalization helpers ─────────────────────────

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn string_or_number_or_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_and_local_field_names_normalize_to_one_shape() {
        let server = r#"{
            "id": 42,
            "name": "Sky Pack",
            "mc_versions": ["1.20.1"],
            "modloader": "Forge",
            "loader_version": "47.2.0",
            "download_url": "/files/sky.zip",
            "file_hash": "",
            "file_size": 1024
        }"#;
        let local = r#"{
            "id": "42",
            "name": "Sky Pack",
            "minecraftVersions": ["1.20.1"],
            "loaderType": "forge",
            "loaderVersion": "47.2.0",
            "downloadURL": "/files/sky.zip",
            "fileSizeBytes": 1024
        }"#;

        let a: ModpackDescriptor = serde_json::from_str(server).unwrap();
        let b: ModpackDescriptor = serde_json::from_str(local).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id, "42");
        assert_eq!(a.loader_type, LoaderType::Forge);
        assert_eq!(a.file_hash, None);
    }

    #[test]
    fn missing_loader_defaults_to_vanilla() {
        let d: ModpackDescriptor = serde_json::from_str(r#"{"id": "p", "loader_type": null}"#).unwrap();
        assert_eq!(d.loader_type, LoaderType::Vanilla);
        assert_eq!(d.name, "Unknown Pack");
        assert_eq!(d.version, "1.0.0");
    }

    #[test]
    fn unknown_loader_is_rejected() {
        let err = serde_json::from_str::<ModpackDescriptor>(r#"{"id": "p", "modloader": "rift"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("rift"));
    }

    #[test]
    fn is_installed_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ModpackDescriptor::new("p", "P", "1");
        assert!(!d.is_installed());

        d.install_path = Some(dir.path().join("missing"));
        assert!(!d.is_installed());

        d.install_path = Some(dir.path().to_path_buf());
        assert!(d.is_installed());
    }

    #[test]
    fn query_matches_name_description_and_author_case_insensitively() {
        let mut d = ModpackDescriptor::new("p", "Sky Factory", "1");
        d.author = "Bacon".into();
        d.description = "Start on a tree".into();

        assert!(d.matches_query("sky"));
        assert!(d.matches_query("BACON"));
        assert!(d.matches_query("tree"));
        assert!(d.matches_query(""));
        assert!(!d.matches_query("ocean"));
    }

    #[test]
    fn mod_file_name_falls_back_to_url_and_strips_paths() {
        let json = r#"{"id": "jei", "download_url": "https://cdn.example/mods/jei-15.2.jar?token=x"}"#;
        let m: ModEntry = serde_json::from_str(json).unwrap();
        assert_eq!(m.resolved_file_name(), "jei-15.2.jar");

        let mut evil = m.clone();
        evil.file_name = Some("../../escape.jar".into());
        assert_eq!(evil.resolved_file_name(), "escape.jar");

        let mut bare = m;
        bare.download_url = "https://cdn.example/".into();
        assert_eq!(bare.resolved_file_name(), "jei.jar");
    }

    #[test]
    fn bundled_mod_entries_without_url_or_id_parse() {
        let json = r#"{
            "id": "legacy",
            "name": "Legacy Pack",
            "mc_versions": ["1.20.1"],
            "mods": [
                {"name": "Sodium", "filename": "sodium.jar", "version": "Unknown", "mc_versions": ["1.20.1"]},
                {"filename": "lithium-0.11.jar", "version": "Unknown"}
            ]
        }"#;
        let pack: ModpackDescriptor = serde_json::from_str(json).unwrap();

        let sodium = &pack.mod_entries[0];
        assert_eq!(sodium.id, "Sodium");
        assert_eq!(sodium.download_url, "");
        assert_eq!(sodium.resolved_file_name(), "sodium.jar");
        assert!(sodium.is_compatible_with("1.20.1"));

        let lithium = &pack.mod_entries[1];
        assert_eq!(lithium.id, "lithium-0.11");
        assert_eq!(lithium.name, "lithium-0.11");

        let written = serde_json::to_string(&pack).unwrap();
        let reread: ModpackDescriptor = serde_json::from_str(&written).unwrap();
        assert_eq!(reread, pack);
    }

    #[test]
    fn mod_entry_without_any_identity_is_rejected() {
        assert!(serde_json::from_str::<ModEntry>(r#"{"version": "1.0"}"#).is_err());
    }
}
