use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::LauncherResult;
use crate::core::modpack::manifest::write_atomic;

pub const CONFIG_FILE: &str = "config.json";

/// Public client id of the official launcher, used when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "00000000402B5328";
pub const DEFAULT_REDIRECT_URI: &str = "https://login.microsoftonline.com/common/oauth2/nativeclient";
pub const DEFAULT_SCOPES: &str = "XboxLive.signin XboxLive.offline_access";

/// A catalog server as configured by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrustedSource {
    pub url: String,
    #[serde(default)]
    pub api_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub max_download_threads: usize,
    pub repositories: Vec<RepositoryConfig>,
    pub trusted_sources: BTreeMap<String, TrustedSource>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        let mut trusted_sources = BTreeMap::new();
        trusted_sources.insert(
            "curseforge".to_string(),
            TrustedSource {
                url: "https://www.curseforge.com".into(),
                api_endpoint: Some("https://api.curseforge.com".into()),
            },
        );
        trusted_sources.insert(
            "modrinth".to_string(),
            TrustedSource {
                url: "https://modrinth.com".into(),
                api_endpoint: Some("https://api.modrinth.com/v2".into()),
            },
        );

        Self {
            client_id: DEFAULT_CLIENT_ID.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.into(),
            scopes: DEFAULT_SCOPES.into(),
            max_download_threads: 3,
            repositories: vec![RepositoryConfig {
                id: "default".into(),
                name: "Default Repository".into(),
                url: "http://localhost:5000".into(),
                enabled: true,
                auth_token: None,
            }],
            trusted_sources,
        }
    }
}

impl LauncherConfig {
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(CONFIG_FILE)
    }

    /// Missing or unreadable config yields the defaults.
    pub fn load(data_dir: &Path) -> Self {
        let path = Self::path(data_dir);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<LauncherConfig>(&raw) {
            Ok(cfg) => cfg.sanitized(),
            Err(e) => {
                warn!("Ignoring corrupt config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub async fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&Self::path(data_dir), json.as_bytes()).await
    }

    fn sanitized(mut self) -> Self {
        if self.client_id.trim().is_empty() {
            self.client_id = DEFAULT_CLIENT_ID.into();
        }
        if self.redirect_uri.trim().is_empty() {
            self.redirect_uri = DEFAULT_REDIRECT_URI.into();
        }
        if self.scopes.trim().is_empty() {
            self.scopes = DEFAULT_SCOPES.into();
        }
        self.max_download_threads = self.max_download_threads.max(1);
        self
    }

    /// Whether `url` starts with the URL of a trusted source.
    pub fn is_url_trusted(&self, url: &str) -> bool {
        self.trusted_sources
            .values()
            .any(|s| !s.url.is_empty() && url.starts_with(&s.url))
    }
}
