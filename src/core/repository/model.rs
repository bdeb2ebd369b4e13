use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::RepositoryConfig;
use crate::core::modpack::ModpackDescriptor;

/// A catalog older than this is due for a sync.
pub const SYNC_INTERVAL_SECS: i64 = 3600;

/// A modpack catalog server and what we last fetched from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub auth_token: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub modpacks: Vec<ModpackDescriptor>,
}

impl From<RepositoryConfig> for Repository {
    fn from(cfg: RepositoryConfig) -> Self {
        Self {
            id: cfg.id,
            name: cfg.name,
            url: cfg.url.trim_end_matches('/').to_string(),
            enabled: cfg.enabled,
            auth_token: cfg.auth_token.filter(|t| !t.trim().is_empty()),
            last_synced_at: None,
            modpacks: Vec::new(),
        }
    }
}

impl Repository {
    pub fn to_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            id: self.id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            enabled: self.enabled,
            auth_token: self.auth_token.clone(),
        }
    }

    pub fn needs_sync_at(&self, now: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            Some(at) => now - at > Duration::seconds(SYNC_INTERVAL_SECS),
            None => true,
        }
    }

    pub fn needs_sync(&self) -> bool {
        self.needs_sync_at(Utc::now())
    }

    pub fn catalog_url(&self) -> String {
        format!("{}/api/modpacks", self.url)
    }

    pub fn modpack_url(&self, modpack_id: &str) -> String {
        format!("{}/api/modpacks/{}", self.url, modpack_id)
    }

    /// Absolute URLs pass through; anything else is relative to the
    /// repository root.
    pub fn resolve_url(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return raw.to_string();
        }
        format!("{}/{}", self.url, raw.trim_start_matches('/'))
    }
}

/// On-disk copy of a repository's last good catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCatalog {
    pub synced_at: DateTime<Utc>,
    pub modpacks: Vec<ModpackDescriptor>,
}

/// Repository id derived from a display name.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "repository".into()
    } else {
        slug
    }
}
