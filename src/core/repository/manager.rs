use std::path::{Path, PathBuf};

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::client::RepositoryClient;
use super::model::{slugify, CachedCatalog, Repository};
use crate::core::config::RepositoryConfig;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::modpack::manifest::write_atomic;
use crate::core::modpack::ModpackDescriptor;

/// Owns the ordered set of repositories and their cached catalogs.
pub struct RepositoryManager {
    repositories: Vec<Repository>,
    client: RepositoryClient,
    cache_dir: PathBuf,
}

impl RepositoryManager {
    /// Build from configuration, seeding each catalog from its disk cache.
    pub fn new(configs: Vec<RepositoryConfig>, http: Client, cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        let repositories = configs
            .into_iter()
            .map(|cfg| {
                let mut repo = Repository::from(cfg);
                if let Some(cached) = load_cache(&cache_dir, &repo.id) {
                    repo.last_synced_at = Some(cached.synced_at);
                    repo.modpacks = cached.modpacks;
                }
                repo
            })
            .collect();

        Self {
            repositories,
            client: RepositoryClient::new(http),
            cache_dir,
        }
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    pub fn get(&self, repo_id: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.id == repo_id)
    }

    fn get_mut(&mut self, repo_id: &str) -> LauncherResult<&mut Repository> {
        self.repositories
            .iter_mut()
            .find(|r| r.id == repo_id)
            .ok_or_else(|| LauncherError::RepositoryNotFound(repo_id.to_string()))
    }

    /// Current settings, for persisting back into the launcher config.
    pub fn configs(&self) -> Vec<RepositoryConfig> {
        self.repositories.iter().map(Repository::to_config).collect()
    }

    // ── Management ──────────────────────────────────────

    /// Add a repository; its id is derived from `name`.
    pub fn add_repository(&mut self, name: &str, url: &str) -> LauncherResult<String> {
        let id = slugify(name);
        if self.get(&id).is_some() {
            return Err(LauncherError::RepositoryAlreadyExists(id));
        }

        self.repositories.push(Repository::from(RepositoryConfig {
            id: id.clone(),
            name: name.trim().to_string(),
            url: url.trim().to_string(),
            enabled: true,
            auth_token: None,
        }));
        info!("Added repository {} ({})", id, url);
        Ok(id)
    }

    pub async fn remove_repository(&mut self, repo_id: &str) -> LauncherResult<()> {
        let before = self.repositories.len();
        self.repositories.retain(|r| r.id != repo_id);
        if self.repositories.len() == before {
            return Err(LauncherError::RepositoryNotFound(repo_id.to_string()));
        }

        let cache = cache_path(&self.cache_dir, repo_id);
        if let Err(e) = tokio::fs::remove_file(&cache).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove catalog cache {:?}: {}", cache, e);
            }
        }
        info!("Removed repository {}", repo_id);
        Ok(())
    }

    pub fn set_enabled(&mut self, repo_id: &str, enabled: bool) -> LauncherResult<()> {
        self.get_mut(repo_id)?.enabled = enabled;
        Ok(())
    }

    pub fn set_auth_token(&mut self, repo_id: &str, token: Option<String>) -> LauncherResult<()> {
        self.get_mut(repo_id)?.auth_token = token.filter(|t| !t.trim().is_empty());
        Ok(())
    }

    // ── Sync ────────────────────────────────────────────

    /// Fetch a repository's catalog. On failure the last cached catalog is
    /// served instead, and the repository is left marked as stale. Only a
    /// repository with no cache at all reports `RepositoryUnreachable`.
    pub async fn sync_repository(&mut self, repo_id: &str) -> LauncherResult<Vec<ModpackDescriptor>> {
        let snapshot = self.get_mut(repo_id)?.clone();

        match self.client.fetch_catalog(&snapshot).await {
            Ok(modpacks) => {
                let now = Utc::now();
                let cache = CachedCatalog {
                    synced_at: now,
                    modpacks: modpacks.clone(),
                };
                if let Err(e) = write_cache(&self.cache_dir, repo_id, &cache).await {
                    warn!("Failed to write catalog cache for {}: {}", repo_id, e);
                }

                let repo = self.get_mut(repo_id)?;
                repo.last_synced_at = Some(now);
                repo.modpacks = modpacks.clone();
                info!("Synced repository {}: {} modpacks", repo_id, modpacks.len());
                Ok(modpacks)
            }
            Err(e) => {
                let Some(cached) = read_cache(&self.cache_dir, repo_id).await else {
                    warn!("Repository {} unreachable and no cache available: {}", repo_id, e);
                    return Err(e);
                };
                warn!(
                    "Repository {} unreachable ({}); serving {} cached modpacks",
                    repo_id,
                    e,
                    cached.modpacks.len()
                );
                let repo = self.get_mut(repo_id)?;
                repo.modpacks = cached.modpacks.clone();
                Ok(cached.modpacks)
            }
        }
    }

    /// Sync every enabled repository that is due (all of them if `force`).
    /// Returns one `(id, ok)` per repository attempted, in order.
    pub async fn sync_all(&mut self, force: bool) -> Vec<(String, bool)> {
        let now = Utc::now();
        let due: Vec<String> = self
            .repositories
            .iter()
            .filter(|r| r.enabled && (force || r.needs_sync_at(now)))
            .map(|r| r.id.clone())
            .collect();

        let mut results = Vec::with_capacity(due.len());
        for id in due {
            let ok = self.sync_repository(&id).await.is_ok();
            results.push((id, ok));
        }
        results
    }

    // ── Queries ─────────────────────────────────────────

    /// Case-insensitive substring match over name, description and author in
    /// every enabled repository. Results keep repository order, then catalog
    /// order.
    pub fn search(&self, query: &str, minecraft_version: Option<&str>) -> Vec<ModpackDescriptor> {
        let version = minecraft_version.map(str::trim).filter(|v| !v.is_empty());
        self.repositories
            .iter()
            .filter(|r| r.enabled)
            .flat_map(|r| {
                r.modpacks.iter().map(move |pack| {
                    let mut pack = pack.clone();
                    pack.repository_id.get_or_insert_with(|| r.id.clone());
                    pack
                })
            })
            .filter(|pack| pack.matches_query(query))
            .filter(|pack| version.map_or(true, |v| pack.supports_minecraft_version(v)))
            .collect()
    }

    /// A single pack: the cached catalog first, then the server.
    pub async fn modpack_details(
        &self,
        repo_id: &str,
        modpack_id: &str,
    ) -> LauncherResult<ModpackDescriptor> {
        let repo = self
            .get(repo_id)
            .ok_or_else(|| LauncherError::RepositoryNotFound(repo_id.to_string()))?;

        if let Some(pack) = repo.modpacks.iter().find(|p| p.id == modpack_id) {
            debug!("Found {} in cached catalog of {}", modpack_id, repo_id);
            let mut pack = pack.clone();
            pack.repository_id = Some(repo.id.clone());
            return Ok(pack);
        }

        self.client.fetch_modpack(repo, modpack_id).await
    }

    /// Absolute archive URL and bearer token for a catalog descriptor.
    pub fn resolve_download(
        &self,
        descriptor: &ModpackDescriptor,
    ) -> LauncherResult<(String, Option<String>)> {
        let raw = descriptor
            .download_url
            .as_deref()
            .ok_or_else(|| LauncherError::InvalidManifest(format!("modpack {} has no download URL", descriptor.id)))?;

        match descriptor.repository_id.as_deref().and_then(|id| self.get(id)) {
            Some(repo) => Ok((repo.resolve_url(raw), repo.auth_token.clone())),
            None => Ok((raw.to_string(), None)),
        }
    }

    /// The catalog entry for an installed pack, if its version differs.
    pub fn check_for_update(&self, installed: &ModpackDescriptor) -> Option<ModpackDescriptor> {
        let candidates = self.repositories.iter().filter(|r| r.enabled);
        let mut ordered: Vec<&Repository> = candidates.collect();
        // Prefer the repository the pack was installed from.
        if let Some(origin) = installed.repository_id.as_deref() {
            ordered.sort_by_key(|r| r.id != origin);
        }

        ordered.into_iter().find_map(|repo| {
            repo.modpacks
                .iter()
                .find(|p| p.id == installed.id && p.version != installed.version)
                .map(|p| {
                    let mut p = p.clone();
                    p.repository_id = Some(repo.id.clone());
                    p
                })
        })
    }
}

fn cache_path(cache_dir: &Path, repo_id: &str) -> PathBuf {
    cache_dir.join(format!("{}.json", repo_id))
}

/// Blocking read, for construction before any runtime work starts.
fn load_cache(cache_dir: &Path, repo_id: &str) -> Option<CachedCatalog> {
    let path = cache_path(cache_dir, repo_id);
    let raw = std::fs::read_to_string(&path).ok()?;
    parse_cache(&path, &raw)
}

async fn read_cache(cache_dir: &Path, repo_id: &str) -> Option<CachedCatalog> {
    let path = cache_path(cache_dir, repo_id);
    let raw = tokio::fs::read_to_string(&path).await.ok()?;
    parse_cache(&path, &raw)
}

fn parse_cache(path: &Path, raw: &str) -> Option<CachedCatalog> {
    match serde_json::from_str(raw) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Ignoring corrupt catalog cache {:?}: {}", path, e);
            None
        }
    }
}

async fn write_cache(cache_dir: &Path, repo_id: &str, cache: &CachedCatalog) -> LauncherResult<()> {
    let json = serde_json::to_string_pretty(cache)?;
    write_atomic(&cache_path(cache_dir, repo_id), json.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {"id": "pack1", "name": "Sky Factory", "description": "Skyblock", "author": "Bacon",
         "mc_versions": ["1.20.1"], "modloader": "forge", "download_url": "/files/pack1.zip"},
        {"id": "pack2", "name": "Vanilla+", "author": "Someone", "mc_versions": ["1.21"]}
    ]"#;

    fn config(id: &str, url: &str) -> RepositoryConfig {
        RepositoryConfig {
            id: id.into(),
            name: id.into(),
            url: url.into(),
            enabled: true,
            auth_token: None,
        }
    }

    #[tokio::test]
    async fn sync_then_search() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/modpacks")
            .with_body(CATALOG)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut mgr = RepositoryManager::new(vec![config("main", &server.url())], Client::new(), dir.path());

        let packs = mgr.sync_repository("main").await.unwrap();
        assert_eq!(packs.len(), 2);
        assert!(!mgr.get("main").unwrap().needs_sync());

        let hits = mgr.search("SKY", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].repository_id.as_deref(), Some("main"));

        assert_eq!(mgr.search("", Some("1.21")).len(), 1);
        assert_eq!(mgr.search("", None).len(), 2);

        let (url, token) = mgr.resolve_download(&hits[0]).unwrap();
        assert_eq!(url, format!("{}/files/pack1.zip", server.url()));
        assert_eq!(token, None);
    }

    #[tokio::test]
    async fn unreachable_repository_falls_back_to_cache() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/api/modpacks")
            .with_body(CATALOG)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut mgr = RepositoryManager::new(vec![config("main", &server.url())], Client::new(), dir.path());
        mgr.sync_repository("main").await.unwrap();
        ok.remove_async().await;

        server
            .mock("GET", "/api/modpacks")
            .with_status(503)
            .create_async()
            .await;

        // A fresh manager must also see the cache from disk.
        let mut fresh = RepositoryManager::new(vec![config("main", &server.url())], Client::new(), dir.path());
        let packs = fresh.sync_repository("main").await.unwrap();
        assert_eq!(packs.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_without_cache_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/modpacks")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut mgr = RepositoryManager::new(vec![config("main", &server.url())], Client::new(), dir.path());
        assert!(matches!(
            mgr.sync_repository("main").await,
            Err(LauncherError::RepositoryUnreachable { .. })
        ));
        assert_eq!(mgr.sync_all(true).await, vec![("main".to_string(), false)]);
    }

    #[tokio::test]
    async fn bearer_token_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/modpacks")
            .match_header("authorization", "Bearer secret")
            .with_body("[]")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("private", &server.url());
        cfg.auth_token = Some("secret".into());
        let mut mgr = RepositoryManager::new(vec![cfg], Client::new(), dir.path());

        mgr.sync_repository("private").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn search_respects_repository_order_and_enabled_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = RepositoryManager::new(
            vec![config("a", "http://a"), config("b", "http://b")],
            Client::new(),
            dir.path(),
        );
        mgr.repositories[0].modpacks = vec![ModpackDescriptor::new("x", "Pack X", "1")];
        mgr.repositories[1].modpacks = vec![
            ModpackDescriptor::new("y", "Pack Y", "1"),
            ModpackDescriptor::new("z", "Pack Z", "1"),
        ];

        let ids: Vec<String> = mgr.search("pack", None).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["x", "y", "z"]);

        mgr.set_enabled("a", false).unwrap();
        let ids: Vec<String> = mgr.search("pack", None).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["y", "z"]);
    }

    #[tokio::test]
    async fn add_and_remove_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = RepositoryManager::new(vec![], Client::new(), dir.path());

        let id = mgr.add_repository("Community Packs", "http://packs.example/").unwrap();
        assert_eq!(id, "community_packs");
        assert!(matches!(
            mgr.add_repository("community packs", "http://other"),
            Err(LauncherError::RepositoryAlreadyExists(_))
        ));
        assert_eq!(mgr.configs()[0].url, "http://packs.example");

        mgr.remove_repository(&id).await.unwrap();
        assert!(matches!(
            mgr.remove_repository(&id).await,
            Err(LauncherError::RepositoryNotFound(_))
        ));
    }

    #[test]
    fn update_detection_compares_versions() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = RepositoryManager::new(vec![config("a", "http://a")], Client::new(), dir.path());
        mgr.repositories[0].modpacks = vec![ModpackDescriptor::new("p", "P", "2.0")];

        let installed = ModpackDescriptor::new("p", "P", "1.0");
        assert_eq!(mgr.check_for_update(&installed).unwrap().version, "2.0");

        let current = ModpackDescriptor::new("p", "P", "2.0");
        assert!(mgr.check_for_update(&current).is_none());
    }
}
