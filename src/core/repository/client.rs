use reqwest::Client;
use tracing::debug;

use super::model::Repository;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::modpack::{parse_catalog, parse_descriptor, ModpackDescriptor};

/// HTTP access to a catalog server's `/api/modpacks` endpoints.
#[derive(Clone)]
pub struct RepositoryClient {
    http: Client,
}

impl RepositoryClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// `GET {url}/api/modpacks`. Every failure, network or parse, is
    /// `RepositoryUnreachable` so the caller can fall back to its cache.
    pub async fn fetch_catalog(&self, repo: &Repository) -> LauncherResult<Vec<ModpackDescriptor>> {
        let body = self.get_text(repo, &repo.catalog_url()).await?;
        let mut modpacks = parse_catalog(&body).map_err(|e| unreachable(repo, e))?;
        for pack in &mut modpacks {
            pack.repository_id = Some(repo.id.clone());
        }
        debug!("Repository {} lists {} modpacks", repo.id, modpacks.len());
        Ok(modpacks)
    }

    /// `GET {url}/api/modpacks/{id}`.
    pub async fn fetch_modpack(
        &self,
        repo: &Repository,
        modpack_id: &str,
    ) -> LauncherResult<ModpackDescriptor> {
        let url = repo.modpack_url(modpack_id);
        let mut request = self.http.get(&url).header("Accept", "application/json");
        if let Some(token) = &repo.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| unreachable(repo, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LauncherError::ModpackNotFound(modpack_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(unreachable(repo, format!("HTTP {}", response.status())));
        }

        let body = response.text().await.map_err(|e| unreachable(repo, e))?;
        let mut descriptor = parse_descriptor(&body)?;
        descriptor.repository_id = Some(repo.id.clone());
        Ok(descriptor)
    }

    async fn get_text(&self, repo: &Repository, url: &str) -> LauncherResult<String> {
        let mut request = self.http.get(url).header("Accept", "application/json");
        if let Some(token) = &repo.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| unreachable(repo, e))?;
        if !response.status().is_success() {
            return Err(unreachable(repo, format!("HTTP {}", response.status())));
        }
        response.text().await.map_err(|e| unreachable(repo, e))
    }
}

fn unreachable(repo: &Repository, reason: impl std::fmt::Display) -> LauncherError {
    LauncherError::RepositoryUnreachable {
        repository: repo.id.clone(),
        reason: reason.to_string(),
    }
}
