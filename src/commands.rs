// ─── Launcher Commands ───
// The surface a host UI calls: sign-in, repository browsing, and modpack
// install/update/uninstall. Everything deeper stays inside `core`.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::auth::{
    AuthClient, AuthEndpoints, Authenticator, CredentialStore, LoginAttempt, LoginMethod,
    PkceChallenge, Profile, StateListener,
};
use crate::core::error::{
    AuthResult, InstallError, InstallResult, InstallStep, LauncherError, LauncherResult,
};
use crate::core::install::{ArchiveSource, ModpackInstaller};
use crate::core::instance::InstanceManager;
use crate::core::loaders::{GameProvisioner, MojangProvisioner};
use crate::core::modpack::{ModEntry, ModpackDescriptor};
use crate::core::progress::ProgressReporter;
use crate::core::repository::RepositoryManager;
use crate::core::state::AppState;
use crate::core::task::BackgroundTask;
use crate::core::version::{VersionManifest, VERSION_MANIFEST_URL};

/// One launcher backend over one data directory.
///
/// Share it behind an `Arc` to use the `spawn_*` methods.
pub struct Launcher {
    state: AppState,
    authenticator: Authenticator,
    repositories: Mutex<RepositoryManager>,
    instances: InstanceManager,
    installer: ModpackInstaller,
}

impl Launcher {
    pub fn new(state: AppState) -> Self {
        let provisioner = Arc::new(MojangProvisioner::new(
            state.http_client.clone(),
            state.downloader.clone(),
            state.versions_dir(),
            state.libraries_dir(),
        ));
        let authenticator = build_authenticator(&state, AuthEndpoints::default());
        let repositories = RepositoryManager::new(
            state.config.repositories.clone(),
            state.http_client.clone(),
            state.repository_cache_dir(),
        );
        let instances = InstanceManager::new(state.instances_dir(), state.downloader.clone());
        let installer = build_installer(&state, provisioner);

        Self {
            state,
            authenticator,
            repositories: Mutex::new(repositories),
            instances,
            installer,
        }
    }

    /// Launcher over `$PACKLAUNCHER_DATA_DIR`, else the platform data dir.
    pub fn from_env() -> LauncherResult<Self> {
        AppState::from_env().map(Self::new)
    }

    /// Swap how base games and mod loaders are put in place.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn GameProvisioner>) -> Self {
        self.installer = build_installer(&self.state, provisioner);
        self
    }

    /// Point sign-in at other identity and game service hosts.
    pub fn with_auth_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.authenticator = build_authenticator(&self.state, endpoints);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    // ── Authentication ──────────────────────────────────

    pub async fn login(
        &self,
        method: LoginMethod,
        attempt: &mut LoginAttempt,
        cancel: CancellationToken,
    ) -> AuthResult<Profile> {
        self.authenticator.login(method, attempt, cancel).await
    }

    /// PKCE challenge and authorization URL for a browser sign-in. Pass the
    /// challenge back in [`LoginMethod::AuthorizationCode`].
    pub fn begin_browser_login(&self) -> AuthResult<(PkceChallenge, String)> {
        self.authenticator.begin_browser_login()
    }

    pub async fn logout(&self) {
        self.authenticator.logout().await;
        info!("Logged out");
    }

    // ── Repositories ────────────────────────────────────

    pub async fn search(&self, query: &str, minecraft_version: Option<&str>) -> Vec<ModpackDescriptor> {
        self.repositories.lock().await.search(query, minecraft_version)
    }

    /// Sync due repositories (all if `force`). Failures are logged and the
    /// cached catalogs stay in use.
    pub async fn sync_repositories(&self, force: bool) -> Vec<(String, bool)> {
        let results = self.repositories.lock().await.sync_all(force).await;
        for (id, ok) in &results {
            if !ok {
                warn!("Repository {} could not be synced, using cached catalog", id);
            }
        }
        results
    }

    pub async fn add_repository(&self, name: &str, url: &str) -> LauncherResult<String> {
        let mut repos = self.repositories.lock().await;
        let id = repos.add_repository(name, url)?;
        self.persist_repositories(&repos).await?;
        Ok(id)
    }

    pub async fn remove_repository(&self, repo_id: &str) -> LauncherResult<()> {
        let mut repos = self.repositories.lock().await;
        repos.remove_repository(repo_id).await?;
        self.persist_repositories(&repos).await
    }

    pub async fn set_repository_enabled(&self, repo_id: &str, enabled: bool) -> LauncherResult<()> {
        let mut repos = self.repositories.lock().await;
        repos.set_enabled(repo_id, enabled)?;
        self.persist_repositories(&repos).await
    }

    /// Bearer token sent with this repository's catalog and archive requests.
    pub async fn set_repository_token(&self, repo_id: &str, token: Option<String>) -> LauncherResult<()> {
        let mut repos = self.repositories.lock().await;
        repos.set_auth_token(repo_id, token)?;
        self.persist_repositories(&repos).await
    }

    pub async fn modpack_details(&self, repo_id: &str, modpack_id: &str) -> LauncherResult<ModpackDescriptor> {
        self.repositories
            .lock()
            .await
            .modpack_details(repo_id, modpack_id)
            .await
    }

    pub async fn check_for_update(&self, installed: &ModpackDescriptor) -> Option<ModpackDescriptor> {
        self.repositories.lock().await.check_for_update(installed)
    }

    async fn persist_repositories(&self, repos: &RepositoryManager) -> LauncherResult<()> {
        let mut config = self.state.config.clone();
        config.repositories = repos.configs();
        config.save(&self.state.data_dir).await
    }

    /// Release ids from the Mojang version manifest, newest first.
    pub async fn minecraft_releases(&self) -> LauncherResult<Vec<String>> {
        let manifest = VersionManifest::fetch(&self.state.http_client, VERSION_MANIFEST_URL).await?;
        Ok(manifest
            .releases()
            .filter(|entry| !entry.id.to_ascii_lowercase().contains("demo"))
            .map(|entry| entry.id.clone())
            .collect())
    }

    // ── Modpacks ────────────────────────────────────────

    pub async fn list_installed(&self) -> LauncherResult<Vec<ModpackDescriptor>> {
        self.instances.list_installed().await
    }

    /// Download and install a catalog modpack.
    pub async fn install(
        &self,
        descriptor: &ModpackDescriptor,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> InstallResult<ModpackDescriptor> {
        let source = self.archive_source(descriptor).await?;
        self.installer.install(descriptor, source, progress, cancel).await
    }

    /// Install from an archive already on disk.
    pub async fn install_from_file(
        &self,
        descriptor: &ModpackDescriptor,
        archive: &Path,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> InstallResult<ModpackDescriptor> {
        let source = ArchiveSource::Local(archive.to_path_buf());
        self.installer.install(descriptor, source, progress, cancel).await
    }

    /// Update an installed modpack.
    ///
    /// `descriptor` is either the installed pack (the catalog is asked for
    /// a newer version) or a catalog entry with a different version. When
    /// nothing newer exists the installed pack is returned unchanged.
    pub async fn update(
        &self,
        descriptor: &ModpackDescriptor,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> InstallResult<ModpackDescriptor> {
        let installed = match self.instances.find_installed(&descriptor.id).await {
            Ok(Some(pack)) => pack,
            Ok(None) => return Err(InstallError::NotInstalled(descriptor.id.clone())),
            Err(e) => {
                warn!("Could not list installed modpacks: {}", e);
                return Err(InstallError::NotInstalled(descriptor.id.clone()));
            }
        };

        let target = if descriptor.install_path.is_none() && descriptor.version != installed.version {
            Some(descriptor.clone())
        } else {
            self.check_for_update(&installed).await
        };
        let Some(target) = target else {
            info!("{} is already up to date ({})", installed.id, installed.version);
            return Ok(installed);
        };

        let source = self.archive_source(&target).await?;
        self.installer
            .update(&installed, &target, source, progress, cancel)
            .await
    }

    /// Remove an installed modpack. `false` when it was not installed, is
    /// busy, or could not be deleted.
    pub async fn uninstall(&self, descriptor: &ModpackDescriptor) -> bool {
        let _guard = match self.installer.lock().try_acquire(&descriptor.id) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Cannot uninstall {}: {}", descriptor.id, e);
                return false;
            }
        };
        match self.instances.uninstall(descriptor).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Uninstall of {} failed: {}", descriptor.id, e);
                false
            }
        }
    }

    pub async fn create_empty(
        &self,
        name: &str,
        version: &str,
        minecraft_versions: Vec<String>,
    ) -> LauncherResult<ModpackDescriptor> {
        self.instances.create_empty(name, version, minecraft_versions).await
    }

    pub async fn export(&self, descriptor: &ModpackDescriptor, zip_path: &Path) -> LauncherResult<usize> {
        self.instances.export(descriptor, zip_path).await
    }

    pub async fn add_mod(
        &self,
        descriptor: &ModpackDescriptor,
        mod_entry: ModEntry,
        progress: &ProgressReporter,
    ) -> LauncherResult<ModpackDescriptor> {
        let _guard = self
            .installer
            .lock()
            .try_acquire(&descriptor.id)
            .map_err(|e| LauncherError::Other(e.to_string()))?;
        self.instances.add_mod(descriptor, mod_entry, progress).await
    }

    pub async fn remove_mod(&self, descriptor: &ModpackDescriptor, mod_id: &str) -> LauncherResult<ModpackDescriptor> {
        let _guard = self
            .installer
            .lock()
            .try_acquire(&descriptor.id)
            .map_err(|e| LauncherError::Other(e.to_string()))?;
        self.instances.remove_mod(descriptor, mod_id).await
    }

    async fn archive_source(&self, descriptor: &ModpackDescriptor) -> InstallResult<ArchiveSource> {
        let (url, bearer_token) = self
            .repositories
            .lock()
            .await
            .resolve_download(descriptor)
            .map_err(InstallError::at(InstallStep::DownloadArchive))?;
        if !self.state.config.is_url_trusted(&url) {
            warn!("Downloading {} from a source not in the trusted list: {}", descriptor.id, url);
        }
        Ok(ArchiveSource::Remote { url, bearer_token })
    }

    // ── Background ──────────────────────────────────────

    pub fn spawn_install(
        self: &Arc<Self>,
        descriptor: ModpackDescriptor,
        progress: ProgressReporter,
    ) -> BackgroundTask<InstallResult<ModpackDescriptor>> {
        let launcher = Arc::clone(self);
        BackgroundTask::spawn(move |cancel| async move {
            launcher.install(&descriptor, &progress, &cancel).await
        })
    }

    pub fn spawn_update(
        self: &Arc<Self>,
        descriptor: ModpackDescriptor,
        progress: ProgressReporter,
    ) -> BackgroundTask<InstallResult<ModpackDescriptor>> {
        let launcher = Arc::clone(self);
        BackgroundTask::spawn(move |cancel| async move {
            launcher.update(&descriptor, &progress, &cancel).await
        })
    }

    /// Device-code sign-in in the background. `listener` sees every state,
    /// including the user code to display.
    pub fn spawn_device_login(
        self: &Arc<Self>,
        listener: Option<StateListener>,
    ) -> BackgroundTask<AuthResult<Profile>> {
        let launcher = Arc::clone(self);
        BackgroundTask::spawn(move |cancel| async move {
            let mut attempt = LoginAttempt::new(listener);
            launcher
                .login(LoginMethod::DeviceCode, &mut attempt, cancel)
                .await
        })
    }
}

fn build_authenticator(state: &AppState, endpoints: AuthEndpoints) -> Authenticator {
    let client = AuthClient::new(
        state.http_client.clone(),
        state.config.client_id.clone(),
        state.config.scopes.clone(),
    )
    .with_endpoints(endpoints);
    Authenticator::new(
        client,
        CredentialStore::new(state.credentials_path()),
        state.config.redirect_uri.clone(),
    )
}

fn build_installer(state: &AppState, provisioner: Arc<dyn GameProvisioner>) -> ModpackInstaller {
    ModpackInstaller::new(
        state.instances_dir(),
        state.downloads_dir(),
        state.downloader.clone(),
        provisioner,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_changes_are_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let launcher = Launcher::new(AppState::new(tmp.path().to_path_buf()).unwrap());

        let id = launcher
            .add_repository("Team Packs", "http://127.0.0.1:9")
            .await
            .unwrap();
        assert_eq!(id, "team_packs");
        launcher.set_repository_enabled(&id, false).await.unwrap();

        let reloaded = AppState::new(tmp.path().to_path_buf()).unwrap();
        let saved = reloaded
            .config
            .repositories
            .iter()
            .find(|r| r.id == "team_packs")
            .unwrap();
        assert!(!saved.enabled);

        launcher.remove_repository(&id).await.unwrap();
        let reloaded = AppState::new(tmp.path().to_path_buf()).unwrap();
        assert!(reloaded.config.repositories.iter().all(|r| r.id != "team_packs"));
    }

    #[tokio::test]
    async fn update_of_unknown_pack_is_not_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let launcher = Launcher::new(AppState::new(tmp.path().to_path_buf()).unwrap());
        let err = launcher
            .update(
                &ModpackDescriptor::new("nope", "Nope", "1"),
                &ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::NotInstalled(_)));
    }

    #[tokio::test]
    async fn offline_login_persists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let launcher = Launcher::new(AppState::new(tmp.path().to_path_buf()).unwrap());
        let profile = launcher
            .login(
                LoginMethod::Offline {
                    username: "Steve".into(),
                },
                &mut LoginAttempt::default(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(profile.username, "Steve");
        assert!(!launcher.state().credentials_path().exists());
    }
}
