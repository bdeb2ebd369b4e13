use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::core::config::LauncherConfig;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;

const APP_DIR_NAME: &str = "PackLauncher";
pub const DATA_DIR_ENV: &str = "PACKLAUNCHER_DATA_DIR";

/// Shared launcher state: the data directory layout, the loaded config and
/// one HTTP client for every component.
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: LauncherConfig,
    pub http_client: Client,
    pub downloader: Arc<Downloader>,
}

impl AppState {
    pub fn new(data_dir: PathBuf) -> LauncherResult<Self> {
        for dir in [
            data_dir.clone(),
            data_dir.join("instances"),
            data_dir.join("versions"),
            data_dir.join("libraries"),
            data_dir.join("downloads"),
            data_dir.join("cache").join("repositories"),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| LauncherError::io(&dir, e))?;
        }

        let config = LauncherConfig::load(&data_dir);
        let http_client = build_http_client()?;
        let downloader =
            Arc::new(Downloader::new(http_client.clone()).with_concurrency(config.max_download_threads));

        info!("Launcher data directory: {:?}", data_dir);
        Ok(Self {
            data_dir,
            config,
            http_client,
            downloader,
        })
    }

    /// State rooted at `$PACKLAUNCHER_DATA_DIR`, else the platform data dir.
    pub fn from_env() -> LauncherResult<Self> {
        Self::new(default_data_dir())
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("credentials.json")
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.data_dir.join("instances")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    pub fn repository_cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache").join("repositories")
    }
}

pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Recursive copy that overwrites existing files at the destination.
pub fn copy_dir_recursive(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(destination)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = destination.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            if dst_path.exists() {
                std::fs::remove_file(&dst_path)?;
            }
            std::fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}
