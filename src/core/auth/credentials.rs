use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::LauncherResult;
use crate::core::modpack::manifest::write_atomic;

/// Persisted token material for one Microsoft account.
///
/// All expiry fields are absolute instants, so checking them needs nothing
/// but the current time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub account_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub minecraft_access_token: Option<String>,
    #[serde(default)]
    pub minecraft_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

impl Credential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    /// Whether the Minecraft token can still be used at `now`.
    pub fn minecraft_token_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.minecraft_access_token, self.minecraft_expires_at) {
            (Some(token), Some(expires_at)) if !token.is_empty() => {
                now + Duration::seconds(EXPIRY_SKEW_SECS) < expires_at
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    active: Option<String>,
    #[serde(default)]
    accounts: BTreeMap<String, Credential>,
}

/// JSON credential cache keyed by account id.
///
/// Reads never fail: a missing or corrupt file is "no credential". Writes
/// replace the whole file via a temporary sibling.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active account's credential.
    pub async fn load(&self) -> Option<Credential> {
        let mut file = self.read_file().await?;
        let active = file.active.clone()?;
        file.accounts.remove(&active)
    }

    pub async fn load_account(&self, account_id: &str) -> Option<Credential> {
        self.read_file().await?.accounts.remove(account_id)
    }

    /// Store `credential` and make it the active account.
    pub async fn save(&self, credential: &Credential) -> LauncherResult<()> {
        let mut file = self.read_file().await.unwrap_or_default();
        file.active = Some(credential.account_id.clone());
        file.accounts
            .insert(credential.account_id.clone(), credential.clone());

        let json = serde_json::to_string_pretty(&file)?;
        write_atomic(&self.path, json.as_bytes()).await?;
        debug!("Saved credentials for account {}", credential.account_id);
        Ok(())
    }

    /// Remove every stored credential. A missing file is not an error.
    pub async fn clear(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => info!("Cleared stored credentials"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove credential cache {:?}: {}", self.path, e),
        }
    }

    async fn read_file(&self) -> Option<CredentialFile> {
        let raw = tokio::fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str::<CredentialFile>(&raw) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Ignoring corrupt credential cache {:?}: {}", self.path, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(account: &str) -> Credential {
        Credential {
            account_id: account.into(),
            access_token: "ms-access".into(),
            refresh_token: Some("ms-refresh".into()),
            expires_at: Utc::now() + Duration::hours(1),
            minecraft_access_token: Some("mc-access".into()),
            minecraft_expires_at: Some(Utc::now() + Duration::hours(24)),
            username: Some("Steve".into()),
            uuid: Some(account.into()),
        }
    }

    #[tokio::test]
    async fn save_then_load_returns_same_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        let c = sample("acc-1");

        store.save(&c).await.unwrap();
        assert_eq!(store.load().await, Some(c));
    }

    #[tokio::test]
    async fn latest_save_becomes_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.save(&sample("acc-1")).await.unwrap();
        store.save(&sample("acc-2")).await.unwrap();

        assert_eq!(store.load().await.unwrap().account_id, "acc-2");
        assert!(store.load_account("acc-1").await.is_some());
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = CredentialStore::new(&path);
        assert_eq!(store.load().await, None);

        std::fs::write(&path, b"\x00\x01 definitely not json").unwrap();
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.clear().await;

        store.save(&sample("acc-1")).await.unwrap();
        store.clear().await;
        store.clear().await;
        assert_eq!(store.load().await, None);
    }

    #[test]
    fn expiry_uses_absolute_instants() {
        let now = Utc::now();
        let mut c = sample("acc");
        c.expires_at = now + Duration::seconds(30);
        assert!(c.is_expired_at(now));

        c.minecraft_expires_at = Some(now + Duration::hours(2));
        assert!(c.minecraft_token_valid_at(now));
        assert!(!c.minecraft_token_valid_at(now + Duration::hours(3)));
    }
}
