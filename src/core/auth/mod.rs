// ─── Authentication ───
// Microsoft identity → Xbox Live → XSTS → Minecraft services, plus the
// credential store and offline profiles.
//
//   credentials — persisted token material
//   endpoints   — service URLs (overridable for tests)
//   oauth       — device-code, authorization-code and refresh grants
//   pkce        — S256 challenge + redirect parsing
//   xbox        — XBL / XSTS / Minecraft token chain
//   profile     — entitlement check + profile fetch
//   flow        — per-attempt state machine and login orchestration

pub mod credentials;
pub mod endpoints;
pub mod flow;
pub mod oauth;
pub mod pkce;
pub mod profile;
pub mod xbox;

use md5::{Digest, Md5};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub use credentials::{Credential, CredentialStore};
pub use endpoints::AuthEndpoints;
pub use flow::{Authenticator, LoginAttempt, LoginMethod, LoginState, StateListener};
pub use oauth::{DeviceCodeFlow, DeviceTokenSource, MsToken, PollOutcome};
pub use pkce::PkceChallenge;
pub use profile::MinecraftProfile;
pub use xbox::{MinecraftToken, XboxToken};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountMode {
    Offline,
    Microsoft,
}

/// The identity a game session runs as. Re-derived on every login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub mode: AccountMode,
    pub username: String,
    pub uuid: String,
    pub minecraft_access_token: String,
}

impl Profile {
    pub fn offline(username: &str) -> Self {
        let username = match username.trim() {
            "" => "Player",
            name => name,
        };
        Self {
            mode: AccountMode::Offline,
            username: username.to_string(),
            uuid: offline_uuid(username),
            minecraft_access_token: "offline_access_token".into(),
        }
    }
}

/// The UUID the vanilla server assigns to an offline player:
/// MD5 of `OfflinePlayer:<name>` stamped as a version-3 UUID.
pub fn offline_uuid(username: &str) -> String {
    let digest = Md5::digest(format!("OfflinePlayer:{}", username).as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    bytes[6] = (bytes[6] & 0x0f) | 0x30;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes).hyphenated().to_string()
}

/// HTTP client for every Microsoft, Xbox and Minecraft services call.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    endpoints: AuthEndpoints,
    client_id: String,
    scopes: String,
}

impl AuthClient {
    pub fn new(http: Client, client_id: impl Into<String>, scopes: impl Into<String>) -> Self {
        Self {
            http,
            endpoints: AuthEndpoints::default(),
            client_id: client_id.into(),
            scopes: scopes.into(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn scopes(&self) -> &str {
        &self.scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_uuid_is_stable_version_3() {
        let id = offline_uuid("Steve");
        assert_eq!(id, offline_uuid("Steve"));
        assert_ne!(id, offline_uuid("Alex"));

        let parsed = uuid::Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 3);
        assert_eq!(parsed.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn offline_profile_defaults_blank_name() {
        let p = Profile::offline("  ");
        assert_eq!(p.username, "Player");
        assert_eq!(p.mode, AccountMode::Offline);
        assert_eq!(p.uuid, offline_uuid("Player"));
    }
}
