use serde::Deserialize;
use tracing::warn;

use super::AuthClient;
use crate::core::error::{AuthError, AuthResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MinecraftProfile {
    /// Undashed UUID as returned by the profile endpoint.
    pub id: String,
    pub name: String,
}

impl MinecraftProfile {
    /// `id` in the dashed 8-4-4-4-12 form; unchanged if it is not a UUID.
    pub fn dashed_uuid(&self) -> String {
        uuid::Uuid::parse_str(&self.id)
            .map(|u| u.hyphenated().to_string())
            .unwrap_or_else(|_| self.id.clone())
    }
}

#[derive(Debug, Deserialize)]
struct EntitlementsResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

impl AuthClient {
    /// Whether the account owns the game. Anything other than a 200 with at
    /// least one entitlement is `false`.
    pub async fn check_ownership(&self, minecraft_token: &str) -> bool {
        let response = match self
            .http
            .get(&self.endpoints.entitlements)
            .header("Accept", "application/json")
            .bearer_auth(minecraft_token)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Entitlement check failed: {}", e);
                return false;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            warn!("Entitlement check returned HTTP {}", response.status());
            return false;
        }

        match response.json::<EntitlementsResponse>().await {
            Ok(payload) => !payload.items.is_empty(),
            Err(e) => {
                warn!("Malformed entitlement response: {}", e);
                false
            }
        }
    }

    pub async fn fetch_profile(&self, minecraft_token: &str) -> AuthResult<MinecraftProfile> {
        let response = self
            .http
            .get(&self.endpoints.profile)
            .header("Accept", "application/json")
            .bearer_auth(minecraft_token)
            .send()
            .await
            .map_err(|e| {
                warn!("Profile request failed: {}", e);
                AuthError::ProfileUnavailable { status: 0 }
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AuthError::ProfileUnavailable {
                status: status.as_u16(),
            });
        }

        response
            .json::<MinecraftProfile>()
            .await
            .map_err(|_| AuthError::ProfileUnavailable {
                status: status.as_u16(),
            })
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Client;

    use super::*;
    use crate::core::auth::AuthEndpoints;

    fn client(server: &mockito::Server) -> AuthClient {
        AuthClient::new(Client::new(), "cid", "XboxLive.signin")
            .with_endpoints(AuthEndpoints::with_base(&server.url()))
    }

    #[tokio::test]
    async fn ownership_fails_closed() {
        let mut server = mockito::Server::new_async().await;
        let c = client(&server);

        let m = server
            .mock("GET", "/entitlements/mcstore")
            .with_status(500)
            .create_async()
            .await;
        assert!(!c.check_ownership("mc").await);
        m.remove_async().await;

        let m = server
            .mock("GET", "/entitlements/mcstore")
            .with_body(r#"{"items":[]}"#)
            .create_async()
            .await;
        assert!(!c.check_ownership("mc").await);
        m.remove_async().await;

        server
            .mock("GET", "/entitlements/mcstore")
            .match_header("authorization", "Bearer mc")
            .with_body(r#"{"items":[{"name":"game_minecraft"}]}"#)
            .create_async()
            .await;
        assert!(c.check_ownership("mc").await);
    }

    #[tokio::test]
    async fn profile_fetch() {
        let mut server = mockito::Server::new_async().await;
        let c = client(&server);

        let m = server
            .mock("GET", "/minecraft/profile")
            .with_status(404)
            .create_async()
            .await;
        assert!(matches!(
            c.fetch_profile("mc").await,
            Err(AuthError::ProfileUnavailable { status: 404 })
        ));
        m.remove_async().await;

        server
            .mock("GET", "/minecraft/profile")
            .with_body(r#"{"id":"069a79f444e94726a5befca90e38aaf5","name":"Notch","skins":[]}"#)
            .create_async()
            .await;
        let profile = c.fetch_profile("mc").await.unwrap();
        assert_eq!(profile.name, "Notch");
        assert_eq!(profile.dashed_uuid(), "069a79f4-44e9-4726-a5be-fca90e38aaf5");
    }

    #[tokio::test]
    async fn unreachable_profile_host_is_profile_error() {
        let c = AuthClient::new(Client::new(), "cid", "XboxLive.signin")
            .with_endpoints(AuthEndpoints::with_base("http://127.0.0.1:9"));
        assert!(matches!(
            c.fetch_profile("mc").await,
            Err(AuthError::ProfileUnavailable { status: 0 })
        ));
    }
}
