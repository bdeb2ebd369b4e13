use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::AuthClient;
use crate::core::error::{AuthError, AuthResult};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// A started device-code sign-in, as returned by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeFlow {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(rename = "interval", default = "default_interval")]
    pub poll_interval_secs: u64,
    #[serde(rename = "expires_in", default = "default_expires_in")]
    pub expires_in_secs: u64,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

fn default_expires_in() -> u64 {
    900
}

/// Microsoft account token.
#[derive(Debug, Clone, Deserialize)]
pub struct MsToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_lifetime")]
    pub expires_in: i64,
}

fn default_token_lifetime() -> i64 {
    3600
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    Token(MsToken),
    /// `authorization_pending`: the user has not finished yet.
    Pending,
    /// `slow_down`: keep polling, less often.
    SlowDown,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn describe(&self, status: u16) -> String {
        match (&self.error_description, self.error.is_empty()) {
            (Some(desc), _) => format!("{} ({})", self.error, first_line(desc)),
            (None, false) => self.error.clone(),
            (None, true) => format!("HTTP {}", status),
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s).trim()
}

/// One poll of the token endpoint. A trait so the polling loop can be
/// driven by something other than the live endpoint.
#[async_trait]
pub trait DeviceTokenSource: Send + Sync {
    async fn poll_for_token(&self, flow: &DeviceCodeFlow) -> AuthResult<PollOutcome>;
}

impl AuthClient {
    /// Ask the identity provider for a user code.
    pub async fn start_device_code_flow(&self) -> AuthResult<DeviceCodeFlow> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("scope", self.scopes.as_str()),
        ];
        let response = self
            .http
            .post(&self.endpoints.device_code)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::AuthProviderError(format!("device code request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = OAuthErrorBody::parse(&body);
            return Err(AuthError::AuthProviderError(err.describe(status.as_u16())));
        }

        let flow = response
            .json::<DeviceCodeFlow>()
            .await
            .map_err(|e| AuthError::AuthProviderError(format!("malformed device code response: {}", e)))?;
        info!(
            "Device code issued; expires in {}s, poll every {}s",
            flow.expires_in_secs, flow.poll_interval_secs
        );
        Ok(flow)
    }

    /// Exchange the code from a browser redirect (PKCE).
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> AuthResult<MsToken> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
            ("scope", self.scopes.as_str()),
        ];
        let response = self.post_token(&params).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = OAuthErrorBody::parse(&body);
            return Err(match err.error.as_str() {
                "access_denied" | "authorization_declined" => {
                    AuthError::AuthorizationDeclined(err.describe(status.as_u16()))
                }
                _ => AuthError::AuthProviderError(err.describe(status.as_u16())),
            });
        }
        parse_token(response).await
    }

    /// Silently renew the Microsoft token. A rejected refresh token is
    /// `RefreshRejected`; the caller must start an interactive flow.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<MsToken> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", self.scopes.as_str()),
        ];
        let response = self.post_token(&params).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = OAuthErrorBody::parse(&body);
            if err.error == "invalid_grant" || status.as_u16() == 401 {
                warn!("Refresh token rejected: {}", err.describe(status.as_u16()));
                return Err(AuthError::RefreshRejected);
            }
            return Err(AuthError::AuthProviderError(err.describe(status.as_u16())));
        }
        debug!("Microsoft token refreshed");
        parse_token(response).await
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> AuthResult<reqwest::Response> {
        self.http
            .post(&self.endpoints.token)
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::AuthProviderError(format!("token request failed: {}", e)))
    }
}

async fn parse_token(response: reqwest::Response) -> AuthResult<MsToken> {
    response
        .json::<MsToken>()
        .await
        .map_err(|e| AuthError::AuthProviderError(format!("malformed token response: {}", e)))
}

#[async_trait]
impl DeviceTokenSource for AuthClient {
    async fn poll_for_token(&self, flow: &DeviceCodeFlow) -> AuthResult<PollOutcome> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", DEVICE_CODE_GRANT),
            ("device_code", flow.device_code.as_str()),
        ];
        let response = self.post_token(&params).await?;
        let status = response.status();

        if status.is_success() {
            return parse_token(response).await.map(PollOutcome::Token);
        }

        let body = response.text().await.unwrap_or_default();
        let err = OAuthErrorBody::parse(&body);
        match err.error.as_str() {
            "authorization_pending" => Ok(PollOutcome::Pending),
            "slow_down" => Ok(PollOutcome::SlowDown),
            "authorization_declined" | "access_denied" => Err(AuthError::AuthorizationDeclined(
                err.describe(status.as_u16()),
            )),
            "expired_token" | "code_expired" => Err(AuthError::DeviceCodeExpired),
            _ => Err(AuthError::AuthProviderError(err.describe(status.as_u16()))),
        }
    }
}
