use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::AuthClient;
use crate::core::error::{AuthError, AuthResult};

/// An Xbox Live or XSTS token together with its user hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XboxToken {
    pub token: String,
    pub user_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinecraftToken {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct XboxAuthResponse {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "DisplayClaims")]
    display_claims: XboxDisplayClaims,
}

#[derive(Debug, Deserialize)]
struct XboxDisplayClaims {
    xui: Vec<XboxUserClaim>,
}

#[derive(Debug, Deserialize)]
struct XboxUserClaim {
    uhs: String,
}

impl XboxAuthResponse {
    fn into_token(self) -> Option<XboxToken> {
        let user_hash = self.display_claims.xui.into_iter().next()?.uhs;
        Some(XboxToken {
            token: self.token,
            user_hash,
        })
    }
}

#[derive(Debug, Deserialize)]
struct McAuthResponse {
    access_token: String,
    #[serde(default = "default_mc_lifetime")]
    expires_in: i64,
}

fn default_mc_lifetime() -> i64 {
    86400
}

/// The `XErr` code of an XSTS error body, if present.
pub fn parse_xerr(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("XErr").cloned())
        .and_then(|v| v.as_u64())
}

pub fn identity_token(user_hash: &str, xsts_token: &str) -> String {
    format!("XBL3.0 x={};{}", user_hash, xsts_token)
}

fn trim_body(body: &str) -> String {
    let body = body.trim();
    if body.len() > 200 {
        let mut end = 200;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    } else {
        body.to_string()
    }
}

impl AuthClient {
    pub async fn exchange_for_xbox_live_token(&self, ms_access_token: &str) -> AuthResult<XboxToken> {
        let body = json!({
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={}", ms_access_token),
            },
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT"
        });

        let response = self
            .http
            .post(&self.endpoints.xbox_live)
            .header("Accept", "application/json")
            .header("x-xbl-contract-version", "1")
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::XboxAuthError {
                status: 0,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::XboxAuthError {
                status: status.as_u16(),
                message: trim_body(&text),
            });
        }

        let token = response
            .json::<XboxAuthResponse>()
            .await
            .ok()
            .and_then(XboxAuthResponse::into_token)
            .ok_or_else(|| AuthError::XboxAuthError {
                status: status.as_u16(),
                message: "response carries no token or user hash".into(),
            })?;
        debug!("Xbox Live token acquired");
        Ok(token)
    }

    /// Authorize against the Minecraft relying party. Failures keep the
    /// provider's `XErr` code.
    pub async fn exchange_for_xsts_token(&self, xbox: &XboxToken) -> AuthResult<XboxToken> {
        let body = json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [xbox.token],
            },
            "RelyingParty": "rp://api.minecraftservices.com/",
            "TokenType": "JWT"
        });

        let response = self
            .http
            .post(&self.endpoints.xsts)
            .header("Accept", "application/json")
            .header("x-xbl-contract-version", "1")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("XSTS request failed: {}", e);
                AuthError::XstsAuthError { status: 0, xerr: None }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let xerr = parse_xerr(&text);
            warn!("XSTS authorization failed: HTTP {} XErr {:?}", status, xerr);
            return Err(AuthError::XstsAuthError {
                status: status.as_u16(),
                xerr,
            });
        }

        let mut token = response
            .json::<XboxAuthResponse>()
            .await
            .ok()
            .and_then(XboxAuthResponse::into_token)
            .ok_or(AuthError::XstsAuthError {
                status: status.as_u16(),
                xerr: None,
            })?;
        // Fall back to the XBL hash if XSTS returns an empty one.
        if token.user_hash.is_empty() {
            token.user_hash = xbox.user_hash.clone();
        }
        debug!("XSTS token acquired");
        Ok(token)
    }

    pub async fn exchange_for_minecraft_token(&self, xsts: &XboxToken) -> AuthResult<MinecraftToken> {
        let body = json!({
            "identityToken": identity_token(&xsts.user_hash, &xsts.token),
        });

        let response = self
            .http
            .post(&self.endpoints.minecraft_login)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::MinecraftAuthError {
                status: 0,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::MinecraftAuthError {
                status: status.as_u16(),
                message: trim_body(&text),
            });
        }

        let mc = response
            .json::<McAuthResponse>()
            .await
            .map_err(|e| AuthError::MinecraftAuthError {
                status: status.as_u16(),
                message: format!("malformed response: {}", e),
            })?;
        debug!("Minecraft access token acquired");
        Ok(MinecraftToken {
            access_token: mc.access_token,
            expires_in: mc.expires_in,
        })
    }
}
