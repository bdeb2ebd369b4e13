use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use url::Url;

use super::AuthEndpoints;
use crate::core::error::{AuthError, AuthResult};

/// Verifier, S256 challenge and anti-forgery state for one browser sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        // 64 hex chars: inside the 43..=128 range RFC 7636 allows.
        let verifier = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
            state: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// The URL to open in the user's browser.
    pub fn authorization_url(
        &self,
        endpoints: &AuthEndpoints,
        client_id: &str,
        redirect_uri: &str,
        scopes: &str,
    ) -> AuthResult<String> {
        let url = Url::parse_with_params(
            &endpoints.authorize,
            &[
                ("client_id", client_id),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("scope", scopes),
                ("prompt", "select_account"),
                ("code_challenge", self.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", self.state.as_str()),
            ],
        )
        .map_err(|e| AuthError::AuthProviderError(format!("invalid authorize endpoint: {}", e)))?;
        Ok(url.into())
    }

    /// Pull the authorization code out of the redirect the browser landed
    /// on, checking `state` against this attempt.
    pub fn parse_redirect(&self, redirect: &str) -> AuthResult<String> {
        let url = Url::parse(redirect.trim())
            .map_err(|e| AuthError::AuthProviderError(format!("invalid redirect URL: {}", e)))?;

        let param = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };

        if let Some(error) = param("error") {
            let description = param("error_description").unwrap_or_default();
            let message = format!("{} {}", error, description).trim().to_string();
            return Err(match error.as_str() {
                "access_denied" | "authorization_declined" => {
                    AuthError::AuthorizationDeclined(message)
                }
                _ => AuthError::AuthProviderError(message),
            });
        }

        if param("state").as_deref() != Some(self.state.as_str()) {
            return Err(AuthError::StateMismatch);
        }

        param("code")
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::AuthProviderError("redirect carries no code".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_is_s256_of_verifier() {
        let p = PkceChallenge::generate();
        assert_eq!(p.verifier.len(), 64);
        assert_eq!(
            p.challenge,
            URL_SAFE_NO_PAD.encode(Sha256::digest(p.verifier.as_bytes()))
        );
        assert!(!p.challenge.contains('='));
    }

    #[test]
    fn authorization_url_carries_challenge_and_state() {
        let p = PkceChallenge::generate();
        let url = p
            .authorization_url(&AuthEndpoints::default(), "cid", "http://localhost/cb", "XboxLive.signin")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("code_challenge".into(), p.challenge.clone())));
        assert!(pairs.contains(&("state".into(), p.state.clone())));
        assert!(pairs.contains(&("code_challenge_method".into(), "S256".into())));
    }

    #[test]
    fn redirect_parsing() {
        let p = PkceChallenge::generate();

        let ok = format!("http://localhost/cb?code=abc&state={}", p.state);
        assert_eq!(p.parse_redirect(&ok).unwrap(), "abc");

        let forged = "http://localhost/cb?code=abc&state=other";
        assert!(matches!(p.parse_redirect(forged), Err(AuthError::StateMismatch)));

        let denied = format!("http://localhost/cb?error=access_denied&state={}", p.state);
        assert!(matches!(
            p.parse_redirect(&denied),
            Err(AuthError::AuthorizationDeclined(_))
        ));
    }
}
