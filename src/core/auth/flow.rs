// ─── Login Flow ───
// One state machine per login attempt, driving the exchanges in order and
// naming the step that failed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    AccountMode, AuthClient, Credential, CredentialStore, DeviceCodeFlow, DeviceTokenSource,
    MsToken, PkceChallenge, PollOutcome, Profile,
};
use crate::core::error::{AuthError, AuthResult};
use crate::core::task::{run_every, Scheduled, Tick};

/// Extra wait added after each `slow_down`.
const SLOW_DOWN_STEP_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    DeviceCodeRequested,
    AwaitingUserCompletion {
        user_code: String,
        verification_uri: String,
    },
    TokenAcquired,
    XboxAuthenticated,
    XstsAuthenticated,
    MinecraftAuthenticated,
    Complete,
    Failed(String),
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::Complete | LoginState::Failed(_))
    }
}

/// Observer for state changes, e.g. to show the user code.
pub type StateListener = Arc<dyn Fn(&LoginState) + Send + Sync>;

/// State of a single login attempt. Terminal states are final.
pub struct LoginAttempt {
    state: LoginState,
    listener: Option<StateListener>,
}

impl Default for LoginAttempt {
    fn default() -> Self {
        Self::new(None)
    }
}

impl LoginAttempt {
    pub fn new(listener: Option<StateListener>) -> Self {
        Self {
            state: LoginState::Idle,
            listener,
        }
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    pub fn advance(&mut self, next: LoginState) {
        if self.state.is_terminal() {
            warn!("Ignoring transition {:?} after {:?}", next, self.state);
            return;
        }
        debug!("Login: {:?} -> {:?}", self.state, next);
        self.state = next;
        if let Some(listener) = &self.listener {
            listener(&self.state);
        }
    }

    pub fn fail(&mut self, err: &AuthError) {
        self.advance(LoginState::Failed(err.to_string()));
    }
}

/// How the user wants to sign in.
#[derive(Debug, Clone)]
pub enum LoginMethod {
    DeviceCode,
    /// Browser redirect captured by the host, for a challenge it generated.
    AuthorizationCode {
        redirect_url: String,
        pkce: PkceChallenge,
    },
    /// Stored credential, refreshed once if expired.
    Cached,
    Offline {
        username: String,
    },
}

/// Poll the token endpoint on the flow's interval until it yields a token,
/// fails, is cancelled, or the device code expires.
pub async fn await_device_token(
    source: &dyn DeviceTokenSource,
    flow: &DeviceCodeFlow,
    attempt: &mut LoginAttempt,
    cancel: CancellationToken,
) -> AuthResult<MsToken> {
    let interval_secs = AtomicU64::new(flow.poll_interval_secs.max(1));
    let interval_secs = &interval_secs;
    let deadline = Instant::now() + Duration::from_secs(flow.expires_in_secs);

    let outcome = run_every(
        Duration::from_secs(interval_secs.load(Ordering::SeqCst)),
        Some(deadline),
        cancel,
        || async move {
            match source.poll_for_token(flow).await {
                Ok(PollOutcome::Token(token)) => Tick::Done(Ok(token)),
                Ok(PollOutcome::Pending) => Tick::Continue,
                Ok(PollOutcome::SlowDown) => {
                    let next = interval_secs.fetch_add(SLOW_DOWN_STEP_SECS, Ordering::SeqCst)
                        + SLOW_DOWN_STEP_SECS;
                    debug!("Provider asked to slow down; polling every {}s", next);
                    Tick::Reschedule(Duration::from_secs(next))
                }
                Err(e) => Tick::Done(Err(e)),
            }
        },
    )
    .await;

    let result = match outcome {
        Scheduled::Completed(result) => result,
        Scheduled::Cancelled => Err(AuthError::Cancelled),
        Scheduled::Expired => Err(AuthError::Timeout),
    };

    match &result {
        Ok(_) => attempt.advance(LoginState::TokenAcquired),
        Err(e) => attempt.fail(e),
    }
    result
}

/// Login orchestration over an `AuthClient` and a `CredentialStore`.
pub struct Authenticator {
    client: AuthClient,
    store: CredentialStore,
    redirect_uri: String,
}

impl Authenticator {
    pub fn new(client: AuthClient, store: CredentialStore, redirect_uri: impl Into<String>) -> Self {
        Self {
            client,
            store,
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// A fresh PKCE challenge and the URL the host should open.
    pub fn begin_browser_login(&self) -> AuthResult<(PkceChallenge, String)> {
        let pkce = PkceChallenge::generate();
        let url = pkce.authorization_url(
            self.client.endpoints(),
            self.client.client_id(),
            &self.redirect_uri,
            self.client.scopes(),
        )?;
        Ok((pkce, url))
    }

    /// Run `method` to completion. Nothing is persisted unless the whole
    /// chain succeeds.
    pub async fn login(
        &self,
        method: LoginMethod,
        attempt: &mut LoginAttempt,
        cancel: CancellationToken,
    ) -> AuthResult<Profile> {
        let result = match method {
            LoginMethod::Offline { username } => {
                let profile = Profile::offline(&username);
                info!("Offline login as {}", profile.username);
                attempt.advance(LoginState::Complete);
                return Ok(profile);
            }
            LoginMethod::DeviceCode => self.device_code_login(attempt, cancel).await,
            LoginMethod::AuthorizationCode { redirect_url, pkce } => {
                self.authorization_code_login(&redirect_url, &pkce, attempt).await
            }
            LoginMethod::Cached => self.cached_login(attempt).await,
        };

        match &result {
            Ok(profile) => {
                info!("Logged in as {}", profile.username);
                attempt.advance(LoginState::Complete);
            }
            Err(e) => {
                warn!("Login failed: {}", e);
                attempt.fail(e);
            }
        }
        result
    }

    async fn device_code_login(
        &self,
        attempt: &mut LoginAttempt,
        cancel: CancellationToken,
    ) -> AuthResult<Profile> {
        attempt.advance(LoginState::DeviceCodeRequested);
        let flow = self.client.start_device_code_flow().await?;
        attempt.advance(LoginState::AwaitingUserCompletion {
            user_code: flow.user_code.clone(),
            verification_uri: flow.verification_uri.clone(),
        });

        let token = await_device_token(&self.client, &flow, attempt, cancel).await?;
        self.complete_chain(token, None, attempt).await
    }

    async fn authorization_code_login(
        &self,
        redirect_url: &str,
        pkce: &PkceChallenge,
        attempt: &mut LoginAttempt,
    ) -> AuthResult<Profile> {
        let code = pkce.parse_redirect(redirect_url)?;
        let token = self
            .client
            .exchange_authorization_code(&code, &pkce.verifier, &self.redirect_uri)
            .await?;
        attempt.advance(LoginState::TokenAcquired);
        self.complete_chain(token, None, attempt).await
    }

    async fn cached_login(&self, attempt: &mut LoginAttempt) -> AuthResult<Profile> {
        let credential = self.store.load().await.ok_or(AuthError::NotLoggedIn)?;

        if credential.minecraft_token_valid_at(Utc::now()) {
            if let (Some(token), Some(username), Some(uuid)) = (
                &credential.minecraft_access_token,
                &credential.username,
                &credential.uuid,
            ) {
                debug!("Reusing stored Minecraft token");
                return Ok(Profile {
                    mode: AccountMode::Microsoft,
                    username: username.clone(),
                    uuid: uuid.clone(),
                    minecraft_access_token: token.clone(),
                });
            }
        }

        let Some(refresh_token) = credential.refresh_token.clone() else {
            self.store.clear().await;
            return Err(AuthError::RefreshRejected);
        };

        // One refresh only; a rejection sends the user back to an
        // interactive flow.
        let token = match self.client.refresh(&refresh_token).await {
            Ok(token) => token,
            Err(AuthError::RefreshRejected) => {
                self.store.clear().await;
                return Err(AuthError::RefreshRejected);
            }
            Err(e) => return Err(e),
        };
        attempt.advance(LoginState::TokenAcquired);
        self.complete_chain(token, Some(refresh_token), attempt).await
    }

    /// XBL → XSTS → Minecraft → entitlement → profile, then persist.
    async fn complete_chain(
        &self,
        token: MsToken,
        previous_refresh: Option<String>,
        attempt: &mut LoginAttempt,
    ) -> AuthResult<Profile> {
        let xbl = self
            .client
            .exchange_for_xbox_live_token(&token.access_token)
            .await?;
        attempt.advance(LoginState::XboxAuthenticated);

        let xsts = self.client.exchange_for_xsts_token(&xbl).await?;
        attempt.advance(LoginState::XstsAuthenticated);

        let mc = self.client.exchange_for_minecraft_token(&xsts).await?;
        attempt.advance(LoginState::MinecraftAuthenticated);

        if !self.client.check_ownership(&mc.access_token).await {
            return Err(AuthError::EntitlementCheckFailed);
        }
        let mc_profile = self.client.fetch_profile(&mc.access_token).await?;
        let uuid = mc_profile.dashed_uuid();

        let now = Utc::now();
        let credential = Credential {
            account_id: uuid.clone(),
            access_token: token.access_token,
            refresh_token: token.refresh_token.or(previous_refresh),
            expires_at: now + chrono::Duration::seconds(token.expires_in),
            minecraft_access_token: Some(mc.access_token.clone()),
            minecraft_expires_at: Some(now + chrono::Duration::seconds(mc.expires_in)),
            username: Some(mc_profile.name.clone()),
            uuid: Some(uuid.clone()),
        };
        self.store.save(&credential).await?;

        Ok(Profile {
            mode: AccountMode::Microsoft,
            username: mc_profile.name,
            uuid,
            minecraft_access_token: mc.access_token,
        })
    }

    pub async fn logout(&self) {
        self.store.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::Client;

    use super::*;
    use crate::core::auth::AuthEndpoints;

    /// Answers `pending` a fixed number of times, then yields a token.
    struct ScriptedProvider {
        pending: usize,
        slow_down_first: bool,
        calls: AtomicUsize,
        times: Mutex<Vec<Instant>>,
    }

    impl ScriptedProvider {
        fn new(pending: usize) -> Self {
            Self {
                pending,
                slow_down_first: false,
                calls: AtomicUsize::new(0),
                times: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeviceTokenSource for ScriptedProvider {
        async fn poll_for_token(&self, _flow: &DeviceCodeFlow) -> AuthResult<PollOutcome> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.times.lock().unwrap().push(Instant::now());
            if n == 0 && self.slow_down_first {
                return Ok(PollOutcome::SlowDown);
            }
            if n < self.pending {
                return Ok(PollOutcome::Pending);
            }
            Ok(PollOutcome::Token(MsToken {
                access_token: "at".into(),
                refresh_token: Some("rt".into()),
                expires_in: 3600,
            }))
        }
    }

    fn flow(interval: u64, expires_in: u64) -> DeviceCodeFlow {
        DeviceCodeFlow {
            device_code: "dc".into(),
            user_code: "CODE".into(),
            verification_uri: "https://microsoft.com/link".into(),
            poll_interval_secs: interval,
            expires_in_secs: expires_in,
            message: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pending_n_times_then_token_polls_n_plus_one() {
        let provider = ScriptedProvider::new(3);
        let mut attempt = LoginAttempt::default();

        let token = await_device_token(&provider, &flow(5, 900), &mut attempt, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(token.access_token, "at");
        assert_eq!(provider.calls(), 4);
        assert_eq!(attempt.state(), &LoginState::TokenAcquired);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_device_code_times_out_without_more_polls() {
        let provider = ScriptedProvider::new(usize::MAX);
        let mut attempt = LoginAttempt::default();

        let err = await_device_token(&provider, &flow(5, 12), &mut attempt, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Timeout));
        assert_eq!(provider.calls(), 2);
        assert!(matches!(attempt.state(), LoginState::Failed(_)));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_down_stretches_the_interval() {
        let mut provider = ScriptedProvider::new(1);
        provider.slow_down_first = true;
        let mut attempt = LoginAttempt::default();

        await_device_token(&provider, &flow(5, 900), &mut attempt, CancellationToken::new())
            .await
            .unwrap();

        let times = provider.times.lock().unwrap();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1] - times[0], Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_polling_stops() {
        let provider = ScriptedProvider::new(usize::MAX);
        let mut attempt = LoginAttempt::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let err = await_device_token(&provider, &flow(5, 900), &mut attempt, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Cancelled));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn terminal_state_is_final() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut attempt = LoginAttempt::new(Some(Arc::new(move |s: &LoginState| {
            sink.lock().unwrap().push(s.clone())
        })));

        attempt.advance(LoginState::DeviceCodeRequested);
        attempt.fail(&AuthError::DeviceCodeExpired);
        attempt.advance(LoginState::TokenAcquired);

        assert!(matches!(attempt.state(), LoginState::Failed(_)));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    fn authenticator(server: &mockito::Server, dir: &std::path::Path) -> Authenticator {
        let client = AuthClient::new(Client::new(), "cid", "XboxLive.signin")
            .with_endpoints(AuthEndpoints::with_base(&server.url()));
        Authenticator::new(
            client,
            CredentialStore::new(dir.join("credentials.json")),
            "http://localhost/cb",
        )
    }

    async fn mock_chain(server: &mut mockito::Server, owns_game: bool) {
        server
            .mock("POST", "/user/authenticate")
            .with_body(r#"{"Token":"xbl","DisplayClaims":{"xui":[{"uhs":"hash"}]}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/xsts/authorize")
            .with_body(r#"{"Token":"xsts","DisplayClaims":{"xui":[{"uhs":"hash"}]}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/authentication/login_with_xbox")
            .with_body(r#"{"access_token":"mc-token","expires_in":86400}"#)
            .create_async()
            .await;
        let items = if owns_game { r#"[{"name":"game_minecraft"}]"# } else { "[]" };
        server
            .mock("GET", "/entitlements/mcstore")
            .with_body(format!(r#"{{"items":{}}}"#, items))
            .create_async()
            .await;
        server
            .mock("GET", "/minecraft/profile")
            .with_body(r#"{"id":"069a79f444e94726a5befca90e38aaf5","name":"Notch"}"#)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn browser_login_runs_chain_and_persists() {
        let mut server = mockito::Server::new_async().await;
        mock_chain(&mut server, true).await;
        server
            .mock("POST", "/oauth2/v2.0/token")
            .with_body(r#"{"access_token":"at","refresh_token":"rt","expires_in":3600}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&server, dir.path());
        let (pkce, _) = auth.begin_browser_login().unwrap();
        let redirect = format!("http://localhost/cb?code=xyz&state={}", pkce.state);

        let mut attempt = LoginAttempt::default();
        let profile = auth
            .login(
                LoginMethod::AuthorizationCode {
                    redirect_url: redirect,
                    pkce,
                },
                &mut attempt,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(profile.username, "Notch");
        assert_eq!(attempt.state(), &LoginState::Complete);

        let stored = auth.store().load().await.unwrap();
        assert_eq!(stored.minecraft_access_token.as_deref(), Some("mc-token"));
        assert_eq!(stored.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn missing_entitlement_fails_and_persists_nothing() {
        let mut server = mockito::Server::new_async().await;
        mock_chain(&mut server, false).await;
        server
            .mock("POST", "/oauth2/v2.0/token")
            .with_body(r#"{"access_token":"at","refresh_token":"rt"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&server, dir.path());
        let (pkce, _) = auth.begin_browser_login().unwrap();
        let redirect = format!("http://localhost/cb?code=xyz&state={}", pkce.state);

        let mut attempt = LoginAttempt::default();
        let err = auth
            .login(
                LoginMethod::AuthorizationCode {
                    redirect_url: redirect,
                    pkce,
                },
                &mut attempt,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::EntitlementCheckFailed));
        assert!(auth.store().load().await.is_none());
    }

    #[tokio::test]
    async fn rejected_refresh_clears_store() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/v2.0/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&server, dir.path());
        let now = Utc::now();
        auth.store()
            .save(&Credential {
                account_id: "acc".into(),
                access_token: "old".into(),
                refresh_token: Some("stale".into()),
                expires_at: now - chrono::Duration::hours(1),
                minecraft_access_token: Some("old-mc".into()),
                minecraft_expires_at: Some(now - chrono::Duration::hours(1)),
                username: Some("Steve".into()),
                uuid: Some("acc".into()),
            })
            .await
            .unwrap();

        let err = auth
            .login(LoginMethod::Cached, &mut LoginAttempt::default(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::RefreshRejected));
        assert!(auth.store().load().await.is_none());
    }
}
