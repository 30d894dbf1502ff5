//! AuthSession - chart provider login state machine
//!
//! ```text
//! LoggedOut --start_auth--> AwaitingCallback --callback ok--> LoggedIn
//! LoggedOut --relogin-----> Refreshing -------refresh ok---> LoggedIn
//! any failure or cancel_auth ---------------------------------> LoggedOut
//! ```
//!
//! The interactive login hands its challenge to a task serving the loopback
//! callback. That task owns the attempt until it finishes and reports the
//! outcome through a one-shot channel ([`PendingAuth::wait`]). Only one
//! attempt may be in flight at a time.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;
use crate::Result;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::Error;
use crate::http::HttpsClient;
use super::callback_server::{CallbackServer, FormFields};
use super::pkce::AuthChallenge;
use super::provider::{IdentityProvider, TokenSet};
use super::signed::{fetch_signed_access, ChartCredentials, SignedAccess, SignedAccessEndpoints};
use super::token_store::TokenStore;

/// Observable login state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    AwaitingCallback,
    Refreshing,
    LoggedIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingCallback,
    Refreshing,
}

struct Inner {
    phase: Phase,
    /// Id of the most recent attempt
    attempt: u64,
    cancel: CancelToken,
    tokens: TokenSet,
    store: Option<TokenStore>,
    signed: Option<SignedAccess>,
}

impl Inner {
    /// Adopt a fresh token set and persist its refresh token
    fn install(&mut self, tokens: TokenSet) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&tokens.refresh_token) {
                tracing::warn!("Failed to save login to {:?}: {}", store.path(), e);
            }
        } else {
            tracing::warn!("No cache directory configured, login will not be remembered");
        }
        self.tokens = tokens;
        self.signed = None;
    }

    /// Forget every credential, on disk and in memory
    fn revoke(&mut self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                tracing::warn!("Failed to delete saved login {:?}: {}", store.path(), e);
            }
        }
        self.tokens = TokenSet::default();
        self.signed = None;
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-flight attempt. Dropping it returns the session to idle unless a
/// newer attempt has started since.
struct Attempt {
    id: u64,
    cancel: CancelToken,
    inner: Arc<Mutex<Inner>>,
}

impl Attempt {
    /// Install `tokens` unless this attempt was cancelled meanwhile
    fn complete(&self, tokens: TokenSet) -> Result<()> {
        let mut inner = lock(&self.inner);
        if self.cancel.is_cancelled() || inner.attempt != self.id {
            return Err(Error::Cancelled);
        }
        inner.install(tokens);
        Ok(())
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        let mut inner = lock(&self.inner);
        if inner.attempt == self.id {
            inner.phase = Phase::Idle;
        }
    }
}

/// Interactive login waiting for the browser
///
/// Open [`url`](Self::url) in a browser, then await [`wait`](Self::wait).
#[derive(Debug)]
pub struct PendingAuth {
    url: String,
    port: u16,
    done: oneshot::Receiver<Result<()>>,
}

impl PendingAuth {
    /// Authorization URL to open in a browser
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Loopback port the provider redirects to
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves once the callback has been handled, failed or was cancelled
    pub async fn wait(self) -> Result<()> {
        self.done.await.unwrap_or(Err(Error::Cancelled))
    }
}

/// Callback handling for one interactive attempt. Runs on the server task.
struct PendingLogin {
    challenge: AuthChallenge,
    provider: IdentityProvider,
    attempt: Attempt,
}

impl PendingLogin {
    async fn on_auth_reply(&self, fields: FormFields) -> Result<()> {
        // The loopback port accepts any POST, so the state must match first
        let state = fields
            .get("state")
            .ok_or_else(|| Error::Protocol("No state".to_string()))?;
        if state != &self.challenge.state {
            return Err(Error::Protocol("Invalid state, the link only works once!".to_string()));
        }

        if let Some(error) = fields.get("error") {
            let description = fields
                .get("error_description")
                .map(String::as_str)
                .unwrap_or("Unknown error");
            return Err(Error::Auth(format!("Authorization failed: {} - {}", error, description)));
        }

        let session_state = fields
            .get("session_state")
            .ok_or_else(|| Error::Protocol("No session_state".to_string()))?;
        let code = fields
            .get("code")
            .ok_or_else(|| Error::Protocol("No auth code".to_string()))?;

        let tokens = self
            .provider
            .exchange_code(code, session_state, &self.challenge, &self.attempt.cancel)
            .await?;
        self.attempt.complete(tokens)?;

        // The attempt is satisfied, stop anything still tied to it
        self.attempt.cancel.cancel();
        tracing::info!("Chart login complete");
        Ok(())
    }
}

/// Chart provider login session
pub struct AuthSession {
    provider: IdentityProvider,
    http: HttpsClient,
    signed_endpoints: SignedAccessEndpoints,
    inner: Arc<Mutex<Inner>>,
}

impl AuthSession {
    pub fn new(config: &Config) -> Self {
        let http = HttpsClient::new();
        Self {
            provider: IdentityProvider::new(config, http.clone()),
            http,
            signed_endpoints: SignedAccessEndpoints {
                enroute_key_url: config.endpoints.enroute_key_url.clone(),
                signed_cookies_url: config.endpoints.signed_cookies_url.clone(),
                ttl_secs: config.signed_access_ttl_secs,
            },
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                attempt: 0,
                cancel: CancelToken::new(),
                tokens: TokenSet::default(),
                store: None,
                signed: None,
            })),
        }
    }

    /// Create a session using the configured cache directory
    pub fn from_config(config: &Config) -> Result<Self> {
        let session = Self::new(config);
        session.configure_cache(&config.cache_dir)?;
        Ok(session)
    }

    /// Set the persistence directory and load a saved login from it
    pub fn configure_cache(&self, dir: impl AsRef<Path>) -> Result<()> {
        let store = TokenStore::open(dir)?;
        let saved = store.load()?;

        let mut inner = lock(&self.inner);
        if let Some(refresh_token) = saved {
            tracing::debug!("Loaded saved login from {:?}", store.path());
            inner.tokens.refresh_token = refresh_token;
        }
        inner.store = Some(store);
        Ok(())
    }

    /// Whether this build can log in at all
    pub fn is_supported(&self) -> bool {
        self.provider.is_supported()
    }

    /// Whether a refresh token is held
    pub fn can_relogin(&self) -> bool {
        !lock(&self.inner).tokens.refresh_token.is_empty()
    }

    pub fn is_logged_in(&self) -> bool {
        !lock(&self.inner).tokens.access_token.is_empty()
    }

    pub fn state(&self) -> SessionState {
        let inner = lock(&self.inner);
        match inner.phase {
            Phase::AwaitingCallback => SessionState::AwaitingCallback,
            Phase::Refreshing => SessionState::Refreshing,
            Phase::Idle if !inner.tokens.access_token.is_empty() => SessionState::LoggedIn,
            Phase::Idle => SessionState::LoggedOut,
        }
    }

    /// Current access token, if logged in
    pub fn access_token(&self) -> Option<String> {
        let inner = lock(&self.inner);
        if inner.tokens.access_token.is_empty() {
            None
        } else {
            Some(inner.tokens.access_token.clone())
        }
    }

    /// Current identity token, if logged in. Its signature is not verified.
    pub fn id_token(&self) -> Option<String> {
        let inner = lock(&self.inner);
        if inner.tokens.id_token.is_empty() {
            None
        } else {
            Some(inner.tokens.id_token.clone())
        }
    }

    fn begin(&self, phase: Phase) -> Result<Attempt> {
        let mut inner = lock(&self.inner);
        if inner.phase != Phase::Idle {
            return Err(Error::Auth("A login attempt is already in progress".to_string()));
        }

        inner.attempt += 1;
        inner.cancel = CancelToken::new();
        inner.phase = phase;

        Ok(Attempt {
            id: inner.attempt,
            cancel: inner.cancel.clone(),
            inner: Arc::clone(&self.inner),
        })
    }

    /// Start the interactive browser login
    ///
    /// Binds the loopback callback server and returns the authorization URL
    /// together with a handle that resolves when the login finishes.
    pub async fn start_auth(&self) -> Result<PendingAuth> {
        if !self.is_supported() {
            return Err(Error::Unsupported);
        }

        let attempt = self.begin(Phase::AwaitingCallback)?;
        let server = CallbackServer::bind().await?;
        let port = server.port();

        let challenge = AuthChallenge::new(port);
        let url = self.provider.authorization_url(&challenge)?;
        let cancel = attempt.cancel.clone();

        let login = PendingLogin {
            challenge,
            provider: self.provider.clone(),
            attempt,
        };

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = {
                let login = &login;
                server.serve_once(cancel, move |fields| login.on_auth_reply(fields)).await
            };

            match &result {
                Ok(()) => {}
                Err(Error::Cancelled) => tracing::info!("Chart login cancelled"),
                Err(e) => tracing::warn!("Chart login failed: {}", e),
            }

            drop(login);
            let _ = tx.send(result);
        });

        tracing::info!("Waiting for chart login callback on port {}", port);
        Ok(PendingAuth { url, port, done: rx })
    }

    /// Log in again with the saved refresh token
    ///
    /// If the provider rejects the token it is deleted from disk and memory
    /// and [`Error::LoginExpired`] is returned; an interactive
    /// [`start_auth`](Self::start_auth) is needed after that.
    pub async fn relogin(&self) -> Result<()> {
        if !self.is_supported() {
            return Err(Error::Unsupported);
        }

        let refresh_token = lock(&self.inner).tokens.refresh_token.clone();
        if refresh_token.is_empty() {
            return Err(Error::NoRefreshToken);
        }

        let attempt = self.begin(Phase::Refreshing)?;

        match self.provider.refresh(&refresh_token, &attempt.cancel).await {
            Ok(tokens) => {
                attempt.complete(tokens)?;
                tracing::info!("Chart login refreshed");
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                tracing::warn!("Saved chart login was rejected: {}", e);
                lock(&self.inner).revoke();
                Err(Error::LoginExpired)
            }
            Err(e) => Err(e),
        }
    }

    /// Abort whatever login attempt is in flight. Idempotent.
    pub fn cancel_auth(&self) {
        let mut inner = lock(&self.inner);
        inner.cancel.cancel();
        inner.phase = Phase::Idle;
    }

    /// Cancel any attempt and forget the login, including the saved one
    pub fn logout(&self) {
        self.cancel_auth();
        lock(&self.inner).revoke();
        tracing::info!("Logged out of charts");
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        self.cancel_auth();
    }
}

#[async_trait]
impl ChartCredentials for AuthSession {
    async fn signed_access(&self, cancel: &CancelToken) -> Result<SignedAccess> {
        let access_token = {
            let inner = lock(&self.inner);
            if let Some(signed) = inner.signed.as_ref().filter(|s| !s.is_expired()) {
                return Ok(signed.clone());
            }
            inner.tokens.access_token.clone()
        };
        if access_token.is_empty() {
            return Err(Error::NotLoggedIn);
        }

        let signed = fetch_signed_access(&self.http, &self.signed_endpoints, &access_token, cancel).await?;

        let mut inner = lock(&self.inner);
        if inner.tokens.access_token == access_token {
            inner.signed = Some(signed.clone());
        }
        Ok(signed)
    }
}
