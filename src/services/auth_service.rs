//! Auth service client (GoTrue) for SmartMarks.
//!
//! Implements the OAuth authorization-code flow with PKCE: `begin_oauth`
//! produces the provider redirect URL and persists the verifier,
//! `exchange_code` trades the callback's code for a session. The current
//! session is cached in memory, persisted encrypted via [`SessionStore`], and
//! refreshed when it is about to expire. Every session change is broadcast
//! to auth listeners and published on a token watch channel for the realtime
//! connection.

use std::sync::Mutex;

use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, watch};

use crate::backend::{AuthListener, AUTH_EVENT_CAPACITY};
use crate::services::crypto_service::{CryptoService, CryptoServiceTrait};
use crate::services::session_store::{SessionStore, SessionStoreTrait};
use crate::types::errors::AuthError;
use crate::types::session::{AuthEvent, AuthEventKind, AuthSession, AuthUser};

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> AuthSession {
        AuthSession {
            expires_at: self.expires_at.unwrap_or(now + self.expires_in),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user: self.user,
        }
    }
}

/// Error body returned by the auth service.
#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Builds the provider authorize URL for a PKCE flow.
pub fn authorize_url(
    base_url: &str,
    provider: &str,
    redirect_to: &str,
    code_challenge: &str,
) -> Result<String, AuthError> {
    let mut url = Url::parse(&format!("{}/auth/v1/authorize", base_url.trim_end_matches('/')))
        .map_err(|e| AuthError::Rejected(format!("invalid backend url: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("provider", provider)
        .append_pair("redirect_to", redirect_to)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", "s256");
    Ok(url.to_string())
}

/// Pulls the authorization code out of the URL the provider redirected to.
///
/// Accepts a bare code as well as a full callback URL. Provider errors
/// (`?error=…&error_description=…`) become [`AuthError::Rejected`].
pub fn extract_code(callback: &str) -> Result<String, AuthError> {
    let callback = callback.trim();
    let Ok(url) = Url::parse(callback) else {
        if callback.is_empty() {
            return Err(AuthError::MissingCode("empty callback".to_string()));
        }
        return Ok(callback.to_string());
    };

    let mut code = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error_description" => error = Some(value.into_owned()),
            "error" if error.is_none() => error = Some(value.into_owned()),
            _ => {}
        }
    }
    if let Some(error) = error {
        return Err(AuthError::Rejected(error));
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::MissingCode(callback.to_string()))
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// GoTrue client with a persisted, self-refreshing session.
pub struct AuthService {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    refresh_margin_secs: i64,
    crypto: CryptoService,
    store: SessionStore,
    current: Mutex<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
    token_tx: watch::Sender<Option<String>>,
}

impl AuthService {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        anon_key: &str,
        refresh_margin_secs: i64,
        store: SessionStore,
    ) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        let (token_tx, _) = watch::channel(None);
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            refresh_margin_secs,
            crypto: CryptoService::new(),
            store,
            current: Mutex::new(None),
            events,
            token_tx,
        }
    }

    pub fn listener(&self) -> AuthListener {
        AuthListener::new(self.events.subscribe())
    }

    /// Watch channel carrying the newest access token (`None` when signed out).
    pub fn token_watch(&self) -> watch::Receiver<Option<String>> {
        self.token_tx.subscribe()
    }

    /// Generates a PKCE pair, remembers the verifier and returns the authorize URL.
    pub fn begin_oauth(&self, provider: &str, redirect_to: &str) -> Result<String, AuthError> {
        let pkce = self
            .crypto
            .generate_pkce_pair()
            .map_err(|e| AuthError::StorageError(e.to_string()))?;
        self.store
            .save_verifier(&pkce.verifier)
            .map_err(|e| AuthError::StorageError(e.to_string()))?;
        tracing::info!(provider, "starting OAuth sign-in");
        authorize_url(&self.base_url, provider, redirect_to, &pkce.challenge)
    }

    #[tracing::instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> Result<AuthSession, AuthError> {
        let verifier = self
            .store
            .take_verifier()
            .map_err(|e| AuthError::StorageError(e.to_string()))?
            .ok_or_else(|| AuthError::Rejected("no sign-in in progress".to_string()))?;

        let session = self
            .token_request("pkce", json!({ "auth_code": code, "code_verifier": verifier }))
            .await?;
        self.install(Some(session.clone()), AuthEventKind::SignedIn);
        tracing::info!(user = %session.user.id, "signed in");
        Ok(session)
    }

    /// Cached or persisted session, refreshed when close to expiry.
    ///
    /// A session the auth service refuses to refresh is cleared. When the
    /// service is unreachable the stored session is kept: it is returned while
    /// its access token is still valid, and counts as signed out otherwise.
    pub async fn session(&self) -> Result<Option<AuthSession>, AuthError> {
        let cached = self.lock_current().clone();
        let session = match cached {
            Some(session) => Some(session),
            None => match self.store.load_session() {
                Ok(Some(stored)) => {
                    *self.lock_current() = Some(stored.clone());
                    self.token_tx.send_replace(Some(stored.access_token.clone()));
                    Some(stored)
                }
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "stored session unreadable, treating as signed out");
                    None
                }
            },
        };

        let Some(session) = session else {
            return Ok(None);
        };
        if !session.expires_within(now(), self.refresh_margin_secs) {
            return Ok(Some(session));
        }

        match self
            .token_request("refresh_token", json!({ "refresh_token": session.refresh_token }))
            .await
        {
            Ok(refreshed) => {
                tracing::debug!(user = %refreshed.user.id, "access token refreshed");
                self.install(Some(refreshed.clone()), AuthEventKind::TokenRefreshed);
                Ok(Some(refreshed))
            }
            Err(AuthError::NetworkError(e)) => {
                // Keep the refresh token for the next lookup.
                tracing::warn!(error = %e, "session refresh unreachable, keeping stored session");
                if session.expires_at > now() {
                    Ok(Some(session))
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "session refresh rejected, signing out locally");
                self.install(None, AuthEventKind::SignedOut);
                Ok(None)
            }
        }
    }

    /// Current access token, or `NotAuthenticated`.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        self.session()
            .await?
            .map(|s| s.access_token.clone())
            .ok_or(AuthError::NotAuthenticated)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let token = self.lock_current().as_ref().map(|s| s.access_token.clone());
        if let Some(token) = token {
            let result = self
                .http
                .post(format!("{}/auth/v1/logout", self.base_url))
                .header("apikey", &self.anon_key)
                .bearer_auth(token)
                .send()
                .await;
            match result {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!(status = %resp.status(), "remote logout rejected");
                }
                Err(e) => tracing::warn!(error = %e, "remote logout failed"),
                Ok(_) => {}
            }
        }
        self.install(None, AuthEventKind::SignedOut);
        tracing::info!("signed out");
        Ok(())
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<AuthSession, AuthError> {
        let response = self
            .http
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AuthError::NetworkError(format!("auth service unavailable: {}", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<AuthErrorBody>(&text)
                .ok()
                .and_then(|b| b.error_description.or(b.msg).or(b.message).or(b.error))
                .unwrap_or_else(|| status.to_string());
            return Err(AuthError::Rejected(reason));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Rejected(format!("malformed token response: {}", e)))?;
        Ok(token.into_session(now()))
    }

    /// Replaces the current session everywhere and notifies listeners.
    fn install(&self, session: Option<AuthSession>, kind: AuthEventKind) {
        let persisted = match &session {
            Some(s) => self.store.save_session(s),
            None => self.store.clear_session(),
        };
        if let Err(e) = persisted {
            tracing::warn!(error = %e, "failed to persist session");
        }
        self.token_tx
            .send_replace(session.as_ref().map(|s| s.access_token.clone()));
        *self.lock_current() = session.clone();
        let _ = self.events.send(AuthEvent { kind, session });
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<AuthSession>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}
