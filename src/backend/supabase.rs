//! Hosted backend: GoTrue auth, PostgREST table access and Realtime feed.

use std::path::Path;

use crate::services::auth_service::AuthService;
use crate::services::realtime_client::{websocket_url, ChannelConfig, RealtimeClient};
use crate::services::rest_client::RestClient;
use crate::services::session_store::SessionStore;
use crate::types::bookmark::{Bookmark, BookmarkPatch, NewBookmark};
use crate::types::errors::{AuthError, BookmarkError, RealtimeError, SettingsError};
use crate::types::session::AuthSession;
use crate::types::settings::ClientSettings;

use super::{AuthApi, AuthListener, BookmarkTable, ChangeFeed, ChangeSubscription};

pub struct SupabaseBackend {
    auth: AuthService,
    rest: RestClient,
    realtime: RealtimeClient,
}

impl SupabaseBackend {
    /// Builds a backend from validated settings, keeping the session in `store`.
    pub fn new(settings: &ClientSettings, store: SessionStore) -> Result<Self, SettingsError> {
        let backend = &settings.backend;
        if backend.url.trim().is_empty() {
            return Err(SettingsError::Missing("backend.url".to_string()));
        }
        if backend.anon_key.trim().is_empty() {
            return Err(SettingsError::Missing("backend.anon_key".to_string()));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("smartmarks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SettingsError::InvalidValue(e.to_string()))?;
        let ws_url = websocket_url(&backend.url, &backend.anon_key)
            .map_err(|e| SettingsError::InvalidValue(e.to_string()))?;

        Ok(Self {
            auth: AuthService::new(
                http.clone(),
                &backend.url,
                &backend.anon_key,
                settings.auth.refresh_margin_secs,
                store,
            ),
            rest: RestClient::new(http, &backend.url, &backend.anon_key, &settings.realtime.table),
            realtime: RealtimeClient::new(ChannelConfig::new(ws_url, &settings.realtime)),
        })
    }

    /// Opens (or creates) the session database under `data_dir`.
    pub fn open(settings: &ClientSettings, data_dir: &Path) -> Result<Self, SettingsError> {
        let store = SessionStore::open(data_dir).map_err(|e| SettingsError::IoError(e.to_string()))?;
        Self::new(settings, store)
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    async fn token(&self) -> Result<String, BookmarkError> {
        self.auth.access_token().await.map_err(|e| match e {
            AuthError::NetworkError(msg) => BookmarkError::NetworkError(msg),
            _ => BookmarkError::NotAuthenticated,
        })
    }
}

impl AuthApi for SupabaseBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError> {
        self.auth.session().await
    }

    fn subscribe_auth(&self) -> AuthListener {
        self.auth.listener()
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> Result<String, AuthError> {
        self.auth.begin_oauth(provider, redirect_to)
    }

    async fn exchange_code(&self, code: &str) -> Result<AuthSession, AuthError> {
        self.auth.exchange_code(code).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await
    }
}

impl BookmarkTable for SupabaseBackend {
    async fn select_owned(&self, owner: &str) -> Result<Vec<Bookmark>, BookmarkError> {
        let token = self.token().await?;
        self.rest.select_owned(&token, owner).await
    }

    async fn insert(&self, row: &NewBookmark) -> Result<Bookmark, BookmarkError> {
        let token = self.token().await?;
        self.rest.insert(&token, row).await
    }

    async fn update(&self, id: &str, owner: &str, patch: &BookmarkPatch) -> Result<Bookmark, BookmarkError> {
        let token = self.token().await?;
        self.rest.update(&token, id, owner, patch).await
    }

    async fn delete(&self, id: &str, owner: &str) -> Result<(), BookmarkError> {
        let token = self.token().await?;
        self.rest.delete(&token, id, owner).await
    }
}

impl ChangeFeed for SupabaseBackend {
    async fn subscribe(&self, owner: &str) -> Result<ChangeSubscription, RealtimeError> {
        let session = self
            .auth
            .session()
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?
            .ok_or(RealtimeError::NotAuthenticated)?;
        if session.user.id != owner {
            return Err(RealtimeError::JoinRejected(format!(
                "filter user_id=eq.{} does not match the session",
                owner
            )));
        }
        Ok(self.realtime.subscribe(owner, self.auth.token_watch()))
    }
}
