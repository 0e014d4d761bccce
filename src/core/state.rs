//! Application state
//!
//! One container for everything the front end shares: the API client, the
//! resource caches, the signed-in session and the theme. Built once at start
//! up, `init` restores persisted state and `teardown` undoes it on logout.

use std::sync::{Arc, RwLock};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::auth::AuthSession;
use super::theme::Theme;
use crate::api::{ApiClient, ApiError, AuthFailure, HttpTransport, Transport};
use crate::cache::Resources;
use crate::config::storage::{THEME_KEY, TOKEN_KEY};
use crate::config::{Config, LocalStore};
use crate::domain::User;

pub struct AppState {
    pub config: Config,
    pub client: Arc<ApiClient>,
    pub resources: Resources,
    storage: LocalStore,
    auth: RwLock<Option<AuthSession>>,
    theme: RwLock<Theme>,
}

impl AppState {
    pub fn new(config: Config, transport: Arc<dyn Transport>, storage: LocalStore) -> Self {
        let client = Arc::new(ApiClient::new(transport).with_timeout(config.api.timeout()));
        let resources = Resources::new(
            Arc::clone(&client),
            config.cache.settings(),
            config.cache.poll_interval(),
        );
        Self {
            config,
            client,
            resources,
            storage,
            auth: RwLock::new(None),
            theme: RwLock::new(Theme::default()),
        }
    }

    /// HTTP transport and on-disk storage, as configured
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(
            config.api.base_url.clone(),
            config.api.timeout(),
            config.api.connect_timeout(),
        ));
        let storage = LocalStore::open(config.storage_file()?)?;
        Ok(Self::new(config, transport, storage))
    }

    /// Restore the persisted theme and token. Expired tokens are discarded.
    pub fn init(&self) -> Result<()> {
        if let Some(raw) = self.storage.get(THEME_KEY) {
            match Theme::from_str(&raw) {
                Ok(theme) => *self.theme.write().unwrap_or_else(|e| e.into_inner()) = theme,
                Err(e) => warn!("Ignoring stored theme: {}", e),
            }
        }

        if let Some(token) = self.storage.get(TOKEN_KEY) {
            let session = AuthSession::new(token, None);
            if session.is_expired(Utc::now()) {
                info!("Stored token has expired, discarding");
                self.storage.remove(TOKEN_KEY)?;
            } else {
                self.install(session);
            }
        }

        debug!("Application state initialised (theme={})", self.theme());
        Ok(())
    }

    fn install(&self, session: AuthSession) {
        self.client.set_token(Some(session.token.clone()));
        *self.auth.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.auth.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ApiError> {
        let tokens = self.client.login(email, password).await?.into_result()?;
        let session = AuthSession::new(tokens.access_token, tokens.user);
        if let Err(e) = self.storage.set(TOKEN_KEY, session.token.clone()) {
            warn!("Could not persist token: {}", e);
        }
        self.install(session.clone());
        Ok(session)
    }

    /// Fetch the signed-in user and remember it on the session
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let user = self.client.current_user().await?.into_result()?;
        if let Some(session) = self.auth.write().unwrap_or_else(|e| e.into_inner()).as_mut() {
            session.user = Some(user.clone());
        }
        Ok(user)
    }

    /// Tell the server, then clear local state whatever it said
    pub async fn logout(&self) -> Result<()> {
        if self.is_authenticated() {
            match self.client.logout().await {
                Ok(response) => {
                    if let Err(e) = response.into_result() {
                        warn!("Server logout failed: {}", e);
                    }
                }
                Err(e) => warn!("Server logout failed: {}", e),
            }
        }
        self.teardown()
    }

    /// Drop the token and cached records, and revert the theme to its default
    pub fn teardown(&self) -> Result<()> {
        self.resources.clear();

        self.client.set_token(None);
        *self.auth.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.storage.remove(TOKEN_KEY)?;

        *self.theme.write().unwrap_or_else(|e| e.into_inner()) = Theme::default();
        self.storage.remove(THEME_KEY)?;

        info!("Signed out");
        Ok(())
    }

    /// A 401 means the token is no longer any good
    pub fn observe_error(&self, error: &ApiError) -> Result<()> {
        if let ApiError::Auth {
            kind: AuthFailure::Unauthenticated,
            ..
        } = error
        {
            if self.is_authenticated() {
                warn!("Token rejected by server, signing out");
                self.teardown()?;
            }
        }
        Ok(())
    }

    pub fn theme(&self) -> Theme {
        *self.theme.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        *self.theme.write().unwrap_or_else(|e| e.into_inner()) = theme;
        self.storage.set(THEME_KEY, theme.as_str())
    }
}
