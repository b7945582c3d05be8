use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::gateway::{Identity, IdentityGateway, Provider};

/// The signed-in user as the UI shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub avatar_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_id: Option<String>,
}

impl UserInfo {
    pub fn new(id: impl Into<String>, avatar_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            avatar_url: avatar_url.into(),
            email: None,
            github_id: None,
        }
    }

    /// Maps a gateway identity; the GitHub id comes from the session's provider record.
    pub fn from_identity(identity: Identity, avatar_url: Option<String>) -> Self {
        let github_id = match identity.provider {
            Some(Provider::Github) => identity.provider_uid,
            _ => None,
        };
        Self {
            id: identity.id,
            avatar_url: avatar_url.unwrap_or_default(),
            email: identity.email,
            github_id,
        }
    }

    /// What the settings dialog shows as the user's name.
    pub fn display_name(&self) -> &str {
        self.email
            .as_deref()
            .or(self.github_id.as_deref())
            .unwrap_or("Logged-in User")
    }
}

/// Authentication state. Every transition consumes the old state and returns the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub logged_in_user: Option<UserInfo>,
    pub api_key: String,
    pub loading_auth: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            logged_in_user: None,
            api_key: String::new(),
            loading_auth: true,
        }
    }
}

impl SessionState {
    pub fn logged_in(self, user: UserInfo) -> Self {
        Self {
            logged_in_user: Some(user),
            ..self
        }
    }

    pub fn logged_out(self) -> Self {
        Self {
            logged_in_user: None,
            api_key: String::new(),
            ..self
        }
    }

    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        Self {
            api_key: key.into(),
            ..self
        }
    }

    pub fn resync_started(self) -> Self {
        Self {
            loading_auth: true,
            ..self
        }
    }

    pub fn resync_finished(self, user: Option<UserInfo>) -> Self {
        Self {
            logged_in_user: user,
            loading_auth: false,
            ..self
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.logged_in_user.is_some()
    }
}

/// Owns the session state and runs the actions that need the identity gateway.
#[derive(Clone)]
pub struct AuthStore {
    gateway: Arc<dyn IdentityGateway>,
    state: Arc<RwLock<SessionState>>,
}

impl AuthStore {
    pub fn new(gateway: Arc<dyn IdentityGateway>) -> Self {
        Self {
            gateway,
            state: Arc::new(RwLock::new(SessionState::default())),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn IdentityGateway> {
        &self.gateway
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn api_key(&self) -> String {
        self.state.read().await.api_key.clone()
    }

    async fn apply(&self, transition: impl FnOnce(SessionState) -> SessionState) {
        let mut state = self.state.write().await;
        let current = std::mem::take(&mut *state);
        *state = transition(current);
    }

    pub async fn login(&self, user: UserInfo) {
        info!(user_id = %user.id, "Logging in");
        self.apply(|s| s.logged_in(user)).await;
    }

    /// Deletes the gateway session, then forgets the user and API key.
    /// A gateway failure is logged and leaves everything as it was.
    pub async fn logout(&self) {
        info!("Attempting to log out...");
        match self.gateway.delete_session().await {
            Ok(()) => {
                self.apply(SessionState::logged_out).await;
                info!("User logged out successfully");
            }
            Err(e) => error!("Logout failed: {}", e),
        }
    }

    pub async fn save_api_key(&self, key: impl Into<String>) {
        let key = key.into();
        debug!(key_len = key.len(), "Saving API key");
        self.apply(|s| s.with_api_key(key)).await;
    }

    /// Re-reads the signed-in user from the gateway. Any failure means signed out;
    /// the loading flag is cleared either way.
    pub async fn resync(&self) {
        debug!("Checking auth session");
        self.apply(SessionState::resync_started).await;

        let user = match self.gateway.current_session().await {
            Ok(Some(identity)) => {
                let avatar = self.gateway.avatar_url(&identity.name);
                let user = UserInfo::from_identity(identity, avatar);
                info!(user_id = %user.id, "Active session found");
                Some(user)
            }
            Ok(None) => {
                info!("No active user session found");
                None
            }
            Err(e) => {
                error!("Failed to get user session: {}", e);
                None
            }
        };

        self.apply(|s| s.resync_finished(user)).await;
        debug!("Auth session check finished");
    }
}
