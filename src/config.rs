use tracing::{error, info};

use crate::constants;

/// Settings for talking to the identity gateway.
///
/// Missing endpoint or project id is not fatal: the gateway client reports
/// [`crate::error::GatewayError::MissingConfig`] on every call and the app
/// stays signed out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayConfig {
    pub endpoint: Option<String>,
    pub project_id: Option<String>,
    /// Server key used only to exchange an OAuth token for a session.
    pub api_key: Option<String>,
    pub oauth_success_url: String,
    pub oauth_failure_url: String,
}

impl GatewayConfig {
    pub fn new(endpoint: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            project_id: Some(project_id.into()),
            ..Self::default()
        }
        .with_local_redirects(constants::DEFAULT_PORT)
    }

    /// Reads the gateway settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_on_port(constants::DEFAULT_PORT)
    }

    /// Like [`GatewayConfig::from_env`], but OAuth redirects missing from the
    /// environment point at the local web server on `port`.
    pub fn from_env_on_port(port: u16) -> Self {
        let local = Self::default().with_local_redirects(port);
        Self {
            endpoint: constants::APPWRITE_ENDPOINT.clone(),
            project_id: constants::APPWRITE_PROJECT_ID.clone(),
            api_key: constants::APPWRITE_API_KEY.clone(),
            oauth_success_url: constants::OAUTH_SUCCESS_URL
                .clone()
                .unwrap_or(local.oauth_success_url),
            oauth_failure_url: constants::OAUTH_FAILURE_URL
                .clone()
                .unwrap_or(local.oauth_failure_url),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_redirects(
        mut self,
        success: impl Into<String>,
        failure: impl Into<String>,
    ) -> Self {
        self.oauth_success_url = success.into();
        self.oauth_failure_url = failure.into();
        self
    }

    /// Sends OAuth logins back to the web server on `localhost:port`.
    pub fn with_local_redirects(self, port: u16) -> Self {
        self.with_redirects(
            format!("http://localhost:{}{}", port, constants::OAUTH_CALLBACK_PATH),
            format!("http://localhost:{}{}", port, constants::LOGIN_FAILED_PATH),
        )
    }

    pub fn is_complete(&self) -> bool {
        self.endpoint.is_some() && self.project_id.is_some()
    }

    /// Endpoint without a trailing slash.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().map(|e| e.trim_end_matches('/'))
    }

    /// Logs what was configured; absence is an error but startup continues.
    pub fn report(&self) {
        if !self.is_complete() {
            error!(
                endpoint = ?self.endpoint,
                project_id = ?self.project_id,
                "Missing identity gateway settings (APPWRITE_ENDPOINT / APPWRITE_PROJECT_ID); \
                 login is disabled"
            );
            return;
        }
        info!(
            endpoint = ?self.endpoint,
            project_id = ?self.project_id,
            oauth_success_url = %self.oauth_success_url,
            "Identity gateway client configured"
        );
    }
}
