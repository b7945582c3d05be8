use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::config::GatewayConfig;
use crate::constants::FALLBACK_DISPLAY_NAME;
use crate::error::GatewayError;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const SESSION_HEADER: &str = "X-Appwrite-Session";
const KEY_HEADER: &str = "X-Appwrite-Key";

/// OAuth providers the login dialog offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            other => Err(format!("unsupported OAuth provider '{}'", other)),
        }
    }
}

/// Who the gateway says is signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub provider: Option<Provider>,
    pub provider_uid: Option<String>,
}

/// The account/session service the app authenticates against.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// `Ok(None)` when nobody is signed in.
    async fn current_session(&self) -> Result<Option<Identity>, GatewayError>;

    async fn delete_session(&self) -> Result<(), GatewayError>;

    /// URL the browser is sent to in order to start an OAuth login.
    fn oauth_url(&self, provider: Provider) -> Result<String, GatewayError>;

    /// Turns the token handed to the OAuth success redirect into a session.
    async fn complete_oauth(&self, user_id: &str, secret: &str) -> Result<(), GatewayError>;

    fn avatar_url(&self, display_name: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct AccountPayload {
    #[serde(rename = "$id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    #[serde(default)]
    provider: String,
    #[serde(rename = "providerUid", default)]
    provider_uid: String,
    #[serde(default)]
    secret: String,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    secret: &'a str,
}

/// REST client for an Appwrite-compatible account service.
pub struct AppwriteGateway {
    client: Client,
    config: GatewayConfig,
    session: RwLock<Option<String>>,
}

impl AppwriteGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            session: RwLock::new(None),
        }
    }

    /// Starts with an already established session secret.
    pub fn with_session(self, secret: impl Into<String>) -> Self {
        Self {
            session: RwLock::new(Some(secret.into())),
            ..self
        }
    }

    pub async fn has_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    fn endpoint(&self) -> Result<&str, GatewayError> {
        self.config
            .endpoint()
            .ok_or(GatewayError::MissingConfig("APPWRITE_ENDPOINT"))
    }

    fn project_id(&self) -> Result<&str, GatewayError> {
        self.config
            .project_id
            .as_deref()
            .ok_or(GatewayError::MissingConfig("APPWRITE_PROJECT_ID"))
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<RequestBuilder, GatewayError> {
        let url = format!("{}{}", self.endpoint()?, path);
        let mut builder = self
            .client
            .request(method, url)
            .header(PROJECT_HEADER, self.project_id()?);
        if let Some(secret) = self.session.read().await.as_deref() {
            builder = builder.header(SESSION_HEADER, secret);
        }
        Ok(builder)
    }

    async fn fetch_session(&self) -> Result<SessionPayload, GatewayError> {
        let response = self
            .request(reqwest::Method::GET, "/account/sessions/current")
            .await?
            .send()
            .await?;
        Ok(check(response).await?.json::<SessionPayload>().await?)
    }
}

async fn check(response: Response) -> Result<Response, GatewayError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(GatewayError::Status { status, body })
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[async_trait]
impl IdentityGateway for AppwriteGateway {
    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<Identity>, GatewayError> {
        let response = self
            .request(reqwest::Method::GET, "/account")
            .await?
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Gateway reports no active session");
            return Ok(None);
        }
        let account = check(response).await?.json::<AccountPayload>().await?;

        // The provider only lives on the session record; a failed lookup still
        // leaves a usable identity.
        let (provider, provider_uid) = match self.fetch_session().await {
            Ok(session) => (
                session.provider.parse::<Provider>().ok(),
                non_empty(session.provider_uid),
            ),
            Err(e) => {
                warn!("Could not read current session provider: {}", e);
                (None, None)
            }
        };

        Ok(Some(Identity {
            id: account.id,
            name: account.name,
            email: non_empty(account.email),
            provider,
            provider_uid,
        }))
    }

    #[instrument(skip(self))]
    async fn delete_session(&self) -> Result<(), GatewayError> {
        let response = self
            .request(reqwest::Method::DELETE, "/account/sessions/current")
            .await?
            .send()
            .await?;
        check(response).await?;
        self.session.write().await.take();
        Ok(())
    }

    fn oauth_url(&self, provider: Provider) -> Result<String, GatewayError> {
        let base = format!("{}/account/tokens/oauth2/{}", self.endpoint()?, provider);
        let url = Url::parse_with_params(
            &base,
            &[
                ("project", self.project_id()?),
                ("success", self.config.oauth_success_url.as_str()),
                ("failure", self.config.oauth_failure_url.as_str()),
            ],
        )
        .map_err(|e| GatewayError::Url(e.to_string()))?;
        Ok(url.into())
    }

    #[instrument(skip(self, secret))]
    async fn complete_oauth(&self, user_id: &str, secret: &str) -> Result<(), GatewayError> {
        let mut builder = self
            .request(reqwest::Method::POST, "/account/sessions/token")
            .await?
            .json(&TokenRequest { user_id, secret });
        if let Some(key) = self.config.api_key.as_deref() {
            builder = builder.header(KEY_HEADER, key);
        }
        let session = check(builder.send().await?)
            .await?
            .json::<SessionPayload>()
            .await?;
        let secret = non_empty(session.secret).ok_or(GatewayError::NoSessionSecret)?;
        *self.session.write().await = Some(secret);
        debug!("OAuth token exchanged for a session");
        Ok(())
    }

    fn avatar_url(&self, display_name: &str) -> Option<String> {
        let endpoint = self.config.endpoint()?;
        let name = if display_name.is_empty() {
            FALLBACK_DISPLAY_NAME
        } else {
            display_name
        };
        Url::parse_with_params(&format!("{}/avatars/initials", endpoint), &[("name", name)])
            .ok()
            .map(String::from)
    }
}
