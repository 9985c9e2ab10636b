//! Identity resolution: turn a callback credential into an [`ExternalProfile`].

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};

use thirdlogin_api::oauth::{self, ExternalProfile, OAuthProviderConfig, ProviderKind, TokenAuth};

const CLIENT_USER_AGENT: &str = "thirdlogin-server";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The credential could not be turned into an access token.
    #[error("token exchange failed: {0}")]
    Exchange(String),
    /// The profile request failed or returned something unusable.
    #[error("profile fetch failed: {0}")]
    Profile(String),
}

/// An external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn config(&self) -> &OAuthProviderConfig;

    fn id(&self) -> &str {
        &self.config().id
    }

    /// Browser URL that starts the provider's login, `None` when the
    /// provider has no authorize step.
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Option<String> {
        oauth::build_authorize_url(self.config(), redirect_uri, state)
    }

    /// Exchange the callback credential for an access token.
    async fn exchange(&self, code: &str) -> Result<String, ResolveError>;

    /// Fetch the normalized profile for an access token.
    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ResolveError>;
}

/// Exchange then fetch: the profile of whoever owns `code`.
pub async fn resolve(
    provider: &dyn IdentityProvider,
    code: &str,
) -> Result<ExternalProfile, ResolveError> {
    let token = provider.exchange(code).await?;
    provider.fetch_profile(&token).await
}

/// Config-driven provider speaking plain HTTP + JSON.
pub struct HttpIdentityProvider {
    config: OAuthProviderConfig,
    client: reqwest::Client,
    redirect_uri: String,
}

impl HttpIdentityProvider {
    pub fn new(config: OAuthProviderConfig, client: reqwest::Client, redirect_uri: String) -> Self {
        Self {
            config,
            client,
            redirect_uri,
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn config(&self) -> &OAuthProviderConfig {
        &self.config
    }

    async fn exchange(&self, code: &str) -> Result<String, ResolveError> {
        if self.config.kind == ProviderKind::TokenProfile {
            return Ok(code.to_string());
        }
        let token_url = self
            .config
            .token_url
            .as_deref()
            .ok_or_else(|| ResolveError::Exchange("no token endpoint configured".into()))?;

        let form = oauth::build_token_request_form(&self.config, code, &self.redirect_uri);
        let resp = self
            .client
            .post(token_url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .form(&form)
            .send()
            .await
            .map_err(|e| ResolveError::Exchange(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ResolveError::Exchange(e.to_string()))?;
        if !status.is_success() {
            return Err(ResolveError::Exchange(format!("HTTP {status}: {body}")));
        }
        oauth::parse_access_token_response(&body)
            .map_err(|e| ResolveError::Exchange(e.message().to_string()))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ResolveError> {
        let request = self
            .client
            .get(&self.config.userinfo_url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT);
        let request = match self.config.token_auth {
            TokenAuth::Bearer => request.bearer_auth(access_token),
            TokenAuth::Query => request.query(&[("access_token", access_token)]),
            TokenAuth::Raw => request.header(AUTHORIZATION, access_token),
        };

        let resp = request
            .send()
            .await
            .map_err(|e| ResolveError::Profile(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ResolveError::Profile(format!("HTTP {status}")));
        }
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ResolveError::Profile(format!("invalid JSON: {e}")))?;

        oauth::extract_profile(&self.config, &json)
            .map_err(|e| ResolveError::Profile(e.message().to_string()))
    }
}
