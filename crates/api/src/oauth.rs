//! Generic third-party identity provider support.
//!
//! Config-driven: no provider-specific code branches. Classic OAuth2
//! authorization-code providers (Gitee, GitHub, ...) and "token-profile"
//! providers (the callback already carries a bearer token, profile comes
//! wrapped in a status envelope) are both described by
//! [`OAuthProviderConfig`].
//!
//! This module contains only types, URL builders, and JSON parsing.
//! No HTTP calls or DB access; those live in the server.

use serde::{Deserialize, Serialize};

use crate::ServiceError;

// ── Provider Configuration ──────────────────────────────────────────────────

/// How the callback's credential turns into an access token.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Standard OAuth2: the callback carries a code that is exchanged at `token_url`.
    #[default]
    AuthorizationCode,
    /// The callback already carries the access token; exchange is the identity.
    TokenProfile,
}

/// How the access token is presented to the profile endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenAuth {
    /// `Authorization: Bearer <token>`
    #[default]
    Bearer,
    /// `?access_token=<token>`
    Query,
    /// `Authorization: <token>`
    Raw,
}

/// Status envelope wrapped around some providers' profile payloads:
/// `{"code": 200, "message": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileEnvelope {
    pub code_field: String,
    pub success_code: i64,
    pub message_field: String,
    pub data_field: String,
}

/// Identity provider configuration. Loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    /// Unique provider identifier: "gitee", "github", "mall"
    pub id: String,
    /// UI display name: "Gitee", "GitHub"
    pub display_name: String,
    #[serde(default)]
    pub kind: ProviderKind,

    /// Browser-facing authorize endpoint. `None` for token-profile providers.
    pub authorize_url: Option<String>,
    /// Code exchange endpoint. `None` for token-profile providers.
    pub token_url: Option<String>,
    pub userinfo_url: String,

    pub client_id: String,
    #[serde(skip_serializing, default)]
    pub client_secret: String,
    pub scopes: String,

    /// Query parameter of the callback that carries the code (or token).
    pub code_param: String,
    #[serde(default)]
    pub token_auth: TokenAuth,
    #[serde(default)]
    pub envelope: Option<ProfileEnvelope>,

    /// JSON field mapping from userinfo response to internal fields
    pub field_map: OAuthFieldMap,
}

/// Maps provider-specific JSON field names to our internal fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthFieldMap {
    /// Field holding the stable external login identifier.
    pub id: String,
    /// Field containing the login name.
    pub username: String,
    /// Field containing the display name, when the provider has one.
    pub name: Option<String>,
    pub email: String,
    /// Field containing the avatar URL: "avatar_url", "photo", "picture"
    pub avatar: String,
}

/// Normalized identity fetched from any provider. Transient, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    /// Provider config id (e.g. "gitee")
    pub provider_id: String,
    /// Provider-side stable login identifier (as string)
    pub external_id: String,
    pub username: String,
    /// Never blank: falls back to `username`.
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

// ── URL Builders (pure functions, no HTTP) ──────────────────────────────────

/// Build the authorize URL that the user's browser should be redirected to.
///
/// The authcode travels through the provider untouched as `state`.
/// Returns `None` for providers without an authorize step.
pub fn build_authorize_url(
    config: &OAuthProviderConfig,
    redirect_uri: &str,
    state: &str,
) -> Option<String> {
    let base = config.authorize_url.as_deref()?;
    let mut url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&state={}",
        base,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(state),
    );
    if !config.scopes.is_empty() {
        url.push_str("&scope=");
        url.push_str(&urlencoding::encode(&config.scopes));
    }
    Some(url)
}

/// Build the OAuth2 token request as application/x-www-form-urlencoded pairs.
pub fn build_token_request_form(
    config: &OAuthProviderConfig,
    code: &str,
    redirect_uri: &str,
) -> Vec<(String, String)> {
    vec![
        ("client_id".into(), config.client_id.clone()),
        ("client_secret".into(), config.client_secret.clone()),
        ("code".into(), code.to_string()),
        ("grant_type".into(), "authorization_code".into()),
        ("redirect_uri".into(), redirect_uri.to_string()),
    ]
}

/// Parse access_token from an OAuth token response.
///
/// Supports both JSON (`{"access_token":"..."}`) and query-string style
/// (`access_token=...&scope=...`) payloads.
pub fn parse_access_token_response(raw: &str) -> Result<String, ServiceError> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(ServiceError::Internal(
            "OAuth token exchange failed: empty response body".into(),
        ));
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(token) = json
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Ok(token.to_string());
        }

        let err = json.get("error").and_then(|v| v.as_str());
        let err_desc = json
            .get("error_description")
            .and_then(|v| v.as_str())
            .or_else(|| json.get("error_message").and_then(|v| v.as_str()));

        return Err(ServiceError::Internal(format!(
            "OAuth token exchange failed: {}",
            describe_token_error(err, err_desc, "no access_token field in JSON response")
        )));
    }

    let mut access_token: Option<String> = None;
    let mut error: Option<String> = None;
    let mut error_description: Option<String> = None;

    for pair in body.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_form_component(k);
        let value = decode_form_component(v);
        match key.as_str() {
            "access_token" if !value.trim().is_empty() => access_token = Some(value),
            "error" if !value.trim().is_empty() => error = Some(value),
            "error_description" if !value.trim().is_empty() => error_description = Some(value),
            _ => {}
        }
    }

    if let Some(token) = access_token {
        return Ok(token);
    }

    Err(ServiceError::Internal(format!(
        "OAuth token exchange failed: {}",
        describe_token_error(
            error.as_deref(),
            error_description.as_deref(),
            "no access_token field in response"
        )
    )))
}

/// Extract a normalized profile from a provider's userinfo JSON response.
///
/// Unwraps the status envelope first when the provider uses one.
pub fn extract_profile(
    config: &OAuthProviderConfig,
    userinfo_json: &serde_json::Value,
) -> Result<ExternalProfile, ServiceError> {
    let payload = match &config.envelope {
        Some(envelope) => unwrap_envelope(envelope, userinfo_json)?,
        None => userinfo_json,
    };

    // Provider user ID: may be number or string depending on provider
    let external_id = match &payload[&config.field_map.id] {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => {
            return Err(ServiceError::Internal(format!(
                "profile missing '{}' field",
                config.field_map.id
            )));
        }
    };

    let username = non_blank(&payload[&config.field_map.username])
        .unwrap_or_else(|| external_id.clone());

    let display_name = config
        .field_map
        .name
        .as_ref()
        .and_then(|field| non_blank(&payload[field]))
        .unwrap_or_else(|| username.clone());

    Ok(ExternalProfile {
        provider_id: config.id.clone(),
        external_id,
        username,
        display_name,
        email: non_blank(&payload[&config.field_map.email]),
        avatar_url: non_blank(&payload[&config.field_map.avatar]),
    })
}

fn unwrap_envelope<'a>(
    envelope: &ProfileEnvelope,
    json: &'a serde_json::Value,
) -> Result<&'a serde_json::Value, ServiceError> {
    let code = json[&envelope.code_field].as_i64();
    if code != Some(envelope.success_code) {
        let message = json[&envelope.message_field].as_str().unwrap_or("");
        return Err(ServiceError::Internal(format!(
            "profile request rejected: code {}, message: {message}",
            code.map_or_else(|| "missing".to_string(), |c| c.to_string()),
        )));
    }
    let data = &json[&envelope.data_field];
    if !data.is_object() {
        return Err(ServiceError::Internal(format!(
            "profile envelope missing '{}' object",
            envelope.data_field
        )));
    }
    Ok(data)
}

// ── Provider Presets ────────────────────────────────────────────────────────

/// Create a Gitee OAuth2 provider config. Gitee links accounts by login name.
pub fn gitee_preset(client_id: String, client_secret: String) -> OAuthProviderConfig {
    OAuthProviderConfig {
        id: "gitee".into(),
        display_name: "Gitee".into(),
        kind: ProviderKind::AuthorizationCode,
        authorize_url: Some("https://gitee.com/oauth/authorize".into()),
        token_url: Some("https://gitee.com/oauth/token".into()),
        userinfo_url: "https://gitee.com/api/v5/user".into(),
        client_id,
        client_secret,
        scopes: "user_info".into(),
        code_param: "code".into(),
        token_auth: TokenAuth::Query,
        envelope: None,
        field_map: OAuthFieldMap {
            id: "login".into(),
            username: "login".into(),
            name: Some("name".into()),
            email: "email".into(),
            avatar: "avatar_url".into(),
        },
    }
}

/// Create a GitHub OAuth2 provider config. Only needs client credentials.
pub fn github_preset(client_id: String, client_secret: String) -> OAuthProviderConfig {
    OAuthProviderConfig {
        id: "github".into(),
        display_name: "GitHub".into(),
        kind: ProviderKind::AuthorizationCode,
        authorize_url: Some("https://github.com/login/oauth/authorize".into()),
        token_url: Some("https://github.com/login/oauth/access_token".into()),
        userinfo_url: "https://api.github.com/user".into(),
        client_id,
        client_secret,
        scopes: "read:user".into(),
        code_param: "code".into(),
        token_auth: TokenAuth::Bearer,
        envelope: None,
        field_map: OAuthFieldMap {
            id: "id".into(),
            username: "login".into(),
            name: Some("name".into()),
            email: "email".into(),
            avatar: "avatar_url".into(),
        },
    }
}

/// Create a token-profile provider for a commerce backend whose app hands the
/// user token straight to the callback.
pub fn mall_preset(profile_url: String) -> OAuthProviderConfig {
    OAuthProviderConfig {
        id: "mall".into(),
        display_name: "Mall".into(),
        kind: ProviderKind::TokenProfile,
        authorize_url: None,
        token_url: None,
        userinfo_url: profile_url,
        client_id: String::new(),
        client_secret: String::new(),
        scopes: String::new(),
        code_param: "token".into(),
        token_auth: TokenAuth::Raw,
        envelope: Some(ProfileEnvelope {
            code_field: "code".into(),
            success_code: 200,
            message_field: "message".into(),
            data_field: "data".into(),
        }),
        field_map: OAuthFieldMap {
            id: "userId".into(),
            username: "userId".into(),
            name: Some("nickname".into()),
            email: "email".into(),
            avatar: "photo".into(),
        },
    }
}

// ── API Response Types ──────────────────────────────────────────────────────

/// Available third-party providers (returned by GET /api/auth/providers).
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthProvidersResponse {
    pub oauth: Vec<OAuthProviderInfo>,
}

/// Public info about a provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthProviderInfo {
    pub id: String,
    pub display_name: String,
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn non_blank(value: &serde_json::Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn describe_token_error(err: Option<&str>, desc: Option<&str>, fallback: &str) -> String {
    match (err, desc) {
        (Some(e), Some(d)) if !d.is_empty() => format!("{e}: {d}"),
        (Some(e), _) => e.to_string(),
        (_, Some(d)) if !d.is_empty() => d.to_string(),
        _ => fallback.to_string(),
    }
}

fn decode_form_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|c| c.into_owned())
        .unwrap_or(spaced)
}
