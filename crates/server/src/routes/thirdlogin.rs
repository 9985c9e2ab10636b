use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use thirdlogin_api::AuthcodeResponse;
use thirdlogin_api::handshake::AuthStatusResponse;
use thirdlogin_api::oauth::{AuthProvidersResponse, OAuthProviderInfo};

use super::client_ip;
use crate::AppConfig;
use crate::error::ApiErr;
use crate::handshake::PollOutcome;
use crate::login::LoginService;

/// Shown in the browser tab the provider redirected to. The polling client
/// receives the real outcome.
const CALLBACK_PAGE: &str = "Login finished. You can close this page and return to the app.";

#[derive(Debug, Deserialize)]
pub struct AuthcodeQuery {
    #[serde(default)]
    pub authcode: String,
}

// ---------------------------------------------------------------------------
// GET /api/auth/providers
// ---------------------------------------------------------------------------

/// GET /api/auth/providers: list enabled third-party providers.
pub async fn providers(State(login): State<LoginService>) -> Json<AuthProvidersResponse> {
    Json(AuthProvidersResponse {
        oauth: login
            .providers()
            .iter()
            .map(|p| OAuthProviderInfo {
                id: p.id().to_string(),
                display_name: p.config().display_name.clone(),
            })
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Handshake: begin + poll
// ---------------------------------------------------------------------------

/// GET /api/user/thirdlogin/authcode: begin a handshake.
pub async fn authcode(State(login): State<LoginService>) -> Result<Json<AuthcodeResponse>, ApiErr> {
    let authcode = login.handshakes().begin().await?;
    Ok(Json(AuthcodeResponse { authcode }))
}

/// GET /api/user/thirdlogin/authstatus?authcode=: poll a handshake.
pub async fn authstatus(
    State(login): State<LoginService>,
    Query(q): Query<AuthcodeQuery>,
) -> Result<Json<AuthStatusResponse>, ApiErr> {
    let authcode = q.authcode.trim();
    if authcode.is_empty() {
        return Err(ApiErr::bad_request("authcode must not be empty"));
    }

    match login.handshakes().poll(authcode).await? {
        PollOutcome::Pending => Ok(Json(AuthStatusResponse::pending())),
        PollOutcome::Succeeded(result) => Ok(Json(AuthStatusResponse::succeeded(result))),
        PollOutcome::Failed => Ok(Json(AuthStatusResponse::failed())),
        PollOutcome::NotFound => Err(ApiErr::not_found("login status expired")),
    }
}

// ---------------------------------------------------------------------------
// Provider redirect + callback
// ---------------------------------------------------------------------------

/// GET /api/user/oauth/{provider}/authorize?authcode=: send the browser to the provider.
pub async fn authorize(
    Path(provider_id): Path<String>,
    State(login): State<LoginService>,
    State(config): State<AppConfig>,
    Query(q): Query<AuthcodeQuery>,
) -> Result<impl IntoResponse, ApiErr> {
    let provider = login
        .provider(&provider_id)
        .ok_or_else(|| ApiErr::not_found(format!("provider '{provider_id}' not found")))?;
    let authcode = q.authcode.trim();
    if authcode.is_empty() {
        return Err(ApiErr::bad_request("authcode must not be empty"));
    }

    let url = provider
        .authorize_url(&config.callback_url(&provider_id), authcode)
        .ok_or_else(|| {
            ApiErr::not_found(format!("provider '{provider_id}' has no authorize step"))
        })?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]))
}

/// GET /api/user/oauth/{provider}/callback: provider redirect target.
pub async fn callback(
    Path(provider_id): Path<String>,
    State(login): State<LoginService>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
) -> Result<impl IntoResponse, ApiErr> {
    let code_param = login
        .provider(&provider_id)
        .map_or("code", |p| p.config().code_param.as_str());
    let code = params.get(code_param).map_or("", String::as_str);
    let authcode = params.get("state").map_or("", String::as_str);
    let public_ip = client_ip(&request);

    login
        .handle_callback(&provider_id, code, authcode, &public_ip)
        .await?;
    Ok(CALLBACK_PAGE)
}
