//! Shared API types, provider configuration and SQL builders for thirdlogin.
//!
//! This crate is the **single source of truth** for everything that crosses a
//! boundary: the JSON shapes seen by the polling client, the values written to
//! the handoff store, and the rows written to SQLite. The server crate only
//! adds I/O on top.

use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
pub mod crypto;
#[cfg(feature = "backend")]
pub mod db;
pub mod handshake;
pub mod oauth;
#[cfg(feature = "backend")]
pub mod service;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Device class a session is issued for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFlag {
    #[default]
    App,
    Web,
    Pc,
}

impl DeviceFlag {
    pub fn as_str(&self) -> &str {
        match self {
            Self::App => "app",
            Self::Web => "web",
            Self::Pc => "pc",
        }
    }

    /// Numeric code stored in the `users.device_flag` column.
    pub fn code(&self) -> i64 {
        match self {
            Self::App => 0,
            Self::Web => 1,
            Self::Pc => 2,
        }
    }
}

impl std::fmt::Display for DeviceFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Login ───────────────────────────────────────────────────────────────────

/// Session payload handed to the polling client once a third-party login
/// completes. Travels through the handoff store as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResult {
    pub uid: String,
    pub name: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub device_flag: DeviceFlag,
    pub has_avatar: bool,
}

/// Returned by `GET /api/user/thirdlogin/authcode`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthcodeResponse {
    pub authcode: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ─── Service Error ───────────────────────────────────────────────────────────

/// Framework-agnostic service error.
///
/// Each variant maps to an HTTP status code. Pure functions in this crate
/// return it; the server converts it into its own response type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Internal(m) => m,
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}

/// JSON error shape `{ "error": "..." }` returned by all error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl From<&ServiceError> for ApiError {
    fn from(e: &ServiceError) -> Self {
        Self {
            error: e.message().to_string(),
        }
    }
}
