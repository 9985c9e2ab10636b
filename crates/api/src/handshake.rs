//! Handoff store wire format for the third-party login handshake.
//!
//! The callback and the polling client never talk to each other directly.
//! They share one key per authcode:
//!
//! | value          | meaning                          | TTL      |
//! |----------------|----------------------------------|----------|
//! | `"1"`          | pending, callback not yet seen   | 5 min    |
//! | `"0"`          | failed                           | 1 min    |
//! | JSON object    | succeeded, serialized [`LoginResult`] | 1 min |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{LoginResult, ServiceError};

/// Key prefix for authcode entries.
pub const AUTHCODE_KEY_PREFIX: &str = "thirdlogin:authcode:";

/// Sentinel stored while the callback has not completed.
pub const PENDING_SENTINEL: &str = "1";

/// Sentinel stored when the callback completed without a login.
pub const FAILED_SENTINEL: &str = "0";

/// How long a begun handshake waits for its callback.
pub const PENDING_TTL: Duration = Duration::from_secs(5 * 60);

/// How long a resolved handshake waits for its poller.
pub const RESULT_TTL: Duration = Duration::from_secs(60);

/// Build the handoff store key for an authcode.
pub fn authcode_key(authcode: &str) -> String {
    format!("{AUTHCODE_KEY_PREFIX}{authcode}")
}

/// Decoded value of an authcode entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Pending,
    Succeeded(LoginResult),
    Failed,
}

impl HandshakeState {
    /// Encode for storage.
    pub fn encode(&self) -> Result<String, ServiceError> {
        match self {
            Self::Pending => Ok(PENDING_SENTINEL.to_string()),
            Self::Failed => Ok(FAILED_SENTINEL.to_string()),
            Self::Succeeded(result) => serde_json::to_string(result)
                .map_err(|e| ServiceError::Internal(format!("encode login result: {e}"))),
        }
    }

    /// Decode a stored value.
    pub fn decode(raw: &str) -> Result<Self, ServiceError> {
        match raw {
            PENDING_SENTINEL => Ok(Self::Pending),
            FAILED_SENTINEL => Ok(Self::Failed),
            other => serde_json::from_str::<LoginResult>(other)
                .map(Self::Succeeded)
                .map_err(|e| ServiceError::Internal(format!("decode login result: {e}"))),
        }
    }
}

// ─── Client status ──────────────────────────────────────────────────────────

/// Application-level status reported to the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Pending,
    Succeeded,
    Failed,
}

impl AuthStatus {
    /// Numeric code on the wire: 0 pending, 1 succeeded, 2 failed.
    pub fn code(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Succeeded => 1,
            Self::Failed => 2,
        }
    }
}

/// Returned by `GET /api/user/thirdlogin/authstatus`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthStatusResponse {
    pub status: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<LoginResult>,
}

impl AuthStatusResponse {
    pub fn pending() -> Self {
        Self {
            status: AuthStatus::Pending.code(),
            result: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: AuthStatus::Failed.code(),
            result: None,
        }
    }

    pub fn succeeded(result: LoginResult) -> Self {
        Self {
            status: AuthStatus::Succeeded.code(),
            result: Some(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceFlag;

    fn sample_result() -> LoginResult {
        LoginResult {
            uid: "u1".into(),
            name: "Alice".into(),
            username: "alice".into(),
            access_token: "jwt".into(),
            refresh_token: "rt".into(),
            expires_in: 3600,
            device_flag: DeviceFlag::App,
            has_avatar: false,
        }
    }

    #[test]
    fn sentinels_decode() {
        assert_eq!(HandshakeState::decode("1").unwrap(), HandshakeState::Pending);
        assert_eq!(HandshakeState::decode("0").unwrap(), HandshakeState::Failed);
    }

    #[test]
    fn login_result_survives_the_store() {
        let state = HandshakeState::Succeeded(sample_result());
        let raw = state.encode().unwrap();
        assert!(raw.starts_with('{'));
        assert_eq!(HandshakeState::decode(&raw).unwrap(), state);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = HandshakeState::decode("not json").unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn key_has_prefix() {
        assert_eq!(authcode_key("abc123"), "thirdlogin:authcode:abc123");
    }

    #[test]
    fn status_response_shapes() {
        let pending = serde_json::to_value(AuthStatusResponse::pending()).unwrap();
        assert_eq!(pending, serde_json::json!({"status": 0}));

        let failed = serde_json::to_value(AuthStatusResponse::failed()).unwrap();
        assert_eq!(failed, serde_json::json!({"status": 2}));

        let ok = serde_json::to_value(AuthStatusResponse::succeeded(sample_result())).unwrap();
        assert_eq!(ok["status"], 1);
        assert_eq!(ok["result"]["uid"], "u1");
    }
}
