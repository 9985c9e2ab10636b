//! Shared business logic: framework-agnostic pure functions.
//!
//! Route handlers and the provisioning pipeline call these, keeping the I/O
//! layers thin.

use sha2::{Digest, Sha256};

use crate::{DeviceFlag, LoginResult, ServiceError};

// ─── Identifiers ────────────────────────────────────────────────────────────

/// Generate a new account UID.
pub fn generate_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ─── Avatars ────────────────────────────────────────────────────────────────

/// Placeholder image providers serve when the user never uploaded one.
const DEFAULT_AVATAR_SUFFIX: &str = "no_portrait.png";

/// Return the avatar URL worth downloading, if any.
pub fn avatar_candidate(avatar_url: Option<&str>) -> Option<&str> {
    avatar_url
        .map(str::trim)
        .filter(|url| !url.is_empty() && !url.ends_with(DEFAULT_AVATAR_SUFFIX))
}

/// Deterministic shard index for an account's avatar.
///
/// `partitions` of zero is treated as one.
pub fn avatar_partition(uid: &str, partitions: u32) -> u32 {
    let digest = Sha256::digest(uid.as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head % partitions.max(1)
}

/// Storage path of an account's avatar: `avatar/{shard}/{uid}.png`.
pub fn avatar_path(uid: &str, partitions: u32) -> String {
    format!("avatar/{}/{uid}.png", avatar_partition(uid, partitions))
}

// ─── Token Bundle ───────────────────────────────────────────────────────────

/// Pre-computed token bundle returned by [`prepare_token_bundle`].
///
/// Contains everything needed to insert a refresh token and hand the login
/// result to the client. The caller only needs to perform the DB INSERT.
pub struct TokenBundle {
    /// SHA-256 hash of the refresh token (stored in DB).
    pub token_hash: String,
    /// UUID primary key for the refresh_tokens row.
    pub token_id: String,
    /// `datetime` string for the refresh token expiry (DB column value).
    pub expires_at: String,
    /// Ready-to-return login payload.
    pub result: LoginResult,
}

/// Account fields a session is issued for.
pub struct SessionSubject<'a> {
    pub uid: &'a str,
    pub name: &'a str,
    pub username: &'a str,
    pub has_avatar: bool,
}

/// Build a [`TokenBundle`] containing a JWT, refresh token, and the login payload.
pub fn prepare_token_bundle(
    jwt_secret: &str,
    subject: &SessionSubject<'_>,
    device_flag: DeviceFlag,
    now_unix: u64,
) -> Result<TokenBundle, ServiceError> {
    use crate::crypto;

    if jwt_secret.is_empty() {
        return Err(ServiceError::Internal("JWT_SECRET not configured".into()));
    }

    let access_token = crypto::sign_jwt(subject.uid, jwt_secret, now_unix)?;
    let refresh_token = crypto::generate_token()?;
    let token_hash = crypto::hash_token(&refresh_token);
    let token_id = uuid::Uuid::new_v4().to_string();

    let base = chrono::DateTime::from_timestamp(now_unix as i64, 0)
        .ok_or_else(|| ServiceError::Internal("invalid timestamp".into()))?;
    let expires_at = base
        .checked_add_signed(chrono::Duration::seconds(
            crypto::REFRESH_EXPIRY_SECS as i64,
        ))
        .ok_or_else(|| ServiceError::Internal("timestamp overflow".into()))?
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    let result = LoginResult {
        uid: subject.uid.to_string(),
        name: subject.name.to_string(),
        username: subject.username.to_string(),
        access_token,
        refresh_token,
        expires_in: crypto::JWT_EXPIRY_SECS,
        device_flag,
        has_avatar: subject.has_avatar,
    };

    Ok(TokenBundle {
        token_hash,
        token_id,
        expires_at,
        result,
    })
}
