//! Cryptographic helpers for sessions and handshakes.
//!
//! - Opaque random tokens (authcodes, refresh tokens)
//! - SHA-256 token hashing for storage
//! - HMAC-SHA256 JWT signing/verification

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::ServiceError;

// ── JWT (HMAC-SHA256) ───────────────────────────────────────────────────────

/// JWT header (always HS256).
const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// JWT expiry: 1 hour in seconds.
pub const JWT_EXPIRY_SECS: u64 = 3600;

/// Refresh token expiry: 7 days in seconds.
pub const REFRESH_EXPIRY_SECS: u64 = 7 * 24 * 3600;

/// Sign a JWT for the given account. Returns the encoded JWT string.
pub fn sign_jwt(uid: &str, secret: &str, now_unix: u64) -> Result<String, ServiceError> {
    let header_b64 = URL_SAFE_NO_PAD.encode(JWT_HEADER.as_bytes());

    let payload = serde_json::json!({
        "sub": uid,
        "iat": now_unix,
        "exp": now_unix + JWT_EXPIRY_SECS,
    });
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());

    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature = hmac_sha256(secret.as_bytes(), signing_input.as_bytes())?;
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{signing_input}.{sig_b64}"))
}

/// Verify a JWT and return the `sub` (account uid) if valid.
pub fn verify_jwt(token: &str, secret: &str, now_unix: u64) -> Result<String, ServiceError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(ServiceError::Unauthorized("invalid JWT format".into()));
    }

    let signing_input = format!("{}.{}", parts[0], parts[1]);
    let expected_sig = hmac_sha256(secret.as_bytes(), signing_input.as_bytes())?;
    let actual_sig = URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|_| ServiceError::Unauthorized("invalid JWT signature encoding".into()))?;

    // Constant-time comparison
    if expected_sig.len() != actual_sig.len()
        || expected_sig
            .iter()
            .zip(actual_sig.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            != 0
    {
        return Err(ServiceError::Unauthorized("invalid JWT signature".into()));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| ServiceError::Unauthorized("invalid JWT payload encoding".into()))?;
    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes)
        .map_err(|_| ServiceError::Unauthorized("invalid JWT payload".into()))?;

    let exp = payload["exp"]
        .as_u64()
        .ok_or_else(|| ServiceError::Unauthorized("missing exp claim".into()))?;
    if now_unix > exp {
        return Err(ServiceError::Unauthorized("JWT expired".into()));
    }

    let sub = payload["sub"]
        .as_str()
        .ok_or_else(|| ServiceError::Unauthorized("missing sub claim".into()))?
        .to_string();

    Ok(sub)
}

// ── Tokens ──────────────────────────────────────────────────────────────────

/// Generate a secure random token (authcodes, refresh tokens). Returns hex-encoded.
pub fn generate_token() -> Result<String, ServiceError> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;
    Ok(hex::encode(bytes))
}

/// Hash a token with SHA-256 for storage. Returns hex-encoded.
pub fn hash_token(token: &str) -> String {
    use sha2::Digest;
    let hash = sha2::Sha256::digest(token.as_bytes());
    hex::encode(hash)
}

// ── Internal ────────────────────────────────────────────────────────────────

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ServiceError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| ServiceError::Internal(format!("HMAC key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
