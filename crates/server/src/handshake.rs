//! Authcode handshake between a polling client and the provider callback.

use std::sync::Arc;
use std::time::Duration;

use thirdlogin_api::LoginResult;
use thirdlogin_api::crypto;
use thirdlogin_api::handshake::{
    FAILED_SENTINEL, HandshakeState, PENDING_SENTINEL, PENDING_TTL, RESULT_TTL, authcode_key,
};

use crate::handoff::{KvStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

/// What a poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Succeeded(LoginResult),
    Failed,
    /// Never issued, already consumed, or expired.
    NotFound,
}

/// Terminal outcome written by the callback.
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Succeeded(&'a LoginResult),
    Failed,
}

/// Begins, completes and polls authcode handshakes against a [`KvStore`].
#[derive(Debug, Clone)]
pub struct Handshakes {
    store: Arc<dyn KvStore>,
    pending_ttl: Duration,
    result_ttl: Duration,
}

impl Handshakes {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            pending_ttl: PENDING_TTL,
            result_ttl: RESULT_TTL,
        }
    }

    /// Issue a fresh authcode and record it as pending.
    pub async fn begin(&self) -> Result<String, HandshakeError> {
        let authcode =
            crypto::generate_token().map_err(|e| HandshakeError::Internal(e.to_string()))?;
        self.store
            .set(&authcode_key(&authcode), PENDING_SENTINEL, self.pending_ttl)
            .await?;
        tracing::debug!(authcode = %authcode, "handshake begun");
        Ok(authcode)
    }

    /// Whether `authcode` names a live handshake still waiting for its callback.
    ///
    /// Advisory only: [`Handshakes::complete`] re-checks atomically.
    pub async fn is_pending(&self, authcode: &str) -> Result<bool, HandshakeError> {
        let raw = self.store.get(&authcode_key(authcode)).await?;
        Ok(raw.as_deref() == Some(PENDING_SENTINEL))
    }

    /// Record the outcome of a callback.
    ///
    /// Only a pending handshake is resolved. Returns `false` when the authcode
    /// is unknown, expired or already resolved; nothing is written then.
    pub async fn complete(
        &self,
        authcode: &str,
        resolution: Resolution<'_>,
    ) -> Result<bool, HandshakeError> {
        let value = match resolution {
            Resolution::Succeeded(result) => HandshakeState::Succeeded(result.clone())
                .encode()
                .map_err(|e| HandshakeError::Internal(e.to_string()))?,
            Resolution::Failed => FAILED_SENTINEL.to_string(),
        };
        let written = self
            .store
            .replace_if(
                &authcode_key(authcode),
                PENDING_SENTINEL,
                &value,
                self.result_ttl,
            )
            .await?;
        if !written {
            tracing::warn!(authcode = %authcode, "callback for a handshake that is not pending");
        }
        Ok(written)
    }

    /// Read the handshake state. A terminal state is consumed by the read,
    /// so of several overlapping polls at most one observes it.
    pub async fn poll(&self, authcode: &str) -> Result<PollOutcome, HandshakeError> {
        let key = authcode_key(authcode);
        let read = match self.store.get(&key).await? {
            None => return Ok(PollOutcome::NotFound),
            Some(raw) if raw == PENDING_SENTINEL => return Ok(PollOutcome::Pending),
            Some(raw) => raw,
        };

        // A terminal entry never returns to pending, so whoever takes it owns it.
        let raw = match self.store.take(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(PollOutcome::NotFound),
            Err(e) => {
                // The entry expires on its own if the take does not land.
                tracing::warn!(authcode = %authcode, "failed to consume handshake entry: {e}");
                read
            }
        };

        Ok(match HandshakeState::decode(&raw) {
            Ok(HandshakeState::Succeeded(result)) => PollOutcome::Succeeded(result),
            Ok(HandshakeState::Failed) => PollOutcome::Failed,
            Ok(HandshakeState::Pending) => PollOutcome::Pending,
            Err(e) => {
                tracing::error!(authcode = %authcode, "undecodable handshake entry: {e}");
                PollOutcome::Failed
            }
        })
    }
}
