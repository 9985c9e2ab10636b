//! The callback pipeline: resolve, match or provision, issue, hand off.

use std::sync::Arc;

use thirdlogin_api::oauth::ExternalProfile;
use thirdlogin_api::{DeviceFlag, LoginResult};

use crate::handshake::{HandshakeError, Handshakes, Resolution};
use crate::identity::{self, IdentityProvider, ResolveError};
use crate::matcher::{self, Account};
use crate::provision::{ProvisionError, Provisioner};
use crate::session::{SessionError, SessionIssuer};
use crate::storage::Db;

/// Why a login attempt did not produce a session.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("linked account lookup failed: {0}")]
    Lookup(#[from] rusqlite::Error),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Malformed or unroutable callbacks. Nothing is written to the handshake.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("{0} must not be empty")]
    EmptyCode(String),
    #[error("state (authcode) must not be empty")]
    MissingAuthcode,
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
    #[error(transparent)]
    Store(#[from] HandshakeError),
}

#[derive(Clone)]
pub struct LoginService {
    db: Db,
    handshakes: Handshakes,
    providers: Vec<Arc<dyn IdentityProvider>>,
    provisioner: Provisioner,
    issuer: SessionIssuer,
}

impl LoginService {
    pub fn new(
        db: Db,
        handshakes: Handshakes,
        providers: Vec<Arc<dyn IdentityProvider>>,
        provisioner: Provisioner,
        issuer: SessionIssuer,
    ) -> Self {
        Self {
            db,
            handshakes,
            providers,
            provisioner,
            issuer,
        }
    }

    pub fn handshakes(&self) -> &Handshakes {
        &self.handshakes
    }

    pub fn providers(&self) -> &[Arc<dyn IdentityProvider>] {
        &self.providers
    }

    pub fn provider(&self, id: &str) -> Option<&Arc<dyn IdentityProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Log in whoever owns `code` at `provider`, creating the account on first sight.
    pub async fn login(
        &self,
        provider: &dyn IdentityProvider,
        code: &str,
        device_flag: DeviceFlag,
        public_ip: &str,
    ) -> Result<LoginResult, LoginError> {
        let profile = identity::resolve(provider, code).await?;

        let account = match self.find_linked(&profile)? {
            Some(account) => account,
            None => match self.provisioner.provision(&profile, device_flag).await {
                Ok(provisioned) => provisioned.into_account(),
                Err(err @ ProvisionError::AlreadyLinked { .. }) => {
                    tracing::info!(
                        provider = %profile.provider_id,
                        external_id = %profile.external_id,
                        "lost provisioning race, using the winner's account"
                    );
                    self.find_linked(&profile)?.ok_or(err)?
                }
                Err(err) => return Err(err.into()),
            },
        };

        Ok(self.issuer.issue(&account, device_flag, public_ip)?)
    }

    fn find_linked(&self, profile: &ExternalProfile) -> rusqlite::Result<Option<Account>> {
        let conn = self.db.conn();
        matcher::find_linked(&conn, &profile.provider_id, &profile.external_id)
    }

    /// Handle a provider callback and record its outcome under `authcode`.
    ///
    /// Login failures do not surface here: they resolve the handshake to
    /// failed, and the poller reports them. A callback whose authcode is
    /// unknown, expired or already resolved is ignored before any login runs.
    pub async fn handle_callback(
        &self,
        provider_id: &str,
        code: &str,
        authcode: &str,
        public_ip: &str,
    ) -> Result<(), CallbackError> {
        let provider = self
            .provider(provider_id)
            .ok_or_else(|| CallbackError::UnknownProvider(provider_id.to_string()))?;
        if code.trim().is_empty() {
            return Err(CallbackError::EmptyCode(provider.config().code_param.clone()));
        }
        if authcode.trim().is_empty() {
            return Err(CallbackError::MissingAuthcode);
        }
        if !self.handshakes.is_pending(authcode).await? {
            tracing::warn!(
                provider = %provider_id,
                "ignoring callback for a handshake that is not pending"
            );
            return Ok(());
        }

        let outcome = self
            .login(provider.as_ref(), code, DeviceFlag::App, public_ip)
            .await;
        let resolution = match &outcome {
            Ok(result) => Resolution::Succeeded(result),
            Err(e) => {
                tracing::warn!(provider = %provider_id, "third-party login failed: {e}");
                Resolution::Failed
            }
        };
        self.handshakes.complete(authcode, resolution).await?;
        Ok(())
    }
}
