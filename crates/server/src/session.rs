//! Session issuance for a matched or freshly provisioned account.

use std::sync::Arc;

use thirdlogin_api::db as dbq;
use thirdlogin_api::service::{self, SessionSubject};
use thirdlogin_api::{DeviceFlag, LoginResult};

use crate::matcher::Account;
use crate::notify::Notifier;
use crate::storage::{Db, sq_execute};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("account {0} is destroyed")]
    Destroyed(String),
    #[error("token preparation failed: {0}")]
    Token(String),
    #[error("refresh token insert failed: {0}")]
    Store(#[from] rusqlite::Error),
}

#[derive(Clone)]
pub struct SessionIssuer {
    db: Db,
    jwt_secret: String,
    notifier: Arc<dyn Notifier>,
}

impl SessionIssuer {
    pub fn new(db: Db, jwt_secret: String, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            jwt_secret,
            notifier,
        }
    }

    /// Issue tokens for `account` and kick off the welcome notification.
    ///
    /// The notification runs detached; its outcome is only logged.
    pub fn issue(
        &self,
        account: &Account,
        device_flag: DeviceFlag,
        public_ip: &str,
    ) -> Result<LoginResult, SessionError> {
        if account.destroyed {
            return Err(SessionError::Destroyed(account.uid.clone()));
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let bundle = service::prepare_token_bundle(
            &self.jwt_secret,
            &SessionSubject {
                uid: &account.uid,
                name: &account.name,
                username: &account.username,
                has_avatar: account.has_avatar,
            },
            device_flag,
            now,
        )
        .map_err(|e| SessionError::Token(e.message().to_string()))?;

        {
            let conn = self.db.conn();
            sq_execute(
                &conn,
                dbq::users::insert_refresh_token(
                    &bundle.token_id,
                    &account.uid,
                    &bundle.token_hash,
                    &bundle.expires_at,
                ),
            )?;
        }

        let notifier = Arc::clone(&self.notifier);
        let uid = account.uid.clone();
        let public_ip = public_ip.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_welcome(&public_ip, &uid).await {
                tracing::warn!(uid = %uid, "welcome notification failed: {e:#}");
            }
        });

        tracing::info!(uid = %account.uid, device = %device_flag, "session issued");
        Ok(bundle.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sq_query_row;
    use crate::storage::test_support::test_db;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct ChannelNotifier(mpsc::UnboundedSender<(String, String)>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn send_welcome(&self, public_ip: &str, uid: &str) -> anyhow::Result<()> {
            let _ = self.0.send((public_ip.to_string(), uid.to_string()));
            anyhow::bail!("push servers down")
        }
    }

    fn seed_account(db: &Db, uid: &str) -> Account {
        sq_execute(
            &db.conn(),
            dbq::users::insert_account(&dbq::users::NewAccount {
                uid,
                name: "Octo",
                username: "octo",
                email: None,
                device_flag: 0,
                has_avatar: true,
            }),
        )
        .unwrap();
        Account {
            uid: uid.into(),
            name: "Octo".into(),
            username: "octo".into(),
            destroyed: false,
            has_avatar: true,
        }
    }

    #[tokio::test]
    async fn issues_tokens_and_notifies() {
        let t = test_db();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let issuer = SessionIssuer::new(t.db.clone(), "secret".into(), Arc::new(ChannelNotifier(tx)));
        let account = seed_account(&t.db, "u1");

        let result = issuer.issue(&account, DeviceFlag::Pc, "10.1.2.3").unwrap();
        assert_eq!(result.uid, "u1");
        assert_eq!(result.device_flag, DeviceFlag::Pc);
        assert!(result.has_avatar);

        let stored: i64 = sq_query_row(
            &t.db.conn(),
            dbq::users::count_refresh_tokens("u1"),
            |row| row.get(0),
        )
        .unwrap();
        assert_eq!(stored, 1);

        // A failing notifier does not affect the issued session.
        assert_eq!(
            rx.recv().await,
            Some(("10.1.2.3".to_string(), "u1".to_string()))
        );
    }

    #[tokio::test]
    async fn destroyed_account_gets_no_session() {
        let t = test_db();
        let issuer = SessionIssuer::new(
            t.db.clone(),
            "secret".into(),
            Arc::new(crate::notify::NoopNotifier),
        );
        let mut account = seed_account(&t.db, "u1");
        account.destroyed = true;

        assert!(matches!(
            issuer.issue(&account, DeviceFlag::App, "127.0.0.1"),
            Err(SessionError::Destroyed(uid)) if uid == "u1"
        ));
    }

    #[tokio::test]
    async fn missing_secret_is_a_token_error() {
        let t = test_db();
        let issuer = SessionIssuer::new(t.db.clone(), String::new(), Arc::new(crate::notify::NoopNotifier));
        let account = seed_account(&t.db, "u1");
        assert!(matches!(
            issuer.issue(&account, DeviceFlag::App, "127.0.0.1"),
            Err(SessionError::Token(_))
        ));
    }
}
