//! First-login provisioning: linked identity + account, all or nothing.
//!
//! The avatar is fetched before the transaction opens, under its own
//! deadline. It only ever decides the `has_avatar` flag; it never fails
//! provisioning.

use std::sync::Arc;
use std::time::Duration;

use thirdlogin_api::DeviceFlag;
use thirdlogin_api::db as dbq;
use thirdlogin_api::oauth::ExternalProfile;
use thirdlogin_api::service;

use crate::files::FileService;
use crate::matcher::Account;
use crate::storage::{Db, is_unique_violation, sq_execute};

/// Upper bound on the avatar download + upload.
pub const AVATAR_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const AVATAR_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Another login linked the same identity first.
    #[error("identity {provider}/{external_id} is already linked")]
    AlreadyLinked {
        provider: String,
        external_id: String,
    },
    #[error("could not open transaction: {0}")]
    Begin(rusqlite::Error),
    #[error("linked identity insert failed: {0}")]
    LinkedRecordInsert(rusqlite::Error),
    #[error("account creation failed: {0}")]
    AccountCreation(rusqlite::Error),
    #[error("commit failed: {0}")]
    Commit(rusqlite::Error),
}

/// A freshly provisioned account, with or without its avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    Enriched(Account),
    Plain(Account),
}

impl Provisioned {
    pub fn account(&self) -> &Account {
        match self {
            Self::Enriched(account) | Self::Plain(account) => account,
        }
    }

    pub fn into_account(self) -> Account {
        match self {
            Self::Enriched(account) | Self::Plain(account) => account,
        }
    }
}

#[derive(Clone)]
pub struct Provisioner {
    db: Db,
    files: Arc<dyn FileService>,
    avatar_partitions: u32,
    avatar_timeout: Duration,
}

impl Provisioner {
    pub fn new(db: Db, files: Arc<dyn FileService>, avatar_partitions: u32) -> Self {
        Self {
            db,
            files,
            avatar_partitions: avatar_partitions.max(1),
            avatar_timeout: AVATAR_FETCH_TIMEOUT,
        }
    }

    pub fn with_avatar_timeout(mut self, timeout: Duration) -> Self {
        self.avatar_timeout = timeout;
        self
    }

    /// Create the account for a first-seen identity.
    pub async fn provision(
        &self,
        profile: &ExternalProfile,
        device_flag: DeviceFlag,
    ) -> Result<Provisioned, ProvisionError> {
        self.provision_as(service::generate_uid(), profile, device_flag)
            .await
    }

    async fn provision_as(
        &self,
        uid: String,
        profile: &ExternalProfile,
        device_flag: DeviceFlag,
    ) -> Result<Provisioned, ProvisionError> {
        let has_avatar = self.store_avatar(&uid, profile.avatar_url.as_deref()).await;
        self.insert_account(&uid, profile, device_flag, has_avatar)?;

        tracing::info!(
            provider = %profile.provider_id,
            external_id = %profile.external_id,
            uid = %uid,
            has_avatar,
            "provisioned account"
        );

        let account = Account {
            uid,
            name: profile.display_name.clone(),
            username: profile.username.clone(),
            destroyed: false,
            has_avatar,
        };
        Ok(if has_avatar {
            Provisioned::Enriched(account)
        } else {
            Provisioned::Plain(account)
        })
    }

    /// Download and store the avatar. Returns whether it was stored.
    async fn store_avatar(&self, uid: &str, avatar_url: Option<&str>) -> bool {
        let Some(url) = service::avatar_candidate(avatar_url) else {
            return false;
        };
        let path = service::avatar_path(uid, self.avatar_partitions);

        let pipeline = async {
            match self.files.download_image(url).await? {
                Some(bytes) => {
                    self.files
                        .upload_file(&path, AVATAR_CONTENT_TYPE, bytes)
                        .await?;
                    anyhow::Ok(true)
                }
                None => anyhow::Ok(false),
            }
        };

        match tokio::time::timeout(self.avatar_timeout, pipeline).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => {
                tracing::warn!(uid, "avatar skipped: {e:#}");
                false
            }
            Err(_) => {
                tracing::warn!(uid, timeout = ?self.avatar_timeout, "avatar skipped: timed out");
                false
            }
        }
    }

    fn insert_account(
        &self,
        uid: &str,
        profile: &ExternalProfile,
        device_flag: DeviceFlag,
        has_avatar: bool,
    ) -> Result<(), ProvisionError> {
        let mut conn = self.db.conn();
        // Dropping `tx` without commit rolls back.
        let tx = conn.transaction().map_err(ProvisionError::Begin)?;

        sq_execute(
            &tx,
            dbq::oauth::insert_identity(&dbq::oauth::NewIdentity {
                provider: &profile.provider_id,
                external_id: &profile.external_id,
                uid,
                username: &profile.username,
                display_name: &profile.display_name,
                avatar_url: profile.avatar_url.as_deref(),
                email: profile.email.as_deref(),
            }),
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                ProvisionError::AlreadyLinked {
                    provider: profile.provider_id.clone(),
                    external_id: profile.external_id.clone(),
                }
            } else {
                ProvisionError::LinkedRecordInsert(e)
            }
        })?;

        sq_execute(
            &tx,
            dbq::users::insert_account(&dbq::users::NewAccount {
                uid,
                name: &profile.display_name,
                username: &profile.username,
                email: profile.email.as_deref(),
                device_flag: device_flag.code(),
                has_avatar,
            }),
        )
        .map_err(ProvisionError::AccountCreation)?;
        sq_execute(&tx, dbq::users::insert_settings(uid))
            .map_err(ProvisionError::AccountCreation)?;

        tx.commit().map_err(ProvisionError::Commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::find_linked;
    use crate::storage::sq_query_row;
    use crate::storage::test_support::{TestDb, test_db};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFiles {
        download: Option<Vec<u8>>,
        fail_download: bool,
        stall: bool,
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FileService for FakeFiles {
        async fn download_image(&self, _url: &str) -> anyhow::Result<Option<Vec<u8>>> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail_download {
                anyhow::bail!("connection reset");
            }
            Ok(self.download.clone())
        }

        async fn upload_file(
            &self,
            path: &str,
            _content_type: &str,
            _bytes: Vec<u8>,
        ) -> anyhow::Result<String> {
            self.uploads.lock().unwrap().push(path.to_string());
            Ok(path.to_string())
        }
    }

    fn profile(avatar: Option<&str>) -> ExternalProfile {
        ExternalProfile {
            provider_id: "gitee".into(),
            external_id: "octo".into(),
            username: "octo".into(),
            display_name: "Octo".into(),
            email: Some("octo@example.com".into()),
            avatar_url: avatar.map(str::to_string),
        }
    }

    fn provisioner(t: &TestDb, files: FakeFiles) -> (Provisioner, Arc<FakeFiles>) {
        let files = Arc::new(files);
        (Provisioner::new(t.db.clone(), files.clone(), 100), files)
    }

    fn counts(t: &TestDb) -> (i64, i64) {
        let conn = t.db.conn();
        let users = sq_query_row(&conn, dbq::users::count(), |row| row.get(0)).unwrap();
        let links = sq_query_row(
            &conn,
            dbq::oauth::count_identities("gitee", "octo"),
            |row| row.get(0),
        )
        .unwrap();
        (users, links)
    }

    #[tokio::test]
    async fn creates_account_with_avatar() {
        let t = test_db();
        let (p, files) = provisioner(
            &t,
            FakeFiles {
                download: Some(vec![1, 2, 3]),
                ..Default::default()
            },
        );

        let provisioned = p
            .provision(&profile(Some("https://cdn/a.png")), DeviceFlag::App)
            .await
            .unwrap();
        assert!(matches!(provisioned, Provisioned::Enriched(_)));
        let account = provisioned.into_account();
        assert!(account.has_avatar);

        let uploads = files.uploads.lock().unwrap().clone();
        assert_eq!(uploads, vec![service::avatar_path(&account.uid, 100)]);

        let linked = find_linked(&t.db.conn(), "gitee", "octo").unwrap().unwrap();
        assert_eq!(linked, account);
    }

    #[tokio::test]
    async fn avatar_failure_still_creates_account() {
        let t = test_db();
        let (p, files) = provisioner(
            &t,
            FakeFiles {
                fail_download: true,
                ..Default::default()
            },
        );

        let provisioned = p
            .provision(&profile(Some("https://cdn/a.png")), DeviceFlag::App)
            .await
            .unwrap();
        assert!(matches!(provisioned, Provisioned::Plain(_)));
        assert!(!provisioned.account().has_avatar);
        assert!(files.uploads.lock().unwrap().is_empty());
        assert_eq!(counts(&t), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_avatar_is_abandoned_after_timeout() {
        let t = test_db();
        let (p, _) = provisioner(
            &t,
            FakeFiles {
                stall: true,
                download: Some(vec![1]),
                ..Default::default()
            },
        );

        let provisioned = p
            .provision(&profile(Some("https://cdn/a.png")), DeviceFlag::Web)
            .await
            .unwrap();
        assert!(!provisioned.account().has_avatar);
        assert_eq!(counts(&t), (1, 1));
    }

    #[tokio::test]
    async fn default_portrait_is_not_downloaded() {
        let t = test_db();
        let (p, files) = provisioner(
            &t,
            FakeFiles {
                download: Some(vec![1]),
                ..Default::default()
            },
        );

        let provisioned = p
            .provision(
                &profile(Some("https://gitee.com/assets/no_portrait.png")),
                DeviceFlag::App,
            )
            .await
            .unwrap();
        assert!(!provisioned.account().has_avatar);
        assert!(files.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn account_creation_failure_rolls_back_link() {
        let t = test_db();
        sq_execute(
            &t.db.conn(),
            dbq::users::insert_account(&dbq::users::NewAccount {
                uid: "taken",
                name: "x",
                username: "x",
                email: None,
                device_flag: 0,
                has_avatar: false,
            }),
        )
        .unwrap();
        let (p, _) = provisioner(&t, FakeFiles::default());

        let err = p
            .provision_as("taken".into(), &profile(None), DeviceFlag::App)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::AccountCreation(_)));
        assert_eq!(counts(&t), (1, 0));
    }

    #[tokio::test]
    async fn commit_failure_leaves_nothing_behind() {
        let t = test_db();
        // Point the link at a missing account; the deferred key fails at COMMIT.
        t.db.conn()
            .execute_batch(
                "CREATE TRIGGER orphan_link AFTER INSERT ON user_settings BEGIN
                     UPDATE linked_identities SET user_id = 'ghost' WHERE user_id = NEW.user_id;
                 END;",
            )
            .unwrap();
        let (p, _) = provisioner(&t, FakeFiles::default());

        let err = p
            .provision(&profile(None), DeviceFlag::App)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Commit(_)), "got {err:?}");
        assert_eq!(counts(&t), (0, 0));
        assert!(t.db.conn().is_autocommit());
    }

    #[tokio::test]
    async fn link_insert_failure_creates_no_account() {
        let t = test_db();
        t.db.conn()
            .execute_batch(
                "CREATE TRIGGER reject_link BEFORE INSERT ON linked_identities BEGIN
                     SELECT RAISE(ABORT, 'linked identities are read-only');
                 END;",
            )
            .unwrap();
        let (p, files) = provisioner(&t, FakeFiles::default());

        let err = p
            .provision(&profile(None), DeviceFlag::App)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ProvisionError::LinkedRecordInsert(_)),
            "got {err:?}"
        );
        assert_eq!(counts(&t), (0, 0));
        assert!(files.uploads.lock().unwrap().is_empty());
        assert!(t.db.conn().is_autocommit());
    }

    #[tokio::test]
    async fn second_provision_is_already_linked() {
        let t = test_db();
        let (p, _) = provisioner(&t, FakeFiles::default());

        p.provision(&profile(None), DeviceFlag::App).await.unwrap();
        let err = p
            .provision(&profile(None), DeviceFlag::App)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::AlreadyLinked { .. }));
        assert_eq!(counts(&t), (1, 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_provisions_leave_one_pair() {
        let t = test_db();
        let (p, _) = provisioner(&t, FakeFiles::default());
        let target = profile(None);

        let attempts = (0..8).map(|_| {
            let p = p.clone();
            let target = target.clone();
            tokio::spawn(async move { p.provision(&target, DeviceFlag::App).await })
        });
        let mut created = 0;
        let mut conflicts = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(ProvisionError::AlreadyLinked { .. }) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((created, conflicts), (1, 7));
        assert_eq!(counts(&t), (1, 1));
    }
}
