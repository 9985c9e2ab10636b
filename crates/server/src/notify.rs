//! Welcome notifications and push de-duplication.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::handoff::KvStore;

/// Key prefix for the "recently pushed" marker of a uid.
pub const PUSH_UID_KEY_PREFIX: &str = "thirdlogin:push_uid:";

/// How long a delivered push suppresses further pushes to the same uid.
pub const PUSH_DEDUP_TTL: Duration = Duration::from_secs(5 * 60);

const PUSH_TYPE_NOTICE: i32 = 3;
const WELCOME_TEMPLATE_ID: i32 = 27;
const WELCOME_CONTENT: &str = "Welcome! Your account is ready.";

/// Fire-and-forget welcome delivery after a successful login.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(&self, public_ip: &str, uid: &str) -> anyhow::Result<()>;
}

/// Drops every notification. Used when no push server is configured.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_welcome(&self, _public_ip: &str, uid: &str) -> anyhow::Result<()> {
        tracing::debug!(uid, "welcome notification disabled");
        Ok(())
    }
}

/// Presence markers that suppress duplicate pushes within a window.
#[derive(Debug, Clone)]
pub struct PushDedup {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl PushDedup {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            ttl: PUSH_DEDUP_TTL,
        }
    }

    fn key(uid: &str) -> String {
        format!("{PUSH_UID_KEY_PREFIX}{uid}")
    }

    pub async fn recently_pushed(&self, uid: &str) -> anyhow::Result<bool> {
        Ok(self.store.get(&Self::key(uid)).await?.is_some())
    }

    pub async fn mark(&self, uid: &str) -> anyhow::Result<()> {
        self.store.set(&Self::key(uid), "1", self.ttl).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendNoticeRequest<'a> {
    user_id: &'a str,
    device_id: &'a str,
    lang: &'a str,
    push_type: i32,
    template_id: i32,
    params: HashMap<&'a str, &'a str>,
}

/// Delivers pushes through the first reachable inner push server.
pub struct PushNotifier {
    servers: Vec<String>,
    client: reqwest::Client,
    dedup: PushDedup,
}

impl PushNotifier {
    pub fn new(servers: Vec<String>, client: reqwest::Client, dedup: PushDedup) -> Self {
        Self {
            servers,
            client,
            dedup,
        }
    }

    /// Push `content` to `uid` unless a push already went out recently.
    ///
    /// Returns `Ok(false)` when suppressed by the de-duplication marker.
    pub async fn push(&self, uid: &str, content: &str) -> anyhow::Result<bool> {
        if self.dedup.recently_pushed(uid).await? {
            tracing::info!(uid, "push suppressed, already sent within window");
            return Ok(false);
        }

        let body = SendNoticeRequest {
            user_id: uid,
            device_id: "",
            lang: "",
            push_type: PUSH_TYPE_NOTICE,
            template_id: WELCOME_TEMPLATE_ID,
            params: HashMap::from([("im_content", content)]),
        };

        for server in &self.servers {
            let url = format!("http://{server}/inner/push/sendNotice");
            match self.client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    self.dedup.mark(uid).await?;
                    tracing::info!(uid, server = %server, "push delivered");
                    return Ok(true);
                }
                Ok(resp) => {
                    tracing::warn!(uid, server = %server, status = %resp.status(), "push rejected");
                }
                Err(e) => {
                    tracing::warn!(uid, server = %server, "push server unreachable: {e}");
                }
            }
        }
        anyhow::bail!("no push server accepted the notice for {uid}")
    }
}

#[async_trait]
impl Notifier for PushNotifier {
    async fn send_welcome(&self, public_ip: &str, uid: &str) -> anyhow::Result<()> {
        tracing::debug!(uid, public_ip, "sending welcome notification");
        self.push(uid, WELCOME_CONTENT).await.map(|_| ())
    }
}
