//! Third-party login server: authcode handshake, identity resolution and
//! first-login account provisioning behind an axum router.

pub mod config;
pub mod error;
pub mod files;
pub mod handoff;
pub mod handshake;
pub mod identity;
pub mod login;
pub mod matcher;
pub mod notify;
pub mod provision;
pub mod routes;
pub mod session;
pub mod storage;

use std::sync::Arc;

use axum::{Router, extract::FromRef, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::AppConfig;

use files::LocalFileService;
use handoff::KvStore;
use handshake::Handshakes;
use identity::{HttpIdentityProvider, IdentityProvider};
use login::LoginService;
use notify::{NoopNotifier, Notifier, PushDedup, PushNotifier};
use provision::Provisioner;
use session::SessionIssuer;
use storage::Db;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub login: LoginService,
    pub config: AppConfig,
}

impl FromRef<AppState> for LoginService {
    fn from_ref(state: &AppState) -> Self {
        state.login.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl AppState {
    /// Wire the production collaborators: HTTP providers from config, local
    /// file storage under the data directory, push notifications when push
    /// servers are configured.
    pub fn new(config: AppConfig, db: Db, store: Arc<dyn KvStore>) -> Self {
        let client = reqwest::Client::new();

        let providers: Vec<Arc<dyn IdentityProvider>> = config
            .oauth_providers
            .iter()
            .map(|p| {
                Arc::new(HttpIdentityProvider::new(
                    p.clone(),
                    client.clone(),
                    config.callback_url(&p.id),
                )) as Arc<dyn IdentityProvider>
            })
            .collect();

        let notifier: Arc<dyn Notifier> = if config.push_servers.is_empty() {
            Arc::new(NoopNotifier)
        } else {
            Arc::new(PushNotifier::new(
                config.push_servers.clone(),
                client.clone(),
                PushDedup::new(Arc::clone(&store)),
            ))
        };

        let files = Arc::new(LocalFileService::new(client, db.files_dir()));
        let login = LoginService::new(
            db.clone(),
            Handshakes::new(store),
            providers,
            Provisioner::new(db.clone(), files, config.avatar_partitions),
            SessionIssuer::new(db, config.jwt_secret.clone(), notifier),
        );

        Self { login, config }
    }
}

/// Build the full router with tracing and CORS layers.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health::health))
        .route("/auth/providers", get(routes::thirdlogin::providers))
        // Handshake
        .route("/user/thirdlogin/authcode", get(routes::thirdlogin::authcode))
        .route(
            "/user/thirdlogin/authstatus",
            get(routes::thirdlogin::authstatus),
        )
        // Providers
        .route(
            "/user/oauth/{provider}/authorize",
            get(routes::thirdlogin::authorize),
        )
        .route(
            "/user/oauth/{provider}/callback",
            get(routes::thirdlogin::callback),
        );

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
