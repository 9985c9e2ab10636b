use std::path::PathBuf;

use thirdlogin_api::oauth::{self, OAuthProviderConfig};

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_AVATAR_PARTITION: u32 = 100;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub jwt_secret: String,
    pub data_dir: PathBuf,
    pub port: u16,
    pub avatar_partitions: u32,
    pub push_servers: Vec<String>,
    pub oauth_providers: Vec<OAuthProviderConfig>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = var("THIRDLOGIN_BASE_URL")
            .or_else(|| var("BASE_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.into())
            .trim_end_matches('/')
            .to_string();

        let port = var("PORT")
            .and_then(|p| {
                p.parse::<u16>()
                    .inspect_err(|e| tracing::warn!("ignoring invalid PORT {p:?}: {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_PORT);

        let avatar_partitions = var("AVATAR_PARTITION")
            .and_then(|p| {
                p.parse::<u32>()
                    .inspect_err(|e| tracing::warn!("ignoring invalid AVATAR_PARTITION {p:?}: {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_AVATAR_PARTITION)
            .max(1);

        let push_servers = var("PUSH_SERVERS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let oauth_providers = [
            try_load_gitee(&var),
            try_load_github(&var),
            try_load_mall(&var),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self {
            base_url,
            jwt_secret: var("JWT_SECRET").unwrap_or_default(),
            data_dir: var("THIRDLOGIN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            port,
            avatar_partitions,
            push_servers,
            oauth_providers,
        }
    }

    /// Server-side callback the provider redirects back to.
    pub fn callback_url(&self, provider_id: &str) -> String {
        format!("{}/api/user/oauth/{provider_id}/callback", self.base_url)
    }
}

fn try_load_gitee(var: &impl Fn(&str) -> Option<String>) -> Option<OAuthProviderConfig> {
    let id = var("GITEE_CLIENT_ID")?;
    let secret = var("GITEE_CLIENT_SECRET")?;
    tracing::info!("identity provider enabled: Gitee");
    Some(oauth::gitee_preset(id, secret))
}

fn try_load_github(var: &impl Fn(&str) -> Option<String>) -> Option<OAuthProviderConfig> {
    let id = var("GITHUB_CLIENT_ID")?;
    let secret = var("GITHUB_CLIENT_SECRET")?;
    tracing::info!("identity provider enabled: GitHub");
    Some(oauth::github_preset(id, secret))
}

fn try_load_mall(var: &impl Fn(&str) -> Option<String>) -> Option<OAuthProviderConfig> {
    let url = var("MALL_PROFILE_URL")?;
    tracing::info!("identity provider enabled: Mall ({url})");
    Some(oauth::mall_preset(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]);
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.port, 3000);
        assert_eq!(c.avatar_partitions, 100);
        assert_eq!(c.data_dir, PathBuf::from("data"));
        assert!(c.jwt_secret.is_empty());
        assert!(c.push_servers.is_empty());
        assert!(c.oauth_providers.is_empty());
    }

    #[test]
    fn base_url_prefers_specific_variable() {
        let c = config(&[
            ("BASE_URL", "https://generic.example"),
            ("THIRDLOGIN_BASE_URL", "https://im.example/"),
        ]);
        assert_eq!(c.base_url, "https://im.example");
        assert_eq!(
            c.callback_url("gitee"),
            "https://im.example/api/user/oauth/gitee/callback"
        );
        let c = config(&[("BASE_URL", "https://generic.example")]);
        assert_eq!(c.base_url, "https://generic.example");
    }

    #[test]
    fn providers_need_every_variable() {
        let c = config(&[
            ("GITEE_CLIENT_ID", "cid"),
            ("GITHUB_CLIENT_ID", "cid"),
            ("GITHUB_CLIENT_SECRET", "secret"),
            ("MALL_PROFILE_URL", "https://mall.example/user/get"),
        ]);
        let ids: Vec<&str> = c.oauth_providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["github", "mall"]);
    }

    #[test]
    fn numeric_values_are_validated() {
        let c = config(&[
            ("PORT", "not-a-port"),
            ("AVATAR_PARTITION", "0"),
            ("PUSH_SERVERS", " 10.0.0.1:8080, ,10.0.0.2:8080 "),
        ]);
        assert_eq!(c.port, 3000);
        assert_eq!(c.avatar_partitions, 1);
        assert_eq!(c.push_servers, ["10.0.0.1:8080", "10.0.0.2:8080"]);
    }
}
