use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

pub const ENV_TOKEN_URL: &str = "SPOTDECK_TOKEN_URL";
pub const ENV_SHARED_SECRET: &str = "SPOTDECK_SHARED_SECRET";
pub const ENV_CLIENT_ID: &str = "SPOTDECK_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SPOTDECK_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "SPOTDECK_REFRESH_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenSourceKind {
    /// `GET token_url` returning `{ "access_token": ... }`.
    #[default]
    Service,
    /// OAuth refresh-token grant against `token_endpoint`.
    RefreshToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub source: TokenSourceKind,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndpoint {
    /// `/me/player`, the full player object.
    #[default]
    Player,
    /// `/me/player/currently-playing`, track only.
    CurrentlyPlaying,
}

impl PlaybackEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            PlaybackEndpoint::Player => "/me/player",
            PlaybackEndpoint::CurrentlyPlaying => "/me/player/currently-playing",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub playback_endpoint: PlaybackEndpoint,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Optional shared secret gating mutating commands. This is a casual
/// deterrent compared in plain text; it does not protect anything.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GateConfig {
    #[serde(default)]
    pub shared_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Resolved token source, ready for the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Service {
        url: String,
    },
    RefreshToken {
        endpoint: String,
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("token service URL is not configured (set [session].token_url or SPOTDECK_TOKEN_URL)")]
    MissingTokenUrl,
    #[error("refresh-token grant needs [session].{0}")]
    MissingCredential(&'static str),
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source: TokenSourceKind::default(),
            token_url: None,
            token_endpoint: default_token_endpoint(),
            client_id: None,
            client_secret: None,
            refresh_token: None,
        }
    }
}

impl SessionConfig {
    pub fn token_source(&self) -> Result<TokenSource, ConfigError> {
        match self.source {
            TokenSourceKind::Service => self
                .token_url
                .as_ref()
                .filter(|u| !u.trim().is_empty())
                .map(|url| TokenSource::Service { url: url.clone() })
                .ok_or(ConfigError::MissingTokenUrl),
            TokenSourceKind::RefreshToken => Ok(TokenSource::RefreshToken {
                endpoint: self.token_endpoint.clone(),
                client_id: required(&self.client_id, "client_id")?,
                client_secret: required(&self.client_secret, "client_secret")?,
                refresh_token: required(&self.refresh_token, "refresh_token")?,
            }),
        }
    }
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .as_ref()
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(ConfigError::MissingCredential(name))
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            playback_endpoint: PlaybackEndpoint::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_token_endpoint() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config at {:?}, writing defaults", config_path);
            let config = Self::default();
            config.save()?;
            config
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Overlay environment-provided values. Secrets usually arrive this way
    /// rather than through the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_TOKEN_URL) {
            self.session.token_url = Some(url);
        }
        if let Some(id) = lookup(ENV_CLIENT_ID) {
            self.session.client_id = Some(id);
        }
        if let Some(secret) = lookup(ENV_CLIENT_SECRET) {
            self.session.client_secret = Some(secret);
        }
        if let Some(token) = lookup(ENV_REFRESH_TOKEN) {
            self.session.refresh_token = Some(token);
            if self.session.token_url.is_none() {
                self.session.source = TokenSourceKind::RefreshToken;
            }
        }
        if let Some(secret) = lookup(ENV_SHARED_SECRET) {
            self.gate.shared_secret = Some(secret).filter(|s| !s.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8990);
        assert_eq!(config.poll.interval_ms, 1000);
        assert_eq!(config.api.playback_endpoint.path(), "/me/player");
        assert!(config.gate.shared_secret.is_none());
        assert_eq!(
            config.session.token_source(),
            Err(ConfigError::MissingTokenUrl)
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [session]
            token_url = "https://tokens.example/val"

            [gate]
            shared_secret = "hunter2"
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://api.spotify.com/v1");
        assert_eq!(config.gate.shared_secret.as_deref(), Some("hunter2"));
        assert_eq!(
            config.session.token_source().unwrap(),
            TokenSource::Service {
                url: "https://tokens.example/val".to_string()
            }
        );
    }

    #[test]
    fn test_refresh_token_source_requires_credentials() {
        let mut session = SessionConfig {
            source: TokenSourceKind::RefreshToken,
            client_id: Some("id".into()),
            ..SessionConfig::default()
        };
        assert_eq!(
            session.token_source(),
            Err(ConfigError::MissingCredential("client_secret"))
        );
        session.client_secret = Some("secret".into());
        session.refresh_token = Some("refresh".into());
        assert!(matches!(
            session.token_source(),
            Ok(TokenSource::RefreshToken { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_CLIENT_ID, "id"),
            (ENV_CLIENT_SECRET, "secret"),
            (ENV_REFRESH_TOKEN, "refresh"),
            (ENV_SHARED_SECRET, "open sesame"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.session.source, TokenSourceKind::RefreshToken);
        assert_eq!(config.gate.shared_secret.as_deref(), Some("open sesame"));
    }
}
