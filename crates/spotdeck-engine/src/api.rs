//! Thin client over the Web API and the token service.
//!
//! Every method issues exactly one request and classifies the response; none
//! of them touch shared state.

use std::time::Duration;

use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Method, Response};
use serde_json::json;
use spotdeck_proto::config::{ApiConfig, PlaybackEndpoint, TokenSource};
use spotdeck_proto::model::{Command, DeviceSummary, PlaybackSnapshot};
use spotdeck_proto::wire::{self, TokenGrant};
use tracing::debug;

use crate::error::ApiError;

const USER_AGENT: &str = concat!("spotdeck/", env!("CARGO_PKG_VERSION"));

/// Method, path, query and optional JSON body for one command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub method: Method,
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
}

impl CommandRequest {
    pub fn for_command(cmd: &Command) -> Self {
        let (method, path, query, body) = match cmd {
            Command::Play => (Method::PUT, "/me/player/play", vec![], None),
            Command::Pause => (Method::PUT, "/me/player/pause", vec![], None),
            Command::Next => (Method::POST, "/me/player/next", vec![], None),
            Command::Previous => (Method::POST, "/me/player/previous", vec![], None),
            Command::Seek { position_ms } => (
                Method::PUT,
                "/me/player/seek",
                vec![("position_ms", position_ms.to_string())],
                None,
            ),
            Command::SetVolume { percent } => (
                Method::PUT,
                "/me/player/volume",
                vec![("volume_percent", (*percent).min(100).to_string())],
                None,
            ),
            Command::SetShuffle { state } => (
                Method::PUT,
                "/me/player/shuffle",
                vec![("state", state.to_string())],
                None,
            ),
            Command::SetRepeat { state } => (
                Method::PUT,
                "/me/player/repeat",
                vec![("state", state.as_query().to_string())],
                None,
            ),
            // Transfer takes the device in the body, unlike every other command.
            Command::SetDevice { device_id, play } => (
                Method::PUT,
                "/me/player",
                vec![],
                Some(json!({ "device_ids": [device_id], "play": play })),
            ),
        };
        Self { method, path, query, body }
    }
}

pub struct WebApi {
    http: Client,
    base_url: String,
    playback_endpoint: PlaybackEndpoint,
}

impl WebApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            playback_endpoint: config.playback_endpoint,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Query current playback. `Ok(None)` means nothing is playing (204, or
    /// a body without an item).
    pub async fn playback(&self, token: &str) -> Result<Option<PlaybackSnapshot>, ApiError> {
        let resp = self
            .http
            .get(self.url(self.playback_endpoint.path()))
            .bearer_auth(token)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 204 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(resp).await);
        }
        let body = resp.bytes().await?;
        Ok(wire::parse_playback(&body)?)
    }

    pub async fn devices(&self, token: &str) -> Result<Vec<DeviceSummary>, ApiError> {
        let resp = self
            .http
            .get(self.url("/me/player/devices"))
            .bearer_auth(token)
            .send()
            .await?;

        if resp.status().as_u16() != 200 {
            return Err(status_error(resp).await);
        }
        let body = resp.bytes().await?;
        Ok(wire::parse_devices(&body)?)
    }

    /// Send one mutating command. Any 2xx counts as success.
    pub async fn send(&self, token: &str, cmd: &Command) -> Result<(), ApiError> {
        let req = CommandRequest::for_command(cmd);
        debug!("api: {} {} {:?}", req.method, req.path, req.query);

        let mut builder = self
            .http
            .request(req.method, self.url(req.path))
            .bearer_auth(token)
            .query(&req.query);
        builder = match req.body {
            Some(body) => builder.json(&body),
            None => builder.header(CONTENT_LENGTH, "0"),
        };

        let resp = builder.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(status_error(resp).await)
        }
    }

    pub async fn fetch_token(&self, source: &TokenSource) -> Result<TokenGrant, ApiError> {
        let resp = match source {
            TokenSource::Service { url } => self.http.get(url).send().await?,
            TokenSource::RefreshToken {
                endpoint,
                client_id,
                client_secret,
                refresh_token,
            } => {
                self.http
                    .post(endpoint)
                    .basic_auth(client_id, Some(client_secret))
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token.as_str()),
                    ])
                    .send()
                    .await?
            }
        };

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let body = resp.bytes().await?;
        Ok(wire::parse_token(&body)?)
    }
}

async fn status_error(resp: Response) -> ApiError {
    let status = resp.status().as_u16();
    let body = resp.bytes().await.unwrap_or_default();
    ApiError::Status {
        status,
        upstream: wire::parse_error_body(&body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotdeck_proto::model::RepeatState;

    #[test]
    fn test_transport_commands() {
        let next = CommandRequest::for_command(&Command::Next);
        assert_eq!(next.method, Method::POST);
        assert_eq!(next.path, "/me/player/next");
        assert!(next.query.is_empty());

        let pause = CommandRequest::for_command(&Command::Pause);
        assert_eq!(pause.method, Method::PUT);
    }

    #[test]
    fn test_parameterised_commands_use_query() {
        let seek = CommandRequest::for_command(&Command::Seek { position_ms: 90_500 });
        assert_eq!(seek.query, vec![("position_ms", "90500".to_string())]);

        let repeat = CommandRequest::for_command(&Command::SetRepeat {
            state: RepeatState::Track,
        });
        assert_eq!(repeat.query, vec![("state", "track".to_string())]);

        let shuffle = CommandRequest::for_command(&Command::SetShuffle { state: true });
        assert_eq!(shuffle.query, vec![("state", "true".to_string())]);
        assert!(shuffle.body.is_none());
    }

    #[test]
    fn test_device_transfer_uses_body() {
        let req = CommandRequest::for_command(&Command::SetDevice {
            device_id: "74ASZWbe4lXaubB36ztrGX".to_string(),
            play: true,
        });
        assert_eq!(req.path, "/me/player");
        assert!(req.query.is_empty());
        assert_eq!(
            req.body,
            Some(json!({ "device_ids": ["74ASZWbe4lXaubB36ztrGX"], "play": true }))
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let api = WebApi::new(&ApiConfig {
            base_url: "http://127.0.0.1:9/v1/".to_string(),
            ..ApiConfig::default()
        })
        .unwrap();
        assert_eq!(api.url("/me/player"), "http://127.0.0.1:9/v1/me/player");
    }
}
