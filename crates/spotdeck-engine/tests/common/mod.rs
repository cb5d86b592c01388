//! In-process stand-in for the Web API and the token service.
//!
//! Serves `/v1/me/player*` from a small mutable model so that commands have
//! a visible effect on the next poll, and records every request it sees.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use spotdeck_proto::config::{Config, TokenSourceKind};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
    pub auth: Option<String>,
}

pub struct MockState {
    /// 200 serves the player object, 204 means nothing is playing, anything
    /// else is returned as an error.
    pub playback_status: u16,
    pub playing: bool,
    pub shuffle: bool,
    pub volume: u8,
    pub progress_ms: u64,
    /// Every command answers with this instead of succeeding.
    pub command_error: Option<(u16, Value)>,
    /// Bearer tokens answered with 401 on every route.
    pub rejected_tokens: HashSet<String>,
    pub playback_delay: Option<Duration>,
    /// `expires_in` handed out with every token.
    pub token_expires_in: u64,
    pub token_calls: usize,
    pub requests: Vec<Recorded>,
    playback_in_flight: usize,
    pub max_playback_in_flight: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            playback_status: 200,
            playing: true,
            shuffle: false,
            volume: 40,
            progress_ms: 61_000,
            command_error: None,
            rejected_tokens: HashSet::new(),
            playback_delay: None,
            token_expires_in: 3600,
            token_calls: 0,
            requests: Vec::new(),
            playback_in_flight: 0,
            max_playback_in_flight: 0,
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockServer {
    pub addr: SocketAddr,
    state: Shared,
}

impl MockServer {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));
        let app = Router::new()
            .route("/token", get(service_token))
            .route("/oauth/token", post(refresh_grant))
            .fallback(web_api)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Service token source, fast polling.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.session.source = TokenSourceKind::Service;
        config.session.token_url = Some(self.url("/token"));
        config.api.base_url = self.url("/v1");
        config.api.request_timeout_ms = 2_000;
        config.poll.interval_ms = 50;
        config.http.enabled = false;
        config
    }

    pub fn set(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn read<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.read(|s| s.requests.clone())
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.read(|s| {
            s.requests
                .iter()
                .filter(|r| r.method == method && r.path == path)
                .count()
        })
    }

    /// PUT/POST requests against the player, i.e. commands.
    pub fn commands(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with("/v1/") && r.method != "GET")
            .collect()
    }

    pub fn token_calls(&self) -> usize {
        self.read(|s| s.token_calls)
    }
}

async fn service_token(State(state): State<Shared>) -> Response {
    let mut s = state.lock().unwrap();
    s.token_calls += 1;
    Json(json!({
        "access_token": format!("tok-{}", s.token_calls),
        "expires_in": s.token_expires_in,
    }))
    .into_response()
}

async fn refresh_grant(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    let mut s = state.lock().unwrap();
    s.token_calls += 1;
    let basic = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Basic "))
        .unwrap_or(false);
    let form = String::from_utf8_lossy(&body);
    if !basic || !form.contains("grant_type=refresh_token") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_client", "error_description": "Invalid client" })),
        )
            .into_response();
    }
    Json(json!({
        "access_token": format!("tok-{}", s.token_calls),
        "expires_in": s.token_expires_in,
    }))
    .into_response()
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn player_json(s: &MockState) -> Value {
    json!({
        "is_playing": s.playing,
        "progress_ms": s.progress_ms,
        "shuffle_state": s.shuffle,
        "repeat_state": "off",
        "device": {
            "id": "dev-1",
            "name": "Desk",
            "type": "Computer",
            "is_active": true,
            "volume_percent": s.volume,
            "supports_volume": true
        },
        "item": {
            "id": "track-1",
            "name": "Windowlicker",
            "duration_ms": 367_000,
            "external_urls": { "spotify": "https://open.spotify.com/track/1" },
            "album": {
                "name": "Windowlicker",
                "images": [{ "url": "https://i.scdn.co/image/1" }]
            },
            "artists": [{
                "name": "Aphex Twin",
                "external_urls": { "spotify": "https://open.spotify.com/artist/1" }
            }]
        }
    })
}

fn devices_json() -> Value {
    json!({
        "devices": [
            { "id": "dev-1", "name": "Desk", "type": "Computer", "is_active": true, "volume_percent": 40 },
            { "id": "dev-2", "name": "Kitchen", "type": "Speaker", "is_active": false, "volume_percent": null }
        ]
    })
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "status": 401, "message": "The access token expired" } })),
    )
        .into_response()
}

async fn web_api(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let query = parse_query(uri.query());
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (rejected, delay) = {
        let mut s = state.lock().unwrap();
        s.requests.push(Recorded {
            method: method.to_string(),
            path: path.clone(),
            query: query.clone(),
            body: serde_json::from_slice(&body).ok(),
            auth: auth.clone(),
        });
        let token = auth
            .as_deref()
            .and_then(|a| a.strip_prefix("Bearer "))
            .unwrap_or("");
        (s.rejected_tokens.contains(token), s.playback_delay)
    };
    if rejected {
        return unauthorized();
    }

    match (method.as_str(), path.as_str()) {
        ("GET", "/v1/me/player") => {
            {
                let mut s = state.lock().unwrap();
                s.playback_in_flight += 1;
                s.max_playback_in_flight = s.max_playback_in_flight.max(s.playback_in_flight);
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut s = state.lock().unwrap();
            s.playback_in_flight -= 1;
            match s.playback_status {
                200 => Json(player_json(&s)).into_response(),
                204 => StatusCode::NO_CONTENT.into_response(),
                401 => unauthorized(),
                other => (
                    StatusCode::from_u16(other).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    Json(json!({ "error": { "status": other, "message": "Upstream trouble" } })),
                )
                    .into_response(),
            }
        }
        ("GET", "/v1/me/player/devices") => Json(devices_json()).into_response(),
        (_, p) if p.starts_with("/v1/me/player") => {
            let mut s = state.lock().unwrap();
            if let Some((status, body)) = s.command_error.clone() {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
                return (status, Json(body)).into_response();
            }
            match p {
                "/v1/me/player/play" => s.playing = true,
                "/v1/me/player/pause" => s.playing = false,
                "/v1/me/player/shuffle" => s.shuffle = query.get("state").map(String::as_str) == Some("true"),
                "/v1/me/player/volume" => {
                    if let Some(v) = query.get("volume_percent").and_then(|v| v.parse().ok()) {
                        s.volume = v;
                    }
                }
                "/v1/me/player/seek" => {
                    if let Some(v) = query.get("position_ms").and_then(|v| v.parse().ok()) {
                        s.progress_ms = v;
                    }
                }
                _ => {}
            }
            StatusCode::NO_CONTENT.into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
