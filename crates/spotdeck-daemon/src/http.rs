use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use spotdeck_engine::{CommandError, Engine, RenderedView};
use spotdeck_proto::model::{Command, Control, RepeatState, SessionStatus, StatusMessage};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::logs::LogBuffer;

const NOT_PLAYING_TITLE: &str = "Currently Not Playing";

#[derive(Clone)]
struct HttpState {
    engine: Engine,
    logs: LogBuffer,
}

#[derive(Serialize)]
struct CommandReply {
    ok: bool,
    message: String,
}

#[derive(Serialize)]
struct DragReply {
    control: Control,
    value: u64,
}

#[derive(Serialize)]
struct AuthReply {
    authenticated: bool,
}

#[derive(Serialize)]
struct SessionReply {
    status: SessionStatus,
    message: Option<String>,
}

/// Compact card for embedding elsewhere.
#[derive(Serialize)]
struct NowPlaying {
    is_playing: bool,
    shortened_name: String,
    link: Option<String>,
    artist_names: Vec<String>,
    artist_links: Vec<Option<String>>,
    image: Option<String>,
    progress_ms: Option<u64>,
    duration_ms: Option<u64>,
}

#[derive(Deserialize)]
struct AuthRequest {
    secret: String,
}

#[derive(Deserialize)]
struct TransferParams {
    #[serde(default)]
    play: bool,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    engine: Engine,
    logs: LogBuffer,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(HttpState { engine, logs });

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/now-playing", get(now_playing))
        .route("/api/logs", get(get_logs))
        .route("/api/auth", post(authenticate).delete(sign_out))
        .route("/api/session/acquire", post(acquire_session))
        .route("/api/play", post(play))
        .route("/api/pause", post(pause))
        .route("/api/toggle", post(toggle))
        .route("/api/next", post(next))
        .route("/api/previous", post(previous))
        .route("/api/seek/:ms", post(seek))
        .route("/api/volume/:percent", post(set_volume))
        .route("/api/shuffle/:state", post(set_shuffle))
        .route("/api/repeat/:mode", post(set_repeat))
        .route("/api/device/:id", post(set_device))
        .route("/api/drag/:control/start", post(drag_start))
        .route("/api/drag/:control/update/:value", post(drag_update))
        .route("/api/drag/:control/commit/:value", post(drag_commit))
        .route("/api/drag/:control/cancel", post(drag_cancel))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn command_reply(result: Result<StatusMessage, CommandError>) -> Response {
    match result {
        Ok(message) => (
            StatusCode::OK,
            Json(CommandReply {
                ok: true,
                message: message.text,
            }),
        )
            .into_response(),
        Err(e) => {
            let status = match &e {
                CommandError::NotAuthenticated => StatusCode::FORBIDDEN,
                CommandError::Busy => StatusCode::CONFLICT,
                CommandError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
                CommandError::NoActiveDevice { .. } | CommandError::Upstream { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            };
            (
                status,
                Json(CommandReply {
                    ok: false,
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(CommandReply { ok: false, message }),
    )
        .into_response()
}

async fn get_state(State(state): State<HttpState>) -> Json<RenderedView> {
    Json(state.engine.view().await)
}

async fn now_playing(State(state): State<HttpState>) -> Json<NowPlaying> {
    let view = state.engine.view().await;
    let card = match view.snapshot {
        Some(s) => NowPlaying {
            is_playing: s.is_playing,
            link: s.track_url.clone(),
            artist_names: s.artists.iter().map(|a| a.name.clone()).collect(),
            artist_links: s.artists.iter().map(|a| a.url.clone()).collect(),
            image: s.album_art_url.clone(),
            progress_ms: Some(view.position_ms),
            duration_ms: Some(s.duration_ms),
            shortened_name: s.shortened_name,
        },
        None => NowPlaying {
            is_playing: false,
            shortened_name: if view.command.last_is_failure() {
                "Error".to_string()
            } else {
                NOT_PLAYING_TITLE.to_string()
            },
            link: None,
            artist_names: vec![],
            artist_links: vec![],
            image: None,
            progress_ms: None,
            duration_ms: None,
        },
    };
    Json(card)
}

async fn get_logs(State(state): State<HttpState>) -> Json<Vec<String>> {
    Json(state.logs.lines())
}

async fn authenticate(
    State(state): State<HttpState>,
    Json(req): Json<AuthRequest>,
) -> (StatusCode, Json<AuthReply>) {
    let authenticated = state.engine.authenticate(&req.secret);
    let status = if authenticated {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    };
    (status, Json(AuthReply { authenticated }))
}

async fn sign_out(State(state): State<HttpState>) -> Json<AuthReply> {
    state.engine.sign_out();
    Json(AuthReply {
        authenticated: state.engine.gate().is_authenticated(),
    })
}

async fn acquire_session(State(state): State<HttpState>) -> (StatusCode, Json<SessionReply>) {
    info!("HTTP API: acquire session");
    let session = state.engine.acquire_session().await;
    let status = match session.status {
        SessionStatus::Valid => StatusCode::OK,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(SessionReply {
            status: session.status,
            message: session.message.clone(),
        }),
    )
}

async fn play(State(state): State<HttpState>) -> Response {
    command_reply(state.engine.send(Command::Play).await)
}

async fn pause(State(state): State<HttpState>) -> Response {
    command_reply(state.engine.send(Command::Pause).await)
}

async fn toggle(State(state): State<HttpState>) -> Response {
    command_reply(state.engine.toggle_playback().await)
}

async fn next(State(state): State<HttpState>) -> Response {
    command_reply(state.engine.send(Command::Next).await)
}

async fn previous(State(state): State<HttpState>) -> Response {
    command_reply(state.engine.send(Command::Previous).await)
}

async fn seek(State(state): State<HttpState>, Path(ms): Path<u64>) -> Response {
    command_reply(state.engine.send(Command::Seek { position_ms: ms }).await)
}

async fn set_volume(State(state): State<HttpState>, Path(percent): Path<u8>) -> Response {
    let percent = percent.min(100);
    command_reply(state.engine.send(Command::SetVolume { percent }).await)
}

async fn set_shuffle(State(state): State<HttpState>, Path(shuffle): Path<bool>) -> Response {
    command_reply(
        state
            .engine
            .send(Command::SetShuffle { state: shuffle })
            .await,
    )
}

async fn set_repeat(State(state): State<HttpState>, Path(mode): Path<String>) -> Response {
    match RepeatState::from_str(&mode) {
        Ok(repeat) => command_reply(state.engine.send(Command::SetRepeat { state: repeat }).await),
        Err(e) => bad_request(e),
    }
}

async fn set_device(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Query(params): Query<TransferParams>,
) -> Response {
    let cmd = Command::SetDevice {
        device_id: id,
        play: params.play,
    };
    command_reply(state.engine.send(cmd).await)
}

fn parse_control(raw: &str) -> Result<Control, Response> {
    Control::from_str(raw).map_err(bad_request)
}

async fn drag_start(State(state): State<HttpState>, Path(control): Path<String>) -> Response {
    match parse_control(&control) {
        Ok(control) => {
            let value = state.engine.drag_start(control).await;
            Json(DragReply { control, value }).into_response()
        }
        Err(resp) => resp,
    }
}

async fn drag_update(
    State(state): State<HttpState>,
    Path((control, value)): Path<(String, u64)>,
) -> Response {
    match parse_control(&control) {
        Ok(control) => {
            let value = state.engine.drag_update(control, value).await;
            Json(DragReply { control, value }).into_response()
        }
        Err(resp) => resp,
    }
}

async fn drag_commit(
    State(state): State<HttpState>,
    Path((control, value)): Path<(String, u64)>,
) -> Response {
    match parse_control(&control) {
        Ok(control) => command_reply(state.engine.drag_commit(control, value).await),
        Err(resp) => resp,
    }
}

async fn drag_cancel(State(state): State<HttpState>, Path(control): Path<String>) -> Response {
    match parse_control(&control) {
        Ok(control) => {
            state.engine.drag_cancel(control).await;
            StatusCode::OK.into_response()
        }
        Err(resp) => resp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use spotdeck_proto::config::Config;
    use tower::ServiceExt;

    fn app(secret: Option<&str>) -> Router {
        let mut config = Config::default();
        config.gate.shared_secret = secret.map(str::to_string);
        let engine = Engine::new(&config).unwrap();
        router(HttpState {
            engine,
            logs: LogBuffer::default(),
        })
    }

    async fn call(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_gate_rejection_is_forbidden() {
        let (status, body) = call(app(Some("s3cret")), "POST", "/api/next", Body::empty()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["ok"], false);
        assert!(body["message"].as_str().unwrap().starts_with("Not authenticated"));
    }

    #[tokio::test]
    async fn test_command_without_token_is_unavailable() {
        let (status, _) = call(app(None), "POST", "/api/volume/30", Body::empty()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_auth_endpoint() {
        let app = app(Some("s3cret"));
        let (status, body) = call(
            app.clone(),
            "POST",
            "/api/auth",
            Body::from(r#"{"secret":"nope"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["authenticated"], false);

        let (status, _) = call(app, "POST", "/api/auth", Body::from(r#"{"secret":"s3cret"}"#)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_drag_routes() {
        let app = app(None);
        let (status, body) = call(app.clone(), "POST", "/api/drag/volume/update/150", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], 100);

        let (_, view) = call(app.clone(), "GET", "/api/state", Body::empty()).await;
        assert_eq!(view["dragging_volume"], true);
        assert_eq!(view["volume_percent"], 100);

        let (status, _) = call(app, "POST", "/api/drag/balance/start", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_now_playing_without_snapshot() {
        let (status, card) = call(app(None), "GET", "/api/now-playing", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(card["shortened_name"], NOT_PLAYING_TITLE);
        assert_eq!(card["is_playing"], false);
    }
}
