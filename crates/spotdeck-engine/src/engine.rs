use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use spotdeck_proto::config::Config;
use spotdeck_proto::model::{
    Command, CommandState, Control, DeviceSummary, PlaybackSnapshot, SessionStatus, StatusMessage,
};
use tokio::sync::RwLock;
use tracing::info;

use crate::api::WebApi;
use crate::dispatcher::Dispatcher;
use crate::error::{ApiError, CommandError};
use crate::gate::AuthGate;
use crate::interaction::InteractionTracker;
use crate::poller::Poller;
use crate::session::{Session, SessionManager};
use crate::state::{SessionCell, SnapshotCell, StatusCell};

/// Everything a front end needs to draw one frame.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedView {
    pub snapshot: Option<PlaybackSnapshot>,
    /// Position to draw: the dragged value while dragging, else the snapshot's.
    pub position_ms: u64,
    pub volume_percent: u64,
    pub dragging_position: bool,
    pub dragging_volume: bool,
    pub devices: Vec<DeviceSummary>,
    pub command: CommandState,
    pub session_status: SessionStatus,
    pub session_message: Option<String>,
    pub authenticated: bool,
    pub gate_active: bool,
    pub polling: bool,
    pub rev: u64,
}

/// Owns the shared cells and the components built on them.
#[derive(Clone)]
pub struct Engine {
    session: SessionManager,
    playback: SnapshotCell,
    status: StatusCell,
    poller: Poller,
    dispatcher: Dispatcher,
    gate: AuthGate,
    tracker: Arc<RwLock<InteractionTracker>>,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let api = Arc::new(WebApi::new(&config.api)?);
        let session = SessionManager::new(
            api.clone(),
            config.session.token_source(),
            SessionCell::default(),
        );
        let playback = SnapshotCell::default();
        let status = StatusCell::default();
        let poller = Poller::new(
            api.clone(),
            session.clone(),
            playback.clone(),
            status.clone(),
            Duration::from_millis(config.poll.interval_ms.max(1)),
        );
        let gate = AuthGate::new(config.gate.shared_secret.clone());
        let dispatcher = Dispatcher::new(
            api,
            session.clone(),
            gate.clone(),
            playback.clone(),
            status.clone(),
            poller.clone(),
        );

        Ok(Self {
            session,
            playback,
            status,
            poller,
            dispatcher,
            gate,
            tracker: Arc::new(RwLock::new(InteractionTracker::new())),
        })
    }

    /// Acquire a token and, if that worked, start polling.
    pub async fn start(&self) -> Arc<Session> {
        info!("engine: starting");
        self.acquire_session().await
    }

    /// Manual re-acquisition. Restarts polling on success.
    pub async fn acquire_session(&self) -> Arc<Session> {
        let session = self.session.acquire().await;
        if session.status == SessionStatus::Valid {
            self.poller.start();
        }
        session
    }

    pub fn shutdown(&self) {
        info!("engine: shutting down");
        self.poller.stop();
    }

    pub fn authenticate(&self, secret: &str) -> bool {
        self.gate.check(secret)
    }

    pub fn sign_out(&self) {
        self.gate.reset();
    }

    pub async fn send(&self, cmd: Command) -> Result<StatusMessage, CommandError> {
        self.dispatcher.send(cmd).await
    }

    pub async fn toggle_playback(&self) -> Result<StatusMessage, CommandError> {
        self.dispatcher.toggle_playback().await
    }

    /// Returns the value now shown for `control`.
    pub async fn drag_start(&self, control: Control) -> u64 {
        let state = self.playback.get().await;
        let mut tracker = self.tracker.write().await;
        tracker.drag_start(control, state.snapshot.as_ref(), state.rev);
        tracker.rendered(control, state.snapshot.as_ref(), state.rev)
    }

    pub async fn drag_update(&self, control: Control, value: u64) -> u64 {
        let snapshot = self.playback.snapshot().await;
        self.tracker
            .write()
            .await
            .drag_update(control, value, snapshot.as_ref())
    }

    /// End the gesture and send the resulting seek or volume command. If
    /// the command is rejected the control falls back to the snapshot.
    pub async fn drag_commit(&self, control: Control, value: u64) -> Result<StatusMessage, CommandError> {
        let state = self.playback.get().await;
        let cmd = self
            .tracker
            .write()
            .await
            .drag_commit(control, value, state.snapshot.as_ref(), state.rev);

        let result = self.dispatcher.send(cmd).await;
        if result.is_err() {
            self.tracker.write().await.drag_cancel(control);
        }
        result
    }

    pub async fn drag_cancel(&self, control: Control) {
        self.tracker.write().await.drag_cancel(control);
    }

    pub async fn view(&self) -> RenderedView {
        let state = self.playback.get().await;
        let session = self.session.session().await;
        let command = self.status.get().await;

        let mut tracker = self.tracker.write().await;
        tracker.settle(state.rev);
        let snapshot = state.snapshot.as_ref();

        RenderedView {
            position_ms: tracker.rendered(Control::Position, snapshot, state.rev),
            volume_percent: tracker.rendered(Control::Volume, snapshot, state.rev),
            dragging_position: tracker.is_dragging(Control::Position),
            dragging_volume: tracker.is_dragging(Control::Volume),
            snapshot: state.snapshot.clone(),
            devices: state.devices,
            command,
            session_status: session.status,
            session_message: session.message.clone(),
            authenticated: self.gate.is_authenticated(),
            gate_active: self.gate.is_active(),
            polling: self.poller.is_running(),
            rev: state.rev,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn playback(&self) -> &SnapshotCell {
        &self.playback
    }

    pub fn status(&self) -> &StatusCell {
        &self.status
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }
}
