//! Outbound commands.
//!
//! A command passes three local checks before anything touches the network:
//! the gate, the token, and the single in-flight slot in the [`StatusCell`].
//! Once the request resolves, success or not, the poller is asked for an
//! immediate refresh and the slot is released only after that refresh lands.
//!
//! Unlike a failed poll, a failed command leaves the poll timer running.

use std::sync::Arc;

use spotdeck_proto::model::{Command, StatusMessage};
use tracing::{debug, info, warn};

use crate::api::WebApi;
use crate::error::CommandError;
use crate::gate::AuthGate;
use crate::poller::Poller;
use crate::session::{SessionManager, TokenState};
use crate::state::{SnapshotCell, StatusCell};

#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<WebApi>,
    session: SessionManager,
    gate: AuthGate,
    playback: SnapshotCell,
    status: StatusCell,
    poller: Poller,
}

impl Dispatcher {
    pub fn new(
        api: Arc<WebApi>,
        session: SessionManager,
        gate: AuthGate,
        playback: SnapshotCell,
        status: StatusCell,
        poller: Poller,
    ) -> Self {
        Self {
            api,
            session,
            gate,
            playback,
            status,
            poller,
        }
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Pause if the latest snapshot says playing, otherwise play. The
    /// snapshot is read now, not when the gesture started.
    pub async fn toggle_playback(&self) -> Result<StatusMessage, CommandError> {
        let cmd = if self.playback.is_playing().await {
            Command::Pause
        } else {
            Command::Play
        };
        self.send(cmd).await
    }

    /// Send one command. The returned error's `Display` is also what gets
    /// published to the status cell, except for `Busy`, which leaves the
    /// running command's message in place.
    pub async fn send(&self, cmd: Command) -> Result<StatusMessage, CommandError> {
        if !self.gate.is_authenticated() {
            debug!("dispatcher: {} rejected by gate", cmd);
            return self.reject(CommandError::NotAuthenticated).await;
        }

        let token = match self.session.token_state().await {
            TokenState::Usable(token) => token,
            state => {
                debug!("dispatcher: {} rejected, no token", cmd);
                if state == TokenState::Expired {
                    self.poller.spawn_reacquire();
                }
                return self.reject(CommandError::NotReady).await;
            }
        };

        let label = cmd.label();
        let claimed = self
            .status
            .try_begin(StatusMessage::progress(format!(
                "Sending {} to Spotify player...",
                label
            )))
            .await;
        if !claimed {
            debug!("dispatcher: {} rejected, another command pending", cmd);
            return Err(CommandError::Busy);
        }

        info!("dispatcher: sending {}", cmd);
        let result = match self.api.send(&token, &cmd).await {
            Ok(()) => {
                self.session.mark_token_used();
                Ok(StatusMessage::success(format!(
                    "Command \"{}\" sent successfully!",
                    label
                )))
            }
            Err(e) => {
                warn!("dispatcher: {} failed: {}", cmd, e);
                if e.is_unauthorized() && self.session.invalidate(&token).await {
                    self.poller.spawn_reacquire();
                }
                if e.is_no_active_device() {
                    Err(CommandError::NoActiveDevice { command: label })
                } else {
                    Err(CommandError::Upstream {
                        command: label,
                        source: e,
                    })
                }
            }
        };

        let message = match &result {
            Ok(message) => message.clone(),
            Err(e) => StatusMessage::failure(e.to_string()),
        };
        self.status.publish(message).await;

        self.poller.refresh().await;
        self.status.finish().await;
        result
    }

    async fn reject(&self, err: CommandError) -> Result<StatusMessage, CommandError> {
        self.status.publish(StatusMessage::failure(err.to_string())).await;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use spotdeck_proto::config::{ApiConfig, ConfigError};

    use crate::state::SessionCell;

    fn dispatcher(secret: Option<&str>) -> Dispatcher {
        let api = Arc::new(WebApi::new(&ApiConfig::default()).unwrap());
        let session = SessionManager::new(
            api.clone(),
            Err(ConfigError::MissingTokenUrl),
            SessionCell::default(),
        );
        let playback = SnapshotCell::default();
        let status = StatusCell::default();
        let poller = Poller::new(
            api.clone(),
            session.clone(),
            playback.clone(),
            status.clone(),
            Duration::from_secs(1),
        );
        Dispatcher::new(
            api,
            session,
            AuthGate::new(secret.map(str::to_string)),
            playback,
            status,
            poller,
        )
    }

    #[tokio::test]
    async fn test_gate_rejects_before_token_check() {
        let d = dispatcher(Some("secret"));
        let err = d.send(Command::Next).await.unwrap_err();
        assert!(matches!(err, CommandError::NotAuthenticated));

        let state = d.status.get().await;
        assert!(!state.pending);
        assert!(state.last_is_failure());
        assert!(state.last_message.unwrap().text.starts_with("Not authenticated"));
    }

    #[tokio::test]
    async fn test_no_token_is_not_ready() {
        let d = dispatcher(None);
        let err = d.send(Command::SetShuffle { state: true }).await.unwrap_err();
        assert!(matches!(err, CommandError::NotReady));
        assert!(!d.status.is_pending().await);
    }

    #[tokio::test]
    async fn test_toggle_without_token_stays_local() {
        let d = dispatcher(None);
        let err = d.toggle_playback().await.unwrap_err();
        assert!(err.is_local());
    }
}
