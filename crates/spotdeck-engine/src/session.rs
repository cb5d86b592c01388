//! Bearer-token lifecycle.
//!
//! ```text
//!  Unauthenticated ──acquire──▶ Acquiring ──▶ Valid
//!                                    └──────▶ Failed
//!  Valid ──expiry / 401──▶ Unauthenticated
//! ```
//!
//! Expiry and a 401 on a token that had worked before each trigger one
//! automatic `acquire()` (see [`crate::poller::Poller::spawn_reacquire`]).
//! `Failed` is sticky: after that, a fresh `acquire()` has to be requested
//! from outside.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use spotdeck_proto::config::{ConfigError, TokenSource};
use spotdeck_proto::model::SessionStatus;
use tracing::{info, warn};

use crate::api::WebApi;
use crate::state::SessionCell;

/// Tokens are treated as expired this long before the reported deadline.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Immutable view of the credential. Replaced as a whole, never edited.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub token: Option<String>,
    pub status: SessionStatus,
    pub message: Option<String>,
    pub expires_at: Option<Instant>,
}

impl Session {
    fn acquiring() -> Self {
        Self {
            status: SessionStatus::Acquiring,
            message: Some("Obtaining access token...".to_string()),
            ..Self::default()
        }
    }

    fn valid(token: String, expires_in_secs: Option<u64>) -> Self {
        Self {
            token: Some(token),
            status: SessionStatus::Valid,
            message: Some("Access token obtained successfully.".to_string()),
            // A deadline past what `Instant` can hold means no expiry.
            expires_at: expires_in_secs.and_then(|secs| {
                let lifetime = Duration::from_secs(secs).saturating_sub(EXPIRY_MARGIN);
                Instant::now().checked_add(lifetime)
            }),
        }
    }

    fn failed(message: String) -> Self {
        Self {
            status: SessionStatus::Failed,
            message: Some(message),
            ..Self::default()
        }
    }

    fn unauthenticated(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// Result of looking up the token for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenState {
    Usable(String),
    /// The token just ran out. Only the caller that retired it sees this.
    Expired,
    Missing,
}

#[derive(Clone)]
pub struct SessionManager {
    api: Arc<WebApi>,
    source: Result<TokenSource, ConfigError>,
    cell: SessionCell,
    /// Set once the current token has served a successful call.
    token_proven: Arc<AtomicBool>,
}

impl SessionManager {
    pub fn new(api: Arc<WebApi>, source: Result<TokenSource, ConfigError>, cell: SessionCell) -> Self {
        Self {
            api,
            source,
            cell,
            token_proven: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cell(&self) -> &SessionCell {
        &self.cell
    }

    pub async fn session(&self) -> Arc<Session> {
        self.cell.get().await
    }

    /// Obtain a fresh token. Failure is recorded in the session, never
    /// returned as an error. A call made while another acquisition is in
    /// progress returns immediately.
    pub async fn acquire(&self) -> Arc<Session> {
        let claimed = self
            .cell
            .replace_unless(Session::acquiring(), |s| s.status == SessionStatus::Acquiring)
            .await;
        if !claimed {
            return self.cell.get().await;
        }

        let next = match &self.source {
            Err(e) => Session::failed(format!("Failed to obtain access token: {}", e)),
            Ok(source) => match self.api.fetch_token(source).await {
                Ok(grant) => {
                    info!("session: access token obtained");
                    Session::valid(grant.access_token, grant.expires_in_secs)
                }
                Err(e) => {
                    warn!("session: token request failed: {}", e);
                    Session::failed(format!("Failed to obtain access token: {}", e))
                }
            },
        };

        self.token_proven.store(false, Ordering::SeqCst);
        self.cell.replace(next).await
    }

    /// The current token, or `None` if there is no usable one. An expired
    /// token moves the session back to `Unauthenticated`.
    pub async fn get_token(&self) -> Option<String> {
        match self.token_state().await {
            TokenState::Usable(token) => Some(token),
            TokenState::Expired | TokenState::Missing => None,
        }
    }

    /// Like [`get_token`](Self::get_token), but tells the caller that
    /// retired an expired token so it can re-acquire.
    pub(crate) async fn token_state(&self) -> TokenState {
        let session = self.cell.get().await;
        if session.status != SessionStatus::Valid {
            return TokenState::Missing;
        }
        let Some(token) = session.token.clone() else {
            return TokenState::Missing;
        };
        if !session.is_expired() {
            return TokenState::Usable(token);
        }
        let retired = self
            .cell
            .replace_unless(Session::unauthenticated("Access token expired."), |s| {
                s.token.as_deref() != Some(token.as_str())
            })
            .await;
        if !retired {
            return TokenState::Missing;
        }
        info!("session: access token expired");
        self.token_proven.store(false, Ordering::SeqCst);
        TokenState::Expired
    }

    /// Record that `token` just served a successful call.
    pub fn mark_token_used(&self) {
        self.token_proven.store(true, Ordering::SeqCst);
    }

    /// Drop `token` after the API rejected it with a 401.
    ///
    /// Returns `true` if a single automatic re-acquisition is warranted:
    /// the token was still current and had worked before. A token rejected
    /// on first use is not retried.
    pub async fn invalidate(&self, token: &str) -> bool {
        let replaced = self
            .cell
            .replace_unless(
                Session::unauthenticated("Access token was rejected."),
                |s| s.token.as_deref() != Some(token),
            )
            .await;
        if !replaced {
            return false;
        }
        let proven = self.token_proven.swap(false, Ordering::SeqCst);
        warn!("session: token rejected (previously used: {})", proven);
        proven
    }
}
