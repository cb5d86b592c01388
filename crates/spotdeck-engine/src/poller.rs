//! Periodic playback query.
//!
//! The poller is the only writer of the [`SnapshotCell`]. Two paths reach the
//! network:
//!
//! * the timer task calls [`Poller::tick`], which is skipped while another
//!   poll is still outstanding, so timer polls never overlap;
//! * commands call [`Poller::refresh`], which always issues a request.
//!
//! Every poll takes a sequence number before it suspends. The cell applies a
//! result only if no higher-numbered poll has landed first, so an older
//! response can never overwrite a newer snapshot.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use spotdeck_proto::model::{SessionStatus, StatusMessage};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::WebApi;
use crate::session::{SessionManager, TokenState};
use crate::state::{SnapshotCell, StatusCell};

pub const NOTHING_PLAYING: &str = "No song is currently playing.";
pub const NO_TOKEN: &str = "Access token is not available. Please obtain it first.";

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Timer tick dropped because a poll was already in flight.
    Skipped,
    /// No token: timer halted and snapshot cleared.
    NoToken,
    NothingPlaying,
    Updated,
    /// A newer poll landed first; this result was discarded.
    Stale,
    /// Upstream or transport failure: timer halted, snapshot kept.
    Failed(String),
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Inner {
    api: Arc<WebApi>,
    session: SessionManager,
    playback: SnapshotCell,
    status: StatusCell,
    interval: Duration,
    timer: Mutex<Option<CancellationToken>>,
    in_flight: AtomicUsize,
    seq: AtomicU64,
}

#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

impl Poller {
    pub fn new(
        api: Arc<WebApi>,
        session: SessionManager,
        playback: SnapshotCell,
        status: StatusCell,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                session,
                playback,
                status,
                interval,
                timer: Mutex::new(None),
                in_flight: AtomicUsize::new(0),
                seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start the repeating timer with the configured interval. The first
    /// tick fires immediately. A running timer is replaced.
    pub fn start(&self) {
        self.start_with(self.inner.interval);
    }

    pub fn start_with(&self, interval: Duration) {
        let token = CancellationToken::new();
        let previous = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        info!("poller: started ({}ms)", interval.as_millis());
        let poller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        poller.tick().await;
                    }
                }
            }
            debug!("poller: timer task exited");
        });
    }

    /// Halt the timer. Idempotent; returns whether a timer was running.
    /// Requests already in flight are not aborted.
    pub fn stop(&self) -> bool {
        let token = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match token {
            Some(token) => {
                token.cancel();
                info!("poller: stopped");
                true
            }
            None => false,
        }
    }

    /// Timer entry point. Skipped while another poll is outstanding.
    pub async fn tick(&self) -> PollOutcome {
        let claimed = self
            .inner
            .in_flight
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if !claimed {
            debug!("poller: previous poll still in flight, skipping tick");
            return PollOutcome::Skipped;
        }
        let _guard = InFlight(&self.inner.in_flight);
        self.poll().await
    }

    /// Out-of-band poll after a command. Always issues a request.
    pub async fn refresh(&self) -> PollOutcome {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(&self.inner.in_flight);
        self.poll().await
    }

    async fn poll(&self) -> PollOutcome {
        let inner = &self.inner;
        let seq = inner.seq.fetch_add(1, Ordering::SeqCst) + 1;

        let token = match inner.session.token_state().await {
            TokenState::Usable(token) => token,
            state => {
                self.stop();
                inner.playback.replace(seq, None).await;
                inner.status.publish_unless_failure(StatusMessage::info(NO_TOKEN)).await;
                if state == TokenState::Expired {
                    self.spawn_reacquire();
                }
                return PollOutcome::NoToken;
            }
        };

        let (playback, devices) = tokio::join!(
            inner.api.playback(&token),
            inner.api.devices(&token)
        );

        match devices {
            Ok(devices) => {
                inner.playback.set_devices(seq, devices).await;
            }
            Err(e) => debug!("poller: device list ignored: {}", e),
        }

        match playback {
            Ok(None) => {
                inner.session.mark_token_used();
                if !inner.playback.replace(seq, None).await {
                    return PollOutcome::Stale;
                }
                inner
                    .status
                    .publish_unless_failure(StatusMessage::info(NOTHING_PLAYING))
                    .await;
                PollOutcome::NothingPlaying
            }
            Ok(Some(snapshot)) => {
                inner.session.mark_token_used();
                debug!(
                    "poller: {} '{}' {}ms",
                    if snapshot.is_playing { "playing" } else { "paused" },
                    snapshot.track_name,
                    snapshot.progress_ms
                );
                if !inner.playback.replace(seq, Some(snapshot)).await {
                    return PollOutcome::Stale;
                }
                inner.status.clear_if(NOTHING_PLAYING).await;
                inner.status.clear_if(NO_TOKEN).await;
                PollOutcome::Updated
            }
            Err(e) => {
                if inner.playback.is_stale(seq).await {
                    return PollOutcome::Stale;
                }
                // Stale-but-visible beats blank: the snapshot stays as it was.
                self.stop();
                let message = format!(
                    "Failed to fetch current song: {}. Make sure your token is valid and a song is playing on an active device.",
                    e
                );
                warn!("poller: {}", e);
                inner.status.publish(StatusMessage::failure(message.clone())).await;
                if e.is_unauthorized() && inner.session.invalidate(&token).await {
                    self.spawn_reacquire();
                }
                PollOutcome::Failed(message)
            }
        }
    }

    /// Re-acquire the token once in the background and resume polling if
    /// that worked. Used after expiry and after a 401 on a proven token.
    pub(crate) fn spawn_reacquire(&self) {
        let poller = self.clone();
        tokio::spawn(async move {
            let session = poller.inner.session.acquire().await;
            if session.status == SessionStatus::Valid {
                info!("poller: token re-acquired, resuming");
                poller.start();
            }
        });
    }
}
