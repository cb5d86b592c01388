//! Shared state cells.
//!
//! Each cell is a cheap `Clone` handle over one `Arc<RwLock<_>>`. Anyone may
//! read any cell; writes are `pub(crate)` and confined to a single owner:
//!
//! | cell | writer |
//! |---|---|
//! | [`SessionCell`] | [`crate::SessionManager`] |
//! | [`SnapshotCell`] | [`crate::Poller`] |
//! | [`StatusCell`] | [`crate::Dispatcher`] (pending flag), poller and dispatcher (message) |

use std::sync::Arc;

use spotdeck_proto::model::{CommandState, DeviceSummary, PlaybackSnapshot, StatusMessage};
use tokio::sync::RwLock;

use crate::session::Session;

#[derive(Clone, Default)]
pub struct SessionCell {
    inner: Arc<RwLock<Arc<Session>>>,
}

impl SessionCell {
    pub async fn get(&self) -> Arc<Session> {
        Arc::clone(&*self.inner.read().await)
    }

    /// Swap in a new session unless `keep` says the current one must stay.
    /// Returns whether the swap happened.
    pub(crate) async fn replace_unless<F>(&self, next: Session, keep: F) -> bool
    where
        F: FnOnce(&Session) -> bool,
    {
        let mut guard = self.inner.write().await;
        if keep(&**guard) {
            return false;
        }
        *guard = Arc::new(next);
        true
    }

    pub(crate) async fn replace(&self, next: Session) -> Arc<Session> {
        let next = Arc::new(next);
        *self.inner.write().await = Arc::clone(&next);
        next
    }
}

/// What the poller last learned about remote playback.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub snapshot: Option<PlaybackSnapshot>,
    pub devices: Vec<DeviceSummary>,
    /// Incremented every time `snapshot` is replaced.
    pub rev: u64,
    /// Sequence number of the poll that produced `snapshot`.
    applied_seq: u64,
    devices_seq: u64,
}

#[derive(Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<RwLock<PlaybackState>>,
}

impl SnapshotCell {
    pub async fn get(&self) -> PlaybackState {
        self.inner.read().await.clone()
    }

    pub async fn snapshot(&self) -> Option<PlaybackSnapshot> {
        self.inner.read().await.snapshot.clone()
    }

    pub async fn is_playing(&self) -> bool {
        self.inner
            .read()
            .await
            .snapshot
            .as_ref()
            .map(|s| s.is_playing)
            .unwrap_or(false)
    }

    pub async fn rev(&self) -> u64 {
        self.inner.read().await.rev
    }

    /// True when a poll newer than `seq` has already been applied.
    pub(crate) async fn is_stale(&self, seq: u64) -> bool {
        self.inner.read().await.applied_seq > seq
    }

    /// Replace the snapshot wholesale with the result of poll `seq`.
    /// Returns `false` (and changes nothing) if a newer poll already landed.
    pub(crate) async fn replace(&self, seq: u64, snapshot: Option<PlaybackSnapshot>) -> bool {
        let mut state = self.inner.write().await;
        if seq < state.applied_seq {
            return false;
        }
        state.applied_seq = seq;
        state.snapshot = snapshot;
        state.rev += 1;
        true
    }

    pub(crate) async fn set_devices(&self, seq: u64, devices: Vec<DeviceSummary>) -> bool {
        let mut state = self.inner.write().await;
        if seq < state.devices_seq {
            return false;
        }
        state.devices_seq = seq;
        state.devices = devices;
        true
    }
}

#[derive(Clone, Default)]
pub struct StatusCell {
    inner: Arc<RwLock<CommandState>>,
}

impl StatusCell {
    pub async fn get(&self) -> CommandState {
        self.inner.read().await.clone()
    }

    pub async fn is_pending(&self) -> bool {
        self.inner.read().await.pending
    }

    pub(crate) async fn publish(&self, message: StatusMessage) {
        self.inner.write().await.last_message = Some(message);
    }

    /// Publish `message` unless the current one is a failure.
    pub(crate) async fn publish_unless_failure(&self, message: StatusMessage) -> bool {
        let mut state = self.inner.write().await;
        if state.last_is_failure() {
            return false;
        }
        state.last_message = Some(message);
        true
    }

    /// Clear the message if it is exactly `text`.
    pub(crate) async fn clear_if(&self, text: &str) {
        let mut state = self.inner.write().await;
        if state.last_message.as_ref().map(|m| m.text.as_str()) == Some(text) {
            state.last_message = None;
        }
    }

    /// Claim the in-flight slot. Returns `false` if a command is already
    /// pending, in which case nothing changes.
    pub(crate) async fn try_begin(&self, message: StatusMessage) -> bool {
        let mut state = self.inner.write().await;
        if state.pending {
            return false;
        }
        state.pending = true;
        state.last_message = Some(message);
        true
    }

    pub(crate) async fn finish(&self) {
        self.inner.write().await.pending = false;
    }
}
