//! Playback state synchronisation and control.
//!
//! [`Engine`] wires the pieces together: the [`SessionManager`] owns the
//! bearer token, the [`Poller`] owns the playback snapshot, the
//! [`Dispatcher`] turns user intents into remote commands behind the
//! [`AuthGate`], and the [`InteractionTracker`] shadows dragged controls so a
//! poll never yanks a slider out from under the user.

pub mod api;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod gate;
pub mod interaction;
pub mod poller;
pub mod session;
pub mod state;

pub use api::WebApi;
pub use dispatcher::Dispatcher;
pub use engine::{Engine, RenderedView};
pub use error::{ApiError, CommandError};
pub use gate::AuthGate;
pub use interaction::{InteractionState, InteractionTracker};
pub use poller::{PollOutcome, Poller};
pub use session::{Session, SessionManager};
pub use state::{PlaybackState, SessionCell, SnapshotCell, StatusCell};
