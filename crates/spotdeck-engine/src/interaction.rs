//! Local shadowing of controls the user is dragging.
//!
//! While a slider is held, polls keep landing with the server's idea of the
//! position or volume. Rendering those would make the thumb jump under the
//! user's finger, so the tracker keeps its own value until the gesture ends.
//!
//! # States
//! ```text
//!  Idle                       render the snapshot value
//!  Dragging { local }         render `local`, whatever the polls say
//!  Committed { value, rev }   render `value` until the snapshot revision moves past `rev`
//! ```
//!
//! Everything here is synchronous and never touches the network. A commit
//! hands back the [`Command`] the caller must dispatch.

use spotdeck_proto::model::{Command, Control, PlaybackSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Dragging {
        local: u64,
    },
    Committed {
        value: u64,
        at_rev: u64,
    },
}

impl InteractionState {
    pub fn is_dragging(&self) -> bool {
        matches!(self, Self::Dragging { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct InteractionTracker {
    position: InteractionState,
    volume: InteractionState,
}

impl InteractionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, control: Control) -> InteractionState {
        match control {
            Control::Position => self.position,
            Control::Volume => self.volume,
        }
    }

    fn slot(&mut self, control: Control) -> &mut InteractionState {
        match control {
            Control::Position => &mut self.position,
            Control::Volume => &mut self.volume,
        }
    }

    pub fn is_dragging(&self, control: Control) -> bool {
        self.state(control).is_dragging()
    }

    /// Begin a drag, seeding the local value from what is on screen now.
    pub fn drag_start(&mut self, control: Control, snapshot: Option<&PlaybackSnapshot>, rev: u64) {
        let local = self.rendered(control, snapshot, rev);
        *self.slot(control) = InteractionState::Dragging { local };
    }

    /// Move the thumb. An update without a prior start starts the drag.
    /// Returns the clamped value now shown.
    pub fn drag_update(&mut self, control: Control, value: u64, snapshot: Option<&PlaybackSnapshot>) -> u64 {
        let local = clamp(control, value, snapshot);
        *self.slot(control) = InteractionState::Dragging { local };
        local
    }

    /// Release the thumb at `value`. The value stays on screen until the
    /// snapshot revision moves past `rev`. Returns the command to send.
    pub fn drag_commit(
        &mut self,
        control: Control,
        value: u64,
        snapshot: Option<&PlaybackSnapshot>,
        rev: u64,
    ) -> Command {
        let value = clamp(control, value, snapshot);
        *self.slot(control) = InteractionState::Committed { value, at_rev: rev };
        Command::for_control(control, value)
    }

    /// Abandon a drag without sending anything.
    pub fn drag_cancel(&mut self, control: Control) {
        *self.slot(control) = InteractionState::Idle;
    }

    /// The value to render for `control` given the latest snapshot.
    pub fn rendered(&self, control: Control, snapshot: Option<&PlaybackSnapshot>, rev: u64) -> u64 {
        match self.state(control) {
            InteractionState::Dragging { local } => local,
            InteractionState::Committed { value, at_rev } if at_rev == rev => value,
            _ => snapshot.and_then(|s| s.control_value(control)).unwrap_or(0),
        }
    }

    /// Drop committed values a newer snapshot has superseded.
    pub fn settle(&mut self, rev: u64) {
        for slot in [&mut self.position, &mut self.volume] {
            if let InteractionState::Committed { at_rev, .. } = *slot {
                if at_rev != rev {
                    *slot = InteractionState::Idle;
                }
            }
        }
    }
}

fn clamp(control: Control, value: u64, snapshot: Option<&PlaybackSnapshot>) -> u64 {
    match control {
        Control::Volume => value.min(100),
        Control::Position => match snapshot.map(|s| s.duration_ms) {
            Some(duration) if duration > 0 => value.min(duration),
            _ => value,
        },
    }
}
