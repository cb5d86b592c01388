use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Repeat mode as reported and accepted by the Web API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatState {
    #[default]
    Off,
    Context,
    Track,
}

impl RepeatState {
    /// Value used in the `state` query parameter of the repeat endpoint.
    pub fn as_query(&self) -> &'static str {
        match self {
            RepeatState::Off => "off",
            RepeatState::Context => "context",
            RepeatState::Track => "track",
        }
    }
}

impl FromStr for RepeatState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatState::Off),
            "context" => Ok(RepeatState::Context),
            "track" => Ok(RepeatState::Track),
            other => Err(format!("unknown repeat state '{}'", other)),
        }
    }
}

/// Which of the two documented response shapes a snapshot was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// `/me/player/currently-playing`: track and progress only.
    CurrentlyPlaying,
    /// `/me/player`: also carries device, volume, shuffle and repeat.
    Player,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    pub url: Option<String>,
}

/// The device a snapshot reports as the playback target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    pub name: String,
    pub volume_percent: Option<u8>,
    pub supports_volume: bool,
}

/// Authoritative remote playback state at one point in time.
///
/// Always replaced as a whole by the poller, never merged with the previous
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub track_id: Option<String>,
    pub track_name: String,
    /// Display title, see [`crate::wire::shorten_track_name`].
    pub shortened_name: String,
    pub track_url: Option<String>,
    pub album_name: Option<String>,
    pub album_art_url: Option<String>,
    pub artists: Vec<Artist>,
    pub shuffle_state: bool,
    pub repeat_state: RepeatState,
    pub device: Option<Device>,
    pub shape: ResponseShape,
}

impl PlaybackSnapshot {
    /// Remote value of a draggable control, if the snapshot carries it.
    pub fn control_value(&self, control: Control) -> Option<u64> {
        match control {
            Control::Position => Some(self.progress_ms),
            Control::Volume => self
                .device
                .as_ref()
                .and_then(|d| d.volume_percent)
                .map(u64::from),
        }
    }

    /// Comma-joined artist names.
    pub fn artist_line(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One entry of the device-selection list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: Option<String>,
    pub name: String,
    pub is_active: bool,
    pub kind: Option<String>,
    pub volume_percent: Option<u8>,
}

/// Lifecycle of the bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Unauthenticated,
    Acquiring,
    Valid,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Info,
    Progress,
    Success,
    Failure,
}

/// The user-facing status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self { kind: StatusKind::Info, text: text.into() }
    }

    pub fn progress(text: impl Into<String>) -> Self {
        Self { kind: StatusKind::Progress, text: text.into() }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self { kind: StatusKind::Success, text: text.into() }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self { kind: StatusKind::Failure, text: text.into() }
    }

    pub fn is_failure(&self) -> bool {
        self.kind == StatusKind::Failure
    }
}

/// Shared in-flight flag and status line for mutating commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandState {
    pub pending: bool,
    pub last_message: Option<StatusMessage>,
}

impl CommandState {
    pub fn last_is_failure(&self) -> bool {
        self.last_message
            .as_ref()
            .map(StatusMessage::is_failure)
            .unwrap_or(false)
    }
}

/// Controls with continuous drag input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Position,
    Volume,
}

impl FromStr for Control {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "position" | "seek" => Ok(Control::Position),
            "volume" => Ok(Control::Volume),
            other => Err(format!("unknown control '{}'", other)),
        }
    }
}

/// A mutating request against the remote player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Play,
    Pause,
    Next,
    Previous,
    Seek { position_ms: u64 },
    SetVolume { percent: u8 },
    SetShuffle { state: bool },
    SetRepeat { state: RepeatState },
    SetDevice { device_id: String, play: bool },
}

impl Command {
    /// Short name used in status messages and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Next => "next",
            Command::Previous => "previous",
            Command::Seek { .. } => "seek",
            Command::SetVolume { .. } => "volume",
            Command::SetShuffle { .. } => "shuffle",
            Command::SetRepeat { .. } => "repeat",
            Command::SetDevice { .. } => "transfer",
        }
    }

    /// The command a drag commit on `control` turns into.
    pub fn for_control(control: Control, value: u64) -> Self {
        match control {
            Control::Position => Command::Seek { position_ms: value },
            Control::Volume => Command::SetVolume {
                percent: value.min(100) as u8,
            },
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Seek { position_ms } => write!(f, "seek to {}ms", position_ms),
            Command::SetVolume { percent } => write!(f, "volume {}%", percent),
            Command::SetShuffle { state } => write!(f, "shuffle {}", if *state { "on" } else { "off" }),
            Command::SetRepeat { state } => write!(f, "repeat {}", state.as_query()),
            Command::SetDevice { device_id, .. } => write!(f, "transfer to {}", device_id),
            other => f.write_str(other.label()),
        }
    }
}
