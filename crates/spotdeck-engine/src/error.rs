use reqwest::StatusCode;
use spotdeck_proto::wire::{ParseError, UpstreamError};

/// Reason code the Web API attaches to transport commands without a target.
pub const NO_ACTIVE_DEVICE_REASON: &str = "NO_ACTIVE_DEVICE";

/// Failure of a single outbound call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{status} - {}", describe(.status, .upstream))]
    Status { status: u16, upstream: UpstreamError },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

fn describe(status: &u16, upstream: &UpstreamError) -> String {
    upstream
        .message
        .clone()
        .or_else(|| {
            StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown error".to_string())
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Parse(_) => None,
        }
    }

    /// 401: the token was rejected and must be re-acquired.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// The command had no device to act on. Recognised by the reason code,
    /// or by a 404 whose message names the active device. Any other 404
    /// (an unknown device id, say) keeps its own message.
    pub fn is_no_active_device(&self) -> bool {
        let ApiError::Status { status, upstream } = self else {
            return false;
        };
        if upstream.reason.as_deref() == Some(NO_ACTIVE_DEVICE_REASON) {
            return true;
        }
        *status == 404
            && upstream
                .message
                .as_deref()
                .map(|m| m.to_ascii_lowercase().contains("active device"))
                .unwrap_or(false)
    }
}

/// Why a command did not take effect. `Display` is the user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Not authenticated. Enter the shared secret to control playback.")]
    NotAuthenticated,
    #[error("Access token is not available. Cannot send command.")]
    NotReady,
    #[error("Another command is still in progress.")]
    Busy,
    #[error("Failed to send command \"{command}\": no active device. Start playback on a device first.")]
    NoActiveDevice { command: &'static str },
    #[error("Failed to send command \"{command}\": {source}")]
    Upstream {
        command: &'static str,
        #[source]
        source: ApiError,
    },
}

impl CommandError {
    /// Rejected locally, before any request left the process.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            CommandError::NotAuthenticated | CommandError::NotReady | CommandError::Busy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, message: Option<&str>, reason: Option<&str>) -> ApiError {
        ApiError::Status {
            status,
            upstream: UpstreamError {
                message: message.map(str::to_string),
                reason: reason.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_status_display_prefers_upstream_text() {
        let err = status(401, Some("The access token expired"), None);
        assert_eq!(err.to_string(), "401 - The access token expired");
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_status_display_falls_back_to_reason_phrase() {
        assert_eq!(status(503, None, None).to_string(), "503 - Service Unavailable");
    }

    #[test]
    fn test_no_active_device_classification() {
        assert!(status(404, Some("Player command failed: No active device found"), None)
            .is_no_active_device());
        assert!(!status(404, None, None).is_no_active_device());
        assert!(!status(404, Some("Device not found"), None).is_no_active_device());
        assert!(status(403, Some("Player command failed"), Some("NO_ACTIVE_DEVICE")).is_no_active_device());
        assert!(!status(403, Some("Restriction violated"), Some("UNKNOWN")).is_no_active_device());
    }

    #[test]
    fn test_local_rejections() {
        assert!(CommandError::Busy.is_local());
        assert!(!CommandError::NoActiveDevice { command: "next" }.is_local());
    }
}
