//! JSON shapes of the Web API and their normalisation into [`crate::model`].
//!
//! Playback responses come in two shapes. `/me/player/currently-playing`
//! carries the track and progress only; `/me/player` additionally carries the
//! device, shuffle and repeat state. Both go through [`parse_playback`], which
//! tags the result by checking which fields are present instead of trusting
//! the endpoint it was fetched from.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::model::{
    Artist, Device, DeviceSummary, PlaybackSnapshot, RepeatState, ResponseShape,
};

/// Display titles longer than this are shortened.
pub const SHORT_NAME_LIMIT: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response body is missing '{0}'")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct RawPlayback {
    #[serde(default)]
    is_playing: bool,
    progress_ms: Option<u64>,
    item: Option<RawItem>,
    device: Option<RawDevice>,
    shuffle_state: Option<bool>,
    repeat_state: Option<RepeatState>,
}

/// A track, or a podcast episode (which has `show`/`images` instead of
/// `album`/`artists`).
#[derive(Debug, Deserialize)]
struct RawItem {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    duration_ms: u64,
    external_urls: Option<RawExternalUrls>,
    album: Option<RawAlbum>,
    #[serde(default)]
    artists: Vec<RawArtist>,
    #[serde(default)]
    images: Vec<RawImage>,
    show: Option<RawShow>,
}

#[derive(Debug, Deserialize)]
struct RawExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAlbum {
    name: Option<String>,
    #[serde(default)]
    images: Vec<RawImage>,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    name: String,
    external_urls: Option<RawExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct RawShow {
    name: Option<String>,
    publisher: Option<String>,
    external_urls: Option<RawExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    is_active: bool,
    volume_percent: Option<u8>,
    supports_volume: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawDeviceList {
    #[serde(default)]
    devices: Vec<RawDevice>,
}

/// `error` is an object on Web API errors and a plain code string on
/// OAuth token endpoint errors.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawErrorField {
    Detail {
        message: Option<String>,
        reason: Option<String>,
    },
    Code(String),
}

#[derive(Debug, Deserialize)]
struct RawErrorBody {
    error: Option<RawErrorField>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Upstream error text extracted from a non-2xx body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamError {
    pub message: Option<String>,
    pub reason: Option<String>,
}

/// A token grant as returned by either token source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in_secs: Option<u64>,
}

/// Parse a 2xx playback body into a snapshot.
///
/// Returns `Ok(None)` when the body carries no item (e.g. between tracks or
/// during an ad), which the caller treats like "nothing playing".
pub fn parse_playback(body: &[u8]) -> Result<Option<PlaybackSnapshot>, ParseError> {
    let raw: RawPlayback = serde_json::from_slice(body)?;

    let Some(item) = raw.item else {
        return Ok(None);
    };

    let shape = if raw.device.is_some() {
        ResponseShape::Player
    } else {
        ResponseShape::CurrentlyPlaying
    };

    let track_name = item.name.ok_or(ParseError::MissingField("item.name"))?;

    let mut artists: Vec<Artist> = item
        .artists
        .into_iter()
        .map(|a| Artist {
            name: a.name,
            url: a.external_urls.and_then(|u| u.spotify),
        })
        .collect();

    let (album_name, album_art_url) = match (item.album, item.show) {
        (Some(album), _) => (album.name, album.images.into_iter().next().map(|i| i.url)),
        (None, Some(show)) => {
            if artists.is_empty() {
                if let Some(publisher) = show.publisher {
                    artists.push(Artist {
                        name: publisher,
                        url: show.external_urls.and_then(|u| u.spotify),
                    });
                }
            }
            (show.name, item.images.into_iter().next().map(|i| i.url))
        }
        (None, None) => (None, item.images.into_iter().next().map(|i| i.url)),
    };

    let device = raw.device.map(|d| Device {
        supports_volume: d.supports_volume.unwrap_or(d.volume_percent.is_some()),
        id: d.id,
        name: d.name,
        volume_percent: d.volume_percent,
    });

    Ok(Some(PlaybackSnapshot {
        is_playing: raw.is_playing,
        progress_ms: raw.progress_ms.unwrap_or(0),
        duration_ms: item.duration_ms,
        track_id: item.id,
        shortened_name: shorten_track_name(&track_name),
        track_name,
        track_url: item.external_urls.and_then(|u| u.spotify),
        album_name,
        album_art_url,
        artists,
        shuffle_state: raw.shuffle_state.unwrap_or(false),
        repeat_state: raw.repeat_state.unwrap_or_default(),
        device,
        shape,
    }))
}

/// Parse a `/me/player/devices` body.
pub fn parse_devices(body: &[u8]) -> Result<Vec<DeviceSummary>, ParseError> {
    let raw: RawDeviceList = serde_json::from_slice(body)?;
    Ok(raw
        .devices
        .into_iter()
        .map(|d| DeviceSummary {
            id: d.id,
            name: d.name,
            is_active: d.is_active,
            kind: d.kind,
            volume_percent: d.volume_percent,
        })
        .collect())
}

/// Extract whatever error text a non-2xx body carries. Never fails; an
/// unparseable body yields an empty [`UpstreamError`].
pub fn parse_error_body(body: &[u8]) -> UpstreamError {
    let Ok(raw) = serde_json::from_slice::<RawErrorBody>(body) else {
        return UpstreamError::default();
    };
    match raw.error {
        Some(RawErrorField::Detail { message, reason }) => UpstreamError { message, reason },
        Some(RawErrorField::Code(code)) => UpstreamError {
            message: raw.error_description.or(Some(code.clone())),
            reason: Some(code),
        },
        None => UpstreamError {
            message: raw.error_description,
            reason: None,
        },
    }
}

/// Parse a token response (`{ "access_token": ..., "expires_in": ... }`).
pub fn parse_token(body: &[u8]) -> Result<TokenGrant, ParseError> {
    let raw: RawToken = serde_json::from_slice(body)?;
    match raw.access_token {
        Some(token) if !token.is_empty() => Ok(TokenGrant {
            access_token: token,
            expires_in_secs: raw.expires_in,
        }),
        _ => Err(ParseError::MissingField("access_token")),
    }
}

/// Shorten a long track title for display.
///
/// Titles over [`SHORT_NAME_LIMIT`] characters lose their `[...]` groups
/// first; if that is not enough, `(...)` groups go too.
pub fn shorten_track_name(name: &str) -> String {
    if name.chars().count() <= SHORT_NAME_LIMIT {
        return name.to_string();
    }

    let without_brackets = square_groups()
        .map(|re| re.replace_all(name, "").trim().to_string())
        .unwrap_or_else(|| name.to_string());
    if without_brackets.chars().count() <= SHORT_NAME_LIMIT {
        return without_brackets;
    }

    all_groups()
        .map(|re| re.replace_all(name, "").trim().to_string())
        .unwrap_or(without_brackets)
}

fn square_groups() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]").ok()).as_ref()
}

fn all_groups() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").ok()).as_ref()
}
