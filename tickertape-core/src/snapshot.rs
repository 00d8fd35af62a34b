//! Snapshots handed to the display.
//!
//! This module provides:
//! - [`PlaybackSnapshot`] - What is playing right now
//! - [`AudioFeatureSnapshot`] - Audio analysis of one track
//! - [`DeviceSnapshot`] - The user's playback devices
//! - [`PollOutcome`] - Explicit active / no-session / failed classification
//!
//! Every snapshot is built fresh from one response. A failure never leaves
//! fields from an earlier poll behind: the snapshot comes back with every
//! field at its default and `error` set.

use serde::Serialize;

use crate::filter::FilteredDocument;
use crate::text::{
    self, DEVICE_ID_CAPACITY, DEVICE_NAME_CAPACITY, DEVICE_TYPE_CAPACITY, NAME_CAPACITY,
    URI_CAPACITY,
};

/// Fields retained from a currently-playing response.
pub const PLAYBACK_FIELDS: [&str; 11] = [
    "is_playing",
    "progress_ms",
    "item.duration_ms",
    "item.name",
    "item.uri",
    "item.id",
    "item.popularity",
    "item.artists[].name",
    "item.artists[].uri",
    "item.album.name",
    "item.album.uri",
];

/// Fields retained from an audio-features response.
pub const AUDIO_FEATURE_FIELDS: [&str; 11] = [
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
];

/// Fields retained from a devices response.
pub const DEVICE_FIELDS: [&str; 7] = [
    "devices[].id",
    "devices[].name",
    "devices[].type",
    "devices[].is_active",
    "devices[].is_restricted",
    "devices[].is_private_session",
    "devices[].volume_percent",
];

/// Classification of a poll result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// The response carried playback state.
    Active,

    /// The call succeeded but nothing is playing (HTTP 204).
    NoActiveSession,

    /// The call or its decode failed.
    Failed,
}

fn classify(error: bool, status_code: Option<u16>) -> PollOutcome {
    match (error, status_code) {
        (true, _) => PollOutcome::Failed,
        (false, Some(204)) => PollOutcome::NoActiveSession,
        (false, _) => PollOutcome::Active,
    }
}

/// Playback state at one poll.
///
/// When `error` is set no other field is meaningful. `status_code` is the
/// HTTP status of the call, or `None` when no status line was read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub progress_ms: i64,
    pub duration_ms: i64,
    pub track_id: String,
    pub track_name: String,
    pub short_track_name: String,
    pub track_uri: String,
    pub first_artist_name: String,
    pub first_artist_uri: String,
    pub short_first_artist_name: String,
    pub album_name: String,
    pub album_uri: String,
    pub track_popularity: i64,
    pub error: bool,
    pub status_code: Option<u16>,
}

impl PlaybackSnapshot {
    /// Build a snapshot from a decoded currently-playing document.
    pub fn from_document(document: &FilteredDocument, status_code: u16) -> Self {
        let track_name = text::truncate_to_capacity(document.str_at("/item/name"), NAME_CAPACITY);
        let first_artist_name =
            text::truncate_to_capacity(document.str_at("/item/artists/0/name"), NAME_CAPACITY);

        Self {
            is_playing: document.bool_at("/is_playing"),
            progress_ms: document.i64_at("/progress_ms"),
            duration_ms: document.i64_at("/item/duration_ms"),
            track_id: text::truncate_to_capacity(document.str_at("/item/id"), URI_CAPACITY),
            short_track_name: text::short_track_name(&track_name),
            track_name,
            track_uri: text::truncate_to_capacity(document.str_at("/item/uri"), URI_CAPACITY),
            first_artist_uri: text::truncate_to_capacity(
                document.str_at("/item/artists/0/uri"),
                URI_CAPACITY,
            ),
            short_first_artist_name: text::short_artist_name(&first_artist_name),
            first_artist_name,
            album_name: text::truncate_to_capacity(document.str_at("/item/album/name"), NAME_CAPACITY),
            album_uri: text::truncate_to_capacity(document.str_at("/item/album/uri"), URI_CAPACITY),
            track_popularity: document.i64_at("/item/popularity"),
            error: false,
            status_code: Some(status_code),
        }
    }

    /// Default-valued snapshot marking a failed poll.
    pub fn failed(status_code: Option<u16>) -> Self {
        Self {
            error: true,
            status_code,
            ..Self::default()
        }
    }

    /// Successful poll with no active playback.
    pub fn no_session(status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
            ..Self::default()
        }
    }

    pub fn outcome(&self) -> PollOutcome {
        classify(self.error, self.status_code)
    }
}

/// Track mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Minor,
    Major,
}

impl Mode {
    fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(Mode::Minor),
            1 => Some(Mode::Major),
            _ => None,
        }
    }
}

/// Audio analysis of one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioFeatureSnapshot {
    /// 0.0 to 1.0.
    pub danceability: f64,
    /// 0.0 to 1.0.
    pub energy: f64,
    /// Pitch class 0 to 11; `None` when no key was detected.
    pub key: Option<u8>,
    /// Roughly -60 to 0 dB.
    pub loudness: f64,
    pub mode: Option<Mode>,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    /// Beats per minute.
    pub tempo: f64,
    pub error: bool,
    pub status_code: Option<u16>,
}

impl AudioFeatureSnapshot {
    pub fn from_document(document: &FilteredDocument, status_code: u16) -> Self {
        Self {
            danceability: document.f64_at("/danceability"),
            energy: document.f64_at("/energy"),
            key: document
                .i64_opt("/key")
                .and_then(|key| u8::try_from(key).ok())
                .filter(|key| *key < 12),
            loudness: document.f64_at("/loudness"),
            mode: document.i64_opt("/mode").and_then(Mode::from_wire),
            speechiness: document.f64_at("/speechiness"),
            acousticness: document.f64_at("/acousticness"),
            instrumentalness: document.f64_at("/instrumentalness"),
            liveness: document.f64_at("/liveness"),
            valence: document.f64_at("/valence"),
            tempo: document.f64_at("/tempo"),
            error: false,
            status_code: Some(status_code),
        }
    }

    pub fn failed(status_code: Option<u16>) -> Self {
        Self {
            error: true,
            status_code,
            ..Self::default()
        }
    }

    pub fn no_content(status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
            ..Self::default()
        }
    }

    pub fn outcome(&self) -> PollOutcome {
        classify(self.error, self.status_code)
    }
}

/// One playback device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub is_active: bool,
    pub is_restricted: bool,
    pub is_private_session: bool,
    /// `None` when the device does not report a volume.
    pub volume_percent: Option<u8>,
}

/// The user's playback devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub devices: Vec<Device>,
    pub error: bool,
    pub status_code: Option<u16>,
}

impl DeviceSnapshot {
    pub fn from_document(document: &FilteredDocument, status_code: u16) -> Self {
        let devices = (0..document.len_at("/devices"))
            .map(|index| {
                let at = |field: &str| format!("/devices/{}/{}", index, field);
                Device {
                    id: text::truncate_to_capacity(document.str_at(&at("id")), DEVICE_ID_CAPACITY),
                    name: text::truncate_to_capacity(document.str_at(&at("name")), DEVICE_NAME_CAPACITY),
                    device_type: text::truncate_to_capacity(
                        document.str_at(&at("type")),
                        DEVICE_TYPE_CAPACITY,
                    ),
                    is_active: document.bool_at(&at("is_active")),
                    is_restricted: document.bool_at(&at("is_restricted")),
                    is_private_session: document.bool_at(&at("is_private_session")),
                    volume_percent: document
                        .i64_opt(&at("volume_percent"))
                        .and_then(|v| u8::try_from(v).ok()),
                }
            })
            .collect();

        Self {
            devices,
            error: false,
            status_code: Some(status_code),
        }
    }

    pub fn failed(status_code: Option<u16>) -> Self {
        Self {
            error: true,
            status_code,
            ..Self::default()
        }
    }

    /// The device currently marked active, if any.
    pub fn active(&self) -> Option<&Device> {
        self.devices.iter().find(|d| d.is_active)
    }

    pub fn outcome(&self) -> PollOutcome {
        classify(self.error, self.status_code)
    }
}
