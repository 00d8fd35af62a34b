//! Player control commands.
//!
//! A [`PlayerCommand`] knows its method, path and body. Dispatch lives on
//! [`SpotifyClient`](crate::SpotifyClient); a command succeeds only on HTTP 204.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::http::Method;

pub const PLAYER_PATH: &str = "/v1/me/player";
pub const PLAY_PATH: &str = "/v1/me/player/play";
pub const PAUSE_PATH: &str = "/v1/me/player/pause";
pub const NEXT_PATH: &str = "/v1/me/player/next";
pub const PREVIOUS_PATH: &str = "/v1/me/player/previous";
pub const SEEK_PATH: &str = "/v1/me/player/seek";
pub const VOLUME_PATH: &str = "/v1/me/player/volume";
pub const SHUFFLE_PATH: &str = "/v1/me/player/shuffle";
pub const REPEAT_PATH: &str = "/v1/me/player/repeat";

/// Append a `device_id` parameter to `base`.
///
/// An empty `device_id` leaves the path unchanged. Otherwise the parameter
/// starts the query with `?`, or joins an existing one with `&`.
pub fn build_command_path(base: &str, device_id: &str) -> String {
    if device_id.is_empty() {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}device_id={}", base, separator, encode(device_id))
}

/// Path of a seek command.
///
/// With `legacy_query` the device id is joined with a second `?`, which the
/// first firmware clients sent.
pub fn seek_path(position_ms: u32, device_id: &str, legacy_query: bool) -> String {
    let base = format!("{}?position_ms={}", SEEK_PATH, position_ms);
    if legacy_query && !device_id.is_empty() {
        return format!("{}?device_id={}", base, encode(device_id));
    }
    build_command_path(&base, device_id)
}

/// JSON body of a transfer-playback command.
///
/// `play` is sent as the string `"true"` or `"false"`.
pub fn transfer_body(device_id: &str, play: bool) -> String {
    serde_json::json!({
        "device_ids": [device_id],
        "play": play.to_string(),
    })
    .to_string()
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Repeat mode of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Repeat the current track.
    Track,
    /// Repeat the current album or playlist.
    Context,
    Off,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Track => "track",
            RepeatMode::Context => "context",
            RepeatMode::Off => "off",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "track" => Ok(RepeatMode::Track),
            "context" => Ok(RepeatMode::Context),
            "off" => Ok(RepeatMode::Off),
            other => Err(format!("unknown repeat mode: {}", other)),
        }
    }
}

/// A player control action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Resume playback, optionally with a JSON body naming what to play.
    Play { body: Option<String> },
    Pause,
    Next,
    Previous,
    Seek { position_ms: u32 },
    SetVolume { percent: u8 },
    /// Move playback to another device.
    Transfer { device_id: String, play: bool },
    Shuffle { enabled: bool },
    Repeat { mode: RepeatMode },
}

impl PlayerCommand {
    pub fn method(&self) -> Method {
        match self {
            PlayerCommand::Next | PlayerCommand::Previous => Method::Post,
            _ => Method::Put,
        }
    }

    /// Request path, targeting `device_id` unless it is empty.
    ///
    /// A transfer names its device in the body, so `device_id` is ignored.
    pub fn path(&self, device_id: &str, legacy_seek_query: bool) -> String {
        match self {
            PlayerCommand::Play { .. } => build_command_path(PLAY_PATH, device_id),
            PlayerCommand::Pause => build_command_path(PAUSE_PATH, device_id),
            PlayerCommand::Next => build_command_path(NEXT_PATH, device_id),
            PlayerCommand::Previous => build_command_path(PREVIOUS_PATH, device_id),
            PlayerCommand::Seek { position_ms } => seek_path(*position_ms, device_id, legacy_seek_query),
            PlayerCommand::SetVolume { percent } => build_command_path(
                &format!("{}?volume_percent={}", VOLUME_PATH, percent),
                device_id,
            ),
            PlayerCommand::Transfer { .. } => PLAYER_PATH.to_string(),
            PlayerCommand::Shuffle { enabled } => {
                build_command_path(&format!("{}?state={}", SHUFFLE_PATH, enabled), device_id)
            }
            PlayerCommand::Repeat { mode } => {
                build_command_path(&format!("{}?state={}", REPEAT_PATH, mode), device_id)
            }
        }
    }

    /// Request body; empty for most commands.
    pub fn body(&self) -> String {
        match self {
            PlayerCommand::Play { body: Some(body) } => body.clone(),
            PlayerCommand::Transfer { device_id, play } => transfer_body(device_id, *play),
            _ => String::new(),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerCommand::Play { .. } => "play",
            PlayerCommand::Pause => "pause",
            PlayerCommand::Next => "next",
            PlayerCommand::Previous => "previous",
            PlayerCommand::Seek { .. } => "seek",
            PlayerCommand::SetVolume { .. } => "volume",
            PlayerCommand::Transfer { .. } => "transfer",
            PlayerCommand::Shuffle { .. } => "shuffle",
            PlayerCommand::Repeat { .. } => "repeat",
        }
    }
}
