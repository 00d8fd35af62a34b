//! Tickertape CLI
//!
//! Command-line front end for the tickertape core: prints what Spotify is
//! playing and sends player commands.
//!
//! # Usage
//!
//! ```bash
//! # Print the URL to authorize the app, then exchange the returned code
//! tickertape authorize
//! tickertape authorize --code AQD...
//!
//! # What is playing right now
//! tickertape now-playing
//!
//! # Poll every five seconds and print changes
//! tickertape watch --interval-ms 5000
//!
//! # Control playback
//! tickertape pause
//! tickertape volume 40 --device 5fbb3ba6aa454b5534c4ba43a8c7e8e45a63ad0e
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tickertape_core::{
    AudioFeatureSnapshot, CredentialStore, Credentials, DeviceSnapshot, PlaybackSnapshot,
    PollOutcome, RepeatMode, SpotifyClient, TlsTransport,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

mod config;

use config::AppConfig;

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const DEFAULT_REDIRECT_URL: &str = "http://127.0.0.1:8888/callback";
const DEFAULT_SCOPES: &str = "user-read-playback-state user-modify-playback-state user-read-currently-playing";

#[derive(Parser)]
#[command(name = "tickertape")]
#[command(about = "Now-playing ticker and remote for the Spotify Web API")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Spotify application client id
    #[arg(long, global = true, env = "TICKERTAPE_CLIENT_ID", hide_env_values = true)]
    client_id: Option<String>,

    /// Spotify application client secret
    #[arg(long, global = true, env = "TICKERTAPE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Target device id for player commands
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Print snapshots as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize the app and store the refresh token
    Authorize {
        /// Authorization code from the redirect; without it the URL to visit is printed
        #[arg(long)]
        code: Option<String>,

        /// Redirect URL registered for the app
        #[arg(long, default_value = DEFAULT_REDIRECT_URL)]
        redirect_url: String,

        /// Space-separated scopes to request
        #[arg(long, default_value = DEFAULT_SCOPES)]
        scopes: String,
    },

    /// Refresh the access token and report its expiry
    Refresh,

    /// Show the currently playing track
    NowPlaying {
        /// Market (ISO 3166-1 alpha-2) for track relinking
        #[arg(short, long)]
        market: Option<String>,
    },

    /// Show audio features of a track (default: the current one)
    Features {
        /// Track id
        track_id: Option<String>,
    },

    /// List playback devices
    Devices,

    /// Resume playback
    Play {
        /// JSON body, e.g. '{"context_uri":"spotify:album:..."}'
        #[arg(long)]
        body: Option<String>,
    },

    /// Pause playback
    Pause,

    /// Skip to the next track
    Next,

    /// Go back to the previous track
    Previous,

    /// Seek within the current track
    Seek {
        /// Position in milliseconds
        position_ms: u32,
    },

    /// Set the volume
    Volume {
        /// Volume in percent
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Move playback to another device
    Transfer {
        /// Device id to move playback to
        device_id: String,

        /// Start playing on the new device
        #[arg(long)]
        play: bool,
    },

    /// Turn shuffle on or off
    Shuffle {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },

    /// Set the repeat mode (track, context, off)
    Repeat { mode: RepeatMode },

    /// Poll the currently playing track on a fixed period
    Watch {
        /// Poll period in milliseconds (default from config)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many polls
        #[arg(long)]
        count: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    init_logging(cli.verbose, &config.log_level);
    tracing::debug!("Loaded configuration from {:?}", config.config_path);

    let device_id = cli.device.clone().unwrap_or_else(|| config.device_id.clone());

    match &cli.command {
        Commands::Authorize { code, redirect_url, scopes } => {
            authorize(&cli, &config, code.as_deref(), redirect_url, scopes)
        }
        Commands::Refresh => refresh(&cli, &config),
        Commands::NowPlaying { market } => {
            let mut client = build_client(&cli, &config)?;
            let snapshot = client.currently_playing(market.as_deref());
            print_output(cli.json, &snapshot, format_playback(&snapshot))
        }
        Commands::Features { track_id } => features(&cli, &config, track_id.as_deref()),
        Commands::Devices => {
            let mut client = build_client(&cli, &config)?;
            let snapshot = client.devices();
            print_output(cli.json, &snapshot, format_devices(&snapshot))
        }
        Commands::Play { body } => {
            let mut client = build_client(&cli, &config)?;
            let ok = match body {
                Some(body) => client.play_with_body(body, &device_id),
                None => client.play(&device_id),
            };
            report("play", ok)
        }
        Commands::Pause => report("pause", build_client(&cli, &config)?.pause(&device_id)),
        Commands::Next => report("next", build_client(&cli, &config)?.next_track(&device_id)),
        Commands::Previous => {
            report("previous", build_client(&cli, &config)?.previous_track(&device_id))
        }
        Commands::Seek { position_ms } => {
            report("seek", build_client(&cli, &config)?.seek(*position_ms, &device_id))
        }
        Commands::Volume { percent } => {
            report("volume", build_client(&cli, &config)?.set_volume(*percent, &device_id))
        }
        Commands::Transfer { device_id, play } => report(
            "transfer",
            build_client(&cli, &config)?.transfer_playback(device_id, *play),
        ),
        Commands::Shuffle { enabled } => {
            report("shuffle", build_client(&cli, &config)?.set_shuffle(*enabled, &device_id))
        }
        Commands::Repeat { mode } => {
            report("repeat", build_client(&cli, &config)?.set_repeat(*mode, &device_id))
        }
        Commands::Watch { interval_ms, count } => {
            let interval = Duration::from_millis(interval_ms.unwrap_or(config.poll_interval_ms));
            watch(&cli, &config, interval, *count)
        }
    }
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn credentials(cli: &Cli, config: &AppConfig) -> Result<Credentials> {
    let client_id = cli
        .client_id
        .clone()
        .unwrap_or_else(|| config.credentials.client_id.clone());
    let client_secret = cli
        .client_secret
        .clone()
        .unwrap_or_else(|| config.credentials.client_secret.clone());

    if client_id.is_empty() || client_secret.is_empty() {
        bail!(
            "client id and secret are required: set TICKERTAPE_CLIENT_ID/TICKERTAPE_CLIENT_SECRET \
             or [credentials] in {:?}",
            config.config_path
        );
    }

    let store = CredentialStore::load().context("Failed to locate the credential store")?;
    let stored = store
        .refresh_token()
        .with_context(|| format!("Failed to read {:?}", store.path()))?;

    let refresh_token = match stored {
        Some(token) => token.expose().to_string(),
        None => config.credentials.refresh_token.clone(),
    };

    Ok(Credentials::new(client_id, client_secret, refresh_token))
}

fn build_client(cli: &Cli, config: &AppConfig) -> Result<SpotifyClient<TlsTransport>> {
    let credentials = credentials(cli, config)?;
    if credentials.refresh_token.is_empty() {
        bail!("no refresh token available; run `tickertape authorize` first");
    }

    let transport = TlsTransport::new().context("Failed to set up TLS")?;
    Ok(SpotifyClient::new(transport, credentials, config.client.clone()))
}

fn authorize(
    cli: &Cli,
    config: &AppConfig,
    code: Option<&str>,
    redirect_url: &str,
    scopes: &str,
) -> Result<()> {
    let credentials = credentials(cli, config)?;

    let Some(code) = code else {
        println!("Open this URL, approve access, then run `tickertape authorize --code <code>`");
        println!("{}", authorize_url(&credentials.client_id, redirect_url, scopes));
        return Ok(());
    };

    let client_id = credentials.client_id.clone();
    let previous = credentials.refresh_token.expose().to_string();
    let transport = TlsTransport::new().context("Failed to set up TLS")?;
    let mut client = SpotifyClient::new(transport, credentials, config.client.clone());

    let refresh_token = client.exchange_authorization_code(code, redirect_url);
    if refresh_token.is_empty() || refresh_token == previous {
        bail!("authorization code exchange failed");
    }

    let store = CredentialStore::load().context("Failed to locate the credential store")?;
    let saved = store
        .save_refresh_token(&client_id, &refresh_token)
        .with_context(|| format!("Failed to write {:?}", store.path()))?;

    info!("Refresh token saved to {:?}", store.path());
    println!("Authorized; refresh token saved at {}", saved.saved_at.to_rfc3339());
    Ok(())
}

fn authorize_url(client_id: &str, redirect_url: &str, scopes: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_url)
        .append_pair("scope", scopes)
        .finish();
    format!("{}?{}", AUTHORIZE_URL, query)
}

fn refresh(cli: &Cli, config: &AppConfig) -> Result<()> {
    let mut client = build_client(cli, config)?;
    if !client.refresh_access_token() {
        bail!("access token refresh failed");
    }

    let remaining_ms = client.tokens().access_token().map_or(0, |t| t.ttl_ms());
    match local_expiry(remaining_ms) {
        Some(valid_until) => {
            println!("Access token refreshed, valid until {}", valid_until.format("%H:%M:%S"))
        }
        None => println!("Access token refreshed, valid for {} ms", remaining_ms),
    }
    Ok(())
}

fn local_expiry(ttl_ms: u64) -> Option<chrono::DateTime<chrono::Local>> {
    let ttl = chrono::TimeDelta::try_milliseconds(i64::try_from(ttl_ms).ok()?)?;
    chrono::Local::now().checked_add_signed(ttl)
}

fn features(cli: &Cli, config: &AppConfig, track_id: Option<&str>) -> Result<()> {
    let mut client = build_client(cli, config)?;

    let track_id = match track_id {
        Some(id) => id.to_string(),
        None => {
            let playing = client.currently_playing(None);
            if playing.outcome() != PollOutcome::Active || playing.track_id.is_empty() {
                bail!("nothing is playing; pass a track id");
            }
            playing.track_id
        }
    };

    let snapshot = client.audio_features(&track_id, None);
    print_output(cli.json, &snapshot, format_features(&snapshot))
}

fn watch(cli: &Cli, config: &AppConfig, interval: Duration, count: Option<u64>) -> Result<()> {
    let mut client = build_client(cli, config)?;
    let mut last_line = String::new();
    let mut polls = 0u64;

    info!("Polling every {:?}", interval);
    loop {
        let started = Instant::now();
        let snapshot = client.currently_playing(None);
        polls += 1;

        if cli.json {
            println!("{}", serde_json::to_string(&snapshot)?);
        } else {
            let line = format_playback(&snapshot);
            if line != last_line {
                println!("{} {}", chrono::Local::now().format("%H:%M:%S"), line);
                last_line = line;
            }
        }

        if count.is_some_and(|count| polls >= count) {
            return Ok(());
        }

        if let Some(wait) = interval.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
    }
}

fn print_output<T: Serialize>(json: bool, value: &T, text: String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

fn report(command: &str, ok: bool) -> Result<()> {
    if !ok {
        bail!("{} command failed", command);
    }
    println!("{}: ok", command);
    Ok(())
}

fn format_time(ms: i64) -> String {
    let seconds = ms.max(0) / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn format_playback(snapshot: &PlaybackSnapshot) -> String {
    match snapshot.outcome() {
        PollOutcome::Failed => match snapshot.status_code {
            Some(status) => format!("error (HTTP {})", status),
            None => "error (no response)".to_string(),
        },
        PollOutcome::NoActiveSession => "nothing playing".to_string(),
        PollOutcome::Active => format!(
            "{} {} - {} [{} / {}]",
            if snapshot.is_playing { "playing" } else { "paused" },
            snapshot.short_first_artist_name.trim(),
            snapshot.short_track_name.trim(),
            format_time(snapshot.progress_ms),
            format_time(snapshot.duration_ms),
        ),
    }
}

fn format_features(snapshot: &AudioFeatureSnapshot) -> String {
    if snapshot.error {
        return format!("error (HTTP {:?})", snapshot.status_code);
    }

    const PITCH_CLASSES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let key = snapshot
        .key
        .map_or("none", |key| PITCH_CLASSES[usize::from(key)]);
    let mode = snapshot.mode.map_or("-".to_string(), |m| format!("{:?}", m).to_lowercase());

    format!(
        "tempo {:.1} bpm, key {} {}, loudness {:.1} dB\n\
         danceability {:.2}, energy {:.2}, valence {:.2}\n\
         speechiness {:.2}, acousticness {:.2}, instrumentalness {:.2}, liveness {:.2}",
        snapshot.tempo,
        key,
        mode,
        snapshot.loudness,
        snapshot.danceability,
        snapshot.energy,
        snapshot.valence,
        snapshot.speechiness,
        snapshot.acousticness,
        snapshot.instrumentalness,
        snapshot.liveness,
    )
}

fn format_devices(snapshot: &DeviceSnapshot) -> String {
    if snapshot.error {
        return format!("error (HTTP {:?})", snapshot.status_code);
    }
    if snapshot.devices.is_empty() {
        return "no devices".to_string();
    }

    snapshot
        .devices
        .iter()
        .map(|d| {
            let volume = d.volume_percent.map_or("-".to_string(), |v| format!("{}%", v));
            format!(
                "{} {} ({}) vol {} id {}",
                if d.is_active { "*" } else { " " },
                d.name,
                d.device_type,
                volume,
                d.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickertape_core::{Device, Mode};

    #[test]
    fn test_local_expiry_out_of_range() {
        assert!(local_expiry(3_598_000).is_some());
        assert!(local_expiry(9_999_999_999_999_000).is_none());
        assert!(local_expiry(u64::MAX).is_none());
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["tickertape", "volume", "40", "--device", "abc"]).unwrap();
        assert_eq!(cli.device.as_deref(), Some("abc"));
        assert!(matches!(cli.command, Commands::Volume { percent: 40 }));

        assert!(Cli::try_parse_from(["tickertape", "volume", "140"]).is_err());

        let cli = Cli::try_parse_from(["tickertape", "repeat", "context"]).unwrap();
        assert!(matches!(cli.command, Commands::Repeat { mode: RepeatMode::Context }));

        let cli = Cli::try_parse_from(["tickertape", "shuffle", "false"]).unwrap();
        assert!(matches!(cli.command, Commands::Shuffle { enabled: false }));
    }

    #[test]
    fn test_authorize_url() {
        let url = authorize_url("abc", "http://127.0.0.1:8888/callback", "user-read-playback-state");
        assert_eq!(
            url,
            "https://accounts.spotify.com/authorize?client_id=abc&response_type=code\
             &redirect_uri=http%3A%2F%2F127.0.0.1%3A8888%2Fcallback&scope=user-read-playback-state"
        );
    }

    #[test]
    fn test_format_playback() {
        let snapshot = PlaybackSnapshot {
            is_playing: true,
            progress_ms: 61_000,
            duration_ms: 213_000,
            short_track_name: "Song Title ".to_string(),
            short_first_artist_name: "Artist ".to_string(),
            status_code: Some(200),
            ..PlaybackSnapshot::default()
        };
        assert_eq!(format_playback(&snapshot), "playing Artist - Song Title [1:01 / 3:33]");

        assert_eq!(format_playback(&PlaybackSnapshot::no_session(204)), "nothing playing");
        assert_eq!(format_playback(&PlaybackSnapshot::failed(Some(401))), "error (HTTP 401)");
        assert_eq!(format_playback(&PlaybackSnapshot::failed(None)), "error (no response)");
    }

    #[test]
    fn test_format_features() {
        let snapshot = AudioFeatureSnapshot {
            key: Some(9),
            mode: Some(Mode::Minor),
            tempo: 118.2,
            ..AudioFeatureSnapshot::default()
        };
        assert!(format_features(&snapshot).starts_with("tempo 118.2 bpm, key A minor"));
    }

    #[test]
    fn test_format_devices() {
        let snapshot = DeviceSnapshot {
            devices: vec![Device {
                id: "abc".to_string(),
                name: "Kitchen".to_string(),
                device_type: "Speaker".to_string(),
                is_active: true,
                volume_percent: Some(40),
                ..Device::default()
            }],
            error: false,
            status_code: Some(200),
        };
        assert_eq!(format_devices(&snapshot), "* Kitchen (Speaker) vol 40% id abc");
    }
}
