use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::reconnect::BackoffPolicy;
use crate::game::TimeControl;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Relay server for two-player chess games", long_about = None)]
pub struct RelayConfig {
    /// Address to bind
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Starting time per side for new rooms
    #[arg(long, default_value = "5")]
    pub initial_minutes: u64,

    /// Time added to the mover after each move
    #[arg(long, default_value = "0")]
    pub increment_seconds: u64,
}

impl RelayConfig {
    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn time_control(&self) -> TimeControl {
        TimeControl::from_minutes(self.initial_minutes, self.increment_seconds)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Terminal chess peer", long_about = None)]
pub struct PeerConfig {
    /// Relay WebSocket endpoint
    #[arg(short, long, default_value = "ws://127.0.0.1:8080/ws")]
    pub relay: String,

    /// Game to join
    #[arg(short, long)]
    pub game: String,

    /// Participant id; a fresh one is generated when omitted
    #[arg(short, long)]
    pub player: Option<String>,

    #[arg(long, default_value = "5")]
    pub initial_minutes: u64,

    #[arg(long, default_value = "0")]
    pub increment_seconds: u64,

    #[arg(long, default_value = "500")]
    pub backoff_initial_ms: u64,

    #[arg(long, default_value = "30000")]
    pub backoff_max_ms: u64,

    /// Give up after this many failed reconnects (unbounded when omitted)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Saved games file
    #[arg(short, long, default_value = "saved_games.json")]
    pub store: PathBuf,

    /// Resume from this saved game index before connecting
    #[arg(long)]
    pub load: Option<usize>,

    /// Import a PGN file before connecting
    #[arg(long)]
    pub pgn: Option<PathBuf>,
}

impl PeerConfig {
    pub fn time_control(&self) -> TimeControl {
        TimeControl::from_minutes(self.initial_minutes, self.increment_seconds)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(self.backoff_initial_ms),
            max: Duration::from_millis(self.backoff_max_ms),
            max_attempts: self.max_attempts,
            ..BackoffPolicy::default()
        }
    }

    /// Relay URL with the participant id attached.
    pub fn connect_url(&self, participant: &str) -> String {
        let separator = if self.relay.contains('?') { '&' } else { '?' };
        format!("{}{}player={}", self.relay, separator, participant)
    }
}
