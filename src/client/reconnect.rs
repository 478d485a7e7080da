use log::{info, warn};
use std::time::Duration;

use crate::error::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Bounded exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub factor: u32,
    pub max: Duration,
    /// None retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            factor: 2,
            max: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scale = self.factor.max(1).saturating_pow(exponent);
        self.initial.saturating_mul(scale).min(self.max)
    }
}

/// Transport lifecycle bookkeeping. Owns no socket; the transport driver
/// reports what happened and gets back what to do next.
#[derive(Debug)]
pub struct ReconnectManager {
    policy: BackoffPolicy,
    state: ConnectionState,
    attempts: u32,
}

impl ReconnectManager {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Returns true when the caller must ask for a full resync before
    /// trusting its local state.
    pub fn on_connected(&mut self, has_local_game: bool) -> bool {
        info!("Connected after {} failed attempts", self.attempts);
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        has_local_game
    }

    /// Records a lost or failed connection and returns how long to wait.
    pub fn on_disconnected(&mut self) -> Result<Duration, ConnectionError> {
        self.state = ConnectionState::Disconnected;
        self.attempts += 1;
        if let Some(limit) = self.policy.max_attempts {
            if self.attempts > limit {
                return Err(ConnectionError::RetriesExhausted { attempts: limit });
            }
        }
        let delay = self.policy.delay(self.attempts);
        warn!("Connection lost, retry {} in {:?}", self.attempts, delay);
        Ok(delay)
    }

    /// User-initiated reconnect: forget the backoff and try right away.
    pub fn manual_reconnect(&mut self) {
        info!("Manual reconnect requested");
        self.state = ConnectionState::Disconnected;
        self.attempts = 0;
    }
}
