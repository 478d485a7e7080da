use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::game::Side;

/// Fixed tick period of the game clock.
pub const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeControl {
    pub initial_ms: u64,
    pub increment_ms: u64,
}

impl TimeControl {
    pub fn from_minutes(minutes: u64, increment_seconds: u64) -> Self {
        Self {
            initial_ms: minutes * 60_000,
            increment_ms: increment_seconds * 1_000,
        }
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        TimeControl::from_minutes(5, 0)
    }
}

/// Remaining time per side. Which side is running is derived by the session,
/// never stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    white_ms: u64,
    black_ms: u64,
}

impl ClockState {
    pub fn new(control: TimeControl) -> Self {
        Self {
            white_ms: control.initial_ms,
            black_ms: control.initial_ms,
        }
    }

    pub fn remaining(&self, side: Side) -> u64 {
        match side {
            Side::White => self.white_ms,
            Side::Black => self.black_ms,
        }
    }

    fn remaining_mut(&mut self, side: Side) -> &mut u64 {
        match side {
            Side::White => &mut self.white_ms,
            Side::Black => &mut self.black_ms,
        }
    }

    pub fn set(&mut self, white_ms: u64, black_ms: u64) {
        self.white_ms = white_ms;
        self.black_ms = black_ms;
    }

    /// Burns `elapsed_ms` from `side`. Returns true once that side has flagged.
    pub fn tick(&mut self, side: Side, elapsed_ms: u64) -> bool {
        let remaining = self.remaining_mut(side);
        *remaining = remaining.saturating_sub(elapsed_ms);
        *remaining == 0
    }

    pub fn add_increment(&mut self, side: Side, increment_ms: u64) {
        *self.remaining_mut(side) += increment_ms;
    }

    pub fn reading(&self, active: Option<Side>) -> ClockReading {
        ClockReading {
            white_ms: self.white_ms,
            black_ms: self.black_ms,
            active,
        }
    }
}

/// Clock state as it travels in `game_sync` payloads and saved records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockReading {
    pub white_ms: u64,
    pub black_ms: u64,
    #[serde(default)]
    pub active: Option<Side>,
}

impl ClockReading {
    pub fn remaining(&self, side: Side) -> u64 {
        match side {
            Side::White => self.white_ms,
            Side::Black => self.black_ms,
        }
    }
}

/// Drives the periodic clock tick for whichever side is running.
///
/// Armed and disarmed purely from the session's current active side. The
/// interval lives inside the scheduler, so dropping the scheduler (or the
/// event loop owning it) cancels it.
#[derive(Debug)]
pub struct ClockScheduler {
    period: Duration,
    armed_for: Option<Side>,
    interval: Option<Interval>,
}

impl ClockScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            armed_for: None,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    pub fn armed_for(&self) -> Option<Side> {
        self.armed_for
    }

    /// Re-arms when the running side changes, disarms when nothing should run.
    pub fn sync(&mut self, active: Option<Side>) {
        if active == self.armed_for {
            return;
        }
        self.armed_for = active;
        self.interval = active.map(|_| {
            let mut interval = interval_at(Instant::now() + self.period, self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
    }

    pub fn disarm(&mut self) {
        self.sync(None);
    }

    /// Resolves on the next tick of the armed side; pends forever while disarmed.
    pub async fn tick(&mut self) -> Side {
        match (self.interval.as_mut(), self.armed_for) {
            (Some(interval), Some(side)) => {
                interval.tick().await;
                side
            }
            _ => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_only_burns_active_side() {
        let mut clock = ClockState::new(TimeControl::from_minutes(1, 0));
        assert!(!clock.tick(Side::White, 1_000));
        assert_eq!(clock.remaining(Side::White), 59_000);
        assert_eq!(clock.remaining(Side::Black), 60_000);
    }

    #[test]
    fn test_tick_flags_at_zero() {
        let mut clock = ClockState::new(TimeControl {
            initial_ms: 1_500,
            increment_ms: 0,
        });
        assert!(!clock.tick(Side::Black, 1_000));
        assert!(clock.tick(Side::Black, 1_000));
        assert_eq!(clock.remaining(Side::Black), 0);
    }

    #[test]
    fn test_increment() {
        let mut clock = ClockState::new(TimeControl::from_minutes(3, 2));
        clock.add_increment(Side::White, 2_000);
        assert_eq!(clock.remaining(Side::White), 182_000);
        assert_eq!(
            clock.reading(Some(Side::Black)),
            ClockReading {
                white_ms: 182_000,
                black_ms: 180_000,
                active: Some(Side::Black),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_fires_for_armed_side() {
        let mut scheduler = ClockScheduler::new(TICK);
        scheduler.sync(Some(Side::White));
        assert!(scheduler.is_armed());

        let start = Instant::now();
        assert_eq!(scheduler.tick().await, Side::White);
        assert_eq!(start.elapsed(), TICK);

        scheduler.sync(Some(Side::Black));
        assert_eq!(scheduler.tick().await, Side::Black);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_scheduler_never_fires() {
        let mut scheduler = ClockScheduler::new(TICK);
        scheduler.sync(Some(Side::White));
        scheduler.disarm();
        assert!(!scheduler.is_armed());

        let waited = tokio::time::timeout(Duration::from_secs(10), scheduler.tick()).await;
        assert!(waited.is_err());
    }
}
