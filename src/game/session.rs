//! The game session state machine.
//!
//! A [`GameSession`] binds two seats, the [`MoveLog`], the game status and the
//! clock, and is the single source of truth for whose turn it is, whether the
//! game is over and what the history looks like. Every transition returns the
//! [`SessionEvent`]s it produced; rejected transitions leave the session
//! untouched and return a typed [`SessionError`].
//!
//! Remote input comes in two forms. A `move` envelope is reconciled by ply
//! number against the local tip. A full sync replaces history, status and
//! clock wholesale and is allowed in any local state.

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{NotationError, ProtocolError, SessionError};
use crate::game::clock::{ClockReading, ClockState, TimeControl, TICK};
use crate::game::move_log::{MoveLog, MoveRecord};
use crate::game::notation::{self, GameMetadata};
use crate::game::rules::{AppliedMove, RulesEngine, Target, Verdict};
use crate::game::{MoveRequest, Side, Snapshot};
use crate::models::game_state::PersistedRecord;
use crate::models::messages::{GameSyncPayload, MoveEnvelope};

/// How far two views of the same clock may drift apart.
const CLOCK_SLACK_MS: u64 = 2 * TICK.as_millis() as u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GameStatus {
    InProgress,
    Checkmate { winner: Side },
    Stalemate,
    Draw { reason: String },
    Resigned { winner: Side },
    TimeUp { winner: Side },
    Abandoned,
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }

    pub fn winner(&self) -> Option<Side> {
        match self {
            GameStatus::Checkmate { winner }
            | GameStatus::Resigned { winner }
            | GameStatus::TimeUp { winner } => Some(*winner),
            _ => None,
        }
    }

    /// PGN result token for this status.
    pub fn result_token(&self) -> &'static str {
        match self {
            GameStatus::InProgress | GameStatus::Abandoned => "*",
            GameStatus::Stalemate | GameStatus::Draw { .. } => "1/2-1/2",
            _ => match self.winner() {
                Some(Side::White) => "1-0",
                Some(Side::Black) => "0-1",
                None => "*",
            },
        }
    }

    pub fn from_verdict(verdict: &Verdict) -> GameStatus {
        match verdict {
            Verdict::None => GameStatus::InProgress,
            Verdict::Checkmate { winner } => GameStatus::Checkmate { winner: *winner },
            Verdict::Stalemate => GameStatus::Stalemate,
            Verdict::Draw { reason } => GameStatus::Draw {
                reason: reason.clone(),
            },
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::InProgress => write!(f, "in progress"),
            GameStatus::Checkmate { winner } => write!(f, "checkmate, {} wins", winner),
            GameStatus::Stalemate => write!(f, "stalemate"),
            GameStatus::Draw { reason } => write!(f, "draw ({})", reason),
            GameStatus::Resigned { winner } => write!(f, "{} resigned, {} wins", winner.opponent(), winner),
            GameStatus::TimeUp { winner } => write!(f, "time's up, {} wins", winner),
            GameStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Notifications for the presentation layer and the sync protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A local proposal became canonical and should be broadcast.
    MoveAccepted(MoveRecord),
    RemoteMoveApplied(MoveRecord),
    StatusChanged(GameStatus),
    /// The running clock changed (None = both clocks frozen).
    ActiveChanged(Option<Side>),
    CursorMoved(usize),
    HistoryReplaced { plies: usize },
    ClockTicked { side: Side, remaining_ms: u64 },
}

/// Participant ids bound to each color. Bindings never move once made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seats {
    pub white: Option<String>,
    pub black: Option<String>,
}

impl Seats {
    pub fn side_of(&self, participant: &str) -> Option<Side> {
        if self.white.as_deref() == Some(participant) {
            Some(Side::White)
        } else if self.black.as_deref() == Some(participant) {
            Some(Side::Black)
        } else {
            None
        }
    }

    pub fn holder(&self, side: Side) -> Option<&str> {
        match side {
            Side::White => self.white.as_deref(),
            Side::Black => self.black.as_deref(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.white.is_some() && self.black.is_some()
    }

    fn slot(&mut self, side: Side) -> &mut Option<String> {
        match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        }
    }
}

pub struct GameSession {
    id: String,
    rules: Arc<dyn RulesEngine>,
    seats: Seats,
    log: MoveLog,
    status: GameStatus,
    clock: ClockState,
    time_control: TimeControl,
    metadata: GameMetadata,
    outcome_visible: bool,
}

impl fmt::Debug for GameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("seats", &self.seats)
            .field("plies", &self.log.len())
            .field("cursor", &self.log.cursor())
            .field("status", &self.status)
            .field("clock", &self.clock)
            .finish()
    }
}

impl GameSession {
    pub fn new(id: impl Into<String>, rules: Arc<dyn RulesEngine>, time_control: TimeControl) -> Self {
        let log = MoveLog::new(rules.initial_position());
        Self {
            id: id.into(),
            rules,
            seats: Seats::default(),
            log,
            status: GameStatus::InProgress,
            clock: ClockState::new(time_control),
            time_control,
            metadata: GameMetadata::default(),
            outcome_visible: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rules(&self) -> &Arc<dyn RulesEngine> {
        &self.rules
    }

    pub fn seats(&self) -> &Seats {
        &self.seats
    }

    pub fn log(&self) -> &MoveLog {
        &self.log
    }

    pub fn status(&self) -> &GameStatus {
        &self.status
    }

    pub fn clock(&self) -> &ClockState {
        &self.clock
    }

    pub fn time_control(&self) -> TimeControl {
        self.time_control
    }

    pub fn metadata(&self) -> &GameMetadata {
        &self.metadata
    }

    /// Whether the final result should be on screen. Browsing history hides it.
    pub fn outcome_visible(&self) -> bool {
        self.outcome_visible
    }

    pub fn current_snapshot(&self) -> &Snapshot {
        self.log.current()
    }

    /// Seats `participant` on the first free color, or returns the color it
    /// already holds. None when both seats belong to someone else.
    pub fn seat(&mut self, participant: &str) -> Option<Side> {
        if let Some(side) = self.seats.side_of(participant) {
            return Some(side);
        }
        let side = [Side::White, Side::Black]
            .into_iter()
            .find(|side| self.seats.holder(*side).is_none())?;
        self.bind(participant, side);
        Some(side)
    }

    /// Binds `participant` to a specific color if that seat is free.
    pub fn seat_as(&mut self, participant: &str, side: Side) -> bool {
        match self.seats.holder(side) {
            Some(holder) => holder == participant,
            None if self.seats.side_of(participant).is_none() => {
                self.bind(participant, side);
                true
            }
            None => false,
        }
    }

    fn bind(&mut self, participant: &str, side: Side) {
        *self.seats.slot(side) = Some(participant.to_string());
        let name = match side {
            Side::White => &mut self.metadata.white,
            Side::Black => &mut self.metadata.black,
        };
        *name = participant.to_string();
        info!("Seated {} as {} in game {}", participant, side, self.id);
    }

    /// Side to move at the tip of the history.
    pub fn turn(&self) -> Side {
        match self.log.last_move() {
            Some(last) => last.color.opponent(),
            None => self
                .rules
                .side_to_move(&self.log.snapshots()[0])
                .unwrap_or(Side::White),
        }
    }

    /// The running clock: the side to move, only while in progress and at the tip.
    pub fn active(&self) -> Option<Side> {
        if self.status.is_terminal() || !self.log.is_at_tip() {
            None
        } else {
            Some(self.turn())
        }
    }

    pub fn legal_targets(&self, square: &str) -> Result<Vec<Target>, SessionError> {
        Ok(self.rules.legal_targets(self.log.current(), square)?)
    }

    /// Monotone status transition; a finished game never changes outcome here.
    fn finish(&mut self, status: GameStatus, events: &mut Vec<SessionEvent>) {
        if self.status.is_terminal() || !status.is_terminal() {
            return;
        }
        info!("Game {} finished: {}", self.id, status);
        self.status = status.clone();
        self.metadata.result = status.result_token().to_string();
        self.outcome_visible = true;
        events.push(SessionEvent::StatusChanged(status));
    }

    fn record_for(&self, ply: usize, color: Side, request: &MoveRequest, applied: &AppliedMove) -> MoveRecord {
        MoveRecord {
            ply,
            color,
            from: request.from.clone(),
            to: request.to.clone(),
            promotion: request.promotion,
            fen: applied.position.clone(),
            notation: applied.notation.clone(),
            captured: applied.captured,
            check: applied.in_check,
        }
    }

    pub fn propose_move(&mut self, requestor: &str, request: &MoveRequest) -> Result<Vec<SessionEvent>, SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::TerminalState {
                status: self.status.clone(),
            });
        }
        if !self.log.is_at_tip() {
            return Err(SessionError::StaleCursor {
                cursor: self.log.cursor(),
                tip: self.log.tip(),
            });
        }
        let active = self.active();
        let side = match self.seats.side_of(requestor) {
            Some(side) if Some(side) == active => side,
            _ => {
                return Err(SessionError::Authority {
                    participant: requestor.to_string(),
                    active,
                })
            }
        };

        let applied = self.rules.apply_move(self.log.tip_snapshot(), request)?;
        let record = self.record_for(self.log.len() + 1, side, request, &applied);
        self.log.append(record.clone(), applied.position.clone())?;
        self.clock.add_increment(side, self.time_control.increment_ms);
        debug!("Game {}: {} played {}", self.id, side, record.notation);

        let mut events = vec![SessionEvent::MoveAccepted(record)];
        self.finish(GameStatus::from_verdict(&applied.verdict), &mut events);
        events.push(SessionEvent::ActiveChanged(self.active()));
        Ok(events)
    }

    /// Re-derives a claimed move from `base` and checks it lands on the claimed snapshot.
    fn check_claim(&self, base: &Snapshot, record: &MoveRecord) -> Result<AppliedMove, SessionError> {
        let request = MoveRequest {
            from: record.from.clone(),
            to: record.to.clone(),
            promotion: record.promotion,
        };
        let applied = self.rules.apply_move(base, &request).map_err(|e| SessionError::Desync {
            ply: record.ply,
            reason: e.to_string(),
        })?;
        if applied.position != record.fen {
            return Err(SessionError::Desync {
                ply: record.ply,
                reason: "claimed position differs from local derivation".to_string(),
            });
        }
        Ok(applied)
    }

    /// Full validation of a peer's move claim against this session's tip.
    pub fn validate_move_claim(&self, envelope: &MoveEnvelope) -> Result<(), SessionError> {
        let record = &envelope.record;
        if self.status.is_terminal() {
            return Err(SessionError::TerminalState {
                status: self.status.clone(),
            });
        }
        if self.seats.side_of(&envelope.player_id) != Some(record.color) || record.color != self.turn() {
            return Err(SessionError::Authority {
                participant: envelope.player_id.clone(),
                active: Some(self.turn()),
            });
        }
        if record.ply != self.log.len() + 1 {
            return Err(SessionError::Desync {
                ply: record.ply,
                reason: format!("expected ply {}", self.log.len() + 1),
            });
        }
        let applied = self.check_claim(self.log.tip_snapshot(), record)?;
        if GameStatus::from_verdict(&applied.verdict) != envelope.status {
            return Err(SessionError::Desync {
                ply: record.ply,
                reason: format!("claimed status {} does not follow from the move", envelope.status),
            });
        }
        Ok(())
    }

    /// Replays a whole history through the rules engine and returns the
    /// status its final position implies.
    pub fn verify_history(&self, snapshots: &[Snapshot], moves: &[MoveRecord]) -> Result<GameStatus, SessionError> {
        let desync = |ply: usize, reason: &str| SessionError::Desync {
            ply,
            reason: reason.to_string(),
        };
        if snapshots.first() != Some(&self.rules.initial_position()) {
            return Err(desync(0, "history does not start from the initial position"));
        }
        if snapshots.len() != moves.len() + 1 {
            return Err(desync(moves.len(), "snapshot and move counts disagree"));
        }
        let mut implied = GameStatus::InProgress;
        for (index, record) in moves.iter().enumerate() {
            if implied.is_terminal() {
                return Err(desync(index + 1, "history continues past the end of the game"));
            }
            if record.ply != index + 1 || record.fen != snapshots[index + 1] {
                return Err(desync(index + 1, "move does not match its snapshot"));
            }
            let mover = self
                .rules
                .side_to_move(&snapshots[index])
                .map_err(|e| desync(index + 1, &e.to_string()))?;
            if record.color != mover {
                return Err(desync(index + 1, "move recorded for the wrong color"));
            }
            implied = GameStatus::from_verdict(&self.check_claim(&snapshots[index], record)?.verdict);
        }
        Ok(implied)
    }

    /// Checks a `game_sync` sent by the holder of `sender` before it may
    /// replace this session.
    ///
    /// The payload has to keep every recorded position and may only add moves
    /// of the sender's color. Its status must follow from the final position,
    /// or be a resignation by the sender, or a time forfeit of the side to
    /// move. Neither clock may run down faster than `elapsed_ms` allows or gain
    /// more than the increments of the added moves.
    pub fn validate_sync_claim(
        &self,
        sender: Side,
        payload: &GameSyncPayload,
        elapsed_ms: u64,
    ) -> Result<(), SessionError> {
        let implied = self.verify_history(&payload.snapshots, &payload.moves)?;
        let refuse = |ply: usize, reason: &str| SessionError::Desync {
            ply,
            reason: reason.to_string(),
        };

        let known = self.log.snapshots();
        if payload.snapshots.len() < known.len() {
            return Err(refuse(payload.moves.len(), "sync payload is behind the recorded history"));
        }
        if let Some(ply) = known.iter().zip(&payload.snapshots).position(|(a, b)| a != b) {
            return Err(refuse(ply, "sync payload rewrites a recorded move"));
        }
        let added = &payload.moves[self.log.len()..];
        if let Some(record) = added.iter().find(|r| r.color != sender) {
            return Err(refuse(record.ply, "sync payload adds a move for the opponent"));
        }

        if self.status.is_terminal() {
            if !added.is_empty() || payload.status != self.status {
                return Err(SessionError::TerminalState {
                    status: self.status.clone(),
                });
            }
            return Ok(());
        }

        let tip = payload.moves.len();
        let to_move = Side::to_move_after(tip);
        let entitled = match &payload.status {
            status if implied.is_terminal() => *status == implied,
            GameStatus::InProgress => true,
            GameStatus::Resigned { winner } => *winner == sender.opponent(),
            GameStatus::TimeUp { winner } => {
                *winner == to_move.opponent() && payload.clock.remaining(to_move) == 0
            }
            _ => false,
        };
        if !entitled {
            return Err(refuse(tip, &format!("{} does not follow from the game", payload.status)));
        }

        for side in [Side::White, Side::Black] {
            let before = self.clock.remaining(side);
            let after = payload.clock.remaining(side);
            let increments = added.iter().filter(|r| r.color == side).count() as u64;
            let gain = increments * self.time_control.increment_ms;
            if after > before + gain + CLOCK_SLACK_MS || after + elapsed_ms + CLOCK_SLACK_MS < before {
                return Err(refuse(tip, &format!("{} clock moved from {} to {} ms", side, before, after)));
            }
        }
        Ok(())
    }

    /// Applies a peer's canonical move, reconciling by ply number.
    ///
    /// Stale and duplicate envelopes are dropped without events. A conflicting
    /// envelope for the local tip ply replaces the local move. Anything that
    /// cannot be placed on the local history is a [`SessionError::Desync`].
    pub fn apply_remote_move(&mut self, envelope: &MoveEnvelope) -> Result<Vec<SessionEvent>, SessionError> {
        let record = &envelope.record;
        let local = self.log.len();
        let desync = |reason: &str| SessionError::Desync {
            ply: record.ply,
            reason: reason.to_string(),
        };

        if record.ply == 0 {
            return Err(desync("ply numbers start at 1"));
        }
        if record.ply < local {
            debug!("Game {}: discarding stale move for ply {}", self.id, record.ply);
            return Ok(Vec::new());
        }

        if record.ply == local {
            let existing = &self.log.moves()[local - 1];
            if existing.fen == record.fen {
                debug!("Game {}: duplicate move for ply {}", self.id, record.ply);
                return Ok(Vec::new());
            }
            if self.status.is_terminal() || existing.color != record.color {
                return Err(desync("conflicting move at the tip of a finished or misaligned history"));
            }
            self.check_claim(&self.log.snapshots()[local - 1], record)?;
            warn!(
                "Game {}: ply {} superseded ({} replaced by {})",
                self.id, record.ply, existing.notation, record.notation
            );
            self.log.jump_to(local - 1);
            self.log.truncate_and_append(record.clone(), record.fen.clone());
        } else if record.ply == local + 1 {
            if self.status.is_terminal() {
                return Err(desync("game already finished locally"));
            }
            if record.color != self.turn() {
                return Err(desync("mover is not the side to move"));
            }
            self.check_claim(self.log.tip_snapshot(), record)?;
            // A live move snaps any history browsing back to the tip
            self.log.jump_to(self.log.tip());
            self.log.append(record.clone(), record.fen.clone())?;
        } else {
            return Err(desync("plies missing before this move"));
        }

        self.clock.set(envelope.clock.white_ms, envelope.clock.black_ms);
        let mut events = vec![SessionEvent::RemoteMoveApplied(record.clone())];
        self.finish(envelope.status.clone(), &mut events);
        events.push(SessionEvent::ActiveChanged(self.active()));
        Ok(events)
    }

    /// Replaces history, status and clock from an authoritative payload.
    ///
    /// Runs regardless of local state. This is the only path through which a
    /// terminal status can be replaced.
    pub fn apply_full_sync(
        &mut self,
        snapshots: Vec<Snapshot>,
        moves: Vec<MoveRecord>,
        status: GameStatus,
        clock: ClockReading,
    ) -> Result<Vec<SessionEvent>, ProtocolError> {
        let tip = moves.len();
        self.log.reset_from(snapshots, moves, tip)?;
        self.clock.set(clock.white_ms, clock.black_ms);
        self.outcome_visible = status.is_terminal();
        self.metadata.result = status.result_token().to_string();
        self.status = status.clone();
        info!("Game {} resynchronized at ply {} ({})", self.id, tip, self.status);

        Ok(vec![
            SessionEvent::HistoryReplaced { plies: tip },
            SessionEvent::StatusChanged(status),
            SessionEvent::ActiveChanged(self.active()),
        ])
    }

    pub fn apply_sync_payload(&mut self, payload: GameSyncPayload) -> Result<Vec<SessionEvent>, ProtocolError> {
        if payload.game_id != self.id {
            return Err(ProtocolError::WrongGame {
                expected: self.id.clone(),
                got: payload.game_id,
            });
        }
        self.apply_full_sync(payload.snapshots, payload.moves, payload.status, payload.clock)
    }

    fn browse(&mut self, cursor: usize) -> Vec<SessionEvent> {
        self.outcome_visible = false;
        vec![
            SessionEvent::CursorMoved(cursor),
            SessionEvent::ActiveChanged(self.active()),
        ]
    }

    pub fn undo(&mut self) -> Vec<SessionEvent> {
        let cursor = self.log.undo();
        self.browse(cursor)
    }

    pub fn redo(&mut self) -> Vec<SessionEvent> {
        let cursor = self.log.redo();
        self.browse(cursor)
    }

    /// None when `index` is past the tip; the cursor does not move then.
    pub fn jump_to(&mut self, index: usize) -> Option<Vec<SessionEvent>> {
        let cursor = self.log.jump_to(index)?;
        Some(self.browse(cursor))
    }

    pub fn resign(&mut self, requestor: &str) -> Result<Vec<SessionEvent>, SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::TerminalState {
                status: self.status.clone(),
            });
        }
        let side = self
            .seats
            .side_of(requestor)
            .ok_or_else(|| SessionError::UnknownParticipant(requestor.to_string()))?;

        let mut events = Vec::new();
        self.finish(GameStatus::Resigned { winner: side.opponent() }, &mut events);
        events.push(SessionEvent::ActiveChanged(None));
        Ok(events)
    }

    /// Burns one clock tick from the running side, declaring a time forfeit at zero.
    pub fn tick(&mut self, elapsed_ms: u64) -> Vec<SessionEvent> {
        let side = match self.active() {
            Some(side) => side,
            None => return Vec::new(),
        };
        let flagged = self.clock.tick(side, elapsed_ms);
        let mut events = vec![SessionEvent::ClockTicked {
            side,
            remaining_ms: self.clock.remaining(side),
        }];
        if flagged {
            self.finish(GameStatus::TimeUp { winner: side.opponent() }, &mut events);
            events.push(SessionEvent::ActiveChanged(None));
        }
        events
    }

    /// Gives up on a session whose resynchronization keeps failing.
    pub fn abandon(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.finish(GameStatus::Abandoned, &mut events);
        if !events.is_empty() {
            events.push(SessionEvent::ActiveChanged(None));
        }
        events
    }

    pub fn clock_reading(&self) -> ClockReading {
        self.clock.reading(self.active())
    }

    pub fn move_envelope(&self, record: &MoveRecord, player_id: &str) -> MoveEnvelope {
        MoveEnvelope {
            game_id: self.id.clone(),
            player_id: player_id.to_string(),
            record: record.clone(),
            clock: self.clock_reading(),
            status: self.status.clone(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn sync_payload(&self) -> GameSyncPayload {
        GameSyncPayload {
            game_id: self.id.clone(),
            snapshots: self.log.snapshots().to_vec(),
            moves: self.log.moves().to_vec(),
            status: self.status.clone(),
            clock: self.clock_reading(),
        }
    }

    pub fn persisted_record(&self) -> PersistedRecord {
        PersistedRecord {
            game_id: self.id.clone(),
            snapshots: self.log.snapshots().to_vec(),
            moves: self.log.moves().to_vec(),
            cursor: self.log.cursor(),
            clock: self.clock_reading(),
            status: self.status.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Loads a saved record through the full-sync path, then restores its cursor.
    pub fn restore(&mut self, record: PersistedRecord) -> Result<Vec<SessionEvent>, ProtocolError> {
        let cursor = record.cursor;
        self.metadata = record.metadata;
        let mut events = self.apply_full_sync(record.snapshots, record.moves, record.status, record.clock)?;
        if cursor != self.log.tip() {
            let browsed = self
                .jump_to(cursor)
                .ok_or_else(|| ProtocolError::InvalidPayload(format!("cursor {} beyond tip", cursor)))?;
            events.extend(browsed);
        }
        Ok(events)
    }

    pub fn export_pgn(&self) -> String {
        let mut metadata = self.metadata.clone();
        metadata.result = self.status.result_token().to_string();
        let sans: Vec<String> = self.log.moves().iter().map(|m| m.notation.clone()).collect();
        notation::encode(&metadata, &sans)
    }

    /// Rebuilds history from a PGN text by replaying every move through the
    /// rules engine, then installs it through the full-sync path.
    pub fn import_pgn(&mut self, text: &str) -> Result<Vec<SessionEvent>, NotationError> {
        let game = notation::decode(text)?;

        let mut position = self.rules.initial_position();
        let mut snapshots = vec![position.clone()];
        let mut moves = Vec::with_capacity(game.moves.len());
        let mut status = GameStatus::InProgress;
        for (index, san) in game.moves.iter().enumerate() {
            let replay = |source| NotationError::Replay {
                ply: index + 1,
                san: san.clone(),
                source,
            };
            let color = self.rules.side_to_move(&position).map_err(replay)?;
            let request = self.rules.parse_notation(&position, san).map_err(replay)?;
            let applied = self.rules.apply_move(&position, &request).map_err(replay)?;
            moves.push(self.record_for(index + 1, color, &request, &applied));
            status = GameStatus::from_verdict(&applied.verdict);
            position = applied.position;
            snapshots.push(position.clone());
        }

        // Results decided off the board (resignation, agreement) only live in the tags
        if !status.is_terminal() {
            status = match game.metadata.result.as_str() {
                "1-0" => GameStatus::Resigned { winner: Side::White },
                "0-1" => GameStatus::Resigned { winner: Side::Black },
                "1/2-1/2" => GameStatus::Draw {
                    reason: "agreement".to_string(),
                },
                _ => GameStatus::InProgress,
            };
        }

        let fresh = ClockState::new(self.time_control).reading(None);
        self.metadata = game.metadata;
        self.apply_full_sync(snapshots, moves, status, fresh)
            .map_err(|e| NotationError::Inconsistent(e.to_string()))
    }
}
