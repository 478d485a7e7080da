pub mod clock;
pub mod move_log;
pub mod notation;
pub mod rules;
pub mod session;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use clock::{ClockReading, ClockScheduler, ClockState, TimeControl};
pub use move_log::{MoveLog, MoveRecord};
pub use rules::{AppliedMove, ChessRules, RulesEngine, Target, Verdict};
pub use session::{GameSession, GameStatus, SessionEvent};

/// One of the two seats at the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Side to move after `plies` half-moves from the standard start.
    pub fn to_move_after(plies: usize) -> Side {
        if plies % 2 == 0 {
            Side::White
        } else {
            Side::Black
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&utils::side_to_string(*self))
    }
}

impl From<chess::Color> for Side {
    fn from(color: chess::Color) -> Self {
        match color {
            chess::Color::White => Side::White,
            chess::Color::Black => Side::Black,
        }
    }
}

impl From<Side> for chess::Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => chess::Color::White,
            Side::Black => chess::Color::Black,
        }
    }
}

/// Serialized board state (FEN). Produced by the rules engine, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn new(fen: impl Into<String>) -> Self {
        Snapshot(fen.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Promotion {
    #[serde(rename = "q")]
    Queen,
    #[serde(rename = "r")]
    Rook,
    #[serde(rename = "b")]
    Bishop,
    #[serde(rename = "n")]
    Knight,
}

impl Promotion {
    pub fn from_letter(letter: char) -> Option<Promotion> {
        match letter.to_ascii_lowercase() {
            'q' => Some(Promotion::Queen),
            'r' => Some(Promotion::Rook),
            'b' => Some(Promotion::Bishop),
            'n' => Some(Promotion::Knight),
            _ => None,
        }
    }
}

impl From<Promotion> for chess::Piece {
    fn from(promotion: Promotion) -> Self {
        match promotion {
            Promotion::Queen => chess::Piece::Queen,
            Promotion::Rook => chess::Piece::Rook,
            Promotion::Bishop => chess::Piece::Bishop,
            Promotion::Knight => chess::Piece::Knight,
        }
    }
}

/// A move as a participant asks for it, before the rules engine has seen it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<Promotion>,
}

impl MoveRequest {
    pub fn new(from: &str, to: &str, promotion: Option<Promotion>) -> Self {
        Self {
            from: from.to_lowercase(),
            to: to.to_lowercase(),
            promotion,
        }
    }

    /// Parses coordinate notation such as `e2e4` or `e7e8q`.
    pub fn parse_coordinate(text: &str) -> Option<MoveRequest> {
        let text = text.trim();
        if !text.is_ascii() || !(text.len() == 4 || text.len() == 5) {
            return None;
        }
        let promotion = match text.chars().nth(4) {
            Some(letter) => Some(Promotion::from_letter(letter)?),
            None => None,
        };
        Some(MoveRequest::new(&text[0..2], &text[2..4], promotion))
    }
}
