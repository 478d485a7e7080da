use thiserror::Error;

use crate::game::session::GameStatus;
use crate::game::Side;

/// Rejections produced by the rules engine adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("invalid square: {0}")]
    InvalidSquare(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("no piece on {0}")]
    EmptySquare(String),

    #[error("illegal move {from}-{to}")]
    IllegalMove { from: String, to: String },

    #[error("unrecognised move notation: {0}")]
    UnknownNotation(String),
}

/// Local, non-fatal rejections returned to whoever drove the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("{participant} may not move now (active: {active:?})")]
    Authority {
        participant: String,
        active: Option<Side>,
    },

    #[error("illegal move: {0}")]
    IllegalMove(#[from] RulesError),

    #[error("cannot move while browsing history (cursor {cursor}, tip {tip})")]
    StaleCursor { cursor: usize, tip: usize },

    #[error("game already finished: {status}")]
    TerminalState { status: GameStatus },

    #[error("history diverged at ply {ply}: {reason}")]
    Desync { ply: usize, reason: String },

    #[error("participant {0} holds no seat in this game")]
    UnknownParticipant(String),
}

/// Malformed or unexpected wire messages. Logged and dropped, never fatal.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no type discriminator")]
    MissingType,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("message for game {got} received in game {expected}")]
    WrongGame { expected: String, got: String },
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed by relay")]
    Closed,

    #[error("gave up after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotationError {
    #[error("malformed tag pair: {0}")]
    MalformedHeader(String),

    #[error("game record contains no moves and no result")]
    EmptyGame,

    #[error("move {ply} ({san}) cannot be replayed: {source}")]
    Replay {
        ply: usize,
        san: String,
        #[source]
        source: RulesError,
    },

    #[error("replayed game is inconsistent: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("saved games file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("saved games file is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no saved game at index {0}")]
    NotFound(usize),

    #[error("saved game is inconsistent: {0}")]
    Invalid(String),
}

/// Join and routing failures on the relay side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Room is full")]
    RoomFull { game_id: String },

    #[error("Not in a game")]
    NotJoined,

    #[error("Game not found")]
    UnknownGame(String),

    #[error("{0}")]
    Rejected(#[from] SessionError),
}
