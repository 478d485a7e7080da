use serde::{Deserialize, Serialize};

use crate::game::notation::GameMetadata;
use crate::game::{ClockReading, GameStatus, MoveRecord, Snapshot};

/// Everything needed to rebuild a session locally, cursor included.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub game_id: String,
    pub snapshots: Vec<Snapshot>,
    pub moves: Vec<MoveRecord>,
    pub cursor: usize,
    pub clock: ClockReading,
    pub status: GameStatus,
    pub metadata: GameMetadata,
}

impl PersistedRecord {
    /// Cheap shape check before the record is handed to a session.
    pub fn is_consistent(&self) -> bool {
        self.snapshots.len() == self.moves.len() + 1 && self.cursor < self.snapshots.len()
    }
}
