use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, SessionError};
use crate::game::{Promotion, Side, Snapshot};

/// One accepted half-move. Created once by whichever proposal became canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    /// 1-based half-move number
    pub ply: usize,
    pub color: Side,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<Promotion>,
    pub fen: Snapshot,
    pub notation: String,
    pub captured: bool,
    pub check: bool,
}

/// Position history with a viewing cursor.
///
/// `snapshots[0]` is the initial position and `snapshots.len() == moves.len() + 1`.
/// New moves are only accepted with the cursor on the tip; a cursor behind the
/// tip means the history is being browsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveLog {
    snapshots: Vec<Snapshot>,
    moves: Vec<MoveRecord>,
    cursor: usize,
}

impl MoveLog {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            snapshots: vec![initial],
            moves: Vec::new(),
            cursor: 0,
        }
    }

    pub fn tip(&self) -> usize {
        self.snapshots.len() - 1
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_at_tip(&self) -> bool {
        self.cursor == self.tip()
    }

    /// Number of half-moves played.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    /// Snapshot under the cursor.
    pub fn current(&self) -> &Snapshot {
        &self.snapshots[self.cursor]
    }

    pub fn tip_snapshot(&self) -> &Snapshot {
        &self.snapshots[self.tip()]
    }

    pub fn last_move(&self) -> Option<&MoveRecord> {
        self.moves.last()
    }

    pub fn append(&mut self, record: MoveRecord, snapshot: Snapshot) -> Result<usize, SessionError> {
        if !self.is_at_tip() {
            return Err(SessionError::StaleCursor {
                cursor: self.cursor,
                tip: self.tip(),
            });
        }
        Ok(self.push(record, snapshot))
    }

    /// Drops everything after the cursor, then appends. The abandoned future is gone.
    pub fn truncate_and_append(&mut self, record: MoveRecord, snapshot: Snapshot) -> usize {
        self.snapshots.truncate(self.cursor + 1);
        self.moves.truncate(self.cursor);
        self.push(record, snapshot)
    }

    fn push(&mut self, record: MoveRecord, snapshot: Snapshot) -> usize {
        debug_assert_eq!(record.fen, snapshot);
        self.moves.push(record);
        self.snapshots.push(snapshot);
        self.cursor = self.tip();
        self.cursor
    }

    /// Steps back one position; a no-op at the start.
    pub fn undo(&mut self) -> usize {
        self.cursor = self.cursor.saturating_sub(1);
        self.cursor
    }

    /// Steps forward one position; a no-op at the tip.
    pub fn redo(&mut self) -> usize {
        self.cursor = (self.cursor + 1).min(self.tip());
        self.cursor
    }

    pub fn jump_to(&mut self, index: usize) -> Option<usize> {
        if index > self.tip() {
            return None;
        }
        self.cursor = index;
        Some(index)
    }

    /// Wholesale replacement used by full resynchronization.
    pub fn reset_from(
        &mut self,
        snapshots: Vec<Snapshot>,
        moves: Vec<MoveRecord>,
        cursor: usize,
    ) -> Result<(), ProtocolError> {
        if snapshots.len() != moves.len() + 1 {
            return Err(ProtocolError::InvalidPayload(format!(
                "{} snapshots for {} moves",
                snapshots.len(),
                moves.len()
            )));
        }
        if cursor >= snapshots.len() {
            return Err(ProtocolError::InvalidPayload(format!(
                "cursor {} beyond tip {}",
                cursor,
                snapshots.len() - 1
            )));
        }
        if let Some((index, _)) = moves
            .iter()
            .enumerate()
            .find(|(index, record)| record.ply != index + 1 || record.fen != snapshots[index + 1])
        {
            return Err(ProtocolError::InvalidPayload(format!(
                "move {} does not match its snapshot",
                index + 1
            )));
        }

        self.snapshots = snapshots;
        self.moves = moves;
        self.cursor = cursor;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ply: usize, fen: &str) -> MoveRecord {
        MoveRecord {
            ply,
            color: Side::to_move_after(ply - 1),
            from: "a1".to_string(),
            to: "a2".to_string(),
            promotion: None,
            fen: Snapshot::new(fen),
            notation: format!("m{}", ply),
            captured: false,
            check: false,
        }
    }

    fn log_with(count: usize) -> MoveLog {
        let mut log = MoveLog::new(Snapshot::new("p0"));
        for ply in 1..=count {
            let fen = format!("p{}", ply);
            log.append(record(ply, &fen), Snapshot::new(fen)).unwrap();
        }
        log
    }

    #[test]
    fn test_new_log_is_at_tip() {
        let log = MoveLog::new(Snapshot::new("p0"));
        assert_eq!(log.tip(), 0);
        assert_eq!(log.cursor(), 0);
        assert!(log.is_at_tip());
        assert!(log.is_empty());
    }

    #[test]
    fn test_append_advances_cursor() {
        let log = log_with(3);
        assert_eq!(log.len(), 3);
        assert_eq!(log.snapshots().len(), 4);
        assert_eq!(log.cursor(), 3);
        assert_eq!(log.current().as_str(), "p3");
    }

    #[test]
    fn test_append_rejected_off_tip() {
        let mut log = log_with(3);
        log.undo();
        let err = log
            .append(record(4, "p4"), Snapshot::new("p4"))
            .unwrap_err();
        assert_eq!(err, SessionError::StaleCursor { cursor: 2, tip: 3 });
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_undo_redo_clamped() {
        let mut log = log_with(2);
        assert_eq!(log.redo(), 2);
        assert_eq!(log.undo(), 1);
        assert_eq!(log.undo(), 0);
        assert_eq!(log.undo(), 0);
        assert_eq!(log.redo(), 1);
    }

    #[test]
    fn test_undo_redo_inverse() {
        let mut log = log_with(5);
        for cursor in 1..5 {
            log.jump_to(cursor).unwrap();
            let before = log.current().clone();
            log.undo();
            log.redo();
            assert_eq!(log.cursor(), cursor);
            assert_eq!(log.current(), &before);
        }
    }

    #[test]
    fn test_truncate_and_append_drops_future() {
        let mut log = log_with(5);
        log.jump_to(2).unwrap();
        let tip = log.truncate_and_append(record(3, "branch"), Snapshot::new("branch"));
        assert_eq!(tip, 3);
        assert_eq!(log.len(), 3);
        assert_eq!(log.tip_snapshot().as_str(), "branch");
        assert!(log.is_at_tip());
    }

    #[test]
    fn test_jump_to_out_of_range() {
        let mut log = log_with(2);
        assert_eq!(log.jump_to(7), None);
        assert_eq!(log.cursor(), 2);
        assert_eq!(log.jump_to(0), Some(0));
    }

    #[test]
    fn test_reset_from_validates_shape() {
        let mut log = log_with(1);
        let source = log_with(3);

        let err = log
            .reset_from(source.snapshots()[..2].to_vec(), source.moves().to_vec(), 1)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload(_)));
        assert_eq!(log.len(), 1);

        log.reset_from(source.snapshots().to_vec(), source.moves().to_vec(), 3)
            .unwrap();
        assert_eq!(log, source);
    }
}
