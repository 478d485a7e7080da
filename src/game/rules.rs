//! Rules engine seam.
//!
//! The session never decides chess legality itself; it asks a [`RulesEngine`].
//! [`ChessRules`] is the production implementation on top of the `chess` crate,
//! using FEN strings as position snapshots and SAN for move notation.

use chess::{Board, BoardStatus, ChessMove, MoveGen, Piece, Square};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RulesError;
use crate::game::utils::has_insufficient_material;
use crate::game::{MoveRequest, Promotion, Side, Snapshot};

/// A destination square reachable from a selected piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub square: String,
    pub capture: bool,
    pub promotion: bool,
}

/// What the position after a move means for the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    None,
    Checkmate { winner: Side },
    Stalemate,
    Draw { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub position: Snapshot,
    pub notation: String,
    pub captured: bool,
    pub in_check: bool,
    pub verdict: Verdict,
}

/// Pure chess rules. Implementations must not keep state between calls.
pub trait RulesEngine: Send + Sync {
    fn initial_position(&self) -> Snapshot;

    fn side_to_move(&self, position: &Snapshot) -> Result<Side, RulesError>;

    fn legal_targets(&self, position: &Snapshot, square: &str) -> Result<Vec<Target>, RulesError>;

    /// Applies `request` to `position`, rejecting illegal input without side effects.
    fn apply_move(&self, position: &Snapshot, request: &MoveRequest) -> Result<AppliedMove, RulesError>;

    /// Resolves a notation token (SAN or coordinate) against `position`.
    fn parse_notation(&self, position: &Snapshot, notation: &str) -> Result<MoveRequest, RulesError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChessRules;

impl ChessRules {
    pub fn new() -> Self {
        ChessRules
    }

    pub fn board(position: &Snapshot) -> Result<Board, RulesError> {
        Board::from_str(position.as_str())
            .map_err(|_| RulesError::InvalidPosition(position.to_string()))
    }

    fn square(name: &str) -> Result<Square, RulesError> {
        Square::from_str(&name.to_lowercase()).map_err(|_| RulesError::InvalidSquare(name.to_string()))
    }

    fn find_legal(board: &Board, request: &MoveRequest) -> Result<ChessMove, RulesError> {
        let from = Self::square(&request.from)?;
        let to = Self::square(&request.to)?;
        let illegal = || RulesError::IllegalMove {
            from: request.from.clone(),
            to: request.to.clone(),
        };

        let candidates: Vec<ChessMove> = MoveGen::new_legal(board)
            .filter(|m| m.get_source() == from && m.get_dest() == to)
            .collect();

        match request.promotion {
            Some(promotion) => {
                let piece = Piece::from(promotion);
                candidates
                    .into_iter()
                    .find(|m| m.get_promotion() == Some(piece))
                    .ok_or_else(illegal)
            }
            // Promotion defaults to a queen when the caller did not choose
            None => candidates
                .iter()
                .find(|m| m.get_promotion().is_none())
                .or_else(|| candidates.iter().find(|m| m.get_promotion() == Some(Piece::Queen)))
                .copied()
                .ok_or_else(illegal),
        }
    }

    fn request_for(mv: ChessMove) -> MoveRequest {
        let promotion = mv.get_promotion().and_then(|piece| match piece {
            Piece::Queen => Some(Promotion::Queen),
            Piece::Rook => Some(Promotion::Rook),
            Piece::Bishop => Some(Promotion::Bishop),
            Piece::Knight => Some(Promotion::Knight),
            _ => None,
        });
        MoveRequest {
            from: mv.get_source().to_string(),
            to: mv.get_dest().to_string(),
            promotion,
        }
    }
}

impl RulesEngine for ChessRules {
    fn initial_position(&self) -> Snapshot {
        Snapshot::new(Board::default().to_string())
    }

    fn side_to_move(&self, position: &Snapshot) -> Result<Side, RulesError> {
        Ok(Self::board(position)?.side_to_move().into())
    }

    fn legal_targets(&self, position: &Snapshot, square: &str) -> Result<Vec<Target>, RulesError> {
        let board = Self::board(position)?;
        let from = Self::square(square)?;
        if board.piece_on(from).is_none() {
            return Err(RulesError::EmptySquare(square.to_string()));
        }

        let mut targets: Vec<Target> = Vec::new();
        for mv in MoveGen::new_legal(&board).filter(|m| m.get_source() == from) {
            let name = mv.get_dest().to_string();
            // Promotions yield one move per piece; report the square once
            if targets.iter().any(|t| t.square == name) {
                continue;
            }
            targets.push(Target {
                square: name,
                capture: is_capture(&board, mv),
                promotion: mv.get_promotion().is_some(),
            });
        }
        Ok(targets)
    }

    fn apply_move(&self, position: &Snapshot, request: &MoveRequest) -> Result<AppliedMove, RulesError> {
        let board = Self::board(position)?;
        let mv = Self::find_legal(&board, request)?;
        let mover: Side = board.side_to_move().into();
        let after = board.make_move_new(mv);

        Ok(AppliedMove {
            position: Snapshot::new(after.to_string()),
            notation: san(&board, mv),
            captured: is_capture(&board, mv),
            in_check: after.checkers().popcnt() > 0,
            verdict: verdict(&after, mover),
        })
    }

    fn parse_notation(&self, position: &Snapshot, notation: &str) -> Result<MoveRequest, RulesError> {
        let board = Self::board(position)?;
        let wanted = normalize_san(notation);

        if let Some(mv) = MoveGen::new_legal(&board).find(|m| normalize_san(&san(&board, *m)) == wanted) {
            return Ok(Self::request_for(mv));
        }

        // Fall back to coordinate notation (e2e4, e7e8q)
        if let Some(request) = MoveRequest::parse_coordinate(notation) {
            if let Ok(mv) = Self::find_legal(&board, &request) {
                return Ok(Self::request_for(mv));
            }
        }

        Err(RulesError::UnknownNotation(notation.to_string()))
    }
}

fn normalize_san(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c| matches!(c, '+' | '#' | '!' | '?'))
        .replace('0', "O")
}

fn is_capture(board: &Board, mv: ChessMove) -> bool {
    if board.piece_on(mv.get_dest()).is_some() {
        return true;
    }
    // En passant: a pawn changing file onto an empty square
    board.piece_on(mv.get_source()) == Some(Piece::Pawn)
        && mv.get_source().get_file() != mv.get_dest().get_file()
}

fn verdict(after: &Board, mover: Side) -> Verdict {
    match after.status() {
        BoardStatus::Checkmate => Verdict::Checkmate { winner: mover },
        BoardStatus::Stalemate => Verdict::Stalemate,
        BoardStatus::Ongoing if has_insufficient_material(after) => Verdict::Draw {
            reason: "insufficient material".to_string(),
        },
        BoardStatus::Ongoing => Verdict::None,
    }
}

fn piece_letter(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "",
        Piece::Knight => "N",
        Piece::Bishop => "B",
        Piece::Rook => "R",
        Piece::Queen => "Q",
        Piece::King => "K",
    }
}

fn file_char(square: Square) -> char {
    (b'a' + square.get_file().to_index() as u8) as char
}

fn rank_char(square: Square) -> char {
    (b'1' + square.get_rank().to_index() as u8) as char
}

/// Standard algebraic notation for a legal `mv` on `board`.
pub fn san(board: &Board, mv: ChessMove) -> String {
    let source = mv.get_source();
    let dest = mv.get_dest();
    let piece = board.piece_on(source).unwrap_or(Piece::Pawn);
    let capture = is_capture(board, mv);

    let mut text = String::new();
    let file_gap = source.get_file().to_index() as i32 - dest.get_file().to_index() as i32;
    if piece == Piece::King && file_gap.abs() == 2 {
        text.push_str(if file_gap < 0 { "O-O" } else { "O-O-O" });
    } else if piece == Piece::Pawn {
        if capture {
            text.push(file_char(source));
            text.push('x');
        }
        text.push_str(&dest.to_string());
        if let Some(promoted) = mv.get_promotion() {
            text.push('=');
            text.push_str(piece_letter(promoted));
        }
    } else {
        text.push_str(piece_letter(piece));

        let rivals: Vec<Square> = MoveGen::new_legal(board)
            .filter(|m| {
                m.get_dest() == dest && m.get_source() != source && board.piece_on(m.get_source()) == Some(piece)
            })
            .map(|m| m.get_source())
            .collect();
        if !rivals.is_empty() {
            let file_clash = rivals.iter().any(|s| s.get_file() == source.get_file());
            let rank_clash = rivals.iter().any(|s| s.get_rank() == source.get_rank());
            if !file_clash {
                text.push(file_char(source));
            } else if !rank_clash {
                text.push(rank_char(source));
            } else {
                text.push(file_char(source));
                text.push(rank_char(source));
            }
        }

        if capture {
            text.push('x');
        }
        text.push_str(&dest.to_string());
    }

    let after = board.make_move_new(mv);
    if after.status() == BoardStatus::Checkmate {
        text.push('#');
    } else if after.checkers().popcnt() > 0 {
        text.push('+');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(rules: &ChessRules, moves: &[&str]) -> Snapshot {
        let mut position = rules.initial_position();
        for mv in moves {
            let request = MoveRequest::parse_coordinate(mv).unwrap();
            position = rules.apply_move(&position, &request).unwrap().position;
        }
        position
    }

    #[test]
    fn test_opening_move() {
        let rules = ChessRules::new();
        let start = rules.initial_position();
        let applied = rules
            .apply_move(&start, &MoveRequest::new("e2", "e4", None))
            .unwrap();

        assert_eq!(applied.notation, "e4");
        assert!(!applied.captured);
        assert!(!applied.in_check);
        assert_eq!(applied.verdict, Verdict::None);
        assert!(applied
            .position
            .as_str()
            .starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"));
        assert_eq!(rules.side_to_move(&applied.position).unwrap(), Side::Black);
    }

    #[test]
    fn test_illegal_move_rejected() {
        let rules = ChessRules::new();
        let start = rules.initial_position();
        let err = rules
            .apply_move(&start, &MoveRequest::new("e2", "e5", None))
            .unwrap_err();
        assert!(matches!(err, RulesError::IllegalMove { .. }));

        let err = rules
            .apply_move(&start, &MoveRequest::new("z9", "e5", None))
            .unwrap_err();
        assert!(matches!(err, RulesError::InvalidSquare(_)));
    }

    #[test]
    fn test_scholars_mate_verdict() {
        let rules = ChessRules::new();
        let position = play(&rules, &["e2e4", "e7e5", "f1c4", "b8c6", "d1h5", "g8f6"]);
        let applied = rules
            .apply_move(&position, &MoveRequest::new("h5", "f7", None))
            .unwrap();

        assert_eq!(applied.notation, "Qxf7#");
        assert!(applied.captured);
        assert!(applied.in_check);
        assert_eq!(applied.verdict, Verdict::Checkmate { winner: Side::White });
    }

    #[test]
    fn test_legal_targets() {
        let rules = ChessRules::new();
        let start = rules.initial_position();
        let mut targets: Vec<String> = rules
            .legal_targets(&start, "g1")
            .unwrap()
            .into_iter()
            .map(|t| t.square)
            .collect();
        targets.sort();
        assert_eq!(targets, vec!["f3".to_string(), "h3".to_string()]);

        assert_eq!(
            rules.legal_targets(&start, "e4").unwrap_err(),
            RulesError::EmptySquare("e4".to_string())
        );
    }

    #[test]
    fn test_san_castling_and_disambiguation() {
        let rules = ChessRules::new();
        let position = play(&rules, &["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6"]);
        let castle = rules
            .apply_move(&position, &MoveRequest::new("e1", "g1", None))
            .unwrap();
        assert_eq!(castle.notation, "O-O");

        // Knights on b1 and f3 can both reach d2 once the pawn has moved
        let position = Snapshot::new("4k3/8/8/8/8/5N2/8/1N2K3 w - - 0 1");
        let applied = rules
            .apply_move(&position, &MoveRequest::new("b1", "d2", None))
            .unwrap();
        assert_eq!(applied.notation, "Nbd2");
    }

    #[test]
    fn test_promotion_defaults_to_queen() {
        let rules = ChessRules::new();
        let position = Snapshot::new("8/4P3/8/8/8/k7/8/4K3 w - - 0 1");
        let applied = rules
            .apply_move(&position, &MoveRequest::new("e7", "e8", None))
            .unwrap();
        assert_eq!(applied.notation, "e8=Q");

        let applied = rules
            .apply_move(&position, &MoveRequest::new("e7", "e8", Some(Promotion::Knight)))
            .unwrap();
        assert_eq!(applied.notation, "e8=N");
    }

    #[test]
    fn test_parse_notation() {
        let rules = ChessRules::new();
        let start = rules.initial_position();
        assert_eq!(
            rules.parse_notation(&start, "Nf3").unwrap(),
            MoveRequest::new("g1", "f3", None)
        );
        assert_eq!(
            rules.parse_notation(&start, "d2d4").unwrap(),
            MoveRequest::new("d2", "d4", None)
        );
        assert!(matches!(
            rules.parse_notation(&start, "Qh5"),
            Err(RulesError::UnknownNotation(_))
        ));
    }
}
