use chess::{Board, Color, Piece, ALL_SQUARES};
use serde::Serialize;

use crate::game::Side;

/// Convert a side to its wire/display name
pub fn side_to_string(side: Side) -> String {
    match side {
        Side::White => "white".to_string(),
        Side::Black => "black".to_string(),
    }
}

/// Parse a wire color name
pub fn side_from_str(name: &str) -> Option<Side> {
    match name.to_ascii_lowercase().as_str() {
        "white" | "w" => Some(Side::White),
        "black" | "b" => Some(Side::Black),
        _ => None,
    }
}

const COUNTED: [Piece; 5] = [Piece::Pawn, Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen];

fn piece_index(piece: Piece) -> Option<usize> {
    COUNTED.iter().position(|p| *p == piece)
}

fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 1,
        Piece::Knight | Piece::Bishop => 3,
        Piece::Rook => 5,
        Piece::Queen => 9,
        Piece::King => 0,
    }
}

/// Non-king piece counts per color, indexed like `COUNTED`
fn count_pieces(board: &Board) -> ([u32; 5], [u32; 5]) {
    let mut white = [0; 5];
    let mut black = [0; 5];
    for square in ALL_SQUARES {
        if let (Some(piece), Some(color)) = (board.piece_on(square), board.color_on(square)) {
            if let Some(index) = piece_index(piece) {
                match color {
                    Color::White => white[index] += 1,
                    Color::Black => black[index] += 1,
                }
            }
        }
    }
    (white, black)
}

/// Check if the board has insufficient material for checkmate
pub fn has_insufficient_material(board: &Board) -> bool {
    let (white, black) = count_pieces(board);

    // Pawns, rooks or queens on either side can always force mate
    let heavy = |counts: &[u32; 5]| counts[0] + counts[3] + counts[4];
    if heavy(&white) > 0 || heavy(&black) > 0 {
        return false;
    }

    let minors = |counts: &[u32; 5]| counts[1] + counts[2];
    let (white_minors, black_minors) = (minors(&white), minors(&black));

    // King vs king, or king and one minor piece vs bare king
    if white_minors + black_minors <= 1 {
        return true;
    }

    // King and bishop vs king and bishop with both bishops on the same square color
    if white[2] == 1 && black[2] == 1 && white[1] == 0 && black[1] == 0 {
        let mut shades = ALL_SQUARES.iter().filter_map(|square| match board.piece_on(*square) {
            Some(Piece::Bishop) => Some((square.get_rank().to_index() + square.get_file().to_index()) % 2),
            _ => None,
        });
        return shades.next() == shades.next();
    }

    false
}

/// Pieces each side has taken from the other, plus who is ahead on material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialSummary {
    /// Black pieces captured by white, as `[pawns, knights, bishops, rooks, queens]`
    pub white_captured: [u32; 5],
    /// White pieces captured by black
    pub black_captured: [u32; 5],
    pub white_advantage: i32,
    pub black_advantage: i32,
}

pub fn material_summary(board: &Board) -> MaterialSummary {
    const STARTING: [u32; 5] = [8, 2, 2, 2, 1];
    let (white, black) = count_pieces(board);

    let mut white_captured = [0; 5];
    let mut black_captured = [0; 5];
    let mut net = 0;
    for (index, piece) in COUNTED.iter().enumerate() {
        // Promotions can push a count above the starting complement
        white_captured[index] = STARTING[index].saturating_sub(black[index]);
        black_captured[index] = STARTING[index].saturating_sub(white[index]);
        net += (white_captured[index] as i32 - black_captured[index] as i32) * piece_value(*piece);
    }

    MaterialSummary {
        white_captured,
        black_captured,
        white_advantage: net.max(0),
        black_advantage: (-net).max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_side_names() {
        assert_eq!(side_to_string(Side::White), "white");
        assert_eq!(side_from_str("Black"), Some(Side::Black));
        assert_eq!(side_from_str("w"), Some(Side::White));
        assert_eq!(side_from_str("green"), None);
    }

    #[test]
    fn test_insufficient_material() {
        let bare_kings = Board::from_str("8/8/4k3/8/8/3K4/8/8 w - - 0 1").unwrap();
        assert!(has_insufficient_material(&bare_kings));

        let king_knight = Board::from_str("8/8/4k3/8/8/3K4/5N2/8 w - - 0 1").unwrap();
        assert!(has_insufficient_material(&king_knight));

        let king_rook = Board::from_str("8/8/4k3/8/8/3K4/5R2/8 w - - 0 1").unwrap();
        assert!(!has_insufficient_material(&king_rook));

        // Bishops on c1 and f8 both stand on dark squares
        let same_shade = Board::from_str("5b2/8/4k3/8/8/3K4/8/2B5 w - - 0 1").unwrap();
        assert!(has_insufficient_material(&same_shade));

        let opposite_shade = Board::from_str("2b5/8/4k3/8/8/3K4/8/2B5 w - - 0 1").unwrap();
        assert!(!has_insufficient_material(&opposite_shade));

        assert!(!has_insufficient_material(&Board::default()));
    }

    #[test]
    fn test_material_summary() {
        let start = material_summary(&Board::default());
        assert_eq!(start.white_captured, [0; 5]);
        assert_eq!(start.white_advantage, 0);

        // Black is missing its queen, white is missing a pawn
        let board =
            Board::from_str("rnb1kbnr/pppppppp/8/8/8/8/PPPP1PPP/RNBQKBNR w KQkq - 0 1").unwrap();
        let summary = material_summary(&board);
        assert_eq!(summary.white_captured, [0, 0, 0, 0, 1]);
        assert_eq!(summary.black_captured, [1, 0, 0, 0, 0]);
        assert_eq!(summary.white_advantage, 8);
        assert_eq!(summary.black_advantage, 0);
    }
}
