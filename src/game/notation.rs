//! PGN import and export.
//!
//! The codec only deals in text: tags and SAN tokens. Positions are never
//! read from a game record; callers replay the moves through a rules engine.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::NotationError;

const RESULTS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];
const LINE_WIDTH: usize = 80;

/// The seven tag roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: String,
    pub white: String,
    pub black: String,
    pub result: String,
}

impl Default for GameMetadata {
    fn default() -> Self {
        Self {
            event: "Casual Game".to_string(),
            site: "Chess Sync".to_string(),
            date: Local::now().format("%Y.%m.%d").to_string(),
            round: "1".to_string(),
            white: "White Player".to_string(),
            black: "Black Player".to_string(),
            result: "*".to_string(),
        }
    }
}

impl GameMetadata {
    fn tags(&self) -> [(&'static str, &str); 7] {
        [
            ("Event", self.event.as_str()),
            ("Site", self.site.as_str()),
            ("Date", self.date.as_str()),
            ("Round", self.round.as_str()),
            ("White", self.white.as_str()),
            ("Black", self.black.as_str()),
            ("Result", self.result.as_str()),
        ]
    }

    fn set_tag(&mut self, name: &str, value: String) {
        match name {
            "Event" => self.event = value,
            "Site" => self.site = value,
            "Date" => self.date = value,
            "Round" => self.round = value,
            "White" => self.white = value,
            "Black" => self.black = value,
            "Result" => self.result = value,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedGame {
    pub metadata: GameMetadata,
    /// SAN tokens in play order
    pub moves: Vec<String>,
}

pub fn encode(metadata: &GameMetadata, moves: &[String]) -> String {
    let mut out = String::new();
    for (name, value) in metadata.tags() {
        out.push_str(&format!("[{} \"{}\"]\n", name, value.replace('"', "'")));
    }
    out.push('\n');

    let mut tokens = Vec::with_capacity(moves.len() + moves.len() / 2 + 1);
    for (index, san) in moves.iter().enumerate() {
        if index % 2 == 0 {
            tokens.push(format!("{}.", index / 2 + 1));
        }
        tokens.push(san.clone());
    }
    tokens.push(metadata.result.clone());

    let mut line = String::new();
    for token in tokens {
        if !line.is_empty() && line.len() + 1 + token.len() > LINE_WIDTH {
            out.push_str(&line);
            out.push('\n');
            line.clear();
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&token);
    }
    out.push_str(&line);
    out.push('\n');
    out
}

fn parse_tag(line: &str) -> Result<(String, String), NotationError> {
    let malformed = || NotationError::MalformedHeader(line.to_string());
    let inner = line
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(malformed)?;
    let (name, value) = inner.trim().split_once(char::is_whitespace).ok_or_else(malformed)?;
    let value = value
        .trim()
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(malformed)?;
    Ok((name.to_string(), value.to_string()))
}

/// Removes `{...}` comments, `;` line comments and `(...)` variations.
fn strip_commentary(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut braces = false;
    let mut depth = 0usize;
    for line in body.lines() {
        for c in line.chars() {
            match c {
                '{' if depth == 0 => braces = true,
                '}' if braces => braces = false,
                _ if braces => {}
                ';' if depth == 0 => break,
                '(' => depth += 1,
                ')' if depth > 0 => depth -= 1,
                _ if depth > 0 => {}
                _ => out.push(c),
            }
        }
        out.push(' ');
    }
    out
}

pub fn decode(text: &str) -> Result<DecodedGame, NotationError> {
    let mut metadata = GameMetadata::default();
    let mut body = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            let (name, value) = parse_tag(trimmed)?;
            metadata.set_tag(&name, value);
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }

    let mut moves = Vec::new();
    let mut saw_result = false;
    for token in strip_commentary(&body).split_whitespace() {
        if RESULTS.contains(&token) {
            metadata.result = token.to_string();
            saw_result = true;
            continue;
        }
        if token.starts_with('$') {
            continue;
        }
        // "12." "12..." and "12.e4" all carry a move number prefix
        let san = token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
        if !san.is_empty() {
            moves.push(san.to_string());
        }
    }

    if moves.is_empty() && !saw_result {
        return Err(NotationError::EmptyGame);
    }
    Ok(DecodedGame { metadata, moves })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sans(moves: &[&str]) -> Vec<String> {
        moves.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_default_metadata() {
        let metadata = GameMetadata::default();
        assert_eq!(metadata.event, "Casual Game");
        assert_eq!(metadata.result, "*");
        assert_eq!(metadata.date.len(), 10);
        assert_eq!(&metadata.date[4..5], ".");
    }

    #[test]
    fn test_encode_layout() {
        let metadata = GameMetadata {
            result: "1-0".to_string(),
            ..GameMetadata::default()
        };
        let text = encode(&metadata, &sans(&["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]));

        assert!(text.starts_with("[Event \"Casual Game\"]\n[Site \"Chess Sync\"]\n"));
        assert!(text.contains("[Result \"1-0\"]\n\n"));
        assert!(text.ends_with("1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0\n"));
    }

    #[test]
    fn test_encode_wraps_long_games() {
        let moves: Vec<String> = (0..60).map(|i| if i % 2 == 0 { "Nf3" } else { "Nf6" }.to_string()).collect();
        let text = encode(&GameMetadata::default(), &moves);
        assert!(text.lines().all(|line| line.len() <= LINE_WIDTH));
    }

    #[test]
    fn test_decode_strips_annotations() {
        let text = "[Event \"Club night\"]\n[White \"Ann\"]\n\n\
                    1. e4 {best by test} e5 2.Nf3 $1 Nc6 (2... d6 3. d4) 3. Bb5 ; Spanish\n\
                    3... a6 1/2-1/2\n";
        let game = decode(text).unwrap();

        assert_eq!(game.metadata.event, "Club night");
        assert_eq!(game.metadata.white, "Ann");
        assert_eq!(game.metadata.black, "Black Player");
        assert_eq!(game.metadata.result, "1/2-1/2");
        assert_eq!(game.moves, sans(&["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"]));
    }

    #[test]
    fn test_decode_round_trips_encode() {
        let metadata = GameMetadata {
            white: "Ann \"the rook\"".to_string(),
            ..GameMetadata::default()
        };
        let moves = sans(&["d4", "d5", "c4"]);
        let game = decode(&encode(&metadata, &moves)).unwrap();
        assert_eq!(game.moves, moves);
        assert_eq!(game.metadata.white, "Ann 'the rook'");
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode("[Event Casual]\n1. e4 *"),
            Err(NotationError::MalformedHeader(_))
        ));
        assert_eq!(decode("[Event \"x\"]\n\n"), Err(NotationError::EmptyGame));
        assert!(decode("*").unwrap().moves.is_empty());
    }
}
