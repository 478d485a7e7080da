//! Saved games on local disk.
//!
//! All saved games live in a single JSON file holding an array of
//! [`SavedGame`]s, newest last. The file is rewritten whole on every change.

use chrono::{DateTime, Local, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::game::GameSession;
use crate::models::PersistedRecord;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SavedGame {
    pub name: String,
    pub record: PersistedRecord,
    pub saved_at: DateTime<Utc>,
}

/// Default save name, e.g. `Game_2024-03-09_14-05-33`.
pub fn default_name() -> String {
    Local::now().format("Game_%Y-%m-%d_%H-%M-%S").to_string()
}

pub struct GameStore {
    path: PathBuf,
}

impl GameStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All saved games; a missing file is an empty collection.
    pub fn list(&self) -> Result<Vec<SavedGame>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, games: &[SavedGame]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(games)?;
        // Write then rename so a crash never leaves half a file behind
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, text)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    /// Saves the session's current state and returns its index.
    pub fn save(&self, session: &GameSession, name: Option<String>) -> Result<usize, StoreError> {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(default_name);
        let mut games = self.list()?;
        games.push(SavedGame {
            name: name.clone(),
            record: session.persisted_record(),
            saved_at: Utc::now(),
        });
        self.write(&games)?;
        info!("Saved game {} as \"{}\" ({} saved)", session.id(), name, games.len());
        Ok(games.len() - 1)
    }

    pub fn get(&self, index: usize) -> Result<SavedGame, StoreError> {
        self.list()?
            .into_iter()
            .nth(index)
            .ok_or(StoreError::NotFound(index))
    }

    /// Restores a saved game into `session` through the full-sync path.
    pub fn load_into(&self, index: usize, session: &mut GameSession) -> Result<SavedGame, StoreError> {
        let saved = self.get(index)?;
        if !saved.record.is_consistent() {
            return Err(StoreError::Invalid(format!(
                "{} snapshots, {} moves, cursor {}",
                saved.record.snapshots.len(),
                saved.record.moves.len(),
                saved.record.cursor
            )));
        }
        session
            .restore(saved.record.clone())
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        debug!("Loaded \"{}\" into game {}", saved.name, session.id());
        Ok(saved)
    }

    pub fn delete(&self, index: usize) -> Result<SavedGame, StoreError> {
        let mut games = self.list()?;
        if index >= games.len() {
            return Err(StoreError::NotFound(index));
        }
        let removed = games.remove(index);
        self.write(&games)?;
        info!("Deleted saved game \"{}\"", removed.name);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{ChessRules, MoveRequest, TimeControl};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn played_session() -> GameSession {
        let mut session = GameSession::new("g1", Arc::new(ChessRules::new()), TimeControl::default());
        session.seat("alice");
        session.seat("bob");
        for (who, mv) in [("alice", "e2e4"), ("bob", "c7c5"), ("alice", "g1f3")] {
            session
                .propose_move(who, &MoveRequest::parse_coordinate(mv).unwrap())
                .unwrap();
        }
        session
    }

    fn fresh_session() -> GameSession {
        GameSession::new("g1", Arc::new(ChessRules::new()), TimeControl::default())
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path().join("games.json"));
        assert!(store.list().unwrap().is_empty());
        assert!(matches!(store.get(0), Err(StoreError::NotFound(0))));
    }

    #[test]
    fn test_save_list_load() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path().join("nested").join("games.json"));
        let mut session = played_session();
        session.jump_to(2).unwrap();

        assert_eq!(store.save(&session, Some("Sicilian".to_string())).unwrap(), 0);
        assert_eq!(store.save(&session, None).unwrap(), 1);

        let games = store.list().unwrap();
        assert_eq!(games[0].name, "Sicilian");
        assert!(games[1].name.starts_with("Game_"));

        let mut restored = fresh_session();
        let saved = store.load_into(0, &mut restored).unwrap();
        assert_eq!(saved.record.moves.len(), 3);
        assert_eq!(restored.log().cursor(), 2);
        assert_eq!(restored.log().snapshots(), session.log().snapshots());
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path().join("games.json"));
        let session = played_session();
        store.save(&session, Some("first".to_string())).unwrap();
        store.save(&session, Some("second".to_string())).unwrap();

        assert_eq!(store.delete(0).unwrap().name, "first");
        let games = store.list().unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].name, "second");
        assert!(matches!(store.delete(5), Err(StoreError::NotFound(5))));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("games.json");
        fs::write(&path, "{ not json").unwrap();
        let store = GameStore::new(path);
        assert!(matches!(store.list(), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_inconsistent_record_rejected() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path().join("games.json"));
        store.save(&played_session(), Some("x".to_string())).unwrap();

        let mut games = store.list().unwrap();
        games[0].record.snapshots.pop();
        store.write(&games).unwrap();

        let mut session = fresh_session();
        assert!(matches!(store.load_into(0, &mut session), Err(StoreError::Invalid(_))));
        assert!(session.log().is_empty());
    }
}
