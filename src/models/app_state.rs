use actix::Addr;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::game::{ChessRules, RulesEngine, Side, TimeControl};
use crate::websocket::handler::RelaySocket;
use crate::websocket::room::{Delivery, Room};

/// Application state shared between connections
pub struct AppState {
    /// game id -> room
    pub rooms: Mutex<HashMap<String, Room>>,
    /// connection id -> actor
    pub sessions: Mutex<HashMap<String, Addr<RelaySocket>>>,
    pub rules: Arc<dyn RulesEngine>,
    pub time_control: TimeControl,
}

impl AppState {
    pub fn new(rules: Arc<dyn RulesEngine>, time_control: TimeControl) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            rules,
            time_control,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(Arc::new(ChessRules::new()), config.time_control())
    }

    pub fn rooms(&self) -> MutexGuard<'_, HashMap<String, Room>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sessions(&self) -> MutexGuard<'_, HashMap<String, Addr<RelaySocket>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seats a participant in a game, creating its room on first join.
    pub fn join_room(&self, game_id: &str, participant: &str, connection: &str) -> Result<(Side, Vec<Delivery>), RelayError> {
        let mut rooms = self.rooms();
        let room = rooms.entry(game_id.to_string()).or_insert_with(|| {
            info!("Creating room for game {}", game_id);
            Room::new(game_id, self.rules.clone(), self.time_control)
        });
        room.join(participant, connection)
    }

    /// Takes a connection out of a game, dropping the room once it is finished and empty.
    pub fn leave_room(&self, game_id: &str, connection: &str) -> Vec<Delivery> {
        let mut rooms = self.rooms();
        let deliveries = match rooms.get_mut(game_id) {
            Some(room) => room.leave(connection),
            None => return Vec::new(),
        };
        if rooms.get(game_id).map_or(false, |room| room.is_archivable()) {
            rooms.remove(game_id);
            info!("Archived finished game {}", game_id);
        }
        deliveries
    }
}
