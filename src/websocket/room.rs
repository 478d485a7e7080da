//! Per-game routing on the relay.
//!
//! A [`Room`] owns the seat table, the live connections and a mirror
//! [`GameSession`] that every claimed move is checked against before it is
//! fanned out. Room methods never touch sockets; they return the
//! [`Delivery`] list the connection actor has to send.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

use crate::error::{RelayError, SessionError};
use crate::game::{GameSession, RulesEngine, Side, TimeControl};
use crate::models::messages::{
    Chat, GameOver, GameSyncPayload, Init, MoveEnvelope, RoomStatus, SyncMessage, SyncRequest,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub connection: String,
    pub message: SyncMessage,
}

impl Delivery {
    fn to(connection: &str, message: SyncMessage) -> Self {
        Self {
            connection: connection.to_string(),
            message,
        }
    }
}

#[derive(Debug)]
pub struct Room {
    session: GameSession,
    /// participant id -> connection id, only while connected
    connections: HashMap<String, String>,
    /// When the mirror last took a move or a sync
    synced_at: Instant,
}

impl Room {
    pub fn new(game_id: &str, rules: Arc<dyn RulesEngine>, time_control: TimeControl) -> Self {
        Self {
            session: GameSession::new(game_id, rules, time_control),
            connections: HashMap::new(),
            synced_at: Instant::now(),
        }
    }

    pub fn game_id(&self) -> &str {
        self.session.id()
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn players_count(&self) -> usize {
        self.connections.len()
    }

    pub fn ready_to_play(&self) -> bool {
        self.session.seats().is_full() && self.connections.len() == 2
    }

    /// Finished and nobody left to reconnect to it.
    pub fn is_archivable(&self) -> bool {
        self.session.status().is_terminal() && self.connections.is_empty()
    }

    pub fn participant_for(&self, connection: &str) -> Option<&str> {
        self.connections
            .iter()
            .find(|(_, conn)| conn.as_str() == connection)
            .map(|(participant, _)| participant.as_str())
    }

    fn opponent_connection(&self, participant: &str) -> Option<&str> {
        let side = self.session.seats().side_of(participant)?;
        let opponent = self.session.seats().holder(side.opponent())?;
        self.connections.get(opponent).map(String::as_str)
    }

    fn everyone(&self, message: SyncMessage) -> Vec<Delivery> {
        self.connections
            .values()
            .map(|conn| Delivery::to(conn, message.clone()))
            .collect()
    }

    fn others(&self, connection: &str, message: SyncMessage) -> Vec<Delivery> {
        self.connections
            .values()
            .filter(|conn| conn.as_str() != connection)
            .map(|conn| Delivery::to(conn, message.clone()))
            .collect()
    }

    fn status_message(&self, message: String) -> SyncMessage {
        SyncMessage::RoomStatus(RoomStatus {
            players_count: self.players_count(),
            ready_to_play: self.ready_to_play(),
            message,
        })
    }

    fn reject(&self, connection: &str, error: &dyn std::fmt::Display) -> Vec<Delivery> {
        vec![
            Delivery::to(connection, SyncMessage::error(error.to_string())),
            Delivery::to(connection, SyncMessage::GameSync(self.session.sync_payload())),
        ]
    }

    /// Seats a participant (sticky by id) and registers its connection.
    pub fn join(&mut self, participant: &str, connection: &str) -> Result<(Side, Vec<Delivery>), RelayError> {
        let side = self.session.seat(participant).ok_or_else(|| RelayError::RoomFull {
            game_id: self.game_id().to_string(),
        })?;
        if let Some(previous) = self.connections.insert(participant.to_string(), connection.to_string()) {
            info!(
                "Participant {} reconnected to game {} ({} -> {})",
                participant,
                self.game_id(),
                previous,
                connection
            );
        }

        let mut deliveries = vec![Delivery::to(
            connection,
            SyncMessage::Init(Init {
                game_id: self.game_id().to_string(),
                player_id: participant.to_string(),
                color: side,
            }),
        )];
        // A joiner without local state still learns about a game in progress
        if !self.session.log().is_empty() || self.session.status().is_terminal() {
            deliveries.push(Delivery::to(
                connection,
                SyncMessage::GameSync(self.session.sync_payload()),
            ));
        }
        let announcement = if self.ready_to_play() {
            "Both players connected".to_string()
        } else {
            "Waiting for opponent".to_string()
        };
        deliveries.extend(self.everyone(self.status_message(announcement)));
        Ok((side, deliveries))
    }

    /// Drops a connection. A stale connection that was already replaced by a
    /// reconnect is ignored.
    pub fn leave(&mut self, connection: &str) -> Vec<Delivery> {
        let participant = match self.participant_for(connection) {
            Some(participant) => participant.to_string(),
            None => return Vec::new(),
        };
        self.connections.remove(&participant);
        info!("Participant {} left game {}", participant, self.game_id());
        self.everyone(self.status_message("Opponent disconnected".to_string()))
    }

    /// Re-validates a claimed move against the mirror before fan-out.
    pub fn relay_move(&mut self, connection: &str, participant: &str, envelope: MoveEnvelope) -> Vec<Delivery> {
        let verdict = if envelope.player_id != participant {
            Err(SessionError::Authority {
                participant: participant.to_string(),
                active: self.session.active(),
            })
        } else {
            self.session
                .validate_move_claim(&envelope)
                .and_then(|_| self.session.apply_remote_move(&envelope))
        };

        match verdict {
            Ok(_) => {
                self.synced_at = Instant::now();
                debug!(
                    "Game {}: relaying ply {} ({}) from {}",
                    self.game_id(),
                    envelope.record.ply,
                    envelope.record.notation,
                    participant
                );
                self.everyone(SyncMessage::Move(envelope))
            }
            Err(e) => {
                warn!("Game {}: rejected move from {}: {}", self.game_id(), participant, e);
                self.reject(connection, &RelayError::Rejected(e))
            }
        }
    }

    /// Forwarded to the opponent when it is connected, answered from the mirror otherwise.
    pub fn sync_request(&self, connection: &str, participant: &str) -> Vec<Delivery> {
        match self.opponent_connection(participant) {
            Some(opponent) => vec![Delivery::to(
                opponent,
                SyncMessage::SyncRequest(SyncRequest {
                    game_id: self.game_id().to_string(),
                    player_id: participant.to_string(),
                }),
            )],
            None => {
                debug!("Game {}: answering sync for {} from mirror", self.game_id(), participant);
                vec![Delivery::to(
                    connection,
                    SyncMessage::GameSync(self.session.sync_payload()),
                )]
            }
        }
    }

    /// Adopts a seated peer's full state and passes it on.
    ///
    /// The payload must extend the mirror's history with the sender's own
    /// moves only, and may only carry a result the sender can back up.
    pub fn adopt_sync(&mut self, connection: &str, participant: &str, payload: GameSyncPayload) -> Vec<Delivery> {
        let sender = match self.session.seats().side_of(participant) {
            Some(side) => side,
            None => {
                return vec![Delivery::to(
                    connection,
                    SyncMessage::error(RelayError::NotJoined.to_string()),
                )]
            }
        };
        let elapsed_ms = self.synced_at.elapsed().as_millis() as u64;
        if let Err(e) = self.session.validate_sync_claim(sender, &payload, elapsed_ms) {
            warn!("Game {}: refused sync from {}: {}", self.game_id(), participant, e);
            return self.reject(connection, &RelayError::Rejected(e));
        }
        if let Err(e) = self.session.apply_sync_payload(payload.clone()) {
            warn!("Game {}: refused sync from {}: {}", self.game_id(), participant, e);
            return self.reject(connection, &e);
        }
        self.synced_at = Instant::now();
        self.others(connection, SyncMessage::GameSync(payload))
    }

    pub fn game_over(&self, connection: &str, reason: Option<String>) -> Vec<Delivery> {
        self.others(
            connection,
            SyncMessage::GameOver(GameOver {
                game_id: self.game_id().to_string(),
                reason,
            }),
        )
    }

    pub fn chat(&self, participant: &str, message: String) -> Vec<Delivery> {
        self.everyone(SyncMessage::Chat(Chat {
            game_id: self.game_id().to_string(),
            sender: participant.to_string(),
            message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{ChessRules, MoveRequest, SessionEvent};

    fn room() -> Room {
        Room::new("g1", Arc::new(ChessRules::new()), TimeControl::default())
    }

    fn messages_for<'a>(deliveries: &'a [Delivery], connection: &str) -> Vec<&'a SyncMessage> {
        deliveries
            .iter()
            .filter(|d| d.connection == connection)
            .map(|d| &d.message)
            .collect()
    }

    /// A seated peer-side session that produces honest envelopes.
    fn origin() -> GameSession {
        let mut session = GameSession::new("g1", Arc::new(ChessRules::new()), TimeControl::default());
        session.seat("alice");
        session.seat("bob");
        session
    }

    fn envelope(session: &mut GameSession, who: &str, mv: &str) -> MoveEnvelope {
        let events = session
            .propose_move(who, &MoveRequest::parse_coordinate(mv).unwrap())
            .unwrap();
        match &events[0] {
            SessionEvent::MoveAccepted(record) => session.move_envelope(record, who),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_join_assigns_colors_in_order() {
        let mut room = room();
        let (side, deliveries) = room.join("alice", "c1").unwrap();
        assert_eq!(side, Side::White);
        assert!(matches!(messages_for(&deliveries, "c1")[0], SyncMessage::Init(init) if init.color == Side::White));

        let (side, deliveries) = room.join("bob", "c2").unwrap();
        assert_eq!(side, Side::Black);
        assert!(room.ready_to_play());
        assert!(messages_for(&deliveries, "c1")
            .iter()
            .any(|m| matches!(m, SyncMessage::RoomStatus(status) if status.ready_to_play && status.players_count == 2)));
    }

    #[test]
    fn test_third_participant_rejected() {
        let mut room = room();
        room.join("alice", "c1").unwrap();
        room.join("bob", "c2").unwrap();
        let err = room.join("carol", "c3").unwrap_err();
        assert_eq!(err.to_string(), "Room is full");
        assert_eq!(room.players_count(), 2);
    }

    #[test]
    fn test_reconnect_keeps_seat() {
        let mut room = room();
        room.join("alice", "c1").unwrap();
        room.join("bob", "c2").unwrap();
        room.leave("c2");
        assert!(!room.ready_to_play());

        let (side, _) = room.join("bob", "c9").unwrap();
        assert_eq!(side, Side::Black);
        assert_eq!(room.participant_for("c9"), Some("bob"));
        // The old socket closing late must not evict the new one
        assert!(room.leave("c2").is_empty());
        assert!(room.ready_to_play());
    }

    #[test]
    fn test_valid_move_fans_out() {
        let mut room = room();
        room.join("alice", "c1").unwrap();
        room.join("bob", "c2").unwrap();
        let mut alice = origin();

        let deliveries = room.relay_move("c1", "alice", envelope(&mut alice, "alice", "e2e4"));
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|d| matches!(d.message, SyncMessage::Move(_))));
        assert_eq!(room.session().log().len(), 1);
    }

    #[test]
    fn test_forged_position_rejected() {
        let mut room = room();
        room.join("alice", "c1").unwrap();
        room.join("bob", "c2").unwrap();
        let mut alice = origin();
        let mut forged = envelope(&mut alice, "alice", "e2e4");
        forged.record.fen = crate::game::Snapshot::new("4k3/8/8/8/8/8/8/QQQQK3 b - - 0 1");

        let deliveries = room.relay_move("c1", "alice", forged);
        assert!(messages_for(&deliveries, "c2").is_empty());
        let to_sender = messages_for(&deliveries, "c1");
        assert!(matches!(to_sender[0], SyncMessage::Error(_)));
        assert!(matches!(to_sender[1], SyncMessage::GameSync(sync) if sync.moves.is_empty()));
        assert!(room.session().log().is_empty());
    }

    #[test]
    fn test_impersonated_move_rejected() {
        let mut room = room();
        room.join("alice", "c1").unwrap();
        room.join("bob", "c2").unwrap();
        let mut alice = origin();

        let deliveries = room.relay_move("c2", "bob", envelope(&mut alice, "alice", "e2e4"));
        assert!(matches!(messages_for(&deliveries, "c2")[0], SyncMessage::Error(_)));
        assert!(room.session().log().is_empty());
    }

    #[test]
    fn test_sync_request_routing() {
        let mut room = room();
        room.join("alice", "c1").unwrap();
        room.join("bob", "c2").unwrap();

        let forwarded = room.sync_request("c1", "alice");
        assert!(matches!(&forwarded[..], [Delivery { connection, message: SyncMessage::SyncRequest(_) }] if connection == "c2"));

        room.leave("c2");
        let answered = room.sync_request("c1", "alice");
        assert!(matches!(&answered[..], [Delivery { connection, message: SyncMessage::GameSync(_) }] if connection == "c1"));
    }

    #[test]
    fn test_stale_sync_refused() {
        let mut room = room();
        room.join("alice", "c1").unwrap();
        room.join("bob", "c2").unwrap();
        let mut alice = origin();
        let first = envelope(&mut alice, "alice", "e2e4");
        room.relay_move("c1", "alice", first);

        let stale = origin().sync_payload();
        let deliveries = room.adopt_sync("c2", "bob", stale);
        assert!(matches!(messages_for(&deliveries, "c2")[0], SyncMessage::Error(_)));
        assert_eq!(room.session().log().len(), 1);
    }

    #[test]
    fn test_resignation_sync_adopted_and_archivable() {
        let mut room = room();
        room.join("alice", "c1").unwrap();
        room.join("bob", "c2").unwrap();
        let mut bob = origin();
        bob.resign("bob").unwrap();

        let deliveries = room.adopt_sync("c2", "bob", bob.sync_payload());
        assert!(matches!(messages_for(&deliveries, "c1")[0], SyncMessage::GameSync(_)));
        assert!(room.session().status().is_terminal());
        assert!(!room.is_archivable());
        room.leave("c1");
        room.leave("c2");
        assert!(room.is_archivable());
    }
}
