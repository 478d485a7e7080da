use actix::Message;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::game::{ClockReading, GameStatus, MoveRecord, Side, Snapshot};

/// Every `type` discriminator this protocol understands.
pub const KNOWN_TYPES: [&str; 9] = [
    "join_game",
    "init",
    "move",
    "sync_request",
    "game_sync",
    "game-over",
    "chat",
    "room_status",
    "error",
];

/// Frames exchanged between peers and the relay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SyncMessage {
    #[serde(rename = "join_game")]
    JoinGame(JoinGame),
    #[serde(rename = "init")]
    Init(Init),
    #[serde(rename = "move")]
    Move(MoveEnvelope),
    #[serde(rename = "sync_request")]
    SyncRequest(SyncRequest),
    #[serde(rename = "game_sync")]
    GameSync(GameSyncPayload),
    #[serde(rename = "game-over")]
    GameOver(GameOver),
    #[serde(rename = "chat")]
    Chat(Chat),
    #[serde(rename = "room_status")]
    RoomStatus(RoomStatus),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinGame {
    pub game_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Init {
    pub game_id: String,
    pub player_id: String,
    pub color: Side,
}

/// A canonical move as broadcast by the peer that made it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveEnvelope {
    pub game_id: String,
    pub player_id: String,
    #[serde(rename = "move")]
    pub record: MoveRecord,
    /// Remaining times right after the move
    pub clock: ClockReading,
    pub status: GameStatus,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub game_id: String,
    pub player_id: String,
}

/// Full authoritative state. Receivers replace their history with it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSyncPayload {
    pub game_id: String,
    pub snapshots: Vec<Snapshot>,
    pub moves: Vec<MoveRecord>,
    pub status: GameStatus,
    pub clock: ClockReading,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameOver {
    pub game_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub game_id: String,
    pub sender: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub players_count: usize,
    pub ready_to_play: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub message: String,
}

impl SyncMessage {
    pub fn error(message: impl Into<String>) -> Self {
        SyncMessage::Error(ErrorMessage {
            message: message.into(),
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SyncMessage::JoinGame(_) => "join_game",
            SyncMessage::Init(_) => "init",
            SyncMessage::Move(_) => "move",
            SyncMessage::SyncRequest(_) => "sync_request",
            SyncMessage::GameSync(_) => "game_sync",
            SyncMessage::GameOver(_) => "game-over",
            SyncMessage::Chat(_) => "chat",
            SyncMessage::RoomStatus(_) => "room_status",
            SyncMessage::Error(_) => "error",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses one text frame.
    ///
    /// `Ok(None)` means a well-formed frame of a type nobody here handles; it
    /// is logged and should be skipped. Broken frames of a known type are
    /// errors.
    pub fn decode(text: &str) -> Result<Option<SyncMessage>, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if !KNOWN_TYPES.contains(&kind) {
            warn!("Ignoring message of unknown type: {}", kind);
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

/// Text frame handed to a relay connection actor for delivery.
#[derive(Message)]
#[rtype(result = "()")]
pub struct RelayText(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_game_wire_format() {
        let message = SyncMessage::JoinGame(JoinGame {
            game_id: "g1".to_string(),
        });
        assert_eq!(message.encode().unwrap(), r#"{"type":"join_game","gameId":"g1"}"#);
    }

    #[test]
    fn test_decode_init() {
        let text = r#"{"type":"init","gameId":"g1","playerId":"p1","color":"black"}"#;
        let message = SyncMessage::decode(text).unwrap().unwrap();
        assert_eq!(
            message,
            SyncMessage::Init(Init {
                game_id: "g1".to_string(),
                player_id: "p1".to_string(),
                color: Side::Black,
            })
        );
    }

    #[test]
    fn test_game_over_type_keeps_dash() {
        let message = SyncMessage::GameOver(GameOver {
            game_id: "g1".to_string(),
            reason: None,
        });
        let text = message.encode().unwrap();
        assert_eq!(text, r#"{"type":"game-over","gameId":"g1"}"#);
        assert_eq!(message.type_name(), "game-over");
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let decoded = SyncMessage::decode(r#"{"type":"emote","gameId":"g1"}"#).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            SyncMessage::decode("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            SyncMessage::decode(r#"{"gameId":"g1"}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            SyncMessage::decode(r#"{"type":"init","gameId":"g1"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_game_sync_status_shape() {
        let text = r#"{"type":"game_sync","gameId":"g1","snapshots":["start"],"moves":[],
            "status":{"state":"time_up","winner":"white"},
            "clock":{"whiteMs":1000,"blackMs":0}}"#;
        match SyncMessage::decode(text).unwrap() {
            Some(SyncMessage::GameSync(payload)) => {
                assert_eq!(payload.status, GameStatus::TimeUp { winner: Side::White });
                assert_eq!(payload.clock.active, None);
                assert_eq!(payload.snapshots, vec![Snapshot::new("start")]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
