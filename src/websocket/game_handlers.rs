use actix_web_actors::ws;
use log::{info, warn};

use crate::error::RelayError;
use crate::models::messages::{Chat, GameOver, GameSyncPayload, JoinGame, MoveEnvelope, SyncMessage};
use crate::websocket::handler::RelaySocket;
use crate::websocket::room::{Delivery, Room};

impl RelaySocket {
    /// Runs `action` against this connection's room, then delivers its output.
    fn with_room<F>(&mut self, ctx: &mut ws::WebsocketContext<Self>, action: F)
    where
        F: FnOnce(&mut Room, &str, &str) -> Vec<Delivery>,
    {
        let game_id = match &self.game_id {
            Some(id) => id.clone(),
            None => {
                warn!("Connection {} sent a game message before joining", self.id);
                self.send(ctx, &SyncMessage::error(RelayError::NotJoined.to_string()));
                return;
            }
        };

        let deliveries = {
            let mut rooms = self.app_state.rooms();
            match rooms.get_mut(&game_id) {
                Some(room) => action(room, &self.id, &self.participant),
                None => vec![Delivery {
                    connection: self.id.clone(),
                    message: SyncMessage::error(RelayError::UnknownGame(game_id.clone()).to_string()),
                }],
            }
        };
        self.deliver(deliveries, ctx);
    }

    fn wrong_game(&self, ctx: &mut ws::WebsocketContext<Self>, got: &str) -> bool {
        if self.game_id.as_deref() == Some(got) {
            return false;
        }
        warn!("Connection {} sent a message for game {} it has not joined", self.id, got);
        self.send(ctx, &SyncMessage::error(RelayError::NotJoined.to_string()));
        true
    }

    pub fn handle_join(&mut self, join: JoinGame, ctx: &mut ws::WebsocketContext<Self>) {
        let game_id = join.game_id.trim().to_string();
        if game_id.is_empty() {
            warn!("No game ID provided");
            self.send(ctx, &SyncMessage::error("No game ID provided"));
            return;
        }
        info!("Participant {} joining game {}", self.participant, game_id);

        if let Some(previous) = self.game_id.clone().filter(|previous| *previous != game_id) {
            info!("Participant {} leaving game {}", self.participant, previous);
            self.game_id = None;
            let deliveries = self.app_state.leave_room(&previous, &self.id);
            self.deliver(deliveries, ctx);
        }

        match self.app_state.join_room(&game_id, &self.participant, &self.id) {
            Ok((side, deliveries)) => {
                info!("Seated {} as {} in game {}", self.participant, side, game_id);
                self.game_id = Some(game_id);
                self.deliver(deliveries, ctx);
            }
            Err(e) => {
                warn!("Rejected {} from game {}: {}", self.participant, game_id, e);
                self.send(ctx, &SyncMessage::error(e.to_string()));
            }
        }
    }

    pub fn handle_move(&mut self, envelope: MoveEnvelope, ctx: &mut ws::WebsocketContext<Self>) {
        if self.wrong_game(ctx, &envelope.game_id) {
            return;
        }
        self.with_room(ctx, |room, connection, participant| {
            room.relay_move(connection, participant, envelope)
        });
    }

    pub fn handle_sync_request(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        self.with_room(ctx, |room, connection, participant| {
            room.sync_request(connection, participant)
        });
    }

    pub fn handle_game_sync(&mut self, payload: GameSyncPayload, ctx: &mut ws::WebsocketContext<Self>) {
        if self.wrong_game(ctx, &payload.game_id) {
            return;
        }
        self.with_room(ctx, |room, connection, participant| {
            room.adopt_sync(connection, participant, payload)
        });
    }

    pub fn handle_game_over(&mut self, over: GameOver, ctx: &mut ws::WebsocketContext<Self>) {
        if self.wrong_game(ctx, &over.game_id) {
            return;
        }
        self.with_room(ctx, |room, connection, _| room.game_over(connection, over.reason));
    }

    pub fn handle_chat(&mut self, chat: Chat, ctx: &mut ws::WebsocketContext<Self>) {
        if self.wrong_game(ctx, &chat.game_id) {
            return;
        }
        let message = chat.message.trim().to_string();
        if message.is_empty() {
            return;
        }
        self.with_room(ctx, |room, _, participant| room.chat(participant, message));
    }
}
