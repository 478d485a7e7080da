use actix::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, info, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{AppState, RelayText, SyncMessage};
use crate::websocket::room::Delivery;

/// Query string of the WebSocket upgrade: `/ws?player=<participant id>`.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub player: Option<String>,
}

/// One relay connection
pub struct RelaySocket {
    /// Connection id, fresh for every socket
    pub id: String,
    /// Participant id, stable across reconnects
    pub participant: String,
    pub app_state: web::Data<AppState>,
    pub game_id: Option<String>,
}

impl RelaySocket {
    pub fn new(participant: String, app_state: web::Data<AppState>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            participant,
            app_state,
            game_id: None,
        }
    }
}

impl Actor for RelaySocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let total_sessions = {
            let mut sessions = self.app_state.sessions();
            sessions.insert(self.id.clone(), ctx.address());
            sessions.len()
        };
        info!("WebSocket connection started: {} ({})", self.id, self.participant);
        info!("Total active sessions: {}", total_sessions);
    }

    fn stopping(&mut self, ctx: &mut Self::Context) -> Running {
        if let Some(game_id) = self.game_id.take() {
            let deliveries = self.app_state.leave_room(&game_id, &self.id);
            self.deliver(deliveries, ctx);
        }

        let total_sessions = {
            let mut sessions = self.app_state.sessions();
            sessions.remove(&self.id);
            sessions.len()
        };
        info!("WebSocket connection closed: {}", self.id);
        info!("Total active sessions: {}", total_sessions);

        Running::Stop
    }
}

impl Handler<RelayText> for RelaySocket {
    type Result = ();

    fn handle(&mut self, msg: RelayText, ctx: &mut Self::Context) {
        debug!("Forwarding message to {}: {}", self.id, msg.0);
        ctx.text(msg.0);
    }
}

// WebSocket message handler
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelaySocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                debug!("Received text message from {}: {}", self.id, text);
                match SyncMessage::decode(text.as_ref()) {
                    Ok(Some(message)) => self.handle_message(message, ctx),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Dropping message from {}: {}", self.id, e);
                        self.send(ctx, &SyncMessage::error(e.to_string()));
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary messages are not supported");
                self.send(ctx, &SyncMessage::error("Binary messages are not supported"));
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

impl RelaySocket {
    pub fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &SyncMessage) {
        match message.encode() {
            Ok(text) => ctx.text(text),
            Err(e) => warn!("Error serializing {} message: {}", message.type_name(), e),
        }
    }

    /// Writes deliveries for this connection directly and hands the rest to
    /// the other connection actors.
    pub fn deliver(&self, deliveries: Vec<Delivery>, ctx: &mut ws::WebsocketContext<Self>) {
        if deliveries.is_empty() {
            return;
        }
        let sessions_copy = self.app_state.sessions().clone();

        for delivery in deliveries {
            if delivery.connection == self.id {
                self.send(ctx, &delivery.message);
                continue;
            }
            let text = match delivery.message.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Error serializing {} message: {}", delivery.message.type_name(), e);
                    continue;
                }
            };
            match sessions_copy.get(&delivery.connection) {
                Some(addr) => addr.do_send(RelayText(text)),
                None => warn!("Session not found for connection ID: {}", delivery.connection),
            }
        }
    }

    pub fn handle_message(&mut self, message: SyncMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match message {
            SyncMessage::JoinGame(join) => self.handle_join(join, ctx),
            SyncMessage::Move(envelope) => self.handle_move(envelope, ctx),
            SyncMessage::SyncRequest(_) => self.handle_sync_request(ctx),
            SyncMessage::GameSync(payload) => self.handle_game_sync(payload, ctx),
            SyncMessage::GameOver(over) => self.handle_game_over(over, ctx),
            SyncMessage::Chat(chat) => self.handle_chat(chat, ctx),
            other => {
                warn!("Unexpected {} message from client {}", other.type_name(), self.id);
                self.send(ctx, &SyncMessage::error(format!("Unexpected message type: {}", other.type_name())));
            }
        }
    }
}

// WebSocket connection handler
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<ConnectQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let participant = query
        .into_inner()
        .player
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!("New WebSocket connection for participant {}", participant);

    ws::start(RelaySocket::new(participant, app_state), &req, stream)
}
