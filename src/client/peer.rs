//! Peer side of the sync protocol.
//!
//! [`Peer`] owns the local [`GameSession`] and the [`SessionContext`], turns
//! inbound [`SyncMessage`]s and local commands into session transitions, and
//! reports what to send and what to show as a [`Dispatch`]. It never touches
//! the socket, so the transport driver stays the single writer.

use log::{debug, info, warn};
use std::sync::Arc;

use crate::error::SessionError;
use crate::game::{GameSession, GameStatus, MoveRequest, RulesEngine, SessionEvent, Side, TimeControl};
use crate::models::messages::{
    Chat, GameOver, GameSyncPayload, Init, JoinGame, MoveEnvelope, RoomStatus, SyncMessage, SyncRequest,
};

/// Consecutive unanswered resync requests before the game is given up.
pub const MAX_RESYNC_ATTEMPTS: u32 = 3;

/// Who this peer is and where it sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub local_id: String,
    pub game_id: String,
    pub color: Option<Side>,
}

impl SessionContext {
    pub fn new(local_id: impl Into<String>, game_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            game_id: game_id.into(),
            color: None,
        }
    }

    pub fn bind_seat(&mut self, color: Side) {
        if self.color.is_some_and(|bound| bound != color) {
            warn!("Seat for {} changed from {:?} to {}", self.local_id, self.color, color);
        }
        self.color = Some(color);
    }
}

/// Local UI intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(MoveRequest),
    /// A move typed as SAN or coordinates, resolved against the tip
    Notation(String),
    Resign,
    Undo,
    Redo,
    JumpTo(usize),
    Chat(String),
    Reconnect,
    Shutdown,
}

/// What the presentation layer hears about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Session(SessionEvent),
    Seated(Side),
    Rejected(SessionError),
    Room(RoomStatus),
    Chat { sender: String, message: String },
    GameOver { reason: Option<String> },
    RelayError(String),
    ResyncRequested { attempt: u32 },
    Connection(bool),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub outbound: Vec<SyncMessage>,
    pub events: Vec<PeerEvent>,
}

impl Dispatch {
    fn send(message: SyncMessage) -> Self {
        Self {
            outbound: vec![message],
            events: Vec::new(),
        }
    }

    fn show(events: Vec<PeerEvent>) -> Self {
        Self {
            outbound: Vec::new(),
            events,
        }
    }

    fn session(events: Vec<SessionEvent>) -> Self {
        Self::show(events.into_iter().map(PeerEvent::Session).collect())
    }

    pub fn merge(&mut self, other: Dispatch) {
        self.outbound.extend(other.outbound);
        self.events.extend(other.events);
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.events.is_empty()
    }
}

pub struct Peer {
    context: SessionContext,
    session: GameSession,
    pending_resyncs: u32,
}

impl Peer {
    pub fn new(context: SessionContext, rules: Arc<dyn RulesEngine>, time_control: TimeControl) -> Self {
        let session = GameSession::new(context.game_id.clone(), rules, time_control);
        Self {
            context,
            session,
            pending_resyncs: 0,
        }
    }

    /// Wraps an existing session, e.g. one restored from the saved games file.
    pub fn with_session(context: SessionContext, session: GameSession) -> Self {
        Self {
            context,
            session,
            pending_resyncs: 0,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn awaiting_resync(&self) -> bool {
        self.pending_resyncs > 0
    }

    /// Whether local state exists that a reconnect must not trust blindly.
    pub fn has_local_game(&self) -> bool {
        !self.session.log().is_empty() || self.session.status().is_terminal()
    }

    /// Messages for a freshly opened connection.
    pub fn on_connected(&mut self, resync: bool) -> Dispatch {
        let mut dispatch = Dispatch::send(SyncMessage::JoinGame(JoinGame {
            game_id: self.context.game_id.clone(),
        }));
        dispatch.events.push(PeerEvent::Connection(true));
        if resync {
            dispatch.merge(self.request_resync());
        }
        dispatch
    }

    /// Asks for a full `game_sync`, or gives the game up once too many
    /// requests went unanswered.
    pub fn request_resync(&mut self) -> Dispatch {
        if self.pending_resyncs >= MAX_RESYNC_ATTEMPTS {
            warn!(
                "Game {}: {} resync requests unanswered, abandoning",
                self.context.game_id, self.pending_resyncs
            );
            return self.abandon();
        }
        self.pending_resyncs += 1;
        info!(
            "Game {}: requesting resync (attempt {})",
            self.context.game_id, self.pending_resyncs
        );
        let mut dispatch = Dispatch::send(SyncMessage::SyncRequest(SyncRequest {
            game_id: self.context.game_id.clone(),
            player_id: self.context.local_id.clone(),
        }));
        dispatch.events.push(PeerEvent::ResyncRequested {
            attempt: self.pending_resyncs,
        });
        dispatch
    }

    /// Ends the game locally once the relay is out of reach for good.
    pub fn abandon(&mut self) -> Dispatch {
        self.pending_resyncs = 0;
        Dispatch::session(self.session.abandon())
    }

    /// Decodes and dispatches one text frame. Bad frames are logged and dropped.
    pub fn handle_text(&mut self, text: &str) -> Dispatch {
        match SyncMessage::decode(text) {
            Ok(Some(message)) => self.handle(message),
            Ok(None) => Dispatch::default(),
            Err(e) => {
                warn!("Dropping frame from relay: {}", e);
                Dispatch::default()
            }
        }
    }

    pub fn handle(&mut self, message: SyncMessage) -> Dispatch {
        match message {
            SyncMessage::Init(init) => self.on_init(init),
            SyncMessage::Move(envelope) => self.on_move(envelope),
            SyncMessage::SyncRequest(request) => self.on_sync_request(request),
            SyncMessage::GameSync(payload) => self.on_game_sync(payload),
            SyncMessage::GameOver(over) => Dispatch::show(vec![PeerEvent::GameOver { reason: over.reason }]),
            SyncMessage::Chat(chat) => Dispatch::show(vec![PeerEvent::Chat {
                sender: chat.sender,
                message: chat.message,
            }]),
            SyncMessage::RoomStatus(status) => Dispatch::show(vec![PeerEvent::Room(status)]),
            SyncMessage::Error(error) => {
                warn!("Relay reported: {}", error.message);
                Dispatch::show(vec![PeerEvent::RelayError(error.message)])
            }
            SyncMessage::JoinGame(_) => {
                debug!("Ignoring join_game sent to a peer");
                Dispatch::default()
            }
        }
    }

    fn on_init(&mut self, init: Init) -> Dispatch {
        if init.game_id != self.context.game_id {
            warn!("Init for game {} while playing {}", init.game_id, self.context.game_id);
            return Dispatch::default();
        }
        if init.player_id != self.context.local_id {
            info!("Relay knows us as {}", init.player_id);
            self.context.local_id = init.player_id;
        }
        self.context.bind_seat(init.color);
        if !self.session.seat_as(&self.context.local_id, init.color) {
            warn!("Local session already holds a different seat for {}", init.color);
        }
        info!("Seated as {} in game {}", init.color, self.context.game_id);
        Dispatch::show(vec![PeerEvent::Seated(init.color)])
    }

    fn on_move(&mut self, envelope: MoveEnvelope) -> Dispatch {
        if envelope.game_id != self.context.game_id {
            warn!("Move for game {} while playing {}", envelope.game_id, self.context.game_id);
            return Dispatch::default();
        }
        if envelope.player_id == self.context.local_id {
            return Dispatch::default();
        }
        self.session.seat_as(&envelope.player_id, envelope.record.color);

        match self.session.apply_remote_move(&envelope) {
            Ok(events) => Dispatch::session(events),
            Err(SessionError::Desync { ply, reason }) => {
                warn!("Game {}: desync at ply {}: {}", self.context.game_id, ply, reason);
                self.request_resync()
            }
            Err(e) => {
                warn!("Game {}: remote move dropped: {}", self.context.game_id, e);
                Dispatch::default()
            }
        }
    }

    fn on_sync_request(&mut self, request: SyncRequest) -> Dispatch {
        if request.game_id != self.context.game_id {
            warn!("Sync request for game {} while playing {}", request.game_id, self.context.game_id);
            return Dispatch::default();
        }
        if request.player_id == self.context.local_id {
            return Dispatch::default();
        }
        debug!("Answering sync request from {}", request.player_id);
        Dispatch::send(SyncMessage::GameSync(self.session.sync_payload()))
    }

    fn on_game_sync(&mut self, payload: GameSyncPayload) -> Dispatch {
        match self.session.apply_sync_payload(payload) {
            Ok(events) => {
                self.pending_resyncs = 0;
                Dispatch::session(events)
            }
            Err(e) => {
                warn!("Game {}: dropping game_sync: {}", self.context.game_id, e);
                Dispatch::default()
            }
        }
    }

    /// `game_sync` then `game-over`, the announcement for results decided off the board.
    fn announce_result(&self) -> Vec<SyncMessage> {
        vec![
            SyncMessage::GameSync(self.session.sync_payload()),
            SyncMessage::GameOver(GameOver {
                game_id: self.context.game_id.clone(),
                reason: Some(self.session.status().to_string()),
            }),
        ]
    }

    pub fn propose_move(&mut self, request: &MoveRequest) -> Result<Dispatch, SessionError> {
        let events = self.session.propose_move(&self.context.local_id, request)?;
        let mut dispatch = Dispatch::default();
        for event in &events {
            if let SessionEvent::MoveAccepted(record) = event {
                dispatch
                    .outbound
                    .push(SyncMessage::Move(self.session.move_envelope(record, &self.context.local_id)));
            }
        }
        dispatch.merge(Dispatch::session(events));
        Ok(dispatch)
    }

    pub fn resign(&mut self) -> Result<Dispatch, SessionError> {
        let events = self.session.resign(&self.context.local_id)?;
        let mut dispatch = Dispatch::session(events);
        dispatch.outbound = self.announce_result();
        Ok(dispatch)
    }

    /// One clock tick. A forfeit is announced to the opponent.
    pub fn tick(&mut self, elapsed_ms: u64) -> Dispatch {
        let events = self.session.tick(elapsed_ms);
        let forfeit = events
            .iter()
            .any(|e| matches!(e, SessionEvent::StatusChanged(GameStatus::TimeUp { .. })));
        let mut dispatch = Dispatch::session(events);
        if forfeit {
            info!("Game {}: {}", self.context.game_id, self.session.status());
            dispatch.outbound = self.announce_result();
        }
        dispatch
    }

    pub fn chat(&self, message: String) -> Dispatch {
        Dispatch::send(SyncMessage::Chat(Chat {
            game_id: self.context.game_id.clone(),
            sender: self.context.local_id.clone(),
            message,
        }))
    }

    /// Applies a local command that does not concern the connection itself.
    pub fn apply_command(&mut self, command: Command) -> Dispatch {
        let result = match command {
            Command::Move(request) => self.propose_move(&request),
            Command::Notation(text) => self
                .session
                .rules()
                .parse_notation(self.session.log().tip_snapshot(), &text)
                .map_err(SessionError::from)
                .and_then(|request| self.propose_move(&request)),
            Command::Resign => self.resign(),
            Command::Undo => Ok(Dispatch::session(self.session.undo())),
            Command::Redo => Ok(Dispatch::session(self.session.redo())),
            Command::JumpTo(index) => Ok(self
                .session
                .jump_to(index)
                .map(Dispatch::session)
                .unwrap_or_default()),
            Command::Chat(message) => Ok(self.chat(message)),
            Command::Reconnect | Command::Shutdown => Ok(Dispatch::default()),
        };
        result.unwrap_or_else(|e| {
            debug!("Rejected local command: {}", e);
            Dispatch::show(vec![PeerEvent::Rejected(e)])
        })
    }
}
