//! Two-player chess kept in sync over an unreliable relay.
//!
//! The [`game`] module holds the session state machine and everything it
//! depends on. The relay lives in [`websocket`] and [`routes`]; the peer side
//! of the protocol lives in [`client`].

pub mod client;
pub mod config;
pub mod error;
pub mod game;
pub mod models;
pub mod routes;
pub mod store;
pub mod websocket;

pub use error::{ConnectionError, NotationError, ProtocolError, RelayError, RulesError, SessionError, StoreError};
pub use game::{GameSession, GameStatus, MoveRequest, SessionEvent, Side, Snapshot};
pub use models::SyncMessage;
