pub mod peer;
pub mod reconnect;
pub mod transport;

pub use peer::{Command, Dispatch, Peer, PeerEvent, SessionContext, MAX_RESYNC_ATTEMPTS};
pub use reconnect::{BackoffPolicy, ConnectionState, ReconnectManager};
pub use transport::{run, Finished, TransportOptions};
