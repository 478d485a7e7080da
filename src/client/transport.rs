//! WebSocket driver for a [`Peer`].
//!
//! One task owns the socket, the peer, the clock scheduler and the resync
//! timer, and multiplexes them with `select!`, so every session mutation
//! happens on this task. Dropping out of [`run`] on any path drops the
//! scheduler and closes the socket, and hands the peer back.

use futures::{Sink, SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::client::peer::{Command, Dispatch, Peer, PeerEvent};
use crate::client::reconnect::{BackoffPolicy, ReconnectManager};
use crate::error::ConnectionError;
use crate::game::clock::{ClockScheduler, TICK};

/// How long a resync request may stay unanswered before it is repeated.
pub const RESYNC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Full relay URL, participant id included
    pub url: String,
    pub backoff: BackoffPolicy,
}

/// How a transport run ended. The peer comes back either way so its game
/// can still be saved.
pub struct Finished {
    pub peer: Peer,
    /// Set when reconnecting gave up; the session is abandoned then
    pub gave_up: Option<ConnectionError>,
}

enum Ended {
    Shutdown,
    Dropped(ConnectionError),
    ManualReconnect,
}

enum Offline {
    Retry,
    Reconnect,
    Shutdown,
}

async fn flush<S>(sink: &mut S, dispatch: Dispatch, events: &mpsc::UnboundedSender<PeerEvent>) -> Result<(), ConnectionError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    for message in dispatch.outbound {
        debug!("Sending {}", message.type_name());
        sink.send(Message::Text(message.encode()?)).await?;
    }
    publish(events, dispatch.events);
    Ok(())
}

fn publish(events: &mpsc::UnboundedSender<PeerEvent>, batch: Vec<PeerEvent>) {
    for event in batch {
        // Nobody listening is not an error for the game itself
        let _ = events.send(event);
    }
}

/// Runs the peer until a shutdown command arrives or reconnecting gives up.
pub async fn run(
    options: TransportOptions,
    mut peer: Peer,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<PeerEvent>,
) -> Finished {
    let mut manager = ReconnectManager::new(options.backoff);
    let mut clock = ClockScheduler::new(TICK);

    loop {
        manager.begin_connect();
        info!("Connecting to {}", options.url);
        let ended = match connect_async(options.url.as_str()).await {
            Ok((stream, _)) => {
                let resync = manager.on_connected(peer.has_local_game());
                let ended = drive(stream, &mut peer, &mut clock, &mut commands, &events, resync).await;
                publish(&events, vec![PeerEvent::Connection(false)]);
                ended
            }
            Err(e) => Ended::Dropped(e.into()),
        };

        match ended {
            Ended::Shutdown => {
                info!("Transport shut down");
                return Finished { peer, gave_up: None };
            }
            Ended::ManualReconnect => manager.manual_reconnect(),
            Ended::Dropped(e) => {
                warn!("Relay connection dropped: {}", e);
                let delay = match manager.on_disconnected() {
                    Ok(delay) => delay,
                    Err(e) => {
                        warn!("Giving up on the relay: {}", e);
                        publish(&events, peer.abandon().events);
                        return Finished {
                            peer,
                            gave_up: Some(e),
                        };
                    }
                };
                match wait_offline(delay, &mut peer, &mut clock, &mut commands, &events).await {
                    Offline::Retry => {}
                    Offline::Reconnect => manager.manual_reconnect(),
                    Offline::Shutdown => return Finished { peer, gave_up: None },
                }
            }
        }
    }
}

/// Waits out a backoff delay while keeping the local game responsive.
async fn wait_offline(
    delay: Duration,
    peer: &mut Peer,
    clock: &mut ClockScheduler,
    commands: &mut mpsc::Receiver<Command>,
    events: &mpsc::UnboundedSender<PeerEvent>,
) -> Offline {
    let deadline = sleep(delay);
    tokio::pin!(deadline);
    loop {
        clock.sync(peer.session().active());
        let dispatch = tokio::select! {
            _ = &mut deadline => return Offline::Retry,
            _ = clock.tick() => peer.tick(clock.period().as_millis() as u64),
            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => return Offline::Shutdown,
                Some(Command::Reconnect) => return Offline::Reconnect,
                Some(command) => peer.apply_command(command),
            },
        };
        // Offline: outbound messages are dropped, the reconnect resync catches up
        if !dispatch.outbound.is_empty() {
            debug!("Offline, dropping {} outbound messages", dispatch.outbound.len());
        }
        publish(events, dispatch.events);
    }
}

async fn drive<S>(
    stream: S,
    peer: &mut Peer,
    clock: &mut ClockScheduler,
    commands: &mut mpsc::Receiver<Command>,
    events: &mpsc::UnboundedSender<PeerEvent>,
    resync: bool,
) -> Ended
where
    S: Sink<Message, Error = WsError> + futures::Stream<Item = Result<Message, WsError>> + Unpin,
{
    let (mut sink, mut source) = stream.split();
    if let Err(e) = flush(&mut sink, peer.on_connected(resync), events).await {
        return Ended::Dropped(e);
    }

    let mut resync_timer = interval_at(Instant::now() + RESYNC_TIMEOUT, RESYNC_TIMEOUT);
    resync_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        clock.sync(peer.session().active());
        let dispatch = tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => peer.handle_text(&text),
                Some(Ok(Message::Close(frame))) => {
                    info!("Relay closed the connection: {:?}", frame);
                    return Ended::Dropped(ConnectionError::Closed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Ended::Dropped(e.into()),
                None => return Ended::Dropped(ConnectionError::Closed),
            },
            side = clock.tick() => {
                debug!("Clock tick for {}", side);
                peer.tick(clock.period().as_millis() as u64)
            }
            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ended::Shutdown;
                }
                Some(Command::Reconnect) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ended::ManualReconnect;
                }
                Some(command) => peer.apply_command(command),
            },
            _ = resync_timer.tick() => {
                if peer.awaiting_resync() {
                    peer.request_resync()
                } else {
                    Dispatch::default()
                }
            }
        };

        if let Err(e) = flush(&mut sink, dispatch, events).await {
            return Ended::Dropped(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::peer::SessionContext;
    use crate::game::{ChessRules, GameSession, GameStatus, MoveRequest, SessionEvent, TimeControl};
    use std::net::TcpListener;
    use std::sync::Arc;

    /// A local address nothing listens on.
    fn dead_relay() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("ws://127.0.0.1:{}/ws?player=me", port)
    }

    fn peer_with_a_move() -> Peer {
        let mut session = GameSession::new("g1", Arc::new(ChessRules::new()), TimeControl::default());
        session.seat("me");
        session.propose_move("me", &MoveRequest::new("e2", "e4", None)).unwrap();
        Peer::with_session(SessionContext::new("me", "g1"), session)
    }

    fn options(initial: Duration, max_attempts: Option<u32>) -> TransportOptions {
        TransportOptions {
            url: dead_relay(),
            backoff: BackoffPolicy {
                initial,
                factor: 2,
                max: initial,
                max_attempts,
            },
        }
    }

    #[tokio::test]
    async fn test_giving_up_keeps_the_game() {
        let (_command_tx, command_rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let finished = run(
            options(Duration::from_millis(1), Some(2)),
            peer_with_a_move(),
            command_rx,
            event_tx,
        )
        .await;

        assert!(matches!(
            finished.gave_up,
            Some(ConnectionError::RetriesExhausted { attempts: 2 })
        ));
        let session = finished.peer.session();
        assert_eq!(session.log().len(), 1);
        assert_eq!(session.status(), &GameStatus::Abandoned);

        let mut abandoned = false;
        while let Ok(event) = event_rx.try_recv() {
            abandoned |= event == PeerEvent::Session(SessionEvent::StatusChanged(GameStatus::Abandoned));
        }
        assert!(abandoned);
    }

    #[tokio::test]
    async fn test_manual_reconnect_while_offline_resets_backoff() {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        for _ in 0..3 {
            command_tx.send(Command::Reconnect).await.unwrap();
        }
        command_tx.send(Command::Shutdown).await.unwrap();

        let finished = run(
            options(Duration::from_secs(60), Some(1)),
            peer_with_a_move(),
            command_rx,
            event_tx,
        )
        .await;

        assert!(finished.gave_up.is_none());
        assert_eq!(finished.peer.session().status(), &GameStatus::InProgress);
        assert_eq!(finished.peer.session().log().len(), 1);
    }
}
