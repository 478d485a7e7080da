use clap::Parser;
use log::{info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

use chess_sync::client::{self, Command, Peer, PeerEvent, SessionContext, TransportOptions};
use chess_sync::config::PeerConfig;
use chess_sync::game::rules::ChessRules;
use chess_sync::game::utils::material_summary;
use chess_sync::game::{GameSession, MoveRequest, SessionEvent};
use chess_sync::store::GameStore;

const HELP: &str = "Commands: <move> (e2e4, Nf3), undo, redo, jump <n>, resign, chat <text>, reconnect, quit";

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    match word {
        "" => None,
        "undo" => Some(Command::Undo),
        "redo" => Some(Command::Redo),
        "jump" => rest.trim().parse().ok().map(Command::JumpTo),
        "resign" => Some(Command::Resign),
        "chat" => Some(Command::Chat(rest.trim().to_string())),
        "reconnect" => Some(Command::Reconnect),
        "quit" | "exit" => Some(Command::Shutdown),
        _ => Some(match MoveRequest::parse_coordinate(line) {
            Some(request) => Command::Move(request),
            None => Command::Notation(line.to_string()),
        }),
    }
}

fn show(event: &PeerEvent) {
    match event {
        PeerEvent::Session(SessionEvent::MoveAccepted(record))
        | PeerEvent::Session(SessionEvent::RemoteMoveApplied(record)) => {
            println!("{}. {} {}", (record.ply + 1) / 2, record.color, record.notation);
            if let Ok(board) = ChessRules::board(&record.fen) {
                let material = material_summary(&board);
                if material.white_advantage > 0 {
                    println!("   white +{}", material.white_advantage);
                } else if material.black_advantage > 0 {
                    println!("   black +{}", material.black_advantage);
                }
            }
        }
        PeerEvent::Session(SessionEvent::StatusChanged(status)) => println!("** {}", status),
        PeerEvent::Session(SessionEvent::HistoryReplaced { plies }) => println!("Synchronized at ply {}", plies),
        PeerEvent::Session(SessionEvent::CursorMoved(cursor)) => println!("Viewing position {}", cursor),
        PeerEvent::Session(SessionEvent::ClockTicked { side, remaining_ms }) if remaining_ms % 10_000 == 0 => {
            println!("   {} clock {}s", side, remaining_ms / 1_000)
        }
        PeerEvent::Session(_) => {}
        PeerEvent::Seated(side) => println!("You play {}", side),
        PeerEvent::Rejected(e) => println!("Rejected: {}", e),
        PeerEvent::Room(status) => println!("[{}/2] {}", status.players_count, status.message),
        PeerEvent::Chat { sender, message } => println!("<{}> {}", sender, message),
        PeerEvent::GameOver { reason } => println!("Game over: {}", reason.as_deref().unwrap_or("finished")),
        PeerEvent::RelayError(message) => println!("Relay: {}", message),
        PeerEvent::ResyncRequested { attempt } => println!("Resynchronizing (attempt {})", attempt),
        PeerEvent::Connection(true) => println!("Connected"),
        PeerEvent::Connection(false) => println!("Disconnected, reconnecting..."),
    }
}

fn prepare_session(config: &PeerConfig, store: &GameStore) -> Result<GameSession, Box<dyn std::error::Error>> {
    let mut session = GameSession::new(config.game.clone(), Arc::new(ChessRules::new()), config.time_control());
    if let Some(index) = config.load {
        let saved = store.load_into(index, &mut session)?;
        info!("Resuming saved game \"{}\"", saved.name);
    } else if let Some(path) = &config.pgn {
        let text = std::fs::read_to_string(path)?;
        session.import_pgn(&text)?;
        info!("Imported {} plies from {}", session.log().len(), path.display());
    }
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = PeerConfig::parse();
    let player = config.player.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let store = GameStore::new(&config.store);

    let session = prepare_session(&config, &store)?;
    let peer = Peer::with_session(SessionContext::new(player.clone(), config.game.clone()), session);

    let (command_tx, command_rx) = mpsc::channel(32);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            show(&event);
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match parse_command(&line) {
                Some(command) => command,
                None => continue,
            };
            let quit = command == Command::Shutdown;
            if command_tx.send(command).await.is_err() || quit {
                break;
            }
        }
    });

    info!("Joining game {} as {}", config.game, player);
    let options = TransportOptions {
        url: config.connect_url(&player),
        backoff: config.backoff(),
    };
    let finished = client::run(options, peer, command_rx, event_tx).await;

    let session = finished.peer.session();
    if !session.log().is_empty() {
        let index = store.save(session, None)?;
        info!("Saved as entry {} in {}", index, store.path().display());
        println!("{}", session.export_pgn());
    }
    match finished.gave_up {
        Some(e) => {
            warn!("Giving up: {}", e);
            Err(e.into())
        }
        None => Ok(()),
    }
}
