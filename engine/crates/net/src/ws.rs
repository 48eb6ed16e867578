//! WebSocket rooms: join a shared game, receive every accepted change.
//!
//! Each socket gets one writer task draining an mpsc queue, plus one
//! forwarder task per joined room relaying that room's broadcast channel
//! into the queue. Dropping the socket aborts all of them.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{ClientMessage, RoomAction, ServerMessage};
use crate::web_server::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn write_out(
    mut sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = out_rx.recv().await {
        let Ok(text) = serde_json::to_string(&msg) else {
            continue;
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(write_out(sink, out_rx));

    // Forwarder task per joined room, keyed by room id.
    let mut joined: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let client_msg: ClientMessage = match serde_json::from_str(text.as_str()) {
            Ok(m) => m,
            Err(e) => {
                let _ = out_tx.send(ServerMessage::Error {
                    message: format!("unrecognized message: {}", e),
                });
                continue;
            }
        };
        match client_msg {
            ClientMessage::JoinRoom { room_id } => {
                if let Err(e) = join_room(&state, &room_id, &out_tx, &mut joined) {
                    let _ = out_tx.send(ServerMessage::Error { message: e });
                }
            }
            ClientMessage::LeaveRoom { room_id } => {
                if let Some(forwarder) = joined.remove(&room_id) {
                    forwarder.abort();
                    tracing::debug!(room_id, "player left room");
                }
            }
            ClientMessage::GameAction {
                room_id,
                action,
                size,
            } => {
                if let Err(e) = apply_action(&state, &room_id, action, size) {
                    let _ = out_tx.send(ServerMessage::Error { message: e });
                }
            }
            ClientMessage::Ping => {
                let _ = out_tx.send(ServerMessage::Pong);
            }
        }
    }

    for forwarder in joined.into_values() {
        forwarder.abort();
    }
    writer.abort();
}

fn join_room(
    state: &AppState,
    room_id: &str,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    joined: &mut HashMap<String, JoinHandle<()>>,
) -> Result<(), String> {
    let snapshot = state
        .rooms
        .get_or_create(room_id)
        .map_err(|e| e.to_string())?;
    let mut changes = state.rooms.subscribe(room_id).map_err(|e| e.to_string())?;

    // Re-joining replaces the old subscription rather than doubling it.
    if let Some(previous) = joined.remove(room_id) {
        previous.abort();
    }
    let tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(snapshot) => {
                    if tx.send(ServerMessage::GameState { state: snapshot }).is_err() {
                        break;
                    }
                }
                // Missed snapshots are fine; the next one is authoritative.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
    joined.insert(room_id.to_string(), forwarder);

    let players_count = state.rooms.watcher_count(room_id);
    tracing::debug!(room_id, players_count, "player joined room");
    let _ = out_tx.send(ServerMessage::RoomJoined {
        room_id: room_id.to_string(),
        players_count,
    });
    // The joiner sees the current board immediately, not on the next move.
    let _ = out_tx.send(ServerMessage::GameState { state: snapshot });
    Ok(())
}

fn apply_action(
    state: &AppState,
    room_id: &str,
    action: RoomAction,
    size: Option<usize>,
) -> Result<(), String> {
    match action.direction() {
        Some(direction) => {
            // Accepted moves reach players through the room's broadcast
            // channel; a rejected (no-op) move produces no traffic.
            state
                .rooms
                .apply_move(room_id, direction)
                .map_err(|e| e.to_string())?;
        }
        None => {
            let size = match size {
                Some(s) => Some(state.limits.check(s).map_err(|e| e.message)?),
                None => None,
            };
            state.rooms.reset(room_id, size).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}
