use serde::{Deserialize, Serialize};

use game_core::{Direction, GameSnapshot};

/// Client-to-server room message (internally tagged JSON).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    GameAction {
        room_id: String,
        action: RoomAction,
        #[serde(default)]
        size: Option<usize>,
    },
    Ping,
}

/// Actions a room player may request on the shared grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomAction {
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    NewGame,
}

impl RoomAction {
    /// The directional move this action maps to, or None for new_game.
    pub fn direction(self) -> Option<Direction> {
        match self {
            RoomAction::MoveLeft => Some(Direction::Left),
            RoomAction::MoveRight => Some(Direction::Right),
            RoomAction::MoveUp => Some(Direction::Up),
            RoomAction::MoveDown => Some(Direction::Down),
            RoomAction::NewGame => None,
        }
    }
}

/// Server-to-client room message (internally tagged JSON).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomJoined {
        room_id: String,
        players_count: usize,
    },
    GameState {
        state: GameSnapshot,
    },
    Error {
        message: String,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_core::Cell;

    #[test]
    fn deserialize_join_room() {
        let json = r#"{"type":"join_room","room_id":"lobby"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::JoinRoom { room_id } => assert_eq!(room_id, "lobby"),
            _ => panic!("Expected JoinRoom"),
        }
    }

    #[test]
    fn deserialize_game_action_move() {
        let json = r#"{"type":"game_action","room_id":"r1","action":"move_left"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::GameAction { room_id, action, size } => {
                assert_eq!(room_id, "r1");
                assert_eq!(action, RoomAction::MoveLeft);
                assert_eq!(action.direction(), Some(Direction::Left));
                assert!(size.is_none());
            }
            _ => panic!("Expected GameAction"),
        }
    }

    #[test]
    fn deserialize_game_action_new_game_with_size() {
        let json = r#"{"type":"game_action","room_id":"r1","action":"new_game","size":6}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::GameAction { action, size, .. } => {
                assert_eq!(action, RoomAction::NewGame);
                assert!(action.direction().is_none());
                assert_eq!(size, Some(6));
            }
            _ => panic!("Expected GameAction"),
        }
    }

    #[test]
    fn deserialize_ping() {
        let json = r#"{"type":"ping"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn deserialize_rejects_unknown_action() {
        let json = r#"{"type":"game_action","room_id":"r1","action":"explode"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn serialize_room_joined() {
        let msg = ServerMessage::RoomJoined {
            room_id: "lobby".to_string(),
            players_count: 3,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"room_joined""#));
        assert!(json.contains(r#""players_count":3"#));
    }

    #[test]
    fn serialize_game_state_embeds_snapshot() {
        let msg = ServerMessage::GameState {
            state: GameSnapshot {
                grid: vec![
                    vec![Cell::Number(2), Cell::Empty],
                    vec![Cell::Marker, Cell::Number(4)],
                ],
                score: 6,
                high_score: 6,
                moves: 1,
                game_over: false,
                won: false,
                size: 2,
                max_tile: 4,
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"game_state""#));
        assert!(json.contains(r#""grid":[[2,0],["M",4]]"#));
        assert!(json.contains(r#""max_tile":4"#));
    }

    #[test]
    fn serialize_error() {
        let msg = ServerMessage::Error {
            message: "no game registered".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("no game registered"));
    }

    #[test]
    fn serialize_pong() {
        let msg = ServerMessage::Pong;
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"type":"pong"}"#);
    }
}
