use serde::{Deserialize, Serialize};

use crate::cell::Cell;

/// Immutable copy of a game's observable state.
///
/// This is the shape every external collaborator sees: the HTTP/WS layer
/// serializes it outward, the persistence layer embeds it in save records,
/// and the registry hands it back after every mutation. `max_tile` is
/// derived (largest numeric tile, 0 on a board with no numbers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub grid: Vec<Vec<Cell>>,
    pub score: u64,
    pub high_score: u64,
    pub moves: u64,
    pub game_over: bool,
    pub won: bool,
    pub size: usize,
    pub max_tile: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_field_names_match_wire_contract() {
        let snap = GameSnapshot {
            grid: vec![vec![Cell::Number(2), Cell::Empty], vec![Cell::Marker, Cell::Empty]],
            score: 2,
            high_score: 16,
            moves: 3,
            game_over: false,
            won: false,
            size: 2,
            max_tile: 2,
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains(r#""grid":[[2,0],["M",0]]"#));
        assert!(json.contains(r#""high_score":16"#));
        assert!(json.contains(r#""max_tile":2"#));
        assert!(json.contains(r#""game_over":false"#));
    }

    #[test]
    fn round_trips_through_json() {
        let snap = GameSnapshot {
            grid: vec![vec![Cell::Empty, Cell::Marker], vec![Cell::Number(4), Cell::Number(8)]],
            score: 12,
            high_score: 120,
            moves: 7,
            game_over: true,
            won: true,
            size: 2,
            max_tile: 8,
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: GameSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
