//! Tile-merge game engine: a pure, single-grid state machine.
//!
//! The engine knows nothing about sessions, sockets or files; it applies
//! directional moves, spawns tiles, tracks score and detects terminal
//! boards. The registry crate layers concurrency on top.

pub mod cell;
pub mod error;
pub mod game;
pub mod snapshot;

pub use cell::Cell;
pub use error::{GameError, MIN_GRID_SIZE};
pub use game::{Direction, Game, WIN_TILE};
pub use snapshot::GameSnapshot;
