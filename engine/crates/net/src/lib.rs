//! HTTP and WebSocket transport for the tile engine.

pub mod protocol;
pub mod stats;
pub mod web_server;
pub mod ws;

pub use protocol::{ClientMessage, RoomAction, ServerMessage};
pub use stats::{PerformanceReport, ServerStats};
pub use web_server::{
    run_web_server_with_shutdown, AppState, NetError, SizeLimits, DEFAULT_SAVE_NAME,
};
