//! HTTP surface: JSON game API, performance report, static assets.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use game_core::{Direction, GameError, GameSnapshot};
use observability::RequestMetrics;
use persistence::{PersistenceError, SaveInfo, SaveStore};
use registry::{RegistryError, SessionRegistry};

use crate::stats::{PerformanceReport, ServerStats};

pub const DEFAULT_SAVE_NAME: &str = "auto_save";

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bounds on grid sizes clients may request.
#[derive(Debug, Clone, Copy)]
pub struct SizeLimits {
    pub min: usize,
    pub max: usize,
}

impl SizeLimits {
    /// Accept `size`, capping it at the maximum. Undersized requests are
    /// rejected rather than silently grown.
    pub fn check(&self, size: usize) -> Result<usize, ApiError> {
        if size < self.min {
            return Err(ApiError::bad_request(format!(
                "grid size {} below minimum {}",
                size, self.min
            )));
        }
        Ok(size.min(self.max))
    }
}

#[derive(Clone)]
pub struct AppState {
    /// Per-client single-player games, keyed by session id.
    pub sessions: Arc<SessionRegistry>,
    /// Shared multiplayer rooms, keyed by room id.
    pub rooms: Arc<SessionRegistry>,
    pub saves: Arc<SaveStore>,
    pub stats: Arc<ServerStats>,
    pub limits: SizeLimits,
}

/// JSON error payload `{"error": ...}` with a mapped status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let status = match &e {
            RegistryError::KeyNotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Game(GameError::InvalidConfiguration(_)) => StatusCode::BAD_REQUEST,
            RegistryError::Game(GameError::Corrupt(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: e.to_string(),
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "request failed: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: Direction,
}

#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub moved: bool,
    pub state: GameSnapshot,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewGameRequest {
    pub size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub saved: bool,
    pub name: String,
}

async fn get_state(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GameSnapshot>, ApiError> {
    Ok(Json(state.sessions.get_or_create(&key)?))
}

async fn post_move(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<MoveResponse>, ApiError> {
    let (moved, snapshot) = state.sessions.apply_move(&key, req.direction)?;
    Ok(Json(MoveResponse {
        moved,
        state: snapshot,
    }))
}

async fn post_new(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<NewGameRequest>>,
) -> Result<Json<GameSnapshot>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let size = match req.size {
        Some(s) => Some(state.limits.check(s)?),
        None => None,
    };
    Ok(Json(state.sessions.reset(&key, size)?))
}

async fn delete_game(State(state): State<AppState>, Path(key): Path<String>) -> StatusCode {
    state.sessions.remove(&key);
    StatusCode::NO_CONTENT
}

async fn post_save(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<SaveRequest>>,
) -> Result<Json<SaveResponse>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let name = req.name.unwrap_or_else(|| DEFAULT_SAVE_NAME.to_string());
    let snapshot = state.sessions.get(&key)?;
    state.saves.save(&name, &snapshot)?;
    Ok(Json(SaveResponse { saved: true, name }))
}

async fn post_load(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<SaveRequest>>,
) -> Result<Json<GameSnapshot>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let name = req.name.unwrap_or_else(|| DEFAULT_SAVE_NAME.to_string());
    let snapshot = state
        .saves
        .load(&name)?
        .ok_or_else(|| ApiError::not_found(format!("no save named {:?}", name)))?;
    Ok(Json(state.sessions.restore(&key, &snapshot)?))
}

async fn list_saves(State(state): State<AppState>) -> Result<Json<Vec<SaveInfo>>, ApiError> {
    Ok(Json(state.saves.list()?))
}

async fn performance(State(state): State<AppState>) -> Json<PerformanceReport> {
    Json(state.stats.report(
        state.sessions.active_count(),
        state.rooms.active_count(),
    ))
}

/// Counts every request into [`ServerStats`] and emits a timing log line.
async fn track_requests(
    State(stats): State<Arc<ServerStats>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();
    let status = response.status();
    stats.record(duration, status.is_server_error());
    RequestMetrics {
        method,
        path,
        status: status.as_u16(),
        duration_us: duration.as_micros(),
    }
    .log();
    response
}

pub fn build_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/api/game/{key}/state", get(get_state))
        .route("/api/game/{key}/move", post(post_move))
        .route("/api/game/{key}/new", post(post_new))
        .route("/api/game/{key}/save", post(post_save))
        .route("/api/game/{key}/load", post(post_load))
        .route("/api/game/{key}", delete(delete_game))
        .route("/api/saves", get(list_saves))
        .route("/api/performance", get(performance))
        .route("/ws", any(crate::ws::ws_handler));

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.stats.clone(),
            track_requests,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the router on `addr` until the shutdown channel flips.
pub async fn run_web_server_with_shutdown(
    addr: String,
    state: AppState,
    static_dir: Option<PathBuf>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), NetError> {
    let app = build_router(state, static_dir);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "web server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            tracing::info!("web server shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_limits_cap_and_reject() {
        let limits = SizeLimits { min: 2, max: 8 };
        assert_eq!(limits.check(4).unwrap(), 4);
        assert_eq!(limits.check(20).unwrap(), 8);
        assert!(limits.check(1).is_err());
    }

    #[test]
    fn registry_errors_map_to_statuses() {
        let not_found: ApiError = RegistryError::KeyNotFound("k".into()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let bad: ApiError = RegistryError::Game(GameError::InvalidConfiguration(1)).into();
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let corrupt: ApiError = RegistryError::Game(GameError::Corrupt("x".into())).into();
        assert_eq!(corrupt.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn move_request_parses_direction() {
        let req: MoveRequest = serde_json::from_str(r#"{"direction":"up"}"#).unwrap();
        assert_eq!(req.direction, Direction::Up);
        assert!(serde_json::from_str::<MoveRequest>(r#"{"direction":"sideways"}"#).is_err());
    }
}
