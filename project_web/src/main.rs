mod config;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use net::{AppState, ServerStats};
use persistence::{PersistenceError, SaveStore};
use registry::SessionRegistry;

use crate::config::{parse_cli_args, ServerConfig};

#[tokio::main]
async fn main() {
    observability::init_logging();

    let config = parse_cli_args();
    tracing::info!("Tile server starting...");

    let state = match build_state(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize server state: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = shutdown::shutdown_channel();

    let static_dir = {
        let p = PathBuf::from(&config.net.web_static_dir);
        if p.is_dir() { Some(p) } else { None }
    };
    let addr = config.net.http_addr.clone();
    let mut server = tokio::spawn(async move {
        if let Err(e) =
            net::run_web_server_with_shutdown(addr, state, static_dir, shutdown_rx.into_inner())
                .await
        {
            tracing::error!("Web server error: {}", e);
        }
    });

    let signalled = tokio::select! {
        _ = shutdown::wait_for_signal() => {
            tracing::info!("Shutdown signal received, stopping server...");
            shutdown_tx.trigger();
            true
        }
        _ = &mut server => false,
    };
    if signalled {
        // The server task returns once in-flight connections have drained.
        let _ = server.await;
    }

    tracing::info!("Server stopped.");
}

fn build_state(config: &ServerConfig) -> Result<AppState, PersistenceError> {
    Ok(AppState {
        sessions: Arc::new(SessionRegistry::new(config.game.default_size)),
        rooms: Arc::new(SessionRegistry::new(config.game.default_size)),
        saves: Arc::new(SaveStore::new(&config.save.save_dir)?),
        stats: Arc::new(ServerStats::new()),
        limits: config.to_size_limits(),
    })
}
