//! Smash Kills Game Server
//!
//! Runs the shared room on a WebSocket listener until Ctrl-C.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use smash_kills::{GameServer, ServerConfig, VERSION};

#[cfg(feature = "debug-tracing")]
const DEFAULT_FILTER: &str = "debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_FILTER: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();
    info!("Smash Kills Server v{}", VERSION);
    info!(
        "Room: {} players max, respawn {:?}, idle timeout {:?}",
        config.room.max_players, config.room.respawn_delay, config.room.idle_timeout
    );
    if config.auth.is_configured() {
        info!("Identity tokens enabled");
    }

    let server = Arc::new(GameServer::new(config));

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
