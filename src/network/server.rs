//! WebSocket Game Server
//!
//! Accepts WebSocket connections and wires each one into the room: a
//! writer task drains the connection's outbound queue into the socket
//! while the connection task reads frames and hands them to the router.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Error as WsError, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::state::PlayerId;
use crate::network::auth::{AuthConfig, AuthError, IdentityProvider, JwtIdentityProvider};
use crate::network::protocol::{ErrorCode, ServerError, ServerMessage};
use crate::network::room::{env_or, Room, RoomConfig, RoomError};
use crate::network::router::EventRouter;
use crate::network::sweeper::LivenessSweeper;
use crate::{DEFAULT_PORT, VERSION};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Room settings.
    pub room: RoomConfig,
    /// Identity token validation.
    pub auth: AuthConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            room: RoomConfig::default(),
            auth: AuthConfig::default(),
            version: VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let host: IpAddr = env_or("BIND_ADDR", IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port: u16 = env_or("PORT", DEFAULT_PORT);
        Self {
            bind_addr: SocketAddr::new(host, port),
            room: RoomConfig::from_env(),
            auth: AuthConfig::from_env(),
            version: VERSION.to_string(),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Room error.
    #[error("Room error: {0}")]
    Room(#[from] RoomError),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The shared room.
    room: Arc<Room>,
    /// Inbound message dispatch.
    router: Arc<EventRouter>,
    /// Set once shutdown was requested.
    stopping: AtomicBool,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let room = Arc::new(Room::new(config.room.clone()));

        let mut router = EventRouter::new(Arc::clone(&room));
        match JwtIdentityProvider::from_config(&config.auth) {
            Ok(provider) => {
                let provider: Arc<dyn IdentityProvider> = Arc::new(provider);
                router = router.with_identity(provider);
            }
            Err(AuthError::NotConfigured) => debug!("No identity provider configured, tokens ignored"),
            Err(e) => warn!("Identity provider disabled: {}", e),
        }

        Self {
            config,
            room,
            router: Arc::new(router),
            stopping: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!(
            "Game server v{} listening on {}",
            self.config.version,
            listener.local_addr()?
        );

        let sweeper = LivenessSweeper::new(Arc::clone(&self.room)).spawn(self.shutdown_tx.subscribe());

        while !self.stopping.load(Ordering::SeqCst) {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.room.shutdown("Server shutting down").await;
        sweeper.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let room = Arc::clone(&self.room);
        let router = Arc::clone(&self.router);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(room.config().outbound_capacity);

            // The registry holds the only sender; dropping it there ends the writer
            let id = match room.on_connect(msg_tx, Some(addr)).await {
                Ok(id) => id,
                Err(e) => {
                    warn!("Rejecting {}: {}", addr, e);
                    let reply = match e {
                        RoomError::RoomFull { .. } => ServerMessage::Error(ServerError {
                            code: ErrorCode::CapacityExceeded,
                            message: e.to_string(),
                        }),
                        RoomError::Closed => ServerMessage::Shutdown { reason: e.to_string() },
                    };
                    if let Ok(text) = reply.to_json() {
                        let _ = ws_sender.send(Message::Text(text)).await;
                    }
                    let _ = ws_sender.close().await;
                    return;
                }
            };

            // Spawn message sender task
            let mut writer = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize {}: {}", msg.event_name(), e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    frame = ws_receiver.next() => {
                        if !handle_frame(&router, id, frame).await {
                            break;
                        }
                    }
                    _ = &mut writer => {
                        debug!("Outbound stream for {} ended", id);
                        break;
                    }
                }
            }

            // Cleanup
            room.on_disconnect(id).await;
            writer.abort();
        });
    }

    /// Verify `playerReady` tokens with `provider` instead of the configured JWT keys.
    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.router = Arc::new(EventRouter::new(Arc::clone(&self.room)).with_identity(provider));
        self
    }

    /// Signal the accept loop, sweeper and room to shut down.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// The shared room.
    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.room.player_count().await
    }
}

/// Dispatch one inbound frame. Returns false once the connection is done.
///
/// A panicking handler is contained here: the client gets an
/// `internal_error` and the connection stays up.
async fn handle_frame(
    router: &EventRouter,
    id: PlayerId,
    frame: Option<Result<Message, WsError>>,
) -> bool {
    let handled = match frame {
        Some(Ok(Message::Text(text))) => {
            AssertUnwindSafe(router.on_text(id, &text)).catch_unwind().await
        }
        Some(Ok(Message::Binary(data))) => {
            AssertUnwindSafe(router.on_binary(id, &data)).catch_unwind().await
        }
        Some(Ok(Message::Close(_))) | None => {
            debug!("Client {} closed the connection", id);
            return false;
        }
        Some(Err(e)) => {
            debug!("WebSocket error for {}: {}", id, e);
            return false;
        }
        // Control frames are answered by tungstenite
        Some(Ok(_)) => Ok(()),
    };

    if handled.is_err() {
        error!("Handler panicked for {}", id);
        router
            .room()
            .send_to(id, ServerMessage::Error(ServerError {
                code: ErrorCode::InternalError,
                message: "Internal server error".to_string(),
            }))
            .await;
    }
    true
}
