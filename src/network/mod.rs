//! Network Layer
//!
//! Async side of the server: the shared room, the WebSocket transport,
//! message routing and the background sweeper. All rule decisions are
//! delegated to `game/`.

pub mod auth;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod sweeper;

pub use auth::{AuthConfig, AuthError, Identity, IdentityProvider, JwtIdentityProvider};
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{Connection, ConnectionRegistry};
pub use room::{Room, RoomConfig, RoomError};
pub use router::EventRouter;
pub use server::{GameServer, GameServerError, ServerConfig};
pub use sweeper::LivenessSweeper;
