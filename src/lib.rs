//! # Smash Kills Game Server
//!
//! Authoritative session server for a browser first-person shooter. One
//! shared room: players connect over WebSocket, stream their pose, report
//! hits, and the server decides deaths, counts kills and respawns players.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SMASH KILLS SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  └── vec3.rs     - 3D vector (position, rotation)            │
//! │                                                              │
//! │  game/           - Room rules (synchronous)                  │
//! │  ├── state.rs    - Player sessions and store                 │
//! │  ├── spawn.rs    - Spawn point allocation                    │
//! │  └── combat.rs   - Hits, kills and respawns                  │
//! │                                                              │
//! │  network/        - Transport and tasks (async)               │
//! │  ├── protocol.rs - JSON event frames                         │
//! │  ├── registry.rs - Outbound channel per connection           │
//! │  ├── room.rs     - Store + registry under one lock           │
//! │  ├── router.rs   - Inbound message dispatch                  │
//! │  ├── sweeper.rs  - Idle eviction and stats                   │
//! │  ├── auth.rs     - Optional identity tokens                  │
//! │  └── server.rs   - WebSocket accept loop                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! A player's session and its connection are inserted and removed in the
//! same critical section, so every broadcast reaches exactly the players
//! in the room. Messages are delivered after the lock is released; a
//! closed channel found during delivery is treated as a disconnect.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::vec3::Vec3;
pub use game::state::{PlayerId, PlayerSession};
pub use network::room::{Room, RoomConfig};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Full health
pub const MAX_HEALTH: u32 = 100;

/// Ammo a fresh player starts with
pub const DEFAULT_AMMO: u32 = 30;

/// Name used until a player picks one
pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// Longest accepted display name (characters)
pub const MAX_NAME_LEN: usize = 32;

/// Room capacity
pub const DEFAULT_MAX_PLAYERS: usize = 50;

/// Delay between death and respawn (milliseconds)
pub const RESPAWN_DELAY_MS: u64 = 3000;

/// Silence after which a player is evicted (seconds)
pub const IDLE_TIMEOUT_SECS: u64 = 30;

/// Eviction pass period (seconds)
pub const SWEEP_INTERVAL_SECS: u64 = 30;

/// Stats broadcast period (seconds)
pub const STATS_INTERVAL_SECS: u64 = 10;

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Leaderboard rows in stats
pub const LEADERBOARD_SIZE: usize = 10;
