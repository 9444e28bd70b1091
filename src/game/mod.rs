//! Game Logic Module
//!
//! Synchronous room state and rules. Nothing here touches a socket or a
//! clock it was not handed.
//!
//! ## Module Structure
//!
//! - `state`: Player sessions and the player store
//! - `spawn`: Spawn point selection
//! - `combat`: Damage, kills and respawns

pub mod combat;
pub mod spawn;
pub mod state;

// Re-export key types
pub use combat::{HitOutcome, KillRecord, RespawnRecord};
pub use spawn::SpawnAllocator;
pub use state::{LifeState, PlayerId, PlayerSession, PlayerStore, Pose};
