//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`,
//! using the event names the browser client already speaks.

use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;
use crate::game::combat::{KillRecord, RespawnRecord};
use crate::game::state::{PlayerId, PlayerSession, Pose};
use crate::MAX_HEALTH;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Player is ready to play; optionally names itself.
    PlayerReady(ReadyRequest),

    /// Pose update (sent roughly every 100ms).
    PlayerData(PoseUpdate),

    /// Hit report against another player.
    Hit(HitReport),

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back. Fractional clocks such as
        /// `performance.now()` are accepted.
        timestamp: f64,
    },
}

/// Ready request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadyRequest {
    /// Requested display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Identity token from the external login flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Client pose update. Health and ammo arrive as JSON numbers of any kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseUpdate {
    /// Position in world space.
    pub position: Vec3,
    /// Camera rotation.
    pub rotation: Vec3,
    /// Reported health.
    pub health: f64,
    /// Reported ammo.
    pub ammo: f64,
}

impl PoseUpdate {
    /// Normalize into a [`Pose`]. Returns `None` for non-finite values.
    pub fn to_pose(&self) -> Option<Pose> {
        if !self.position.is_finite() || !self.rotation.is_finite() {
            return None;
        }
        if !self.health.is_finite() || !self.ammo.is_finite() {
            return None;
        }
        Some(Pose {
            position: self.position,
            rotation: self.rotation,
            health: self.health.round().clamp(0.0, MAX_HEALTH as f64) as u32,
            ammo: self.ammo.round().max(0.0).min(u32::MAX as f64) as u32,
        })
    }
}

/// Hit report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitReport {
    /// Target player id.
    pub target: String,
    /// Damage dealt.
    pub damage: f64,
    /// Projectile kind, informational only.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl HitReport {
    /// Parsed target id, if well formed.
    pub fn target_id(&self) -> Option<PlayerId> {
        PlayerId::parse(&self.target)
    }

    /// Damage as a whole number. Negative or non-finite damage is rejected.
    pub fn damage_points(&self) -> Option<u32> {
        if !self.damage.is_finite() || self.damage < 0.0 {
            return None;
        }
        Some(self.damage.round().min(u32::MAX as f64) as u32)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// First frame on a new connection: the client's own id.
    Welcome(WelcomeInfo),

    /// Full roster, sent once to a newly joined player.
    PlayerList(Vec<PlayerInfo>),

    /// Someone else joined.
    PlayerJoined(PlayerInfo),

    /// A player left (disconnect or eviction).
    PlayerLeft(PlayerId),

    /// Another player's pose changed.
    PlayerUpdate(PoseBroadcast),

    /// A player was killed.
    Kill(KillEvent),

    /// A dead player came back.
    PlayerRespawn(RespawnEvent),

    /// Periodic room statistics.
    ServerStats(ServerStats),

    /// Pong response.
    Pong {
        /// Echo of the client's ping timestamp.
        timestamp: f64,
        /// Server time (Unix milliseconds).
        #[serde(rename = "serverTime")]
        server_time: i64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why the server is going away.
        reason: String,
    },
}

/// Connection greeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeInfo {
    /// Id assigned to this connection.
    pub id: PlayerId,
    /// Server version.
    pub server_version: String,
}

/// Roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Current position.
    pub position: Vec3,
    /// Current health.
    pub health: u32,
}

impl From<&PlayerSession> for PlayerInfo {
    fn from(p: &PlayerSession) -> Self {
        Self {
            id: p.id,
            name: p.display_name.clone(),
            position: p.position,
            health: p.health,
        }
    }
}

/// Pose relayed to other players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseBroadcast {
    /// Player identifier.
    pub id: PlayerId,
    /// Position.
    pub position: Vec3,
    /// Rotation.
    pub rotation: Vec3,
    /// Health.
    pub health: u32,
    /// Ammo.
    pub ammo: u32,
}

impl From<&PlayerSession> for PoseBroadcast {
    fn from(p: &PlayerSession) -> Self {
        Self {
            id: p.id,
            position: p.position,
            rotation: p.rotation,
            health: p.health,
            ammo: p.ammo,
        }
    }
}

/// Kill notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillEvent {
    /// Shooter.
    pub killer: PlayerId,
    /// Victim.
    pub victim: PlayerId,
    /// Shooter name at death time.
    pub killer_name: String,
    /// Victim name at death time.
    pub victim_name: String,
}

impl From<KillRecord> for KillEvent {
    fn from(k: KillRecord) -> Self {
        Self {
            killer: k.killer,
            victim: k.victim,
            killer_name: k.killer_name,
            victim_name: k.victim_name,
        }
    }
}

/// Respawn notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespawnEvent {
    /// Player identifier.
    pub id: PlayerId,
    /// Spawn position.
    pub position: Vec3,
    /// Restored health.
    pub health: u32,
}

impl From<RespawnRecord> for RespawnEvent {
    fn from(r: RespawnRecord) -> Self {
        Self {
            id: r.id,
            position: r.position,
            health: r.health,
        }
    }
}

/// Room statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    /// Connected players.
    pub player_count: usize,
    /// Server time (Unix milliseconds).
    pub timestamp: i64,
    /// Top players by kills.
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Kill count.
    pub kills: u32,
}

impl From<&PlayerSession> for LeaderboardEntry {
    fn from(p: &PlayerSession) -> Self {
        Self {
            id: p.id,
            name: p.display_name.clone(),
            kills: p.kills,
        }
    }
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Room is at its player limit.
    CapacityExceeded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Deserialize from a binary frame carrying UTF-8 JSON.
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Event name on the wire, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Welcome(_) => "welcome",
            ServerMessage::PlayerList(_) => "playerList",
            ServerMessage::PlayerJoined(_) => "playerJoined",
            ServerMessage::PlayerLeft(_) => "playerLeft",
            ServerMessage::PlayerUpdate(_) => "playerUpdate",
            ServerMessage::Kill(_) => "kill",
            ServerMessage::PlayerRespawn(_) => "playerRespawn",
            ServerMessage::ServerStats(_) => "serverStats",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Error(_) => "error",
            ServerMessage::Shutdown { .. } => "shutdown",
        }
    }
}
