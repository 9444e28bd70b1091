//! Player State Store
//!
//! Per-player session records and the id-keyed map that holds them.
//! Uses BTreeMap so roster snapshots come out in a stable order.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;
use crate::{DEFAULT_AMMO, DEFAULT_PLAYER_NAME, MAX_HEALTH, MAX_NAME_LEN};

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier, bound to one connection for its lifetime.
///
/// Serialized as a hyphenated UUID string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(uuid::Uuid);

impl PlayerId {
    /// Allocate a fresh random id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse from a UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First block is enough to tell players apart in logs
        let s = self.0.simple().to_string();
        write!(f, "PlayerId({})", &s[..8])
    }
}

// =============================================================================
// LIFE STATE
// =============================================================================

/// Alive/dead state machine.
///
/// `Alive -(health hits 0)-> Dead -(respawn fires)-> Alive`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeState {
    /// Can take damage.
    #[default]
    Alive,
    /// Waiting for respawn; further hits are ignored.
    Dead,
}

// =============================================================================
// POSE
// =============================================================================

/// Client-reported pose, already normalized to integer health/ammo.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    /// Position in world space
    pub position: Vec3,
    /// Camera rotation
    pub rotation: Vec3,
    /// Reported health, 0..=MAX_HEALTH
    pub health: u32,
    /// Reported ammo
    pub ammo: u32,
}

// =============================================================================
// PLAYER SESSION
// =============================================================================

/// Mutable record for one connected player.
#[derive(Clone, Debug)]
pub struct PlayerSession {
    /// Player identifier
    pub id: PlayerId,
    /// Display name (placeholder until `ready`)
    pub display_name: String,
    /// Last known position
    pub position: Vec3,
    /// Last known rotation
    pub rotation: Vec3,
    /// Health, never above MAX_HEALTH
    pub health: u32,
    /// Client-reported ammo
    pub ammo: u32,
    /// Kill counter, only ever incremented
    pub kills: u32,
    /// Alive/dead state
    pub life: LifeState,
    /// Time of the most recent inbound message
    pub last_activity: Instant,
}

impl PlayerSession {
    /// Create a fresh session at a spawn position.
    pub fn new(id: PlayerId, spawn: Vec3, now: Instant) -> Self {
        Self {
            id,
            display_name: DEFAULT_PLAYER_NAME.to_string(),
            position: spawn,
            rotation: Vec3::ZERO,
            health: MAX_HEALTH,
            ammo: DEFAULT_AMMO,
            kills: 0,
            life: LifeState::Alive,
            last_activity: now,
        }
    }

    /// Is the player alive?
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.life == LifeState::Alive
    }

    /// Record inbound activity.
    #[inline]
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Has the session been silent for at least `timeout`?
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= timeout
    }

    /// Overwrite the pose with client data (last write wins).
    ///
    /// A dead player keeps health 0 until respawn regardless of what the
    /// client reports.
    pub fn apply_pose(&mut self, pose: Pose) {
        self.position = pose.position;
        self.rotation = pose.rotation;
        self.ammo = pose.ammo;
        if self.is_alive() {
            self.health = pose.health.min(MAX_HEALTH);
        }
    }

    /// Set the display name; `None` or a blank name leaves it unchanged.
    pub fn set_display_name(&mut self, name: Option<&str>) {
        if let Some(name) = name.and_then(normalize_name) {
            self.display_name = name;
        }
    }
}

/// Trim and bound a requested display name. Blank names are rejected.
pub fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_LEN).collect())
}

// =============================================================================
// PLAYER STORE
// =============================================================================

/// Id-keyed map of player sessions.
#[derive(Clone, Debug, Default)]
pub struct PlayerStore {
    players: BTreeMap<PlayerId, PlayerSession>,
}

impl PlayerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Returns false if the id is already present.
    pub fn insert(&mut self, session: PlayerSession) -> bool {
        if self.players.contains_key(&session.id) {
            return false;
        }
        self.players.insert(session.id, session);
        true
    }

    /// Remove a session.
    pub fn remove(&mut self, id: &PlayerId) -> Option<PlayerSession> {
        self.players.remove(id)
    }

    /// Get a session.
    pub fn get(&self, id: &PlayerId) -> Option<&PlayerSession> {
        self.players.get(id)
    }

    /// Get a session mutably.
    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut PlayerSession> {
        self.players.get_mut(id)
    }

    /// Is this id present?
    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Is the store empty?
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Iterate sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerSession> {
        self.players.values()
    }

    /// Ids in id order.
    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    /// Ids of sessions silent for at least `timeout`.
    pub fn idle_ids(&self, now: Instant, timeout: Duration) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| p.is_idle(now, timeout))
            .map(|p| p.id)
            .collect()
    }

    /// Sessions ranked by kills (descending), ties broken by id.
    pub fn ranked_by_kills(&self, limit: usize) -> Vec<&PlayerSession> {
        let mut ranked: Vec<&PlayerSession> = self.players.values().collect();
        ranked.sort_by(|a, b| b.kills.cmp(&a.kills).then(a.id.cmp(&b.id)));
        ranked.truncate(limit);
        ranked
    }

    /// Drop every session.
    pub fn clear(&mut self) {
        self.players.clear();
    }
}
