//! Combat Resolver
//!
//! Applies damage, detects the Alive -> Dead transition, attributes kills
//! and restores players on respawn. Pure functions over the player store;
//! scheduling the respawn timer is the caller's job.

use crate::core::vec3::Vec3;
use crate::game::state::{LifeState, PlayerId, PlayerStore};
use crate::{DEFAULT_PLAYER_NAME, MAX_HEALTH};

/// Kill attribution, with names captured at the moment of death.
#[derive(Clone, Debug, PartialEq)]
pub struct KillRecord {
    /// Shooter
    pub killer: PlayerId,
    /// Target that died
    pub victim: PlayerId,
    /// Shooter's display name at death time
    pub killer_name: String,
    /// Victim's display name at death time
    pub victim_name: String,
}

/// Result of a hit against a live session.
#[derive(Clone, Debug, PartialEq)]
pub struct HitOutcome {
    /// Target health after the hit
    pub target_health: u32,
    /// Set only on the Alive -> Dead transition
    pub kill: Option<KillRecord>,
}

impl HitOutcome {
    /// Did this hit kill the target?
    pub fn died(&self) -> bool {
        self.kill.is_some()
    }
}

/// Result of a completed respawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RespawnRecord {
    /// Player that respawned
    pub id: PlayerId,
    /// New position from the spawn pool
    pub position: Vec3,
    /// Restored health
    pub health: u32,
}

/// Apply `damage` from `shooter` to `target`.
///
/// Returns `None` when the target no longer exists. A target that is
/// already dead, or alive but reporting zero health, absorbs the hit
/// without effect, so a death is credited exactly once until the next
/// respawn.
pub fn apply_hit(
    players: &mut PlayerStore,
    shooter: PlayerId,
    target: PlayerId,
    damage: u32,
) -> Option<HitOutcome> {
    let victim = players.get_mut(&target)?;

    // Death needs Alive with health left to lose
    if victim.life == LifeState::Dead || victim.health == 0 {
        return Some(HitOutcome { target_health: victim.health, kill: None });
    }

    victim.health = victim.health.saturating_sub(damage).min(MAX_HEALTH);
    let target_health = victim.health;

    if target_health > 0 {
        return Some(HitOutcome { target_health, kill: None });
    }

    victim.life = LifeState::Dead;
    let victim_name = victim.display_name.clone();

    let killer_name = match players.get_mut(&shooter) {
        Some(killer) => {
            killer.kills = killer.kills.saturating_add(1);
            killer.display_name.clone()
        }
        None => DEFAULT_PLAYER_NAME.to_string(),
    };

    Some(HitOutcome {
        target_health: 0,
        kill: Some(KillRecord {
            killer: shooter,
            victim: target,
            killer_name,
            victim_name,
        }),
    })
}

/// Bring a dead player back at `spawn` with full health.
///
/// Returns `None` if the player is gone or not dead (nothing to do).
pub fn respawn(players: &mut PlayerStore, target: PlayerId, spawn: Vec3) -> Option<RespawnRecord> {
    let player = players.get_mut(&target)?;
    if player.life != LifeState::Dead {
        return None;
    }

    player.life = LifeState::Alive;
    player.health = MAX_HEALTH;
    player.position = spawn;

    Some(RespawnRecord {
        id: target,
        position: spawn,
        health: MAX_HEALTH,
    })
}
