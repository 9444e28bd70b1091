//! Room
//!
//! The single shared game session. Owns the player store, the connection
//! registry and the pending respawn timers behind one lock, so a session
//! and its connection are always added and removed together.
//!
//! Outbound messages are snapshotted under the lock and delivered after it
//! is released. The one exception is the greeting of a new connection,
//! which is queued on its private channel inside the registering critical
//! section so it always precedes any broadcast the newcomer receives.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::game::combat::{self, HitOutcome};
use crate::game::spawn::SpawnAllocator;
use crate::game::state::{PlayerId, PlayerSession, PlayerStore, Pose};
use crate::network::protocol::{
    LeaderboardEntry, PlayerInfo, PoseBroadcast, ServerMessage, ServerStats, WelcomeInfo,
};
use crate::network::registry::{deliver, Connection, ConnectionRegistry, Outbound};
use crate::{
    DEFAULT_MAX_PLAYERS, IDLE_TIMEOUT_SECS, LEADERBOARD_SIZE, RESPAWN_DELAY_MS,
    STATS_INTERVAL_SECS, SWEEP_INTERVAL_SECS, VERSION,
};

/// Room configuration.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Maximum concurrent players.
    pub max_players: usize,
    /// Delay between death and respawn.
    pub respawn_delay: Duration,
    /// Silence after which a player is evicted.
    pub idle_timeout: Duration,
    /// How often the sweeper looks for idle players.
    pub sweep_interval: Duration,
    /// How often stats are broadcast.
    pub stats_interval: Duration,
    /// Per-connection outbound queue length.
    pub outbound_capacity: usize,
    /// Rows in the stats leaderboard.
    pub leaderboard_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: DEFAULT_MAX_PLAYERS,
            respawn_delay: Duration::from_millis(RESPAWN_DELAY_MS),
            idle_timeout: Duration::from_secs(IDLE_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            stats_interval: Duration::from_secs(STATS_INTERVAL_SECS),
            outbound_capacity: 256,
            leaderboard_size: LEADERBOARD_SIZE,
        }
    }
}

impl RoomConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_players: env_or("MAX_PLAYERS", defaults.max_players),
            respawn_delay: Duration::from_millis(env_or(
                "RESPAWN_DELAY_MS",
                defaults.respawn_delay.as_millis() as u64,
            )),
            idle_timeout: env_period_secs("IDLE_TIMEOUT_SECS", defaults.idle_timeout),
            sweep_interval: env_period_secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            stats_interval: env_period_secs("STATS_INTERVAL_SECS", defaults.stats_interval),
            ..defaults
        }
    }
}

/// Read and parse an environment variable, warning on garbage.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid value for {}: {:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a period in whole seconds. Zero is rejected like garbage.
fn env_period_secs(key: &str, default: Duration) -> Duration {
    match env_or(key, default.as_secs()) {
        0 => {
            warn!("{} must be positive, using default", key);
            default
        }
        secs => Duration::from_secs(secs),
    }
}

/// Room errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Player limit reached.
    #[error("Room is full ({max} players)")]
    RoomFull {
        /// Configured limit.
        max: usize,
    },

    /// Room has been shut down.
    #[error("Room is closed")]
    Closed,
}

/// Everything guarded by the room lock.
struct RoomState {
    players: PlayerStore,
    connections: ConnectionRegistry,
    respawns: BTreeMap<PlayerId, AbortHandle>,
    open: bool,
}

impl RoomState {
    /// Remove a player from both maps and cancel its respawn.
    fn remove(&mut self, id: &PlayerId) -> Option<(PlayerSession, Connection)> {
        if let Some(handle) = self.respawns.remove(id) {
            handle.abort();
        }
        let session = self.players.remove(id);
        let connection = self.connections.remove(id);
        match (session, connection) {
            (Some(s), Some(c)) => Some((s, c)),
            (None, None) => None,
            _ => {
                // Both maps are only ever changed together
                warn!("Room maps out of sync for {}", id);
                None
            }
        }
    }
}

/// The shared game room.
pub struct Room {
    config: RoomConfig,
    spawns: SpawnAllocator,
    state: RwLock<RoomState>,
}

impl Room {
    /// Create a new, open room.
    pub fn new(config: RoomConfig) -> Self {
        Self::with_spawns(config, SpawnAllocator::default())
    }

    /// Create a room with a custom spawn pool.
    pub fn with_spawns(config: RoomConfig, spawns: SpawnAllocator) -> Self {
        Self {
            config,
            spawns,
            state: RwLock::new(RoomState {
                players: PlayerStore::new(),
                connections: ConnectionRegistry::new(),
                respawns: BTreeMap::new(),
                open: true,
            }),
        }
    }

    /// Room configuration.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Spawn allocator.
    pub fn spawns(&self) -> &SpawnAllocator {
        &self.spawns
    }

    // =========================================================================
    // CONNECTION LIFECYCLE
    // =========================================================================

    /// Register a new connection and its player session.
    ///
    /// The newcomer receives `welcome` and the full roster (itself included);
    /// everyone else receives `playerJoined`.
    pub async fn on_connect(
        &self,
        sender: Outbound,
        peer: Option<SocketAddr>,
    ) -> Result<PlayerId, RoomError> {
        let (id, joined, others, count) = {
            let mut state = self.state.write().await;
            if !state.open {
                return Err(RoomError::Closed);
            }
            if state.players.len() >= self.config.max_players {
                return Err(RoomError::RoomFull { max: self.config.max_players });
            }

            let mut id = PlayerId::random();
            while state.players.contains(&id) {
                id = PlayerId::random();
            }

            let session = PlayerSession::new(id, self.spawns.next_spawn_point(), Instant::now());
            let joined = PlayerInfo::from(&session);
            state.players.insert(session);

            let roster: Vec<PlayerInfo> = state.players.iter().map(PlayerInfo::from).collect();
            let greeting = [
                ServerMessage::Welcome(WelcomeInfo {
                    id,
                    server_version: VERSION.to_string(),
                }),
                ServerMessage::PlayerList(roster),
            ];
            for message in greeting {
                if sender.try_send(message).is_err() {
                    debug!("Greeting for {} not queued", id);
                }
            }

            state.connections.insert(id, Connection::new(sender, peer));
            let others = state.connections.targets(Some(id));
            (id, joined, others, state.players.len())
        };

        info!("Player connected: {} ({}/{})", id, count, self.config.max_players);

        let closed = deliver(&others, &ServerMessage::PlayerJoined(joined));
        self.reap(closed).await;

        Ok(id)
    }

    /// Remove a player and announce the departure. Idempotent.
    pub async fn on_disconnect(&self, id: PlayerId) -> bool {
        let removed = self.remove_and_announce(id).await;
        if removed {
            let count = self.player_count().await;
            info!("Player disconnected: {} ({}/{})", id, count, self.config.max_players);
        }
        removed
    }

    /// Remove under the lock, then broadcast `playerLeft` to the rest.
    async fn remove_and_announce(&self, id: PlayerId) -> bool {
        self.remove_where(id, |_| true).await
    }

    /// Remove `id` if `predicate` holds for its session at removal time.
    async fn remove_where<F>(&self, id: PlayerId, predicate: F) -> bool
    where
        F: FnOnce(&PlayerSession) -> bool,
    {
        let targets = {
            let mut state = self.state.write().await;
            if !state.players.get(&id).is_some_and(predicate) {
                return false;
            }
            match state.remove(&id) {
                Some((_, connection)) => {
                    debug!(
                        "Removed {} after {:?}",
                        id,
                        connection.connected_at.elapsed()
                    );
                    state.connections.targets(None)
                }
                None => return false,
            }
        };

        let closed = deliver(&targets, &ServerMessage::PlayerLeft(id));
        self.reap(closed).await;
        true
    }

    /// Run the disconnect path for every closed channel, including the ones
    /// discovered while announcing those departures.
    async fn reap(&self, mut closed: Vec<PlayerId>) {
        while let Some(id) = closed.pop() {
            let targets = {
                let mut state = self.state.write().await;
                if state.remove(&id).is_none() {
                    continue;
                }
                state.connections.targets(None)
            };
            info!("Player dropped (transport closed): {}", id);
            closed.extend(deliver(&targets, &ServerMessage::PlayerLeft(id)));
        }
    }

    // =========================================================================
    // MESSAGING
    // =========================================================================

    /// Send to every connection, optionally excluding one.
    pub async fn broadcast(&self, message: ServerMessage, exclude: Option<PlayerId>) {
        let targets = {
            let state = self.state.read().await;
            state.connections.targets(exclude)
        };
        let closed = deliver(&targets, &message);
        self.reap(closed).await;
    }

    /// Send to a single connection. Returns false if it is not connected.
    pub async fn send_to(&self, id: PlayerId, message: ServerMessage) -> bool {
        let target = {
            let state = self.state.read().await;
            state.connections.target(&id)
        };
        match target {
            Some(target) => {
                let closed = deliver(&[target], &message);
                let delivered = closed.is_empty();
                self.reap(closed).await;
                delivered
            }
            None => false,
        }
    }

    // =========================================================================
    // PLAYER STATE
    // =========================================================================

    /// Refresh a player's activity timestamp.
    pub async fn touch(&self, id: PlayerId) -> bool {
        let mut state = self.state.write().await;
        match state.players.get_mut(&id) {
            Some(player) => {
                player.touch(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Apply a pose update and relay it to everyone else.
    pub async fn apply_pose(&self, id: PlayerId, pose: Pose) -> bool {
        let (update, targets) = {
            let mut state = self.state.write().await;
            let Some(player) = state.players.get_mut(&id) else {
                return false;
            };
            player.apply_pose(pose);
            player.touch(Instant::now());
            let update = PoseBroadcast::from(&*player);
            (update, state.connections.targets(Some(id)))
        };

        let closed = deliver(&targets, &ServerMessage::PlayerUpdate(update));
        self.reap(closed).await;
        true
    }

    /// Handle `ready`: set the display name if one is given.
    ///
    /// Returns the name now in effect, or `None` if the player is gone.
    pub async fn set_ready(&self, id: PlayerId, name: Option<&str>) -> Option<String> {
        let mut state = self.state.write().await;
        let player = state.players.get_mut(&id)?;
        player.set_display_name(name);
        player.touch(Instant::now());
        Some(player.display_name.clone())
    }

    // =========================================================================
    // COMBAT
    // =========================================================================

    /// Apply a hit from `shooter` to `target`.
    ///
    /// On a death the kill is broadcast to everyone and a respawn is
    /// scheduled. Returns `None` if the target is gone.
    pub async fn apply_hit(
        self: &Arc<Self>,
        shooter: PlayerId,
        target: PlayerId,
        damage: u32,
    ) -> Option<HitOutcome> {
        let (outcome, targets) = {
            let mut state = self.state.write().await;
            if let Some(player) = state.players.get_mut(&shooter) {
                player.touch(Instant::now());
            }
            let outcome = combat::apply_hit(&mut state.players, shooter, target, damage)?;
            (outcome, state.connections.targets(None))
        };

        if let Some(kill) = &outcome.kill {
            info!("{} ({}) killed {} ({})", kill.killer_name, kill.killer, kill.victim_name, kill.victim);
            let closed = deliver(&targets, &ServerMessage::Kill(kill.clone().into()));
            self.reap(closed).await;
            self.schedule_respawn(target).await;
        }

        Some(outcome)
    }

    /// Start the respawn timer for a dead player.
    ///
    /// The timer is spawned and registered under the write lock, and its
    /// completion needs that lock too, so it can never finish before its
    /// handle is stored.
    async fn schedule_respawn(self: &Arc<Self>, target: PlayerId) {
        let mut state = self.state.write().await;
        if !state.players.get(&target).is_some_and(|p| !p.is_alive()) {
            // Left (or already back) before the timer was registered
            return;
        }

        let room = Arc::clone(self);
        let delay = self.config.respawn_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            room.complete_respawn(target).await;
        });

        if let Some(stale) = state.respawns.insert(target, task.abort_handle()) {
            stale.abort();
        }
    }

    /// Respawn timer fired. No-op if the player left in the meantime.
    async fn complete_respawn(&self, target: PlayerId) {
        let (record, targets) = {
            let mut state = self.state.write().await;
            state.respawns.remove(&target);
            let spawn = self.spawns.next_spawn_point();
            match combat::respawn(&mut state.players, target, spawn) {
                Some(record) => (record, state.connections.targets(None)),
                None => {
                    debug!("Respawn skipped for {}", target);
                    return;
                }
            }
        };

        debug!("Player {} respawned at {:?}", target, record.position);
        let closed = deliver(&targets, &ServerMessage::PlayerRespawn(record.into()));
        self.reap(closed).await;
    }

    /// Is a respawn pending for this player?
    pub async fn respawn_pending(&self, id: PlayerId) -> bool {
        self.state.read().await.respawns.contains_key(&id)
    }

    // =========================================================================
    // SWEEPING & STATS
    // =========================================================================

    /// Evict every player silent for at least the idle timeout, as of `now`.
    pub async fn evict_idle(&self, now: Instant) -> Vec<PlayerId> {
        let idle = {
            let state = self.state.read().await;
            state.players.idle_ids(now, self.config.idle_timeout)
        };

        let timeout = self.config.idle_timeout;
        let mut evicted = Vec::new();
        for id in idle {
            // The player may have spoken since the scan
            if self.remove_where(id, |p| p.is_idle(now, timeout)).await {
                info!("Removing inactive player: {}", id);
                evicted.push(id);
            }
        }
        evicted
    }

    /// Current room statistics.
    pub async fn stats(&self) -> ServerStats {
        let state = self.state.read().await;
        ServerStats {
            player_count: state.players.len(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            leaderboard: state
                .players
                .ranked_by_kills(self.config.leaderboard_size)
                .into_iter()
                .map(LeaderboardEntry::from)
                .collect(),
        }
    }

    /// Broadcast stats to every connection.
    pub async fn broadcast_stats(&self) {
        let stats = self.stats().await;
        self.broadcast(ServerMessage::ServerStats(stats), None).await;
    }

    /// Top players by kills.
    pub async fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let state = self.state.read().await;
        state
            .players
            .ranked_by_kills(limit)
            .into_iter()
            .map(LeaderboardEntry::from)
            .collect()
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Number of players.
    pub async fn player_count(&self) -> usize {
        self.state.read().await.players.len()
    }

    /// Is this player in the room?
    pub async fn contains(&self, id: PlayerId) -> bool {
        self.state.read().await.players.contains(&id)
    }

    /// Copy of a player's session.
    pub async fn player(&self, id: PlayerId) -> Option<PlayerSession> {
        self.state.read().await.players.get(&id).cloned()
    }

    /// Player ids in the store.
    pub async fn player_ids(&self) -> Vec<PlayerId> {
        self.state.read().await.players.ids()
    }

    /// True when the store and the registry hold exactly the same ids.
    pub async fn is_consistent(&self) -> bool {
        let state = self.state.read().await;
        state.players.ids() == state.connections.ids()
    }

    /// Is the room accepting connections?
    pub async fn is_open(&self) -> bool {
        self.state.read().await.open
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Close the room: cancel respawns, notify and drop every connection.
    pub async fn shutdown(&self, reason: &str) {
        let targets = {
            let mut state = self.state.write().await;
            state.open = false;
            for (_, handle) in std::mem::take(&mut state.respawns) {
                handle.abort();
            }
            state.players.clear();
            state.connections.drain()
        };

        info!("Room shut down ({} connections notified)", targets.len());
        deliver(&targets, &ServerMessage::Shutdown { reason: reason.to_string() });
    }
}
