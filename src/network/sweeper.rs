//! Liveness Sweeper
//!
//! Background task that evicts silent players and broadcasts room stats.
//! Both jobs run on their own interval in one task and stop on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::state::PlayerId;
use crate::network::room::Room;
use crate::{STATS_INTERVAL_SECS, SWEEP_INTERVAL_SECS};

/// Periodic eviction and stats broadcast for one room.
pub struct LivenessSweeper {
    room: Arc<Room>,
}

impl LivenessSweeper {
    /// Create a sweeper for `room`.
    pub fn new(room: Arc<Room>) -> Self {
        Self { room }
    }

    /// One eviction pass as of now.
    pub async fn sweep_once(&self) -> Vec<PlayerId> {
        self.sweep_at(Instant::now()).await
    }

    /// One eviction pass as of `now`.
    pub async fn sweep_at(&self, now: Instant) -> Vec<PlayerId> {
        let evicted = self.room.evict_idle(now).await;
        if !evicted.is_empty() {
            info!("Sweep evicted {} idle player(s)", evicted.len());
        }
        evicted
    }

    /// Run until `shutdown` fires. The first tick of each timer is one
    /// full period after start.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.room.config();
        let sweep_every = period_or("sweep", config.sweep_interval, SWEEP_INTERVAL_SECS);
        let stats_every = period_or("stats", config.stats_interval, STATS_INTERVAL_SECS);
        let start = tokio::time::Instant::now();

        let mut sweep = interval_at(start + sweep_every, sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = interval_at(start + stats_every, stats_every);
        stats.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    self.sweep_once().await;
                }
                _ = stats.tick() => {
                    self.room.broadcast_stats().await;
                }
                _ = shutdown.recv() => {
                    debug!("Sweeper stopping");
                    break;
                }
            }
        }
    }

    /// Spawn onto the runtime.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Timers need a non-zero period.
fn period_or(name: &str, configured: Duration, default_secs: u64) -> Duration {
    if configured.is_zero() {
        warn!("Zero {} interval, using {}s", name, default_secs);
        return Duration::from_secs(default_secs);
    }
    configured
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::ServerMessage;
    use crate::network::room::RoomConfig;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn fast_room() -> Arc<Room> {
        Arc::new(Room::new(RoomConfig {
            idle_timeout: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(40),
            stats_interval: Duration::from_millis(40),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_sweep_at_evicts_only_idle() {
        let room = Arc::new(Room::new(RoomConfig::default()));
        let (tx, _rx) = mpsc::channel(16);
        let a = room.on_connect(tx, None).await.unwrap();
        let sweeper = LivenessSweeper::new(Arc::clone(&room));

        assert!(sweeper.sweep_once().await.is_empty());
        assert!(room.contains(a).await);

        let later = Instant::now() + Duration::from_secs(30);
        assert_eq!(sweeper.sweep_at(later).await, vec![a]);
        assert_eq!(room.player_count().await, 0);
        assert!(room.is_consistent().await);
    }

    #[tokio::test]
    async fn test_zero_intervals_do_not_kill_the_task() {
        let room = Arc::new(Room::new(RoomConfig {
            sweep_interval: Duration::ZERO,
            stats_interval: Duration::ZERO,
            ..Default::default()
        }));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = LivenessSweeper::new(room).spawn(shutdown_rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        shutdown_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_evicts_and_broadcasts_stats() {
        let room = fast_room();
        let (tx, mut rx) = mpsc::channel(64);
        let a = room.on_connect(tx, None).await.unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = LivenessSweeper::new(Arc::clone(&room)).spawn(shutdown_rx);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!room.contains(a).await);

        let mut saw_stats = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, ServerMessage::ServerStats(_)) {
                saw_stats = true;
            }
        }
        assert!(saw_stats);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
