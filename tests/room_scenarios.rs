//! End-to-end room scenarios driven through the event router, with mpsc
//! channels standing in for sockets.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use smash_kills::game::spawn::SPAWN_POINTS;
use smash_kills::network::protocol::ServerMessage;
use smash_kills::network::{EventRouter, LivenessSweeper, Room, RoomConfig};
use smash_kills::PlayerId;

type Inbox = mpsc::Receiver<ServerMessage>;

fn router_with_delay(respawn_delay: Duration) -> EventRouter {
    let config = RoomConfig {
        respawn_delay,
        ..Default::default()
    };
    EventRouter::new(Arc::new(Room::new(config)))
}

async fn join(router: &EventRouter) -> (PlayerId, Inbox) {
    let (tx, rx) = mpsc::channel(128);
    let id = router.room().on_connect(tx, None).await.unwrap();
    (id, rx)
}

fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

fn pose_frame(health: u32) -> String {
    format!(
        r#"{{"event":"playerData","data":{{"position":{{"x":0,"y":2,"z":0}},"rotation":{{"x":0,"y":0,"z":0}},"health":{},"ammo":30}}}}"#,
        health
    )
}

fn hit_frame(target: PlayerId, damage: u32) -> String {
    format!(r#"{{"event":"hit","data":{{"target":"{}","damage":{}}}}}"#, target, damage)
}

/// Room membership, store keys and registry keys all agree.
mod membership {
    use super::*;

    #[tokio::test]
    async fn roster_carries_ready_name() {
        let router = router_with_delay(Duration::from_millis(50));
        let (a, mut rx_a) = join(&router).await;
        router.on_text(a, r#"{"event":"playerReady","data":{"name":"Alice"}}"#).await;
        drain(&mut rx_a);

        let (b, mut rx_b) = join(&router).await;

        let to_b = drain(&mut rx_b);
        let roster = to_b
            .iter()
            .find_map(|m| match m {
                ServerMessage::PlayerList(list) => Some(list.clone()),
                _ => None,
            })
            .expect("roster");
        let alice = roster.iter().find(|p| p.id == a).expect("Alice in roster");
        assert_eq!(alice.name, "Alice");

        let to_a = drain(&mut rx_a);
        let joined: Vec<_> = to_a
            .iter()
            .filter_map(|m| match m {
                ServerMessage::PlayerJoined(p) => Some(p.id),
                _ => None,
            })
            .collect();
        assert_eq!(joined, vec![b]);
    }

    #[tokio::test]
    async fn keys_match_open_connections() {
        let router = router_with_delay(Duration::from_millis(50));
        let room = Arc::clone(router.room());
        let mut open = Vec::new();

        for round in 0..20 {
            let (id, rx) = join(&router).await;
            open.push((id, rx));
            if round % 3 == 2 {
                let (gone, _) = open.remove(0);
                room.on_disconnect(gone).await;
            }
            if round % 5 == 4 {
                // Abrupt transport loss: the receiver vanishes without a disconnect
                let (lost, rx) = open.remove(0);
                drop(rx);
                room.broadcast(ServerMessage::Shutdown { reason: "probe".into() }, None).await;
                assert!(!room.contains(lost).await);
            }
            assert!(room.is_consistent().await);
        }

        let mut expected: Vec<_> = open.iter().map(|(id, _)| *id).collect();
        expected.sort();
        assert_eq!(room.player_ids().await, expected);
    }
}

/// Hits, kills and respawns.
mod combat {
    use super::*;

    #[tokio::test]
    async fn overkill_clamps_and_respawns() {
        let router = router_with_delay(Duration::from_millis(100));
        let (a, mut rx_a) = join(&router).await;
        let (b, mut rx_b) = join(&router).await;
        router.on_text(b, &pose_frame(40)).await;
        assert_eq!(router.room().player(b).await.unwrap().health, 40);
        drain(&mut rx_a);
        drain(&mut rx_b);

        router.on_text(a, &hit_frame(b, 150)).await;

        let victim = router.room().player(b).await.unwrap();
        assert_eq!(victim.health, 0);
        assert!(!victim.is_alive());

        let kills: Vec<_> = drain(&mut rx_a)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::Kill(k) => Some(k),
                _ => None,
            })
            .collect();
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].killer, a);
        assert_eq!(kills[0].victim, b);

        tokio::time::sleep(Duration::from_millis(250)).await;

        let victim = router.room().player(b).await.unwrap();
        assert_eq!(victim.health, 100);
        assert!(SPAWN_POINTS.contains(&victim.position));
        assert!(drain(&mut rx_b)
            .iter()
            .any(|m| matches!(m, ServerMessage::PlayerRespawn(r) if r.id == b)));
    }

    #[tokio::test]
    async fn second_lethal_hit_is_not_a_second_kill() {
        let router = router_with_delay(Duration::from_millis(200));
        let (a, mut rx_a) = join(&router).await;
        let (b, _rx_b) = join(&router).await;
        drain(&mut rx_a);

        router.on_text(a, &hit_frame(b, 100)).await;
        router.on_text(a, &hit_frame(b, 100)).await;

        let kill_count = drain(&mut rx_a)
            .iter()
            .filter(|m| matches!(m, ServerMessage::Kill(_)))
            .count();
        assert_eq!(kill_count, 1);
        assert_eq!(router.room().player(a).await.unwrap().kills, 1);
    }

    #[tokio::test]
    async fn dead_player_pose_keeps_zero_health() {
        let router = router_with_delay(Duration::from_millis(200));
        let (a, _rx_a) = join(&router).await;
        let (b, _rx_b) = join(&router).await;

        router.on_text(a, &hit_frame(b, 100)).await;
        router.on_text(b, &pose_frame(100)).await;

        assert_eq!(router.room().player(b).await.unwrap().health, 0);
    }

    #[tokio::test]
    async fn self_reported_zero_health_cannot_be_farmed_for_kills() {
        let router = router_with_delay(Duration::from_millis(50));
        let (a, mut rx_a) = join(&router).await;
        let (b, _rx_b) = join(&router).await;
        router.on_text(b, &pose_frame(0)).await;
        drain(&mut rx_a);

        router.on_text(a, &hit_frame(b, 0)).await;
        router.on_text(a, &hit_frame(b, 30)).await;

        let kill_count = drain(&mut rx_a)
            .iter()
            .filter(|m| matches!(m, ServerMessage::Kill(_)))
            .count();
        assert_eq!(kill_count, 0);
        assert_eq!(router.room().player(a).await.unwrap().kills, 0);
        assert!(!router.room().respawn_pending(b).await);
    }

    #[tokio::test]
    async fn disconnect_during_respawn_delay_cancels_respawn() {
        let router = router_with_delay(Duration::from_millis(300));
        let (a, mut rx_a) = join(&router).await;
        let (b, _rx_b) = join(&router).await;

        router.on_text(a, &hit_frame(b, 100)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        router.room().on_disconnect(b).await;
        drain(&mut rx_a);

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(drain(&mut rx_a)
            .iter()
            .all(|m| !matches!(m, ServerMessage::PlayerRespawn(_))));
        assert!(!router.room().contains(b).await);
    }
}

/// Idle eviction.
mod liveness {
    use super::*;

    #[tokio::test]
    async fn idle_player_is_evicted_and_announced() {
        let config = RoomConfig {
            idle_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let router = EventRouter::new(Arc::new(Room::new(config)));
        let room = Arc::clone(router.room());
        let (a, _rx_a) = join(&router).await;
        let (b, mut rx_b) = join(&router).await;
        let sweeper = LivenessSweeper::new(Arc::clone(&room));

        tokio::time::sleep(Duration::from_millis(150)).await;
        router.on_text(b, r#"{"event":"ping","data":{"timestamp":1}}"#).await;
        drain(&mut rx_b);

        assert_eq!(sweeper.sweep_once().await, vec![a]);
        assert!(!room.contains(a).await);
        assert!(room.contains(b).await);
        assert!(drain(&mut rx_b)
            .iter()
            .any(|m| matches!(m, ServerMessage::PlayerLeft(id) if *id == a)));

        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(sweeper.sweep_at(later).await, vec![b]);
        assert_eq!(room.player_count().await, 0);
        assert!(room.is_consistent().await);
    }
}
