//! Event Router
//!
//! Dispatches inbound client messages to room operations. Handlers take
//! the sender's id as data, so they run the same with or without a socket
//! behind them.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::game::state::PlayerId;
use crate::network::auth::IdentityProvider;
use crate::network::protocol::{ClientMessage, HitReport, PoseUpdate, ReadyRequest, ServerMessage};
use crate::network::room::Room;

/// Routes client messages into the room.
pub struct EventRouter {
    room: Arc<Room>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl EventRouter {
    /// Create a router without identity verification.
    pub fn new(room: Arc<Room>) -> Self {
        Self { room, identity: None }
    }

    /// Attach an identity provider for `playerReady` tokens.
    pub fn with_identity(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// The room this router feeds.
    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// Parse and dispatch a text frame. Malformed frames are logged and dropped.
    pub async fn on_text(&self, id: PlayerId, text: &str) {
        match ClientMessage::from_json(text) {
            Ok(msg) => self.on_message(id, msg).await,
            Err(e) => debug!("Invalid message from {}: {}", id, e),
        }
    }

    /// Parse and dispatch a binary frame carrying JSON.
    pub async fn on_binary(&self, id: PlayerId, data: &[u8]) {
        match ClientMessage::from_bytes(data) {
            Ok(msg) => self.on_message(id, msg).await,
            Err(e) => debug!("Invalid binary message from {}: {}", id, e),
        }
    }

    /// Dispatch a parsed message from `id`.
    pub async fn on_message(&self, id: PlayerId, msg: ClientMessage) {
        match msg {
            ClientMessage::PlayerReady(req) => self.handle_ready(id, req).await,
            ClientMessage::PlayerData(update) => self.handle_pose(id, update).await,
            ClientMessage::Hit(hit) => self.handle_hit(id, hit).await,
            ClientMessage::Ping { timestamp } => {
                self.room.touch(id).await;
                self.room
                    .send_to(id, ServerMessage::Pong {
                        timestamp,
                        server_time: chrono::Utc::now().timestamp_millis(),
                    })
                    .await;
            }
        }
    }

    /// Handle `playerReady`. A verified identity overrides the requested name.
    async fn handle_ready(&self, id: PlayerId, req: ReadyRequest) {
        let verified = match (&self.identity, req.token.as_deref()) {
            (Some(provider), Some(token)) => match provider.authenticate(token) {
                Ok(identity) => Some(identity.display_name),
                Err(e) => {
                    warn!("Token rejected for {}: {}", id, e);
                    None
                }
            },
            _ => None,
        };

        let name = verified.as_deref().or(req.name.as_deref());
        match self.room.set_ready(id, name).await {
            Some(name) => debug!("Player ready: {} ({})", name, id),
            None => debug!("Ready from unknown player {}", id),
        }
    }

    /// Handle `playerData`.
    async fn handle_pose(&self, id: PlayerId, update: PoseUpdate) {
        let Some(pose) = update.to_pose() else {
            debug!("Non-finite pose from {}, dropped", id);
            return;
        };
        if !self.room.apply_pose(id, pose).await {
            debug!("Pose from unknown player {}", id);
        }
    }

    /// Handle `hit`. Unknown or departed targets are ignored.
    async fn handle_hit(&self, id: PlayerId, hit: HitReport) {
        let (Some(target), Some(damage)) = (hit.target_id(), hit.damage_points()) else {
            debug!("Malformed hit from {}: {:?}", id, hit);
            return;
        };
        if !self.room.contains(id).await {
            debug!("Hit from unknown player {}", id);
            return;
        }
        if self.room.apply_hit(id, target, damage).await.is_none() {
            debug!("Hit from {} on missing target {}", id, target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::auth::{AuthError, Identity};
    use crate::network::room::RoomConfig;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct FixedIdentity;

    impl IdentityProvider for FixedIdentity {
        fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
            if token == "good" {
                Ok(Identity {
                    subject: "acct-1".into(),
                    display_name: "Verified".into(),
                })
            } else {
                Err(AuthError::Rejected("bad signature".into()))
            }
        }
    }

    fn router() -> EventRouter {
        let config = RoomConfig {
            respawn_delay: Duration::from_millis(50),
            ..Default::default()
        };
        EventRouter::new(Arc::new(Room::new(config)))
    }

    async fn join(router: &EventRouter) -> (PlayerId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(64);
        let id = router.room().on_connect(tx, None).await.unwrap();
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_ready_sets_name() {
        let router = router();
        let (a, _rx) = join(&router).await;

        router.on_text(a, r#"{"event":"playerReady","data":{"name":"Alice"}}"#).await;
        assert_eq!(router.room().player(a).await.unwrap().display_name, "Alice");

        router.on_text(a, r#"{"event":"playerReady","data":{}}"#).await;
        assert_eq!(router.room().player(a).await.unwrap().display_name, "Alice");
    }

    #[tokio::test]
    async fn test_ready_with_verified_token() {
        let router = router().with_identity(Arc::new(FixedIdentity));
        let (a, _rx_a) = join(&router).await;
        let (b, _rx_b) = join(&router).await;

        router.on_text(a, r#"{"event":"playerReady","data":{"name":"Spoof","token":"good"}}"#).await;
        router.on_text(b, r#"{"event":"playerReady","data":{"name":"Bob","token":"bad"}}"#).await;

        assert_eq!(router.room().player(a).await.unwrap().display_name, "Verified");
        assert_eq!(router.room().player(b).await.unwrap().display_name, "Bob");
    }

    #[tokio::test]
    async fn test_pose_relayed() {
        let router = router();
        let (a, mut rx_a) = join(&router).await;
        let (_b, mut rx_b) = join(&router).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        router
            .on_text(
                a,
                r#"{"event":"playerData","data":{"position":{"x":1,"y":2,"z":3},"rotation":{"x":0,"y":0,"z":0},"health":80,"ammo":7}}"#,
            )
            .await;

        let to_b = drain(&mut rx_b);
        assert!(matches!(&to_b[0], ServerMessage::PlayerUpdate(u) if u.id == a && u.health == 80));
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let router = router();
        let (a, mut rx_a) = join(&router).await;
        drain(&mut rx_a);

        router.on_text(a, "garbage").await;
        router.on_text(a, r#"{"event":"hit","data":{"target":"nobody","damage":10}}"#).await;
        router.on_text(a, r#"{"event":"hit","data":{"damage":10}}"#).await;
        router.on_binary(a, &[0xff, 0x00]).await;

        assert!(router.room().contains(a).await);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn test_hit_on_departed_target_is_noop() {
        let router = router();
        let (a, mut rx_a) = join(&router).await;
        let (b, _rx_b) = join(&router).await;
        router.room().on_disconnect(b).await;
        drain(&mut rx_a);

        let frame = format!(r#"{{"event":"hit","data":{{"target":"{}","damage":500}}}}"#, b);
        router.on_text(a, &frame).await;

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(router.room().player(a).await.unwrap().kills, 0);
    }

    #[tokio::test]
    async fn test_fractional_ping_gets_pong() {
        let router = router();
        let (a, mut rx_a) = join(&router).await;
        drain(&mut rx_a);

        router.on_text(a, r#"{"event":"ping","data":{"timestamp":5120.25}}"#).await;

        assert!(matches!(rx_a.try_recv(), Ok(ServerMessage::Pong { timestamp, .. }) if timestamp == 5120.25));
    }

    #[tokio::test]
    async fn test_ping_gets_pong() {
        let router = router();
        let (a, mut rx_a) = join(&router).await;
        drain(&mut rx_a);

        router.on_text(a, r#"{"event":"ping","data":{"timestamp":99}}"#).await;

        match rx_a.try_recv() {
            Ok(ServerMessage::Pong { timestamp, server_time }) => {
                assert_eq!(timestamp, 99.0);
                assert!(server_time > 0);
            }
            other => panic!("expected pong, got {:?}", other),
        }
    }
}
