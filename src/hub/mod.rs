//! Client registry and room membership for the WebSocket pub/sub channel.
//!
//! Every connected client owns a bounded outbound queue drained by its
//! socket task. Rooms map a [`Topic`] to the set of member clients.
//! Delivery is best-effort: a client whose queue is full misses the
//! message, nothing is retried.

pub mod protocol;

pub use protocol::{ClientMessage, ServerMessage, Topic};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::HubError;

pub type ClientId = u64;

/// Outbound queue depth per client.
pub const CLIENT_CHANNEL_BUFFER_SIZE: usize = 256;

/// Publish capability consumed by the fan-out publisher.
#[async_trait]
pub trait Broadcast: Send + Sync {
    /// Send `message` to every member of `topic`. Returns how many client
    /// queues accepted it. Publishing to an empty room is a no-op.
    async fn broadcast(&self, topic: &Topic, message: ServerMessage) -> usize;

    /// Whether anyone is currently in `topic`.
    async fn has_listeners(&self, topic: &Topic) -> bool;
}

pub struct SubscriptionHub {
    next_id: AtomicU64,
    state: RwLock<HubState>,
}

#[derive(Default)]
struct HubState {
    clients: HashMap<ClientId, mpsc::Sender<ServerMessage>>,
    rooms: HashMap<Topic, HashSet<ClientId>>,
}

impl HubState {
    fn sender(&self, client: ClientId) -> Result<&mpsc::Sender<ServerMessage>, HubError> {
        self.clients
            .get(&client)
            .ok_or(HubError::UnknownClient(client))
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionHub {
    pub fn new() -> Self {
        SubscriptionHub {
            next_id: AtomicU64::new(1),
            state: RwLock::new(HubState::default()),
        }
    }

    /// Register a client. The receiver yields everything addressed to it.
    pub async fn connect(&self) -> (ClientId, mpsc::Receiver<ServerMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_BUFFER_SIZE);
        let mut state = self.state.write().await;
        state.clients.insert(id, tx);
        info!("Client {} connected. Total clients: {}", id, state.clients.len());
        (id, rx)
    }

    /// Drop a client and all its memberships. Unknown ids are ignored.
    pub async fn disconnect(&self, client: ClientId) {
        let mut state = self.state.write().await;
        if state.clients.remove(&client).is_none() {
            return;
        }
        state.rooms.retain(|_, members| {
            members.remove(&client);
            !members.is_empty()
        });
        info!("Client {} disconnected. Total clients: {}", client, state.clients.len());
    }

    /// Add `client` to `topic`, queueing `replay` to it first.
    /// Joining a room twice is harmless; the replay is sent again.
    pub async fn join(
        &self,
        client: ClientId,
        topic: Topic,
        replay: Vec<ServerMessage>,
    ) -> Result<(), HubError> {
        self.join_with(client, topic, async { replay }).await
    }

    /// Like [`SubscriptionHub::join`], but `replay` is only evaluated once
    /// the hub write lock is held.
    ///
    /// Building the replay, queueing it and recording membership form one
    /// critical section. A broadcast to `topic` either lands before it
    /// (and the replay, read afterwards, already reflects it) or waits and
    /// reaches the client as a member, after the replay.
    ///
    /// `replay` must not touch the hub.
    pub async fn join_with<F>(
        &self,
        client: ClientId,
        topic: Topic,
        replay: F,
    ) -> Result<(), HubError>
    where
        F: Future<Output = Vec<ServerMessage>>,
    {
        let mut state = self.state.write().await;
        state.sender(client)?;
        let replay = replay.await;
        let tx = state.sender(client)?;
        for msg in replay {
            tx.try_send(msg).map_err(|_| HubError::Backlogged(client))?;
        }
        debug!("Client {} joined {}", client, topic);
        state.rooms.entry(topic).or_default().insert(client);
        Ok(())
    }

    /// Remove `client` from `topic`. Returns whether it was a member.
    pub async fn leave(&self, client: ClientId, topic: &Topic) -> Result<bool, HubError> {
        let mut state = self.state.write().await;
        state.sender(client)?;
        let was_member = state
            .rooms
            .get_mut(topic)
            .map(|members| members.remove(&client))
            .unwrap_or(false);
        if state.rooms.get(topic).is_some_and(|m| m.is_empty()) {
            state.rooms.remove(topic);
        }
        debug!("Client {} left {} (member={})", client, topic, was_member);
        Ok(was_member)
    }

    /// Unicast to one client.
    pub async fn send_to(&self, client: ClientId, message: ServerMessage) -> Result<(), HubError> {
        let state = self.state.read().await;
        state
            .sender(client)?
            .try_send(message)
            .map_err(|_| HubError::Backlogged(client))
    }

    pub async fn client_count(&self) -> usize {
        self.state.read().await.clients.len()
    }

    pub async fn room_size(&self, topic: &Topic) -> usize {
        self.state
            .read()
            .await
            .rooms
            .get(topic)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub async fn subscription_count(&self) -> usize {
        self.state.read().await.rooms.values().map(|m| m.len()).sum()
    }
}

#[async_trait]
impl Broadcast for SubscriptionHub {
    async fn broadcast(&self, topic: &Topic, message: ServerMessage) -> usize {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(topic) else {
            return 0;
        };
        let mut delivered = 0;
        for client in members {
            let Some(tx) = state.clients.get(client) else {
                continue;
            };
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Client {} backlogged, dropped {} on {}", client, message.kind(), topic);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Client {} gone, skipped {} on {}", client, message.kind(), topic);
                }
            }
        }
        delivered
    }

    async fn has_listeners(&self, topic: &Topic) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(topic)
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_broadcast_reaches_room_members_only() {
        let hub = SubscriptionHub::new();
        let (a, mut rx_a) = hub.connect().await;
        let (_b, mut rx_b) = hub.connect().await;
        hub.join(a, Topic::LiveMatches, vec![]).await.unwrap();

        let n = hub.broadcast(&Topic::LiveMatches, ServerMessage::Pong).await;
        assert_eq!(n, 1);
        assert!(matches!(rx_a.try_recv(), Ok(ServerMessage::Pong)));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_room_is_noop() {
        let hub = SubscriptionHub::new();
        assert!(!hub.has_listeners(&Topic::MatchList).await);
        assert_eq!(hub.broadcast(&Topic::MatchList, ServerMessage::Pong).await, 0);
    }

    #[tokio::test]
    async fn test_join_is_idempotent_and_replays_first() {
        let hub = SubscriptionHub::new();
        let (a, mut rx) = hub.connect().await;
        let topic = Topic::Match("7".into());

        hub.join(a, topic.clone(), vec![ServerMessage::error("r", "1")]).await.unwrap();
        hub.join(a, topic.clone(), vec![]).await.unwrap();
        assert_eq!(hub.room_size(&topic).await, 1);

        hub.broadcast(&topic, ServerMessage::Pong).await;
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Error { .. })));
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Pong)));
    }

    #[tokio::test]
    async fn test_broadcast_while_replay_builds_is_not_missed() {
        let hub = Arc::new(SubscriptionHub::new());
        let (a, mut rx) = hub.connect().await;
        let topic = Topic::Match("9".into());

        let joining = {
            let hub = Arc::clone(&hub);
            let topic = topic.clone();
            tokio::spawn(async move {
                hub.join_with(a, topic, async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    vec![ServerMessage::error("replay", "cached")]
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let delivered = hub.broadcast(&topic, ServerMessage::Pong).await;
        joining.await.unwrap().unwrap();

        assert_eq!(delivered, 1);
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Error { .. })));
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Pong)));
    }

    #[tokio::test]
    async fn test_leave_and_disconnect_clean_rooms() {
        let hub = SubscriptionHub::new();
        let (a, _rx_a) = hub.connect().await;
        let (b, _rx_b) = hub.connect().await;
        hub.join(a, Topic::MatchList, vec![]).await.unwrap();
        hub.join(b, Topic::MatchList, vec![]).await.unwrap();
        hub.join(b, Topic::LiveMatches, vec![]).await.unwrap();
        assert_eq!(hub.subscription_count().await, 3);

        assert!(hub.leave(a, &Topic::MatchList).await.unwrap());
        assert!(!hub.leave(a, &Topic::MatchList).await.unwrap());

        hub.disconnect(b).await;
        hub.disconnect(b).await;
        assert_eq!(hub.client_count().await, 1);
        assert_eq!(hub.subscription_count().await, 0);
        assert!(!hub.has_listeners(&Topic::LiveMatches).await);
    }

    #[tokio::test]
    async fn test_unknown_client_is_rejected() {
        let hub = SubscriptionHub::new();
        assert_eq!(
            hub.join(99, Topic::MatchList, vec![]).await,
            Err(HubError::UnknownClient(99))
        );
        assert_eq!(
            hub.send_to(99, ServerMessage::Pong).await,
            Err(HubError::UnknownClient(99))
        );
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let hub = SubscriptionHub::new();
        let (a, _rx) = hub.connect().await;
        hub.join(a, Topic::MatchList, vec![]).await.unwrap();
        for _ in 0..CLIENT_CHANNEL_BUFFER_SIZE {
            assert_eq!(hub.broadcast(&Topic::MatchList, ServerMessage::Pong).await, 1);
        }
        assert_eq!(hub.broadcast(&Topic::MatchList, ServerMessage::Pong).await, 0);
        assert_eq!(hub.send_to(a, ServerMessage::Pong).await, Err(HubError::Backlogged(a)));
    }
}
