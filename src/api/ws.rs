use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use super::AppState;
use crate::error::HubError;
use crate::hub::{ClientId, ClientMessage, ServerMessage, Topic};

/// WebSocket upgrade handler.
pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_id, mut rx) = state.hub.connect().await;

    if let Some(greeting) = state.poller.publisher().greeting().await {
        if let Err(e) = state.hub.send_to(client_id, greeting).await {
            warn!("Failed to greet client {}: {}", client_id, e);
        }
    }

    // Drain the hub queue into the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode {}: {}", msg.kind(), e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        let parsed = match frame {
            Ok(Message::Text(text)) => serde_json::from_str::<ClientMessage>(&text),
            Ok(Message::Binary(data)) => serde_json::from_slice::<ClientMessage>(&data),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error for client {}: {}", client_id, e);
                break;
            }
        };

        let outcome = match parsed {
            Ok(msg) => apply_client_message(&state, client_id, msg).await,
            Err(e) => {
                state
                    .hub
                    .send_to(client_id, ServerMessage::error("invalid_message", e.to_string()))
                    .await
            }
        };
        if let Err(e) = outcome {
            warn!("Client {}: {}", client_id, e);
        }
    }

    state.hub.disconnect(client_id).await;
    send_task.abort();
}

/// Apply one client request to the hub.
async fn apply_client_message(
    state: &AppState,
    client: ClientId,
    msg: ClientMessage,
) -> Result<(), HubError> {
    match msg {
        ClientMessage::SubscribeList => subscribe(state, client, Topic::MatchList).await,
        ClientMessage::SubscribeLive => subscribe(state, client, Topic::LiveMatches).await,
        ClientMessage::SubscribeMatch { event_key } => {
            subscribe(state, client, Topic::Match(event_key)).await
        }
        ClientMessage::UnsubscribeList => unsubscribe(state, client, Topic::MatchList).await,
        ClientMessage::UnsubscribeLive => unsubscribe(state, client, Topic::LiveMatches).await,
        ClientMessage::UnsubscribeMatch { event_key } => {
            unsubscribe(state, client, Topic::Match(event_key)).await
        }
        ClientMessage::Ping => state.hub.send_to(client, ServerMessage::Pong).await,
    }
}

/// Acknowledge, replay the room's cached state, then join. The cache is
/// read inside the hub's join section so no publish falls in between.
async fn subscribe(state: &AppState, client: ClientId, topic: Topic) -> Result<(), HubError> {
    let publisher = state.poller.publisher();
    let replay = async {
        let mut replay = vec![ServerMessage::Subscribed {
            topic: topic.clone(),
        }];
        replay.extend(publisher.replay_for(&topic).await);
        replay
    };
    state.hub.join_with(client, topic.clone(), replay).await
}

async fn unsubscribe(state: &AppState, client: ClientId, topic: Topic) -> Result<(), HubError> {
    state.hub.leave(client, &topic).await?;
    state
        .hub
        .send_to(client, ServerMessage::Unsubscribed { topic })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cricket::{MatchDetail, Scorecard};
    use crate::hub::{Broadcast, SubscriptionHub};
    use crate::relay::scheduler::tests::{poller_with, FakeProvider};
    use serde_json::json;

    fn setup() -> AppState {
        let hub = Arc::new(SubscriptionHub::new());
        let (cache, poller) = poller_with(Arc::new(FakeProvider::default()), hub.clone());
        AppState { cache, hub, poller }
    }

    #[tokio::test]
    async fn test_join_match_room_replays_cached_detail() {
        let state = setup();
        state
            .cache
            .upsert_detail(MatchDetail {
                event_key: "X".into(),
                payload: json!({"event_key": "X", "event_status": "Live"}),
            })
            .await;
        let (client, mut rx) = state.hub.connect().await;

        apply_client_message(
            &state,
            client,
            ClientMessage::SubscribeMatch {
                event_key: "X".into(),
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::Subscribed { topic: Topic::Match(ref id) }) if id == "X"
        ));
        match rx.try_recv() {
            Ok(ServerMessage::MatchDetails { event_key, data }) => {
                assert_eq!(event_key, "X");
                assert_eq!(data.payload["event_status"], "Live");
            }
            other => panic!("expected cached detail, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(state.hub.room_size(&Topic::Match("X".into())).await, 1);
    }

    #[tokio::test]
    async fn test_replay_precedes_later_broadcast() {
        let state = setup();
        state
            .cache
            .upsert_scorecard(Scorecard::from_event("Y", &json!({})))
            .await;
        let (client, mut rx) = state.hub.connect().await;
        let topic = Topic::Match("Y".into());

        apply_client_message(&state, client, ClientMessage::SubscribeMatch { event_key: "Y".into() })
            .await
            .unwrap();
        state.hub.broadcast(&topic, ServerMessage::Pong).await;

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|m| m.kind())
            .collect();
        assert_eq!(kinds, vec!["subscribed", "match_scorecard", "pong"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_ping() {
        let state = setup();
        let (client, mut rx) = state.hub.connect().await;

        apply_client_message(&state, client, ClientMessage::SubscribeLive).await.unwrap();
        apply_client_message(&state, client, ClientMessage::UnsubscribeLive).await.unwrap();
        apply_client_message(&state, client, ClientMessage::Ping).await.unwrap();

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|m| m.kind())
            .collect();
        assert_eq!(kinds, vec!["subscribed", "unsubscribed", "pong"]);
        assert!(!state.hub.has_listeners(&Topic::LiveMatches).await);
    }

    #[tokio::test]
    async fn test_disconnected_client_is_rejected() {
        let state = setup();
        let (client, _rx) = state.hub.connect().await;
        state.hub.disconnect(client).await;
        assert_eq!(
            apply_client_message(&state, client, ClientMessage::SubscribeList).await,
            Err(HubError::UnknownClient(client))
        );
    }
}
