use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::reconciler::LiveEvent;
use crate::cache::{MatchCache, SummaryBatch};
use crate::cricket::{MatchDetail, Scorecard};
use crate::hub::{Broadcast, ServerMessage, Topic};

/// Turns cache changes into room broadcasts.
///
/// Delivery is fire-and-forget. Room membership is only consulted to skip
/// building payloads nobody would receive.
#[derive(Clone)]
pub struct Publisher {
    hub: Arc<dyn Broadcast>,
    cache: MatchCache,
}

impl Publisher {
    pub fn new(hub: Arc<dyn Broadcast>, cache: MatchCache) -> Self {
        Publisher { hub, cache }
    }

    /// Full batch on `match_list`.
    pub async fn publish_batch(&self, batch: &SummaryBatch) {
        let topic = Topic::MatchList;
        if !self.hub.has_listeners(&topic).await {
            return;
        }
        let msg = ServerMessage::MatchesUpdate {
            data: batch.matches.as_ref().clone(),
            last_updated: batch.last_updated,
        };
        let n = self.hub.broadcast(&topic, msg).await;
        debug!("matches_update ({} matches) -> {} clients", batch.matches.len(), n);
    }

    /// Each live-set event goes out as the affected summary on `match_list`
    /// and as the full live array on `live_matches`.
    pub async fn publish_live_events(&self, events: &[LiveEvent]) {
        for event in events {
            debug!("{} {}", event.kind(), event.event_key());
            self.hub
                .broadcast(
                    &Topic::MatchList,
                    ServerMessage::MatchUpdated {
                        data: event.summary().clone(),
                    },
                )
                .await;

            if self.hub.has_listeners(&Topic::LiveMatches).await {
                let msg = ServerMessage::LiveMatchesUpdate {
                    matches: self.cache.live_matches().await,
                    last_updated: Utc::now(),
                };
                self.hub.broadcast(&Topic::LiveMatches, msg).await;
            }
        }
    }

    pub async fn publish_detail(&self, detail: &MatchDetail) {
        let topic = Topic::Match(detail.event_key.clone());
        self.hub
            .broadcast(
                &topic,
                ServerMessage::MatchDetails {
                    event_key: detail.event_key.clone(),
                    data: detail.clone(),
                },
            )
            .await;
    }

    pub async fn publish_scorecard(&self, card: &Scorecard) {
        let topic = Topic::Match(card.event_key.clone());
        self.hub
            .broadcast(
                &topic,
                ServerMessage::MatchScorecard {
                    event_key: card.event_key.clone(),
                    data: card.clone(),
                },
            )
            .await;
    }

    /// What a client joining `topic` should receive before anything else.
    pub async fn replay_for(&self, topic: &Topic) -> Vec<ServerMessage> {
        match topic {
            Topic::MatchList => vec![],
            Topic::LiveMatches => {
                let matches = self.cache.live_matches().await;
                if matches.is_empty() {
                    return vec![];
                }
                vec![ServerMessage::LiveMatchesUpdate {
                    matches,
                    last_updated: self.cache.last_updated().await.unwrap_or_else(Utc::now),
                }]
            }
            Topic::Match(id) => {
                let mut replay = Vec::new();
                if let Some(detail) = self.cache.detail(id).await {
                    replay.push(ServerMessage::MatchDetails {
                        event_key: id.clone(),
                        data: detail,
                    });
                }
                if let Some(card) = self.cache.scorecard(id).await {
                    replay.push(ServerMessage::MatchScorecard {
                        event_key: id.clone(),
                        data: card,
                    });
                }
                replay
            }
        }
    }

    /// Sent to every client on connect when a batch has been fetched.
    pub async fn greeting(&self) -> Option<ServerMessage> {
        let batch = self.cache.summaries().await;
        if batch.matches.is_empty() {
            return None;
        }
        Some(ServerMessage::InitialData {
            data: batch.matches.as_ref().clone(),
            last_updated: batch.last_updated,
        })
    }
}
