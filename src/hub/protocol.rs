//! JSON messages exchanged with WebSocket clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::cricket::models::key_string;
use crate::cricket::{MatchDetail, MatchSummary, Scorecard};

/// A pub/sub room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every summary batch plus per-match updates.
    MatchList,
    /// The full live array whenever it changes.
    LiveMatches,
    /// Detail and scorecard pushes for one `event_key`.
    Match(String),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::MatchList => f.write_str("match_list"),
            Topic::LiveMatches => f.write_str("live_matches"),
            Topic::Match(id) => write!(f, "match_{}", id),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Message sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeList,
    UnsubscribeList,
    SubscribeLive,
    UnsubscribeLive,
    SubscribeMatch {
        #[serde(deserialize_with = "event_key_from_any")]
        event_key: String,
    },
    UnsubscribeMatch {
        #[serde(deserialize_with = "event_key_from_any")]
        event_key: String,
    },
    Ping,
}

/// Clients send event keys both as `"123"` and `123`.
fn event_key_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let v = Value::deserialize(deserializer)?;
    key_string(&v).ok_or_else(|| serde::de::Error::custom("event_key must be a non-empty string or number"))
}

/// Message sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current batch, sent once on connect.
    InitialData {
        data: Vec<MatchSummary>,
        #[serde(rename = "lastUpdated")]
        last_updated: Option<DateTime<Utc>>,
    },
    /// A fresh `get_events` batch.
    MatchesUpdate {
        data: Vec<MatchSummary>,
        #[serde(rename = "lastUpdated")]
        last_updated: Option<DateTime<Utc>>,
    },
    /// One match entered, changed in, or left the live set.
    MatchUpdated { data: MatchSummary },
    LiveMatchesUpdate {
        matches: Vec<MatchSummary>,
        #[serde(rename = "lastUpdated")]
        last_updated: DateTime<Utc>,
    },
    MatchDetails { event_key: String, data: MatchDetail },
    MatchScorecard { event_key: String, data: Scorecard },
    Subscribed { topic: Topic },
    Unsubscribed { topic: Topic },
    Pong,
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Wire name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::InitialData { .. } => "initial_data",
            ServerMessage::MatchesUpdate { .. } => "matches_update",
            ServerMessage::MatchUpdated { .. } => "match_updated",
            ServerMessage::LiveMatchesUpdate { .. } => "live_matches_update",
            ServerMessage::MatchDetails { .. } => "match_details",
            ServerMessage::MatchScorecard { .. } => "match_scorecard",
            ServerMessage::Subscribed { .. } => "subscribed",
            ServerMessage::Unsubscribed { .. } => "unsubscribed",
            ServerMessage::Pong => "pong",
            ServerMessage::Error { .. } => "error",
        }
    }
}
