use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde_json::Value;

use super::models::{MatchDetail, MatchSummary, Scorecard};
use crate::error::FetchError;

/// Filter for a `get_events` list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// `YYYY-MM-DD`
    pub date_start: String,
    /// `YYYY-MM-DD`
    pub date_stop: String,
    pub league_key: Option<String>,
    pub event_key: Option<String>,
}

impl ListQuery {
    /// Rolling window of `days` either side of `today`.
    pub fn around(today: NaiveDate, days: u64) -> Self {
        let start = today.checked_sub_days(Days::new(days)).unwrap_or(today);
        let stop = today.checked_add_days(Days::new(days)).unwrap_or(today);
        ListQuery {
            date_start: start.format("%Y-%m-%d").to_string(),
            date_stop: stop.format("%Y-%m-%d").to_string(),
            league_key: None,
            event_key: None,
        }
    }

    pub fn with_event(mut self, event_key: &str) -> Self {
        self.event_key = Some(event_key.to_string());
        self
    }
}

/// Capability every upstream cricket data source must provide.
///
/// Implementations never retry; callers own retry policy.
#[async_trait]
pub trait CricketProvider: Send + Sync {
    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<MatchSummary>, FetchError>;

    async fn fetch_detail(&self, event_key: &str) -> Result<MatchDetail, FetchError>;

    async fn fetch_scorecard(&self, event_key: &str) -> Result<Scorecard, FetchError>;

    async fn fetch_h2h(&self, first_team_key: &str, second_team_key: &str)
        -> Result<Value, FetchError>;

    async fn fetch_standings(&self, league_key: &str) -> Result<Value, FetchError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
