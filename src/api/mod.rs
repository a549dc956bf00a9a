//! REST facade and the `/ws` pub/sub endpoint.

mod ws;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::cache::MatchCache;
use crate::cricket::{ListQuery, MatchDetail, Scorecard};
use crate::error::ApiError;
use crate::hub::SubscriptionHub;
use crate::relay::Poller;

#[derive(Clone)]
pub struct AppState {
    pub cache: MatchCache,
    pub hub: Arc<SubscriptionHub>,
    pub poller: Arc<Poller>,
}

/// Build the Axum router for the REST routes and the WebSocket endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/matches", get(matches_handler))
        .route("/live", get(live_handler))
        .route("/matches/:id", get(match_detail_handler))
        .route("/matches/:id/scorecard", get(match_scorecard_handler))
        .route("/h2h", get(h2h_handler))
        .route("/standings", get(standings_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// GET /
async fn index_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.cache.snapshot().await;
    Json(json!({
        "status": "Cricket API Server",
        "endpoints": {
            "matches": "/matches",
            "live_matches": "/live",
            "match_details": "/matches/:eventKey",
            "match_scorecard": "/matches/:eventKey/scorecard",
            "h2h": "/h2h?first_team_key=&second_team_key=",
            "standings": "/standings?league_key=",
            "websocket": "/ws",
        },
        "cached": {
            "matches": snapshot.summaries.matches.len(),
            "live": snapshot.live.len(),
            "details": snapshot.details.len(),
            "scorecards": snapshot.scorecards.len(),
        },
        "clients": state.hub.client_count().await,
        "last_updated": snapshot.summaries.last_updated,
    }))
}

/// GET /matches
async fn matches_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let batch = state.cache.summaries().await;
    Json(json!({
        "data": batch.matches.as_ref(),
        "lastUpdated": batch.last_updated,
    }))
}

/// GET /live
///
/// Each live summary is merged with whatever detail and scorecard are
/// cached for it (`{}` when none).
async fn live_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let live = state.cache.live_matches().await;
    let mut matches = Vec::with_capacity(live.len());
    for summary in live {
        let detailed = state
            .cache
            .detail(&summary.event_key)
            .await
            .map(|d| d.payload)
            .unwrap_or_else(|| json!({}));
        let scorecard = state
            .cache
            .scorecard(&summary.event_key)
            .await
            .and_then(|c| serde_json::to_value(c).ok())
            .unwrap_or_else(|| json!({}));

        let mut entry = summary.raw;
        if let Value::Object(map) = &mut entry {
            map.insert("detailed".into(), detailed);
            map.insert("scorecard".into(), scorecard);
        }
        matches.push(entry);
    }
    Json(json!({
        "count": matches.len(),
        "matches": matches,
        "lastUpdated": state.cache.last_updated().await,
    }))
}

/// GET /matches/:id
async fn match_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MatchDetail>, ApiError> {
    if let Some(detail) = state.cache.detail(&id).await {
        return Ok(Json(detail));
    }
    debug!("Detail cache miss for {}, fetching", id);
    state.poller.fetch_detail_now(&id).await.map(Json).map_err(|e| {
        warn!("On-demand detail fetch for {} failed: {}", id, e);
        ApiError::NotFound("Match not found".into())
    })
}

/// GET /matches/:id/scorecard
async fn match_scorecard_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Scorecard>, ApiError> {
    if let Some(card) = state.cache.scorecard(&id).await {
        return Ok(Json(card));
    }
    debug!("Scorecard cache miss for {}, fetching", id);
    state.poller.fetch_scorecard_now(&id).await.map(Json).map_err(|e| {
        warn!("On-demand scorecard fetch for {} failed: {}", id, e);
        ApiError::NotFound("Scorecard not available".into())
    })
}

#[derive(Debug, Deserialize)]
struct H2hQuery {
    first_team_key: Option<String>,
    second_team_key: Option<String>,
}

/// GET /h2h?first_team_key=&second_team_key=
async fn h2h_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<H2hQuery>,
) -> Result<Json<Value>, ApiError> {
    let (Some(first), Some(second)) = (non_empty(q.first_team_key), non_empty(q.second_team_key))
    else {
        return Err(ApiError::BadRequest(
            "Both first_team_key and second_team_key are required".into(),
        ));
    };
    let data = state.poller.provider().fetch_h2h(&first, &second).await?;
    Ok(Json(json!({ "success": 1, "data": data })))
}

#[derive(Debug, Deserialize)]
struct StandingsQuery {
    league_key: Option<String>,
    event_key: Option<String>,
}

/// GET /standings?league_key= or ?event_key=
async fn standings_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<StandingsQuery>,
) -> Result<Json<Value>, ApiError> {
    let league_key = match (non_empty(q.event_key), non_empty(q.league_key)) {
        (Some(event_key), _) => resolve_league(&state, &event_key).await?,
        (None, Some(league_key)) => league_key,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "league_key or event_key is required".into(),
            ))
        }
    };
    let standings = state.poller.provider().fetch_standings(&league_key).await?;
    Ok(Json(standings))
}

/// Find the league an event belongs to: cached batch first, then upstream.
async fn resolve_league(state: &AppState, event_key: &str) -> Result<String, ApiError> {
    if let Some(league) = state
        .cache
        .find_summary(event_key)
        .await
        .and_then(|m| m.league_key)
    {
        return Ok(league);
    }

    let query = ListQuery::around(Utc::now().date_naive(), state.poller.config().window_days)
        .with_event(event_key);
    let listed = state.poller.provider().fetch_list(&query).await?;
    listed
        .into_iter()
        .find(|m| m.event_key == event_key)
        .and_then(|m| m.league_key)
        .ok_or_else(|| ApiError::NotFound("Event not found for given event_key".into()))
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
