//! In-memory match state shared by the poller, the publisher and the REST
//! facade.
//!
//! Each granularity (summary batch, live map, details, scorecards) sits
//! behind its own lock so a slow scorecard write never stalls a list swap.
//! The raw maps are never handed out; readers get clones.
//!
//! Summaries are only ever replaced as a whole batch. Details and scorecards
//! are keyed by `event_key` and last write wins.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cricket::{MatchDetail, MatchSummary, Scorecard};

pub type LiveMap = BTreeMap<String, MatchSummary>;

/// Thread-safe handle to the match cache. Clones share state.
#[derive(Clone, Default)]
pub struct MatchCache {
    inner: Arc<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    summaries: RwLock<SummaryBatch>,
    /// event_key → last summary published as live
    live: RwLock<LiveMap>,
    details: RwLock<HashMap<String, MatchDetail>>,
    scorecards: RwLock<HashMap<String, Scorecard>>,
}

/// The latest `get_events` batch and when it was fetched.
#[derive(Debug, Clone, Default)]
pub struct SummaryBatch {
    pub matches: Arc<Vec<MatchSummary>>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Read-only copy of the whole cache.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub summaries: SummaryBatch,
    pub live: Vec<MatchSummary>,
    pub details: HashMap<String, MatchDetail>,
    pub scorecards: HashMap<String, Scorecard>,
}

impl MatchCache {
    pub fn new() -> Self {
        MatchCache::default()
    }

    /// Swap in a new summary batch in one write.
    pub async fn replace_summaries(&self, batch: Vec<MatchSummary>) -> SummaryBatch {
        let next = SummaryBatch {
            matches: Arc::new(batch),
            last_updated: Some(Utc::now()),
        };
        let mut summaries = self.inner.summaries.write().await;
        *summaries = next.clone();
        debug!("MatchCache: {} summaries", next.matches.len());
        next
    }

    pub async fn upsert_detail(&self, detail: MatchDetail) {
        let mut details = self.inner.details.write().await;
        details.insert(detail.event_key.clone(), detail);
    }

    pub async fn upsert_scorecard(&self, card: Scorecard) {
        let mut scorecards = self.inner.scorecards.write().await;
        scorecards.insert(card.event_key.clone(), card);
    }

    /// Store `detail` only while its match is in the live map.
    ///
    /// The live read lock is held across the write, so an eviction by
    /// [`MatchCache::update_live`] cannot slip in between the check and the
    /// insert. Lock order is live, then details, same as `update_live`.
    pub async fn upsert_detail_if_live(&self, detail: MatchDetail) -> bool {
        let live = self.inner.live.read().await;
        if !live.contains_key(&detail.event_key) {
            return false;
        }
        let mut details = self.inner.details.write().await;
        details.insert(detail.event_key.clone(), detail);
        true
    }

    pub async fn upsert_scorecard_if_live(&self, card: Scorecard) -> bool {
        let live = self.inner.live.read().await;
        if !live.contains_key(&card.event_key) {
            return false;
        }
        let mut scorecards = self.inner.scorecards.write().await;
        scorecards.insert(card.event_key.clone(), card);
        true
    }

    /// Drop detail and scorecard entries for ids that are neither live nor
    /// listed in the current batch. Returns how many entries went.
    pub async fn prune_unlisted(&self) -> usize {
        let listed: HashSet<String> = self
            .inner
            .summaries
            .read()
            .await
            .matches
            .iter()
            .map(|m| m.event_key.clone())
            .collect();
        let live = self.inner.live.read().await;
        let keep = |id: &String| listed.contains(id) || live.contains_key(id);

        let mut removed = 0;
        {
            let mut details = self.inner.details.write().await;
            let before = details.len();
            details.retain(|id, _| keep(id));
            removed += before - details.len();
        }
        {
            let mut scorecards = self.inner.scorecards.write().await;
            let before = scorecards.len();
            scorecards.retain(|id, _| keep(id));
            removed += before - scorecards.len();
        }
        if removed > 0 {
            debug!("MatchCache: pruned {} unlisted entries", removed);
        }
        removed
    }

    /// Drop detail and scorecard for a match that is no longer live.
    pub async fn evict(&self, event_key: &str) {
        let had_detail = self.inner.details.write().await.remove(event_key).is_some();
        let had_card = self.inner.scorecards.write().await.remove(event_key).is_some();
        debug!(
            "MatchCache: evicted {} (detail={}, scorecard={})",
            event_key, had_detail, had_card
        );
    }

    /// Recompute the live map under its write lock.
    ///
    /// `f` sees the previous live map and returns the next one plus an
    /// outcome for the caller. Every id that drops out of the live map is
    /// evicted before the lock is released.
    pub async fn update_live<R>(&self, f: impl FnOnce(&LiveMap) -> (LiveMap, R)) -> R {
        let mut live = self.inner.live.write().await;
        let (next, outcome) = f(&*live);
        let dropped: Vec<String> = live
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();
        for id in &dropped {
            self.evict(id).await;
        }
        *live = next;
        outcome
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        let summaries = self.inner.summaries.read().await.clone();
        let live = self.inner.live.read().await.values().cloned().collect();
        let details = self.inner.details.read().await.clone();
        let scorecards = self.inner.scorecards.read().await.clone();
        CacheSnapshot {
            summaries,
            live,
            details,
            scorecards,
        }
    }

    pub async fn summaries(&self) -> SummaryBatch {
        self.inner.summaries.read().await.clone()
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.inner.summaries.read().await.last_updated
    }

    pub async fn find_summary(&self, event_key: &str) -> Option<MatchSummary> {
        self.inner
            .summaries
            .read()
            .await
            .matches
            .iter()
            .find(|m| m.event_key == event_key)
            .cloned()
    }

    pub async fn detail(&self, event_key: &str) -> Option<MatchDetail> {
        self.inner.details.read().await.get(event_key).cloned()
    }

    pub async fn scorecard(&self, event_key: &str) -> Option<Scorecard> {
        self.inner.scorecards.read().await.get(event_key).cloned()
    }

    /// Live summaries ordered by `event_key`.
    pub async fn live_matches(&self) -> Vec<MatchSummary> {
        self.inner.live.read().await.values().cloned().collect()
    }

    pub async fn live_ids(&self) -> Vec<String> {
        self.inner.live.read().await.keys().cloned().collect()
    }

    pub async fn is_live(&self, event_key: &str) -> bool {
        self.inner.live.read().await.contains_key(event_key)
    }
}
