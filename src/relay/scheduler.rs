//! Periodic refresh of the match list, live details and live scorecards.
//!
//! Three independent timers drive a shared [`Poller`]:
//!
//! ```text
//!  list tick ──▶ fetch_list ─▶ replace_summaries ─▶ reconcile ─▶ publish
//!                                                      │ added
//!                                                      ▼
//!  detail tick ───────────────────────────────▶ spawn detail fetch ─▶ publish
//!  scorecard tick ────────────────────────────▶ spawn scorecard fetch ─▶ publish
//! ```
//!
//! The list timer runs its passes back to back so two reconciliations never
//! interleave. Detail and scorecard fetches are spawned per match, at most
//! one of each kind per match at a time; a tick that finds one still pending
//! skips that match. A semaphore caps how many hit the upstream at once.

use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::{LiveEvent, Publisher, Reconciler};
use crate::cache::MatchCache;
use crate::cricket::{CricketProvider, ListQuery, MatchDetail, Scorecard, StatusVocabulary};
use crate::error::FetchError;

/// Fixed-delay retry budget for one logical fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub list_interval: Duration,
    pub detail_interval: Duration,
    pub scorecard_interval: Duration,
    /// Days either side of today covered by the list fetch.
    pub window_days: u64,
    pub list_retry: RetryPolicy,
    pub fetch_retry: RetryPolicy,
    pub max_concurrent_fetches: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            list_interval: Duration::from_secs(30),
            detail_interval: Duration::from_millis(5000),
            scorecard_interval: Duration::from_millis(3000),
            window_days: 14,
            list_retry: RetryPolicy {
                retries: 3,
                delay: Duration::from_secs(5),
            },
            fetch_retry: RetryPolicy {
                retries: 2,
                delay: Duration::from_secs(3),
            },
            max_concurrent_fetches: 8,
        }
    }
}

/// Run `op` until it succeeds or the retry budget is spent.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                warn!(
                    "{} failed: {} (retry {}/{} in {:?})",
                    what, e, attempt, policy.retries, policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FetchKind {
    Detail,
    Scorecard,
}

type InFlightSet = Arc<Mutex<HashSet<(FetchKind, String)>>>;

/// Marks one spawned per-match fetch as pending; released on drop, which
/// also covers a task that panics or is aborted.
struct InFlight {
    set: InFlightSet,
    key: (FetchKind, String),
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
    }
}

/// One refresh pass of each kind, plus on-demand fetches for the REST layer.
pub struct Poller {
    provider: Arc<dyn CricketProvider>,
    cache: MatchCache,
    reconciler: Reconciler,
    publisher: Publisher,
    config: PollConfig,
    permits: Arc<Semaphore>,
    in_flight: InFlightSet,
}

impl Poller {
    pub fn new(
        provider: Arc<dyn CricketProvider>,
        cache: MatchCache,
        publisher: Publisher,
        vocab: StatusVocabulary,
        config: PollConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));
        Poller {
            provider,
            reconciler: Reconciler::new(cache.clone(), vocab),
            cache,
            publisher,
            config,
            permits,
            in_flight: Arc::default(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn CricketProvider> {
        &self.provider
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Fetch the rolling window, swap the batch in, reconcile, publish, and
    /// kick off immediate fetches for matches that just went live.
    pub async fn refresh_list(self: &Arc<Self>) -> Result<Vec<LiveEvent>, FetchError> {
        let query = ListQuery::around(Utc::now().date_naive(), self.config.window_days);
        let batch = with_retry(self.config.list_retry, "match list", || {
            self.provider.fetch_list(&query)
        })
        .await?;
        info!("Fetched {} matches from {}", batch.len(), self.provider.name());

        let stored = self.cache.replace_summaries(batch).await;
        let events = self.reconciler.reconcile(&stored.matches).await;

        self.cache.prune_unlisted().await;

        self.publisher.publish_batch(&stored).await;
        self.publisher.publish_live_events(&events).await;

        for event in &events {
            if let LiveEvent::Added(summary) = event {
                info!(
                    "Match {} is live ({} vs {}, {}), fetching details now",
                    summary.event_key,
                    summary.home_team,
                    summary.away_team,
                    summary.league_name.as_deref().unwrap_or("unknown league")
                );
                self.spawn_detail(summary.event_key.clone());
                self.spawn_scorecard(summary.event_key.clone());
            }
        }
        Ok(events)
    }

    /// Refresh one live match's detail. Failures are logged and swallowed;
    /// the next tick tries again. A result for a match that left the live
    /// set while in flight is discarded.
    pub async fn refresh_detail(&self, event_key: &str) -> Option<MatchDetail> {
        let what = format!("detail {}", event_key);
        let result = with_retry(self.config.fetch_retry, &what, || {
            self.fetch_detail_once(event_key)
        })
        .await;
        match result {
            Ok(detail) => {
                if !self.cache.upsert_detail_if_live(detail.clone()).await {
                    debug!("Discarding detail for {}: no longer live", event_key);
                    return None;
                }
                self.publisher.publish_detail(&detail).await;
                Some(detail)
            }
            Err(e) => {
                warn!("Giving up on {} this cycle: {}", what, e);
                None
            }
        }
    }

    pub async fn refresh_scorecard(&self, event_key: &str) -> Option<Scorecard> {
        let what = format!("scorecard {}", event_key);
        let result = with_retry(self.config.fetch_retry, &what, || {
            self.fetch_scorecard_once(event_key)
        })
        .await;
        match result {
            Ok(card) => {
                if !self.cache.upsert_scorecard_if_live(card.clone()).await {
                    debug!("Discarding scorecard for {}: no longer live", event_key);
                    return None;
                }
                self.publisher.publish_scorecard(&card).await;
                Some(card)
            }
            Err(e) => {
                warn!("Giving up on {} this cycle: {}", what, e);
                None
            }
        }
    }

    /// Single-attempt fetch for a REST cache miss. The result is cached and
    /// published whether or not the match is live; entries for matches that
    /// are neither live nor listed go on the next list refresh.
    pub async fn fetch_detail_now(&self, event_key: &str) -> Result<MatchDetail, FetchError> {
        let detail = self.fetch_detail_once(event_key).await?;
        self.store_detail(&detail).await;
        Ok(detail)
    }

    pub async fn fetch_scorecard_now(&self, event_key: &str) -> Result<Scorecard, FetchError> {
        let card = self.fetch_scorecard_once(event_key).await?;
        self.store_scorecard(&card).await;
        Ok(card)
    }

    /// Spawn a detail refresh unless one for the same match is pending.
    /// Returns whether a task was spawned.
    pub fn spawn_detail(self: &Arc<Self>, event_key: String) -> bool {
        let Some(claim) = self.claim(FetchKind::Detail, &event_key) else {
            debug!("Detail {} still in flight, skipping", event_key);
            return false;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _claim = claim;
            this.refresh_detail(&event_key).await;
        });
        true
    }

    pub fn spawn_scorecard(self: &Arc<Self>, event_key: String) -> bool {
        let Some(claim) = self.claim(FetchKind::Scorecard, &event_key) else {
            debug!("Scorecard {} still in flight, skipping", event_key);
            return false;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _claim = claim;
            this.refresh_scorecard(&event_key).await;
        });
        true
    }

    fn claim(&self, kind: FetchKind, event_key: &str) -> Option<InFlight> {
        let key = (kind, event_key.to_string());
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.clone()) {
            return None;
        }
        Some(InFlight {
            set: Arc::clone(&self.in_flight),
            key,
        })
    }

    async fn fetch_detail_once(&self, event_key: &str) -> Result<MatchDetail, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Transport("fetch pool closed".into()))?;
        self.provider.fetch_detail(event_key).await
    }

    async fn fetch_scorecard_once(&self, event_key: &str) -> Result<Scorecard, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Transport("fetch pool closed".into()))?;
        self.provider.fetch_scorecard(event_key).await
    }

    async fn store_detail(&self, detail: &MatchDetail) {
        self.cache.upsert_detail(detail.clone()).await;
        self.publisher.publish_detail(detail).await;
    }

    async fn store_scorecard(&self, card: &Scorecard) {
        self.cache.upsert_scorecard(card.clone()).await;
        self.publisher.publish_scorecard(card).await;
    }
}

/// Owns the three timer tasks so they start and stop together.
pub struct Scheduler {
    poller: Arc<Poller>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(poller: Arc<Poller>) -> Self {
        Scheduler {
            poller,
            handles: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Spawn the timers. The first list refresh happens immediately.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Scheduler already running");
            return;
        }
        let cfg = self.poller.config().clone();
        info!(
            "Scheduler started (list={:?}, detail={:?}, scorecard={:?}, window=±{}d)",
            cfg.list_interval, cfg.detail_interval, cfg.scorecard_interval, cfg.window_days
        );

        let (list_every, detail_every, scorecard_every) =
            (cfg.list_interval, cfg.detail_interval, cfg.scorecard_interval);

        let poller = Arc::clone(&self.poller);
        self.handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(list_every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = poller.refresh_list().await {
                    error!("Match list refresh failed after retries: {}", e);
                }
            }
        }));

        let poller = Arc::clone(&self.poller);
        self.handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(detail_every);
            loop {
                interval.tick().await;
                for id in poller.cache.live_ids().await {
                    poller.spawn_detail(id);
                }
            }
        }));

        let poller = Arc::clone(&self.poller);
        self.handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(scorecard_every);
            loop {
                interval.tick().await;
                for id in poller.cache.live_ids().await {
                    poller.spawn_scorecard(id);
                }
            }
        }));
    }

    /// Abort all timers. Fetches already spawned run to completion.
    pub fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
