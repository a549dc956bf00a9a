//! Live-set reconciliation.
//!
//! Each list refresh produces a new summary batch. The reconciler filters it
//! to live matches, diffs that against the previous live map and applies the
//! result to the cache:
//!
//! ```text
//!  added   = live(batch) − previous
//!  removed = previous − live(batch)
//!  changed = { id ∈ live(batch) ∩ previous : canonical bytes differ }
//! ```
//!
//! Diffs are computed from one before/after pair only. A match that became
//! live and stopped being live between two refreshes is never seen, and one
//! that was live before and is not now is only ever `removed`.

use std::collections::HashMap;
use tracing::info;

use crate::cache::{LiveMap, MatchCache};
use crate::cricket::{MatchSummary, StatusVocabulary};

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Added(MatchSummary),
    Updated(MatchSummary),
    /// Carries the match as listed in the new batch when it is still there
    /// (typically now finished), else its last live copy.
    Removed(MatchSummary),
}

impl LiveEvent {
    pub fn summary(&self) -> &MatchSummary {
        match self {
            LiveEvent::Added(s) | LiveEvent::Updated(s) | LiveEvent::Removed(s) => s,
        }
    }

    pub fn event_key(&self) -> &str {
        &self.summary().event_key
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::Added(_) => "live-added",
            LiveEvent::Updated(_) => "live-updated",
            LiveEvent::Removed(_) => "live-removed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveDiff {
    pub added: Vec<MatchSummary>,
    pub changed: Vec<MatchSummary>,
    pub removed: Vec<MatchSummary>,
}

impl LiveDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Events in publish order: additions, updates, removals.
    pub fn into_events(self) -> Vec<LiveEvent> {
        self.added
            .into_iter()
            .map(LiveEvent::Added)
            .chain(self.changed.into_iter().map(LiveEvent::Updated))
            .chain(self.removed.into_iter().map(LiveEvent::Removed))
            .collect()
    }
}

/// Pure diff of `batch` against the `previous` live map.
///
/// Returns the next live map (exactly the live entries of `batch`) and the
/// diff. When an id appears more than once in `batch` the last entry wins.
pub fn diff_live_set(
    previous: &LiveMap,
    batch: &[MatchSummary],
    vocab: &StatusVocabulary,
) -> (LiveMap, LiveDiff) {
    let listed: HashMap<&str, &MatchSummary> = batch
        .iter()
        .map(|s| (s.event_key.as_str(), s))
        .collect();

    let next: LiveMap = listed
        .values()
        .filter(|s| vocab.is_live(s))
        .map(|s| (s.event_key.clone(), (*s).clone()))
        .collect();

    let mut diff = LiveDiff::default();

    for (id, summary) in &next {
        match previous.get(id) {
            None => diff.added.push(summary.clone()),
            Some(prev) if !prev.same_content(summary) => diff.changed.push(summary.clone()),
            Some(_) => {}
        }
    }

    for (id, prev) in previous {
        if next.contains_key(id) {
            continue;
        }
        let last_known = listed.get(id.as_str()).copied().unwrap_or(prev);
        diff.removed.push(last_known.clone());
    }

    (next, diff)
}

/// Applies live-set diffs to the cache.
#[derive(Clone)]
pub struct Reconciler {
    cache: MatchCache,
    vocab: StatusVocabulary,
}

impl Reconciler {
    pub fn new(cache: MatchCache, vocab: StatusVocabulary) -> Self {
        Reconciler { cache, vocab }
    }

    /// Store added/changed summaries, evict removed matches and return the
    /// resulting events. The whole pass runs under the live-map write lock.
    pub async fn reconcile(&self, batch: &[MatchSummary]) -> Vec<LiveEvent> {
        let vocab = &self.vocab;
        let diff = self
            .cache
            .update_live(|previous| diff_live_set(previous, batch, vocab))
            .await;

        if !diff.is_empty() {
            info!(
                "Live set: +{} ~{} -{}",
                diff.added.len(),
                diff.changed.len(),
                diff.removed.len()
            );
        }
        for gone in &diff.removed {
            info!(
                "Match {} left the live set (status {:?})",
                gone.event_key, gone.status_text
            );
        }
        diff.into_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cricket::{MatchDetail, Scorecard};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn m(id: &str, status: &str) -> MatchSummary {
        MatchSummary::from_value(
            json!({"event_key": id, "event_status": status}),
            &StatusVocabulary::default(),
        )
        .unwrap()
    }

    fn m_score(id: &str, status: &str, score: &str) -> MatchSummary {
        MatchSummary::from_value(
            json!({"event_key": id, "event_status": status, "event_home_final_result": score}),
            &StatusVocabulary::default(),
        )
        .unwrap()
    }

    fn ids(list: &[MatchSummary]) -> BTreeSet<String> {
        list.iter().map(|s| s.event_key.clone()).collect()
    }

    fn reconciler() -> (MatchCache, Reconciler) {
        let cache = MatchCache::new();
        (cache.clone(), Reconciler::new(cache, StatusVocabulary::default()))
    }

    #[test]
    fn test_added_and_removed_are_disjoint_and_bounded() {
        let vocab = StatusVocabulary::default();
        let b1 = vec![m("a", "Live"), m("b", "Live"), m("c", "")];
        let b2 = vec![m("b", "Finished"), m_score("c", "Live", "10/0"), m("d", "In Progress")];

        let (prev, _) = diff_live_set(&LiveMap::new(), &b1, &vocab);
        let (_, diff) = diff_live_set(&prev, &b2, &vocab);

        let added = ids(&diff.added);
        let removed = ids(&diff.removed);
        assert!(added.is_disjoint(&removed));

        let universe: BTreeSet<String> = ids(&b1).union(&ids(&b2)).cloned().collect();
        for id in added.iter().chain(&removed).chain(&ids(&diff.changed)) {
            assert!(universe.contains(id));
        }
        assert_eq!(added, BTreeSet::from(["c".to_string(), "d".to_string()]));
        assert_eq!(removed, BTreeSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_removed_prefers_batch_copy() {
        let vocab = StatusVocabulary::default();
        let (prev, _) = diff_live_set(&LiveMap::new(), &[m("a", "Live"), m("b", "Live")], &vocab);
        let (_, diff) = diff_live_set(&prev, &[m("a", "Finished")], &vocab);
        let a = diff.removed.iter().find(|s| s.event_key == "a").unwrap();
        assert_eq!(a.status_text, "Finished");
        let b = diff.removed.iter().find(|s| s.event_key == "b").unwrap();
        assert_eq!(b.status_text, "Live");
    }

    #[test]
    fn test_never_added_when_not_live_in_batch() {
        let vocab = StatusVocabulary::default();
        let (prev, d1) = diff_live_set(&LiveMap::new(), &[m("x", "")], &vocab);
        assert!(d1.is_empty());
        let (_, d2) = diff_live_set(&prev, &[m("x", "Finished")], &vocab);
        assert!(d2.is_empty());
    }

    #[test]
    fn test_duplicate_ids_last_wins() {
        let vocab = StatusVocabulary::default();
        let (next, diff) = diff_live_set(&LiveMap::new(), &[m("a", "Live"), m("a", "Finished")], &vocab);
        assert!(next.is_empty());
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_to_live_emits_added() {
        let (cache, rec) = reconciler();
        assert!(rec.reconcile(&[m("A", "scheduled")]).await.is_empty());

        let events = rec.reconcile(&[m("A", "live")]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], LiveEvent::Added(s) if s.event_key == "A"));
        assert_eq!(cache.live_ids().await, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_live_to_finished_emits_removed_and_evicts() {
        let (cache, rec) = reconciler();
        rec.reconcile(&[m("A", "live")]).await;
        cache
            .upsert_detail(MatchDetail { event_key: "A".into(), payload: json!({}) })
            .await;
        cache.upsert_scorecard(Scorecard::from_event("A", &json!({}))).await;

        let events = rec.reconcile(&[m("A", "finished")]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "live-removed");
        assert_eq!(events[0].event_key(), "A");
        assert!(cache.live_ids().await.is_empty());
        assert!(cache.detail("A").await.is_none());
        assert!(cache.scorecard("A").await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_from_batch_is_evicted() {
        let (cache, rec) = reconciler();
        rec.reconcile(&[m("A", "live"), m("B", "live")]).await;
        cache
            .upsert_detail(MatchDetail { event_key: "A".into(), payload: json!({}) })
            .await;

        let events = rec.reconcile(&[m("B", "live")]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], LiveEvent::Removed(s) if s.event_key == "A"));
        assert!(cache.detail("A").await.is_none());
    }

    #[tokio::test]
    async fn test_unchanged_replay_is_quiet() {
        let (_cache, rec) = reconciler();
        let batch = vec![m_score("A", "Live", "120/3")];
        assert_eq!(rec.reconcile(&batch).await.len(), 1);
        assert!(rec.reconcile(&batch).await.is_empty());
        assert!(rec.reconcile(&batch).await.is_empty());
    }

    #[tokio::test]
    async fn test_any_byte_change_emits_updated() {
        let (cache, rec) = reconciler();
        rec.reconcile(&[m_score("A", "Live", "120/3")]).await;
        let events = rec.reconcile(&[m_score("A", "Live", "121/3")]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], LiveEvent::Updated(_)));
        assert_eq!(
            cache.live_matches().await[0].raw["event_home_final_result"],
            "121/3"
        );
    }

    #[tokio::test]
    async fn test_live_set_is_subset_of_latest_batch() {
        let (cache, rec) = reconciler();
        rec.reconcile(&[m("A", "live"), m("B", "live")]).await;
        let batch = vec![m("B", "live"), m("C", "")];
        rec.reconcile(&batch).await;
        let batch_ids = ids(&batch);
        for id in cache.live_ids().await {
            assert!(batch_ids.contains(&id));
        }
    }
}
