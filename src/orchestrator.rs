use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::backend::rest::SelectQuery;
use crate::backend::SupabaseClient;
use crate::error::Result;
use crate::normalize::normalize_all;
use crate::state::BoardStore;
use crate::types::{ChangeNotice, MarketKind, MarketRow};

// ---------------------------------------------------------------------------
// Query cache
// ---------------------------------------------------------------------------

type CacheKey = (MarketKind, String, Option<String>);

/// Explicit fetch cache keyed by (market kind, match id, tag). Poll ticks hit
/// the backend through it; realtime notices and manual refresh invalidate by
/// key or by match prefix so the next tick refetches.
#[derive(Default)]
pub struct QueryCache {
    entries: DashMap<CacheKey, Vec<MarketRow>>,
}

impl QueryCache {
    pub fn get(&self, kind: MarketKind, match_id: &str, tag: &Option<String>) -> Option<Vec<MarketRow>> {
        self.entries
            .get(&(kind, match_id.to_string(), tag.clone()))
            .map(|rows| rows.clone())
    }

    pub fn put(&self, kind: MarketKind, match_id: &str, tag: &Option<String>, rows: Vec<MarketRow>) {
        self.entries.insert((kind, match_id.to_string(), tag.clone()), rows);
    }

    /// Drop one market's entry for one match (any tag).
    pub fn invalidate(&self, kind: MarketKind, match_id: &str) {
        self.entries.retain(|(k, m, _), _| !(*k == kind && m == match_id));
    }

    /// Drop all three markets' entries for one match — the prefix operation
    /// behind `refresh()`.
    pub fn invalidate_match(&self, match_id: &str) {
        self.entries.retain(|(_, m, _), _| m != match_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the three concurrent market fetches for the active match and owns
/// the query cache. Stale responses are fenced by generation stamping: every
/// match switch bumps the generation, and results fetched under an older
/// generation are discarded instead of overwriting the new match's board.
pub struct Orchestrator {
    client: Arc<SupabaseClient>,
    board: Arc<BoardStore>,
    cache: QueryCache,
    /// Optional ai_prompt filter applied to every market fetch.
    tag: Option<String>,
    generation: AtomicU64,
    active: RwLock<String>,
}

impl Orchestrator {
    pub fn new(client: Arc<SupabaseClient>, board: Arc<BoardStore>, tag: Option<String>) -> Self {
        Self {
            client,
            board,
            cache: QueryCache::default(),
            tag,
            generation: AtomicU64::new(0),
            active: RwLock::new(String::new()),
        }
    }

    pub fn board(&self) -> &Arc<BoardStore> {
        &self.board
    }

    pub fn active_match(&self) -> String {
        self.active.read().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Switch the active match. Bumps the generation (fencing any in-flight
    /// fetches for the old match) and clears the board so nothing stale is
    /// rendered while the first fetch for the new match runs.
    pub fn set_match(&self, match_id: &str) {
        {
            let mut active = match self.active.write() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *active == match_id {
                return;
            }
            *active = match_id.to_string();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.board.clear();
    }

    /// Manual refresh: invalidate all three cache entries for the active
    /// match. The caller follows up with `fetch_all`.
    pub fn refresh(&self) {
        let active = self.active_match();
        if !active.is_empty() {
            self.cache.invalidate_match(&active);
        }
    }

    /// Apply an edge-triggered change notice from the realtime channel.
    /// Notices for anything but the active match are dropped.
    pub fn apply_notice(&self, notice: &ChangeNotice) {
        if notice.match_id == self.active_match() {
            debug!(kind = %notice.kind, "change notice, invalidating cache entry");
            self.cache.invalidate(notice.kind, &notice.match_id);
        } else {
            debug!(kind = %notice.kind, match_id = %notice.match_id, "notice for inactive match dropped");
        }
    }

    /// Fetch all three markets concurrently for the active match. Each market
    /// lands independently: one failure flags only that market, and results
    /// from a stale generation are dropped wholesale.
    pub async fn fetch_all(&self) {
        let match_id = self.active_match();
        if match_id.is_empty() {
            return;
        }
        let gen = self.generation();

        for kind in MarketKind::ALL {
            self.board.begin_fetch(kind);
        }

        let (hdp, ou, ml) = tokio::join!(
            self.fetch_market(MarketKind::Handicap, &match_id),
            self.fetch_market(MarketKind::OverUnder, &match_id),
            self.fetch_market(MarketKind::Moneyline, &match_id),
        );

        self.land(gen, MarketKind::Handicap, hdp);
        self.land(gen, MarketKind::OverUnder, ou);
        self.land(gen, MarketKind::Moneyline, ml);

        for kind in MarketKind::ALL {
            self.board.end_fetch(kind);
        }
    }

    /// Store one market's fetch outcome, unless the match changed while the
    /// fetch was in flight.
    fn land(&self, gen: u64, kind: MarketKind, result: Result<Vec<MarketRow>>) {
        if self.generation() != gen {
            debug!(kind = %kind, "stale fetch result dropped");
            return;
        }
        match result {
            Ok(rows) => self.board.set_rows(kind, rows),
            Err(e) => {
                warn!(kind = %kind, "market fetch failed: {e}");
                self.board.set_error(kind, e.to_string());
            }
        }
    }

    /// Build the select for one market's full row set. Unbounded: a row cap
    /// here would keep the smallest ids and silently drop the newest rows,
    /// so the latest-row selector would go stale.
    fn market_query(&self, kind: MarketKind, match_id: &str) -> SelectQuery<'_> {
        let mut query = self
            .client
            .select(kind.table())
            .eq("match_id", match_id)
            .order_asc("id");
        if let Some(tag) = &self.tag {
            query = query.eq("ai_prompt", tag);
        }
        query
    }

    async fn fetch_market(&self, kind: MarketKind, match_id: &str) -> Result<Vec<MarketRow>> {
        if let Some(rows) = self.cache.get(kind, match_id, &self.tag) {
            return Ok(rows);
        }

        let raw = self.market_query(kind, match_id).fetch().await?;
        let rows = normalize_all(kind, &raw);
        self.cache.put(kind, match_id, &self.tag, rows.clone());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::AppError;
    use crate::normalize::normalize;
    use serde_json::json;

    fn test_orchestrator() -> Orchestrator {
        let cfg = Config {
            supabase_url: "http://localhost".to_string(),
            supabase_anon_key: "test-key".to_string(),
            log_level: "info".to_string(),
            poll_interval_secs: 10,
            match_ids: vec![],
            discovery_window_days: 7,
            ai_prompt_tag: None,
            realtime: false,
        };
        let client = Arc::new(SupabaseClient::new(&cfg).unwrap());
        Orchestrator::new(client, BoardStore::new(), None)
    }

    fn row(id: i64) -> MarketRow {
        normalize(MarketKind::Handicap, &json!({ "id": id, "match_id": "m1" }))
    }

    #[test]
    fn market_queries_are_unbounded_and_id_ordered() {
        let orch = test_orchestrator();
        let query = orch.market_query(MarketKind::Handicap, "m1");
        let params = query.params();

        assert!(params.iter().any(|(k, v)| k == "match_id" && v == "eq.m1"));
        assert!(params.iter().any(|(k, v)| k == "order" && v == "id.asc"));
        // No row cap: a limit would keep the smallest ids and drop the newest.
        assert!(params.iter().all(|(k, _)| k != "limit"));
    }

    #[test]
    fn market_queries_carry_the_tag_filter() {
        let orch = test_orchestrator();
        let tagged = Orchestrator::new(
            Arc::clone(&orch.client),
            BoardStore::new(),
            Some("run-7".to_string()),
        );
        let params_plain: Vec<_> = orch.market_query(MarketKind::Moneyline, "m1").params().to_vec();
        let query = tagged.market_query(MarketKind::Moneyline, "m1");

        assert!(query.params().iter().any(|(k, v)| k == "ai_prompt" && v == "eq.run-7"));
        assert!(params_plain.iter().all(|(k, _)| k != "ai_prompt"));
    }

    #[test]
    fn cache_invalidate_by_key_and_prefix() {
        let cache = QueryCache::default();
        cache.put(MarketKind::Handicap, "m1", &None, vec![row(1)]);
        cache.put(MarketKind::OverUnder, "m1", &None, vec![row(2)]);
        cache.put(MarketKind::Handicap, "m2", &None, vec![row(3)]);

        cache.invalidate(MarketKind::Handicap, "m1");
        assert!(cache.get(MarketKind::Handicap, "m1", &None).is_none());
        assert!(cache.get(MarketKind::OverUnder, "m1", &None).is_some());

        cache.invalidate_match("m1");
        assert!(cache.get(MarketKind::OverUnder, "m1", &None).is_none());
        assert!(cache.get(MarketKind::Handicap, "m2", &None).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_keys_include_tag() {
        let cache = QueryCache::default();
        let tagged = Some("run-7".to_string());
        cache.put(MarketKind::Handicap, "m1", &tagged, vec![row(1)]);
        assert!(cache.get(MarketKind::Handicap, "m1", &None).is_none());
        assert!(cache.get(MarketKind::Handicap, "m1", &tagged).is_some());
    }

    #[test]
    fn set_match_bumps_generation_and_clears_board() {
        let orch = test_orchestrator();
        orch.set_match("m1");
        let gen = orch.generation();
        orch.board().set_rows(MarketKind::Handicap, vec![row(1)]);

        orch.set_match("m2");
        assert_eq!(orch.generation(), gen + 1);
        assert!(orch.board().rows(MarketKind::Handicap).is_empty());
        assert_eq!(orch.active_match(), "m2");
    }

    #[test]
    fn reselecting_same_match_is_a_no_op() {
        let orch = test_orchestrator();
        orch.set_match("m1");
        let gen = orch.generation();
        orch.board().set_rows(MarketKind::Handicap, vec![row(1)]);

        orch.set_match("m1");
        assert_eq!(orch.generation(), gen);
        assert_eq!(orch.board().rows(MarketKind::Handicap).len(), 1);
    }

    #[test]
    fn stale_generation_results_are_dropped() {
        let orch = test_orchestrator();
        orch.set_match("m1");
        let gen = orch.generation();

        orch.set_match("m2");
        orch.land(gen, MarketKind::Handicap, Ok(vec![row(1)]));
        assert!(orch.board().rows(MarketKind::Handicap).is_empty());

        orch.land(orch.generation(), MarketKind::Handicap, Ok(vec![row(2)]));
        assert_eq!(orch.board().rows(MarketKind::Handicap).len(), 1);
    }

    #[test]
    fn failed_market_flags_error_without_touching_others() {
        let orch = test_orchestrator();
        orch.set_match("m1");
        let gen = orch.generation();

        orch.land(gen, MarketKind::Handicap, Ok(vec![row(1)]));
        orch.land(gen, MarketKind::Moneyline, Err(AppError::Backend("boom".to_string())));

        assert_eq!(orch.board().rows(MarketKind::Handicap).len(), 1);
        assert!(orch.board().error(MarketKind::Handicap).is_none());
        assert!(orch.board().error(MarketKind::Moneyline).is_some());
    }

    #[test]
    fn notices_for_inactive_matches_are_ignored() {
        let orch = test_orchestrator();
        orch.set_match("m1");
        orch.cache.put(MarketKind::Handicap, "m1", &None, vec![row(1)]);

        orch.apply_notice(&ChangeNotice {
            kind: MarketKind::Handicap,
            match_id: "other".to_string(),
        });
        assert!(orch.cache.get(MarketKind::Handicap, "m1", &None).is_some());

        orch.apply_notice(&ChangeNotice {
            kind: MarketKind::Handicap,
            match_id: "m1".to_string(),
        });
        assert!(orch.cache.get(MarketKind::Handicap, "m1", &None).is_none());
    }

    #[test]
    fn refresh_invalidates_all_markets_for_active_match() {
        let orch = test_orchestrator();
        orch.set_match("m1");
        for kind in MarketKind::ALL {
            orch.cache.put(kind, "m1", &None, vec![row(1)]);
        }
        orch.cache.put(MarketKind::Handicap, "m2", &None, vec![row(9)]);

        orch.refresh();
        assert_eq!(orch.cache.len(), 1);
        assert!(orch.cache.get(MarketKind::Handicap, "m2", &None).is_some());
    }
}
