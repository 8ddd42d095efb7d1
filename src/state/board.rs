use std::sync::{Arc, RwLock};

use dashmap::{DashMap, DashSet};

use crate::snapshot::MarketSnapshot;
use crate::types::{MarketKind, MarketRow, MatchInfo};

/// In-memory state for the active match: the latest successfully fetched row
/// set per market, per-market error strings, and in-flight flags. Everything
/// else is derived on demand — nothing here is persisted.
pub struct BoardStore {
    /// kind → normalized rows from the last successful fetch.
    rows: DashMap<MarketKind, Vec<MarketRow>>,
    /// kind → terse error text for the last failed fetch. A market's error
    /// never blanks another market's rows.
    errors: DashMap<MarketKind, String>,
    /// kinds with a fetch currently in flight.
    in_flight: DashSet<MarketKind>,
    /// Team-name fallbacks from discovery, used while rows are still empty.
    fallback_teams: RwLock<(Option<String>, Option<String>)>,
}

impl BoardStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: DashMap::new(),
            errors: DashMap::new(),
            in_flight: DashSet::new(),
            fallback_teams: RwLock::new((None, None)),
        })
    }

    pub fn set_fallback_teams(&self, home: Option<String>, away: Option<String>) {
        if let Ok(mut guard) = self.fallback_teams.write() {
            *guard = (home, away);
        }
    }

    /// Drop all market data — called on match switch so rows from the
    /// previous match are never rendered against the new one.
    pub fn clear(&self) {
        self.rows.clear();
        self.errors.clear();
    }

    pub fn begin_fetch(&self, kind: MarketKind) {
        self.in_flight.insert(kind);
    }

    pub fn end_fetch(&self, kind: MarketKind) {
        self.in_flight.remove(&kind);
    }

    /// Combined loading state: true iff any market fetch is in flight.
    pub fn is_refreshing(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Store a successful fetch, replacing rows wholesale and clearing the
    /// market's error flag.
    pub fn set_rows(&self, kind: MarketKind, rows: Vec<MarketRow>) {
        self.errors.remove(&kind);
        self.rows.insert(kind, rows);
    }

    /// Flag a failed fetch. Previously fetched rows for this market stay —
    /// stale data with an error indicator beats a blank panel.
    pub fn set_error(&self, kind: MarketKind, message: String) {
        self.errors.insert(kind, message);
    }

    pub fn error(&self, kind: MarketKind) -> Option<String> {
        self.errors.get(&kind).map(|e| e.clone())
    }

    pub fn rows(&self, kind: MarketKind) -> Vec<MarketRow> {
        self.rows.get(&kind).map(|r| r.clone()).unwrap_or_default()
    }

    /// Current + history bundle for one market tab.
    pub fn snapshot(&self, kind: MarketKind) -> MarketSnapshot {
        MarketSnapshot::build(&self.rows(kind))
    }

    /// Header facts from the latest row of any market, preferring handicap,
    /// then over/under, then moneyline, with discovery fallbacks and fixed
    /// defaults last.
    pub fn match_info(&self) -> MatchInfo {
        let latest = MarketKind::ALL
            .into_iter()
            .filter_map(|kind| self.snapshot(kind).current)
            .next();

        let (fb_home, fb_away) = self
            .fallback_teams
            .read()
            .map(|g| g.clone())
            .unwrap_or((None, None));

        let pick = |row_val: Option<&String>, fallback: Option<String>, default: &str| {
            row_val
                .filter(|s| !s.is_empty())
                .cloned()
                .or(fallback)
                .unwrap_or_else(|| default.to_string())
        };

        MatchInfo {
            home_team: pick(latest.as_ref().map(|r| &r.home_team), fb_home, "Home"),
            away_team: pick(latest.as_ref().map(|r| &r.away_team), fb_away, "Away"),
            clock: pick(latest.as_ref().map(|r| &r.clock), None, "0"),
            score: pick(latest.as_ref().map(|r| &r.score), None, "0 - 0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;

    fn hdp_row(id: i64, clock: &str, score: &str) -> MarketRow {
        normalize(
            MarketKind::Handicap,
            &json!({
                "id": id, "match_id": "m1", "clock": clock, "score": score,
                "home_team": "Arsenal", "away_team": "Spurs",
                "handicap": "-0.5", "home_odds": "1.9", "away_odds": "2.0",
            }),
        )
    }

    #[test]
    fn error_on_one_market_keeps_the_others() {
        let board = BoardStore::new();
        board.set_rows(MarketKind::Handicap, vec![hdp_row(1, "10'", "0 - 0")]);
        board.set_error(MarketKind::Moneyline, "network error".to_string());

        assert_eq!(board.rows(MarketKind::Handicap).len(), 1);
        assert!(board.error(MarketKind::Handicap).is_none());
        assert_eq!(board.error(MarketKind::Moneyline).as_deref(), Some("network error"));
    }

    #[test]
    fn successful_fetch_clears_previous_error() {
        let board = BoardStore::new();
        board.set_error(MarketKind::Handicap, "boom".to_string());
        board.set_rows(MarketKind::Handicap, vec![]);
        assert!(board.error(MarketKind::Handicap).is_none());
    }

    #[test]
    fn refreshing_tracks_any_in_flight_market() {
        let board = BoardStore::new();
        assert!(!board.is_refreshing());
        board.begin_fetch(MarketKind::OverUnder);
        board.begin_fetch(MarketKind::Moneyline);
        board.end_fetch(MarketKind::OverUnder);
        assert!(board.is_refreshing());
        board.end_fetch(MarketKind::Moneyline);
        assert!(!board.is_refreshing());
    }

    #[test]
    fn match_info_prefers_latest_row_over_fallbacks() {
        let board = BoardStore::new();
        board.set_fallback_teams(Some("FallbackH".to_string()), Some("FallbackA".to_string()));
        board.set_rows(MarketKind::Handicap, vec![hdp_row(2, "73'", "2 - 1")]);

        let info = board.match_info();
        assert_eq!(info.home_team, "Arsenal");
        assert_eq!(info.away_team, "Spurs");
        assert_eq!(info.clock, "73'");
        assert_eq!(info.score, "2 - 1");
    }

    #[test]
    fn match_info_defaults_when_empty() {
        let board = BoardStore::new();
        let info = board.match_info();
        assert_eq!(info.home_team, "Home");
        assert_eq!(info.away_team, "Away");
        assert_eq!(info.clock, "0");
        assert_eq!(info.score, "0 - 0");
    }

    #[test]
    fn fallback_teams_fill_in_before_first_fetch() {
        let board = BoardStore::new();
        board.set_fallback_teams(Some("Lyon".to_string()), None);
        let info = board.match_info();
        assert_eq!(info.home_team, "Lyon");
        assert_eq!(info.away_team, "Away");
    }

    #[test]
    fn clear_drops_rows_and_errors() {
        let board = BoardStore::new();
        board.set_rows(MarketKind::Handicap, vec![hdp_row(1, "5'", "0 - 0")]);
        board.set_error(MarketKind::OverUnder, "x".to_string());
        board.clear();
        assert!(board.rows(MarketKind::Handicap).is_empty());
        assert!(board.error(MarketKind::OverUnder).is_none());
    }
}
