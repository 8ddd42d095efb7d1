use crate::types::MarketRow;

/// One history line: a normalized row plus its precomputed display summary.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub row: MarketRow,
    pub odds_summary: String,
}

/// Per-match, per-market bundle of {current row, most-recent-first history}.
/// Recomputed from the latest fetch results; never persisted.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub current: Option<MarketRow>,
    pub history: Vec<HistoryEntry>,
}

impl MarketSnapshot {
    /// Build a snapshot from fetched rows. Rows are sorted ascending by the
    /// numeric row id; `current` is the last element of that order and
    /// `history` the same rows reversed (newest on top), each annotated with
    /// its odds summary.
    pub fn build(rows: &[MarketRow]) -> Self {
        let sorted = sort_rows(rows);
        let current = sorted.last().cloned();
        let history = sorted
            .into_iter()
            .rev()
            .map(|row| {
                let odds_summary = row.odds_summary();
                HistoryEntry { row, odds_summary }
            })
            .collect();
        Self { current, history }
    }
}

/// Stable ascending sort by row id, leaving the input untouched. Stability
/// matters: ids defaulted to 0 keep their original fetch order instead of
/// shuffling arbitrarily.
pub fn sort_rows(rows: &[MarketRow]) -> Vec<MarketRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by_key(|r| r.id);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::MarketKind;
    use serde_json::json;

    fn row(id: i64, home_odds: &str) -> MarketRow {
        normalize(
            MarketKind::Handicap,
            &json!({ "id": id, "match_id": "m1", "handicap": "0.5", "home_odds": home_odds, "away_odds": "2.0" }),
        )
    }

    #[test]
    fn empty_input_has_no_current() {
        let snap = MarketSnapshot::build(&[]);
        assert!(snap.current.is_none());
        assert!(snap.history.is_empty());
    }

    #[test]
    fn current_is_max_id_history_descends() {
        // Fetch order 1, 3, 2 — current must be id 3, history [3, 2, 1].
        let rows = vec![row(1, "1.5"), row(3, "1.8"), row(2, "1.6")];
        let snap = MarketSnapshot::build(&rows);

        let current = snap.current.expect("current row");
        assert_eq!(current.id, 3);
        match &current.prices {
            crate::types::MarketPrices::Handicap { home, .. } => assert_eq!(home, "1.8"),
            other => panic!("expected handicap prices, got {other:?}"),
        }

        let ids: Vec<i64> = snap.history.iter().map(|e| e.row.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(snap.history.len(), rows.len());
    }

    #[test]
    fn input_is_not_mutated() {
        let rows = vec![row(2, "1.6"), row(1, "1.5")];
        let _ = MarketSnapshot::build(&rows);
        assert_eq!(rows[0].id, 2);
        assert_eq!(rows[1].id, 1);
    }

    #[test]
    fn zero_id_ties_keep_fetch_order() {
        let rows = vec![row(0, "a"), row(0, "b"), row(0, "c")];
        let sorted = sort_rows(&rows);
        let homes: Vec<String> = sorted
            .iter()
            .map(|r| match &r.prices {
                crate::types::MarketPrices::Handicap { home, .. } => home.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(homes, vec!["a", "b", "c"]);
    }

    #[test]
    fn history_entries_carry_summaries() {
        let snap = MarketSnapshot::build(&[row(1, "1.95")]);
        assert_eq!(snap.history[0].odds_summary, "Line 0.5 | Home 1.95 Away 2.0");
    }
}
