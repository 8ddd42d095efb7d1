use serde_json::Value;

use crate::types::{MarketKind, MarketPrices, MarketRow};

// ---------------------------------------------------------------------------
// Column-candidate specs
// ---------------------------------------------------------------------------
// Snapshots across tables (and across upstream runs within one table) do not
// agree on column names, so each canonical field carries an ordered list of
// acceptable source columns. First present-and-non-null wins.

const HDP_LINE: &[&str] = &["handicap", "pin_hdp_line", "line"];
const HDP_HOME: &[&str] = &["home_odds", "pin_hdp_home"];
const HDP_AWAY: &[&str] = &["away_odds", "pin_hdp_away"];

const OU_LINE: &[&str] = &["handicap", "pin_ou_line", "line"];
const OU_OVER: &[&str] = &["over_odds", "pin_ou_over", "odds_over"];
const OU_UNDER: &[&str] = &["under_odds", "pin_ou_under", "odds_under"];

const ML_HOME: &[&str] = &["home_odds", "pin_1x2_home"];
const ML_DRAW: &[&str] = &["draw_odds", "pin_1x2_draw"];
const ML_AWAY: &[&str] = &["away_odds", "pin_1x2_away"];

/// First present-and-non-null value among the candidate columns.
fn pick<'a>(row: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|key| row.get(*key))
        .find(|v| !v.is_null())
}

/// Coerce a JSON value to display text. Missing or null degrades to an empty
/// string — never an error; field data is not trusted to be well-formed.
fn to_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

fn field(row: &Value, candidates: &[&str]) -> String {
    to_text(pick(row, candidates))
}

/// Numeric coercion of the backend row id. Rows without a parsable id sort
/// as 0, which can misorder them relative to real ids; the stable sort in
/// `snapshot` at least keeps such rows in fetch order.
pub fn row_id(row: &Value) -> i64 {
    match row.get("id") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

/// Normalize one raw table row into the canonical shape for its market.
/// Pure and total: heterogeneous or partially-empty rows never fail.
pub fn normalize(kind: MarketKind, raw: &Value) -> MarketRow {
    let prices = match kind {
        MarketKind::Handicap => MarketPrices::Handicap {
            line: field(raw, HDP_LINE),
            home: field(raw, HDP_HOME),
            away: field(raw, HDP_AWAY),
        },
        MarketKind::OverUnder => MarketPrices::OverUnder {
            line: field(raw, OU_LINE),
            over: field(raw, OU_OVER),
            under: field(raw, OU_UNDER),
        },
        MarketKind::Moneyline => MarketPrices::Moneyline {
            home: field(raw, ML_HOME),
            draw: field(raw, ML_DRAW),
            away: field(raw, ML_AWAY),
        },
    };

    MarketRow {
        id: row_id(raw),
        match_id: field(raw, &["match_id"]),
        clock: field(raw, &["clock"]),
        score: field(raw, &["score"]),
        signal: field(raw, &["signal"]),
        staking_plan: field(raw, &["staking_plan"]),
        home_team: field(raw, &["home_team"]),
        away_team: field(raw, &["away_team"]),
        created_at: field(raw, &["created_at"]),
        ai_prompt: field(raw, &["ai_prompt"]),
        prices,
    }
}

pub fn normalize_all(kind: MarketKind, raw_rows: &[Value]) -> Vec<MarketRow> {
    raw_rows.iter().map(|r| normalize(kind, r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_columns_pass_through_unchanged() {
        let raw = json!({
            "id": 7,
            "match_id": "m1",
            "clock": "45'",
            "score": "1 - 0",
            "signal": "🟢 进场",
            "staking_plan": "2u",
            "home_team": "Arsenal",
            "away_team": "Spurs",
            "handicap": "-0.5",
            "home_odds": "1.90",
            "away_odds": "2.02",
        });
        let row = normalize(MarketKind::Handicap, &raw);
        assert_eq!(row.id, 7);
        assert_eq!(row.match_id, "m1");
        assert_eq!(row.signal, "🟢 进场");
        assert_eq!(
            row.prices,
            MarketPrices::Handicap {
                line: "-0.5".to_string(),
                home: "1.90".to_string(),
                away: "2.02".to_string(),
            }
        );
        // Idempotence under coercion: re-normalizing the canonical values
        // yields the same row.
        let again = normalize(MarketKind::Handicap, &raw);
        assert_eq!(row, again);
    }

    #[test]
    fn alternate_column_names_resolve() {
        let raw = json!({ "id": 1, "match_id": "m1", "pin_hdp_line": "1.75", "pin_hdp_home": "1.85" });
        let row = normalize(MarketKind::Handicap, &raw);
        match row.prices {
            MarketPrices::Handicap { line, home, away } => {
                assert_eq!(line, "1.75");
                assert_eq!(home, "1.85");
                assert_eq!(away, "");
            }
            other => panic!("expected handicap prices, got {other:?}"),
        }
    }

    #[test]
    fn first_candidate_wins_over_later_ones() {
        let raw = json!({ "handicap": "2.5", "pin_ou_line": "2.75", "over_odds": "1.95" });
        let row = normalize(MarketKind::OverUnder, &raw);
        match row.prices {
            MarketPrices::OverUnder { line, over, .. } => {
                assert_eq!(line, "2.5");
                assert_eq!(over, "1.95");
            }
            other => panic!("expected over/under prices, got {other:?}"),
        }
    }

    #[test]
    fn null_candidate_is_skipped() {
        let raw = json!({ "handicap": null, "pin_hdp_line": "0.25" });
        let row = normalize(MarketKind::Handicap, &raw);
        match row.prices {
            MarketPrices::Handicap { line, .. } => assert_eq!(line, "0.25"),
            other => panic!("expected handicap prices, got {other:?}"),
        }
    }

    #[test]
    fn missing_everything_degrades_to_empty_strings() {
        let row = normalize(MarketKind::Moneyline, &json!({}));
        assert_eq!(row.id, 0);
        assert!(row.match_id.is_empty());
        assert_eq!(
            row.prices,
            MarketPrices::Moneyline {
                home: String::new(),
                draw: String::new(),
                away: String::new(),
            }
        );
    }

    #[test]
    fn numeric_source_values_coerce_to_text() {
        let raw = json!({ "id": "42", "home_odds": 1.5, "draw_odds": 3, "away_odds": "6.0" });
        let row = normalize(MarketKind::Moneyline, &raw);
        assert_eq!(row.id, 42);
        match row.prices {
            MarketPrices::Moneyline { home, draw, away } => {
                assert_eq!(home, "1.5");
                assert_eq!(draw, "3");
                assert_eq!(away, "6.0");
            }
            other => panic!("expected moneyline prices, got {other:?}"),
        }
    }

    #[test]
    fn unparsable_id_defaults_to_zero() {
        assert_eq!(row_id(&json!({ "id": "abc" })), 0);
        assert_eq!(row_id(&json!({})), 0);
        assert_eq!(row_id(&json!({ "id": 99 })), 99);
    }

    #[test]
    fn moneyline_summary_template() {
        let raw = json!({ "home_odds": "2.10", "draw_odds": "3.40", "away_odds": "3.10" });
        let row = normalize(MarketKind::Moneyline, &raw);
        assert_eq!(row.odds_summary(), "Home 2.10 | Draw 3.40 | Away 3.10");
    }
}
