use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::SupabaseClient;
use crate::config::{Config, QUERY_ROW_LIMIT};
use crate::error::Result;
use crate::normalize::row_id;
use crate::types::MatchSummary;

/// Tables scanned for match ids and team names: the three market tables plus
/// the fast-odds feed, which often carries team names before any market row
/// lands.
const DISCOVERY_TABLES: &[&str] = &["handicap", "total_points", "moneyline 1x2", "odds_fast_history"];

/// Which matches to surface. The two policies are an explicit configuration
/// choice and never merge: a non-empty MATCH_IDS list selects `AllowList`,
/// otherwise `Window` discovery runs.
#[derive(Debug, Clone)]
pub enum DiscoveryPolicy {
    /// Fixed allow-list; summaries come back in list order regardless of
    /// recency, one per id even when no table has rows for it yet.
    AllowList(Vec<String>),
    /// Open discovery over a trailing creation-time window, optionally
    /// filtered by the upstream run tag.
    Window { days: u64, tag: Option<String> },
}

impl DiscoveryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        if cfg.match_ids.is_empty() {
            DiscoveryPolicy::Window {
                days: cfg.discovery_window_days,
                tag: cfg.ai_prompt_tag.clone(),
            }
        } else {
            DiscoveryPolicy::AllowList(cfg.match_ids.clone())
        }
    }
}

/// Intermediate per-match aggregate while scanning tables.
#[derive(Debug, Default, Clone)]
struct Discovered {
    home_team: Option<String>,
    away_team: Option<String>,
    /// Largest row id seen for this match — the recency key for Window order.
    max_id: i64,
}

/// Query every discovery table and merge discovered matches. Per-table
/// failures are logged and skipped; discovery proceeds with whatever the
/// other tables returned. Invariants: one summary per match id, and a team
/// name once discovered is never overwritten by an empty later value.
pub async fn discover_matches(
    client: &SupabaseClient,
    policy: &DiscoveryPolicy,
) -> Result<Vec<MatchSummary>> {
    let mut grouped: HashMap<String, Discovered> = HashMap::new();

    for table in DISCOVERY_TABLES.iter().copied() {
        let rows = match fetch_table(client, table, policy).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table, "discovery query failed, skipping table: {e}");
                continue;
            }
        };
        merge_rows(&mut grouped, &rows, policy);
    }

    let summaries: Vec<MatchSummary> = match policy {
        DiscoveryPolicy::AllowList(ids) => ids
            .iter()
            .map(|id| {
                let found = grouped.get(id);
                MatchSummary {
                    match_id: id.clone(),
                    home_team: found.and_then(|d| d.home_team.clone()),
                    away_team: found.and_then(|d| d.away_team.clone()),
                }
            })
            .collect(),
        DiscoveryPolicy::Window { .. } => {
            let mut entries: Vec<(String, Discovered)> = grouped.into_iter().collect();
            // Most recently updated match first.
            entries.sort_by(|a, b| b.1.max_id.cmp(&a.1.max_id).then(a.0.cmp(&b.0)));
            entries
                .into_iter()
                .map(|(match_id, d)| MatchSummary {
                    match_id,
                    home_team: d.home_team,
                    away_team: d.away_team,
                })
                .collect()
        }
    };

    info!(matches = summaries.len(), "match discovery complete");
    Ok(summaries)
}

/// Merge raw rows into the per-match aggregates.
fn merge_rows(grouped: &mut HashMap<String, Discovered>, rows: &[Value], policy: &DiscoveryPolicy) {
    for row in rows {
        let Some(match_id) = row.get("match_id").and_then(|v| v.as_str()) else {
            continue;
        };
        if let DiscoveryPolicy::AllowList(ids) = policy {
            if !ids.iter().any(|id| id == match_id) {
                continue;
            }
        }

        let entry = grouped.entry(match_id.to_string()).or_default();
        let home = non_empty_str(row.get("home_team"));
        let away = non_empty_str(row.get("away_team"));
        if entry.home_team.is_none() {
            entry.home_team = home;
        }
        if entry.away_team.is_none() {
            entry.away_team = away;
        }
        entry.max_id = entry.max_id.max(row_id(row));
    }
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Fetch discovery rows from one table under the given policy, relaxing
/// filters stepwise when they yield nothing. Showing something beats strict
/// filter correctness here.
async fn fetch_table(
    client: &SupabaseClient,
    table: &str,
    policy: &DiscoveryPolicy,
) -> Result<Vec<Value>> {
    match policy {
        DiscoveryPolicy::AllowList(ids) => select_columns(client, table, |q| {
            q.in_list("match_id", ids)
        })
        .await,
        DiscoveryPolicy::Window { days, tag } => {
            let since = iso_days_ago(*days);

            if let Some(tag) = tag {
                let rows = select_columns(client, table, |q| {
                    q.gte("created_at", &since).eq("ai_prompt", tag)
                })
                .await?;
                if !rows.is_empty() {
                    return Ok(rows);
                }
                debug!(table, "window+tag query empty, relaxing tag filter");
            }

            let rows =
                select_columns(client, table, |q| q.gte("created_at", &since)).await?;
            if !rows.is_empty() {
                return Ok(rows);
            }
            debug!(table, "windowed query empty, relaxing time filter");

            select_columns(client, table, |q| q).await
        }
    }
}

/// Run a discovery select with the standard column set, falling back to a
/// bare `match_id, id` projection for tables that lack team-name columns
/// entirely (the moneyline table sometimes does).
async fn select_columns<F>(
    client: &SupabaseClient,
    table: &str,
    apply: F,
) -> Result<Vec<Value>>
where
    F: Fn(crate::backend::rest::SelectQuery<'_>) -> crate::backend::rest::SelectQuery<'_>,
{
    let full = apply(
        client
            .select(table)
            .columns("match_id,home_team,away_team,id")
            .limit(QUERY_ROW_LIMIT),
    )
    .fetch()
    .await;

    match full {
        Ok(rows) => Ok(rows),
        Err(e) => {
            debug!(table, "full column select failed ({e}), retrying id-only");
            apply(
                client
                    .select(table)
                    .columns("match_id,id")
                    .limit(QUERY_ROW_LIMIT),
            )
            .fetch()
            .await
        }
    }
}

/// RFC 3339 UTC timestamp for `days` ago, for the created_at window filter.
pub fn iso_days_ago(days: u64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    unix_secs_to_iso(now.saturating_sub(days * 86_400))
}

/// Unix seconds to `YYYY-MM-DDTHH:MM:SSZ` via the civil-from-days algorithm.
pub fn unix_secs_to_iso(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (hour, minute, second) = (rem / 3600, (rem / 60) % 60, rem % 60);

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };

    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketKind;
    use serde_json::json;

    #[test]
    fn discovery_covers_every_market_table_plus_fast_feed() {
        for kind in MarketKind::ALL {
            assert!(DISCOVERY_TABLES.contains(&kind.table()));
        }
        assert!(DISCOVERY_TABLES.contains(&"odds_fast_history"));
    }

    #[test]
    fn epoch_formats_correctly() {
        assert_eq!(unix_secs_to_iso(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn known_date_formats_correctly() {
        // 2022-01-01 is day 18993 since the epoch.
        assert_eq!(unix_secs_to_iso(18_993 * 86_400), "2022-01-01T00:00:00Z");
        assert_eq!(unix_secs_to_iso(18_993 * 86_400 + 3_725), "2022-01-01T01:02:05Z");
    }

    #[test]
    fn leap_day_formats_correctly() {
        // 2024-02-29 is day 19782 since the epoch.
        assert_eq!(unix_secs_to_iso(19_782 * 86_400), "2024-02-29T00:00:00Z");
    }

    fn allow(ids: &[&str]) -> DiscoveryPolicy {
        DiscoveryPolicy::AllowList(ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn merge_keeps_first_team_names() {
        let mut grouped = HashMap::new();
        let policy = allow(&["m1"]);

        merge_rows(
            &mut grouped,
            &[json!({ "match_id": "m1", "home_team": "Arsenal", "away_team": "Spurs", "id": 3 })],
            &policy,
        );
        // Later table with empty names must not overwrite.
        merge_rows(
            &mut grouped,
            &[json!({ "match_id": "m1", "home_team": "", "id": 9 })],
            &policy,
        );

        let d = grouped.get("m1").unwrap();
        assert_eq!(d.home_team.as_deref(), Some("Arsenal"));
        assert_eq!(d.away_team.as_deref(), Some("Spurs"));
        assert_eq!(d.max_id, 9);
    }

    #[test]
    fn merge_fills_names_from_later_table() {
        let mut grouped = HashMap::new();
        let policy = allow(&["m1"]);

        // First table only knows the id (no team columns at all).
        merge_rows(&mut grouped, &[json!({ "match_id": "m1", "id": 1 })], &policy);
        merge_rows(
            &mut grouped,
            &[json!({ "match_id": "m1", "home_team": "Lyon", "away_team": "Nice", "id": 2 })],
            &policy,
        );

        let d = grouped.get("m1").unwrap();
        assert_eq!(d.home_team.as_deref(), Some("Lyon"));
        assert_eq!(d.away_team.as_deref(), Some("Nice"));
    }

    #[test]
    fn allow_list_drops_unknown_ids() {
        let mut grouped = HashMap::new();
        let policy = allow(&["m1"]);
        merge_rows(
            &mut grouped,
            &[
                json!({ "match_id": "m1", "id": 1 }),
                json!({ "match_id": "intruder", "id": 2 }),
            ],
            &policy,
        );
        assert_eq!(grouped.len(), 1);
        assert!(grouped.contains_key("m1"));
    }

    #[test]
    fn one_aggregate_per_match_id() {
        let mut grouped = HashMap::new();
        let policy = DiscoveryPolicy::Window { days: 7, tag: None };
        merge_rows(
            &mut grouped,
            &[
                json!({ "match_id": "m1", "id": 5 }),
                json!({ "match_id": "m1", "id": 8 }),
                json!({ "match_id": "m2", "id": 6 }),
            ],
            &policy,
        );
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.get("m1").unwrap().max_id, 8);
    }
}
