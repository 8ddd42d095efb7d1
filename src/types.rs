use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market kinds
// ---------------------------------------------------------------------------

/// The three market tabs mirrored from the backend. Each maps to one source
/// table; the moneyline table carries an embedded space in its name and must
/// always be escaped, never spliced raw into a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Handicap,
    OverUnder,
    Moneyline,
}

impl MarketKind {
    pub const ALL: [MarketKind; 3] =
        [MarketKind::Handicap, MarketKind::OverUnder, MarketKind::Moneyline];

    /// Source table name — opaque string, may contain spaces.
    pub fn table(self) -> &'static str {
        match self {
            MarketKind::Handicap => "handicap",
            MarketKind::OverUnder => "total_points",
            MarketKind::Moneyline => "moneyline 1x2",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MarketKind::Handicap => "Handicap",
            MarketKind::OverUnder => "Over/Under",
            MarketKind::Moneyline => "1X2",
        }
    }
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketKind::Handicap => "handicap",
            MarketKind::OverUnder => "overunder",
            MarketKind::Moneyline => "moneyline",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Canonical market rows
// ---------------------------------------------------------------------------

/// Market-specific price fields after column-candidate resolution.
/// All values are kept as text — the backend stores them as text and the
/// dashboard never does arithmetic on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MarketPrices {
    Handicap { line: String, home: String, away: String },
    OverUnder { line: String, over: String, under: String },
    Moneyline { home: String, draw: String, away: String },
}

impl MarketPrices {
    pub fn kind(&self) -> MarketKind {
        match self {
            MarketPrices::Handicap { .. } => MarketKind::Handicap,
            MarketPrices::OverUnder { .. } => MarketKind::OverUnder,
            MarketPrices::Moneyline { .. } => MarketKind::Moneyline,
        }
    }
}

/// One normalized market snapshot row. Immutable once fetched; replaced
/// wholesale on refetch. Missing source columns degrade to empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketRow {
    /// Backend row id — the ordering key. 0 when the source row had none.
    pub id: i64,
    pub match_id: String,
    /// Match-minute text, e.g. "73'" — display only, not used for ordering.
    pub clock: String,
    pub score: String,
    /// Free-text, emoji-prefixed recommendation string.
    pub signal: String,
    /// Recommended bet sizing, passed through unmodified.
    pub staking_plan: String,
    pub home_team: String,
    pub away_team: String,
    pub created_at: String,
    pub ai_prompt: String,
    pub prices: MarketPrices,
}

impl MarketRow {
    pub fn kind(&self) -> MarketKind {
        self.prices.kind()
    }

    /// Display summary for history entries, literal per-market templates.
    pub fn odds_summary(&self) -> String {
        match &self.prices {
            MarketPrices::Handicap { line, home, away } => {
                format!("Line {line} | Home {home} Away {away}")
            }
            MarketPrices::OverUnder { line, over, under } => {
                format!("Line {line} | Over {over} Under {under}")
            }
            MarketPrices::Moneyline { home, draw, away } => {
                format!("Home {home} | Draw {draw} | Away {away}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Match summaries
// ---------------------------------------------------------------------------

/// One discovered match: an identifier plus best-known team names, merged
/// across all source tables (first non-empty pair wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub match_id: String,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
}

impl MatchSummary {
    pub fn display_name(&self) -> String {
        match (&self.home_team, &self.away_team) {
            (Some(h), Some(a)) => format!("{h} vs {a}"),
            _ => self.match_id.clone(),
        }
    }
}

/// Header-line facts derived from the latest row of any market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    pub home_team: String,
    pub away_team: String,
    pub clock: String,
    pub score: String,
}

// ---------------------------------------------------------------------------
// Signal taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalCategory {
    Entry,
    Fire,
    Wait,
    Hold,
    None,
}

impl std::fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalCategory::Entry => "entry",
            SignalCategory::Fire => "fire",
            SignalCategory::Wait => "wait",
            SignalCategory::Hold => "hold",
            SignalCategory::None => "none",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Channel message types
// ---------------------------------------------------------------------------

/// Edge-triggered invalidation signal routed from the realtime manager to the
/// poll loop. Carries no row data — a notice means "refetch", nothing more.
#[derive(Debug, Clone)]
pub struct ChangeNotice {
    pub kind: MarketKind,
    pub match_id: String,
}

/// Control messages for the realtime manager's subscription lifecycle.
#[derive(Debug)]
pub enum ControlMsg {
    /// Replace the watched match: leave old topics, join new ones.
    Watch(String),
}
