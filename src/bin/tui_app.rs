use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use odds_radar::backend::{RealtimeManager, SupabaseClient};
use odds_radar::config::{Config, CHANNEL_CAPACITY};
use odds_radar::discovery::{discover_matches, DiscoveryPolicy};
use odds_radar::error::Result;
use odds_radar::orchestrator::Orchestrator;
use odds_radar::state::BoardStore;
use odds_radar::types::{ChangeNotice, ControlMsg, MarketKind, MatchSummary};

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Error(String),
}

/// Dashboard state: discovered matches, the active selection and tab, and
/// handles into the shared board/orchestrator/realtime plumbing.
pub struct AppState {
    pub matches: Vec<MatchSummary>,
    pub selected: usize,
    pub active_tab: MarketKind,
    pub status: ConnectionStatus,
    /// Terse indicator when discovery itself failed.
    pub discovery_error: Option<String>,
    pub board: Arc<BoardStore>,
    pub orchestrator: Arc<Orchestrator>,
    control_tx: Option<mpsc::Sender<ControlMsg>>,
    pub notice_rx: mpsc::Receiver<ChangeNotice>,
}

impl AppState {
    /// Wire up the full stack: backend client, discovery, orchestrator and
    /// (when enabled) the realtime manager task.
    pub async fn bootstrap(cfg: &Config) -> Result<Self> {
        let client = Arc::new(SupabaseClient::new(cfg)?);

        let policy = DiscoveryPolicy::from_config(cfg);
        let (matches, discovery_error) = match discover_matches(&client, &policy).await {
            Ok(m) => (m, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        let board = BoardStore::new();
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&client),
            Arc::clone(&board),
            cfg.ai_prompt_tag.clone(),
        ));

        let (notice_tx, notice_rx) = RealtimeManager::channel();
        let control_tx = if cfg.realtime {
            let (control_tx, control_rx) = mpsc::channel::<ControlMsg>(CHANNEL_CAPACITY);
            let manager = RealtimeManager::new(client.realtime_url(), notice_tx, control_rx);
            tokio::spawn(async move { manager.run().await });
            Some(control_tx)
        } else {
            None
        };

        let mut app = Self {
            matches,
            selected: 0,
            active_tab: MarketKind::Handicap,
            status: ConnectionStatus::Connecting,
            discovery_error,
            board,
            orchestrator,
            control_tx,
            notice_rx,
        };

        if !app.matches.is_empty() {
            app.activate_selected().await;
        }
        Ok(app)
    }

    /// Point everything at the currently selected match and fetch.
    pub async fn activate_selected(&mut self) {
        let Some(summary) = self.matches.get(self.selected).cloned() else {
            return;
        };
        self.board
            .set_fallback_teams(summary.home_team.clone(), summary.away_team.clone());
        self.orchestrator.set_match(&summary.match_id);
        if let Some(tx) = &self.control_tx {
            if let Err(e) = tx.send(ControlMsg::Watch(summary.match_id.clone())).await {
                warn!("realtime watch failed: {e}");
            }
        }
        self.fetch().await;
    }

    /// Refetch the active match (poll tick and the `r` key).
    pub async fn refresh(&mut self) {
        self.orchestrator.refresh();
        self.fetch().await;
    }

    /// Apply a realtime invalidation and refetch.
    pub async fn apply_notice(&mut self, notice: ChangeNotice) {
        self.orchestrator.apply_notice(&notice);
        self.fetch().await;
    }

    async fn fetch(&mut self) {
        self.orchestrator.fetch_all().await;
        // Connected iff at least one market landed cleanly this round.
        let any_ok = MarketKind::ALL
            .into_iter()
            .any(|k| self.board.error(k).is_none());
        self.status = if any_ok {
            ConnectionStatus::Connected
        } else {
            let e = MarketKind::ALL
                .into_iter()
                .find_map(|k| self.board.error(k))
                .unwrap_or_else(|| "all markets failed".to_string());
            ConnectionStatus::Error(e)
        };
    }

    pub fn select_next(&mut self) -> bool {
        let max = self.matches.len().saturating_sub(1);
        let next = (self.selected + 1).min(max);
        let changed = next != self.selected;
        self.selected = next;
        changed
    }

    pub fn select_prev(&mut self) -> bool {
        let prev = self.selected.saturating_sub(1);
        let changed = prev != self.selected;
        self.selected = prev;
        changed
    }

    pub fn next_tab(&mut self) {
        self.active_tab = match self.active_tab {
            MarketKind::Handicap => MarketKind::OverUnder,
            MarketKind::OverUnder => MarketKind::Moneyline,
            MarketKind::Moneyline => MarketKind::Handicap,
        };
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// Compact clock cell: empty clocks render as a dash.
pub fn format_clock(clock: &str) -> String {
    if clock.is_empty() {
        "—".to_string()
    } else {
        clock.to_string()
    }
}

fn main() {
    // Shared state module for the TUI — entry point lives in src/bin/tui.rs
}
