use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use odds_radar::backend::{RealtimeManager, SupabaseClient};
use odds_radar::config::{Config, CHANNEL_CAPACITY};
use odds_radar::discovery::{discover_matches, DiscoveryPolicy};
use odds_radar::error::{AppError, Result};
use odds_radar::orchestrator::Orchestrator;
use odds_radar::signal::classify;
use odds_radar::state::BoardStore;
use odds_radar::types::{ControlMsg, MarketKind};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let client = Arc::new(SupabaseClient::new(&cfg)?);

    // --- Match discovery bootstrap ---
    let policy = DiscoveryPolicy::from_config(&cfg);
    let matches = discover_matches(&client, &policy).await?;
    for m in &matches {
        info!(match_id = %m.match_id, "discovered: {}", m.display_name());
    }
    let Some(selected) = matches.first().cloned() else {
        return Err(AppError::Backend("no matches discovered".to_string()));
    };
    info!(match_id = %selected.match_id, "mirroring {}", selected.display_name());

    // --- Board + orchestrator ---
    let board = BoardStore::new();
    board.set_fallback_teams(selected.home_team.clone(), selected.away_team.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&client),
        Arc::clone(&board),
        cfg.ai_prompt_tag.clone(),
    ));
    orchestrator.set_match(&selected.match_id);

    // --- Realtime invalidation channel ---
    let (notice_tx, mut notice_rx) = RealtimeManager::channel();
    let (control_tx, control_rx) = mpsc::channel::<ControlMsg>(CHANNEL_CAPACITY);
    if cfg.realtime {
        let manager = RealtimeManager::new(client.realtime_url(), notice_tx, control_rx);
        tokio::spawn(async move { manager.run().await });
        if let Err(e) = control_tx.send(ControlMsg::Watch(selected.match_id.clone())).await {
            warn!("failed to start realtime watch: {e}");
        }
    }
    // Held for process lifetime — dropping it shuts the realtime task down.
    let _control_tx = control_tx;

    // --- Poll loop ---
    let mut ticker = interval(Duration::from_secs(cfg.poll_interval_secs));
    let mut last_signals: HashMap<MarketKind, String> = HashMap::new();
    let mut notices_open = cfg.realtime;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Scheduled poll is a full refetch — invalidate, then fetch.
                orchestrator.refresh();
                orchestrator.fetch_all().await;
                log_signal_transitions(&board, &mut last_signals);
            }
            notice = notice_rx.recv(), if notices_open => {
                match notice {
                    Some(n) => {
                        orchestrator.apply_notice(&n);
                        orchestrator.fetch_all().await;
                        log_signal_transitions(&board, &mut last_signals);
                    }
                    None => {
                        // Realtime task gone; polling carries on alone.
                        notices_open = false;
                    }
                }
            }
        }
    }
}

/// Log each market's current signal whenever it changes.
fn log_signal_transitions(board: &Arc<BoardStore>, last: &mut HashMap<MarketKind, String>) {
    let info = board.match_info();
    for kind in MarketKind::ALL {
        if let Some(err) = board.error(kind) {
            warn!(market = %kind, "market errored: {err}");
        }
        let Some(current) = board.snapshot(kind).current else { continue };
        let previous = last.get(&kind);
        if previous.map(|s| s.as_str()) != Some(current.signal.as_str()) {
            let c = classify(&current.signal);
            info!(
                market = %kind,
                category = %c.category,
                clock = %current.clock,
                score = %info.score,
                "{} | {} | {}",
                kind.label(),
                current.signal,
                current.odds_summary(),
            );
            last.insert(kind, current.signal.clone());
        }
    }
}
