use crate::error::{AppError, Result};

/// Poll interval for the three market tables (seconds).
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Realtime heartbeat interval (seconds) — phoenix channels drop silent clients.
pub const REALTIME_HEARTBEAT_SECS: u64 = 30;

/// Reconnect backoff values in milliseconds.
pub const RECONNECT_BACKOFF_MS: &[u64] = &[100, 200, 400, 800];

/// Channel capacity for internal message routing.
pub const CHANNEL_CAPACITY: usize = 256;

/// Row cap per table query — snapshots per match stay far below this.
pub const QUERY_ROW_LIMIT: usize = 500;

/// Trailing discovery window when no allow-list is configured (days).
pub const DEFAULT_DISCOVERY_WINDOW_DAYS: u64 = 7;

#[derive(Debug, Clone)]
pub struct Config {
    /// Supabase project base URL (SUPABASE_URL), e.g. https://xyz.supabase.co
    pub supabase_url: String,
    /// Anon API key (SUPABASE_ANON_KEY) — sent as both apikey and bearer token.
    pub supabase_anon_key: String,
    pub log_level: String,
    /// Poll interval override (POLL_INTERVAL_SECS).
    pub poll_interval_secs: u64,
    /// Fixed match allow-list (MATCH_IDS, comma-separated). Empty → windowed discovery.
    pub match_ids: Vec<String>,
    /// Trailing window for open discovery (DISCOVERY_WINDOW_DAYS).
    pub discovery_window_days: u64,
    /// Optional ai_prompt tag filter (AI_PROMPT_TAG) — selects one upstream run's rows.
    pub ai_prompt_tag: Option<String>,
    /// Whether to hold a realtime subscription alongside polling (REALTIME=0 disables).
    pub realtime: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // The two credentials are the only hard requirements — fail fast, no fallback.
        let supabase_url = std::env::var("SUPABASE_URL")
            .map_err(|_| AppError::Config("SUPABASE_URL is not set".to_string()))?;
        let supabase_anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| AppError::Config("SUPABASE_ANON_KEY is not set".to_string()))?;
        if supabase_url.trim().is_empty() || supabase_anon_key.trim().is_empty() {
            return Err(AppError::Config(
                "SUPABASE_URL and SUPABASE_ANON_KEY must be non-empty".to_string(),
            ));
        }

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .unwrap_or_default()
                .parse::<u64>()
                .unwrap_or(POLL_INTERVAL_SECS),
            match_ids: std::env::var("MATCH_IDS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            discovery_window_days: std::env::var("DISCOVERY_WINDOW_DAYS")
                .unwrap_or_default()
                .parse::<u64>()
                .unwrap_or(DEFAULT_DISCOVERY_WINDOW_DAYS),
            ai_prompt_tag: std::env::var("AI_PROMPT_TAG")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            realtime: std::env::var("REALTIME")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        })
    }
}
