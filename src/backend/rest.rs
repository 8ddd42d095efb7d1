use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Thin PostgREST client. Holds the pooled HTTP client plus the two
/// process-wide credentials; every query goes through `select()`.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.supabase_url.clone(),
            anon_key: cfg.supabase_anon_key.clone(),
        })
    }

    /// Start a select query against one logical table. The table name is an
    /// opaque string — embedded spaces are legal and get percent-encoded.
    pub fn select<'a>(&'a self, table: &str) -> SelectQuery<'a> {
        SelectQuery {
            client: self,
            table: table.to_string(),
            params: vec![("select".to_string(), "*".to_string())],
        }
    }

    /// Realtime WebSocket endpoint derived from the REST base URL.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0", self.anon_key)
    }
}

/// Builder for one PostgREST select. Filters compose as query parameters in
/// PostgREST's `column=op.value` form.
pub struct SelectQuery<'a> {
    client: &'a SupabaseClient,
    table: String,
    params: Vec<(String, String)>,
}

impl<'a> SelectQuery<'a> {
    pub fn columns(mut self, cols: &str) -> Self {
        self.params[0].1 = cols.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.params.push((column.to_string(), format!("eq.{value}")));
        self
    }

    pub fn in_list(mut self, column: &str, values: &[String]) -> Self {
        self.params.push((column.to_string(), format!("in.({})", values.join(","))));
        self
    }

    pub fn gte(mut self, column: &str, value: &str) -> Self {
        self.params.push((column.to_string(), format!("gte.{value}")));
        self
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.params.push(("order".to_string(), format!("{column}.asc")));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.params.push(("limit".to_string(), n.to_string()));
        self
    }

    #[cfg(test)]
    pub(crate) fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Execute the query. Non-2xx responses become `AppError::Backend` with
    /// the status and a body snippet; the response body must be a JSON array.
    pub async fn fetch(self) -> Result<Vec<Value>> {
        let url = format!(
            "{}/rest/v1/{}",
            self.client.base_url,
            encode_table(&self.table)
        );
        debug!(table = %self.table, "PostgREST select");

        let resp = self
            .client
            .http
            .get(&url)
            .query(&self.params)
            .header("apikey", &self.client.anon_key)
            .header("Authorization", format!("Bearer {}", self.client.anon_key))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Backend(format!(
                "{} query failed: {status} {}",
                self.table,
                body_snippet(&body)
            )));
        }

        let rows: Value = resp.json().await?;
        match rows {
            Value::Array(a) => Ok(a),
            _ => Err(AppError::Backend(format!(
                "{} response was not an array",
                self.table
            ))),
        }
    }
}

/// First 200 chars of an error body for log context. Char-based, not byte —
/// backend error text is frequently multibyte.
fn body_snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Percent-encode a table name for the URL path. Table names are trusted
/// identifiers apart from embedded spaces and the occasional reserved byte,
/// so only non-unreserved ASCII gets escaped.
pub fn encode_table(table: &str) -> String {
    let mut out = String::with_capacity(table.len());
    for byte in table.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_table_names_pass_through() {
        assert_eq!(encode_table("handicap"), "handicap");
        assert_eq!(encode_table("total_points"), "total_points");
    }

    #[test]
    fn embedded_space_is_escaped() {
        assert_eq!(encode_table("moneyline 1x2"), "moneyline%201x2");
    }

    #[test]
    fn reserved_bytes_are_escaped() {
        assert_eq!(encode_table("a/b?c"), "a%2Fb%3Fc");
    }

    #[test]
    fn body_snippet_cuts_on_char_boundaries() {
        // 199 ASCII bytes followed by multibyte text: byte 200 lands inside
        // the first CJK char, which a byte slice would panic on.
        let body = format!("{}你好", "x".repeat(199));
        let snippet = body_snippet(&body);
        assert_eq!(snippet.chars().count(), 200);
        assert!(snippet.ends_with('你'));

        assert_eq!(body_snippet("short"), "short");
        assert_eq!(body_snippet(""), "");
    }
}
