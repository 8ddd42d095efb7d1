use serde::Deserialize;
use serde_json::json;

use crate::types::MarketKind;

/// Channel topic for row-change notifications on one table scoped to one
/// match. Phoenix topics are opaque strings, so the raw table name goes in
/// unescaped — spaces included.
pub fn topic_for(kind: MarketKind, match_id: &str) -> String {
    format!("realtime:public:{}:match_id=eq.{match_id}", kind.table())
}

/// Reverse mapping from a source table name to its market kind.
pub fn kind_for_table(table: &str) -> Option<MarketKind> {
    MarketKind::ALL.into_iter().find(|k| k.table() == table)
}

pub fn build_join_msg(topic: &str, msg_ref: u64) -> String {
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

pub fn build_leave_msg(topic: &str, msg_ref: u64) -> String {
    json!({
        "topic": topic,
        "event": "phx_leave",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

pub fn build_heartbeat_msg(msg_ref: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

/// Raw deserializable shape of an inbound phoenix frame. Payload contents are
/// deliberately ignored for change events — notifications are invalidation
/// signals, never a data source.
#[derive(Debug, Deserialize)]
struct RawFrame {
    topic: Option<String>,
    event: Option<String>,
    payload: Option<serde_json::Value>,
}

/// Parsed inbound realtime frame.
#[derive(Debug, PartialEq, Eq)]
pub enum RealtimeFrame {
    /// A row changed in a watched table. `match_id` is the equality-filter
    /// value from the topic, when present.
    Change { kind: MarketKind, match_id: Option<String> },
    /// Reply to a join/leave, ok or error.
    Reply { topic: String, ok: bool },
    /// Heartbeat replies and anything else we don't act on.
    Ignored,
}

/// Parse one inbound WS text frame. Unknown shapes are `Ignored`, never an
/// error — the realtime stream is best-effort.
pub fn parse_realtime_frame(raw: &str) -> RealtimeFrame {
    let frame: RawFrame = match serde_json::from_str(raw) {
        Ok(f) => f,
        Err(_) => return RealtimeFrame::Ignored,
    };

    let topic = frame.topic.unwrap_or_default();
    match frame.event.as_deref() {
        Some("INSERT") | Some("UPDATE") | Some("DELETE") => {
            let Some((table, match_id)) = split_topic(&topic) else {
                return RealtimeFrame::Ignored;
            };
            match kind_for_table(table) {
                Some(kind) => RealtimeFrame::Change { kind, match_id },
                None => RealtimeFrame::Ignored,
            }
        }
        Some("phx_reply") => {
            let ok = frame
                .payload
                .as_ref()
                .and_then(|p| p.get("status"))
                .and_then(|s| s.as_str())
                == Some("ok");
            if topic == "phoenix" {
                RealtimeFrame::Ignored
            } else {
                RealtimeFrame::Reply { topic, ok }
            }
        }
        _ => RealtimeFrame::Ignored,
    }
}

/// Split `realtime:public:<table>[:<col>=eq.<value>]` into the table name and
/// the optional equality-filter value. The table name itself may contain
/// anything except the `:` that starts a filter segment, so the filter is
/// recognized by its `=eq.` marker in the final segment.
fn split_topic(topic: &str) -> Option<(&str, Option<String>)> {
    let rest = topic.strip_prefix("realtime:public:")?;
    match rest.rsplit_once(':') {
        Some((table, filter)) if filter.contains("=eq.") => {
            let value = filter.split_once("=eq.").map(|(_, v)| v.to_string());
            Some((table, value))
        }
        _ => Some((rest, None)),
    }
}
