use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::backend::messages::{
    build_heartbeat_msg, build_join_msg, build_leave_msg, parse_realtime_frame, topic_for,
    RealtimeFrame,
};
use crate::config::{CHANNEL_CAPACITY, REALTIME_HEARTBEAT_SECS, RECONNECT_BACKOFF_MS};
use crate::error::Result;
use crate::types::{ChangeNotice, ControlMsg, MarketKind};

/// Manages the single persistent WebSocket connection to the backend's
/// realtime endpoint. Watches at most one match at a time: three topics, one
/// per market table, all scoped by `match_id=eq.<id>`.
///
/// Notifications are treated strictly as edge-triggered invalidation signals;
/// payloads are never inspected for row data. Switching the watched match
/// leaves the old topics before joining the new ones so no subscription
/// outlives its match.
pub struct RealtimeManager {
    ws_url: String,
    notice_tx: mpsc::Sender<ChangeNotice>,
    control_rx: mpsc::Receiver<ControlMsg>,
    watched: Option<String>,
    msg_ref: u64,
}

impl RealtimeManager {
    pub fn new(
        ws_url: String,
        notice_tx: mpsc::Sender<ChangeNotice>,
        control_rx: mpsc::Receiver<ControlMsg>,
    ) -> Self {
        Self {
            ws_url,
            notice_tx,
            control_rx,
            watched: None,
            msg_ref: 0,
        }
    }

    pub fn channel() -> (mpsc::Sender<ChangeNotice>, mpsc::Receiver<ChangeNotice>) {
        mpsc::channel(CHANNEL_CAPACITY)
    }

    pub async fn run(mut self) {
        let mut backoff_idx = 0usize;

        loop {
            info!("realtime connecting");
            match self.connect_once().await {
                Ok(keep_running) => {
                    if !keep_running {
                        info!("realtime control channel closed, shutting down");
                        return;
                    }
                    info!("realtime connection closed cleanly");
                    backoff_idx = 0;
                }
                Err(e) => {
                    warn!("realtime connection error: {e}");
                }
            }

            let delay_ms = RECONNECT_BACKOFF_MS
                .get(backoff_idx)
                .copied()
                .unwrap_or(*RECONNECT_BACKOFF_MS.last().unwrap());
            backoff_idx = (backoff_idx + 1).min(RECONNECT_BACKOFF_MS.len() - 1);

            debug!("realtime reconnecting in {delay_ms}ms");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    fn next_ref(&mut self) -> u64 {
        self.msg_ref += 1;
        self.msg_ref
    }

    /// Returns Ok(false) when the control channel closed — a clean shutdown,
    /// the outer loop must not reconnect.
    async fn connect_once(&mut self) -> Result<bool> {
        use tokio_tungstenite::{connect_async, tungstenite::Message};

        let (ws_stream, _) = connect_async(&self.ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Re-join topics for the match we were watching before the reconnect.
        if let Some(match_id) = self.watched.clone() {
            for kind in MarketKind::ALL {
                let msg_ref = self.next_ref();
                let join = build_join_msg(&topic_for(kind, &match_id), msg_ref);
                write.send(Message::Text(join.into())).await?;
            }
            info!(match_id = %match_id, "realtime joined 3 table topics");
        }

        let mut heartbeat = interval(Duration::from_secs(REALTIME_HEARTBEAT_SECS));
        heartbeat.tick().await; // consume immediate first tick

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(true);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(_)) => {}
                    }
                }

                _ = heartbeat.tick() => {
                    let msg_ref = self.next_ref();
                    write.send(Message::Text(build_heartbeat_msg(msg_ref).into())).await?;
                }

                ctrl = self.control_rx.recv() => {
                    match ctrl {
                        Some(ControlMsg::Watch(match_id)) => {
                            // Leave first — a stale topic must never keep
                            // delivering notices for the previous match.
                            if let Some(old) = self.watched.take() {
                                if old != match_id {
                                    for kind in MarketKind::ALL {
                                        let msg_ref = self.next_ref();
                                        let leave = build_leave_msg(&topic_for(kind, &old), msg_ref);
                                        write.send(Message::Text(leave.into())).await?;
                                    }
                                    debug!(match_id = %old, "realtime left old topics");
                                }
                            }
                            for kind in MarketKind::ALL {
                                let msg_ref = self.next_ref();
                                let join = build_join_msg(&topic_for(kind, &match_id), msg_ref);
                                write.send(Message::Text(join.into())).await?;
                            }
                            info!(match_id = %match_id, "realtime watching");
                            self.watched = Some(match_id);
                        }
                        None => {
                            return Ok(false);
                        }
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match parse_realtime_frame(text) {
            RealtimeFrame::Change { kind, match_id } => {
                // Topic filters already scope to the watched match; the
                // embedded match_id is a consistency check, not a trust source.
                let watched = match (&self.watched, match_id) {
                    (Some(w), Some(m)) if *w != m => {
                        debug!(got = %m, want = %w, "realtime notice for stale match, dropped");
                        return;
                    }
                    (Some(w), _) => w.clone(),
                    (None, _) => return,
                };

                let notice = ChangeNotice { kind, match_id: watched };
                if let Err(e) = self.notice_tx.try_send(notice) {
                    warn!("notice channel full, dropping invalidation: {e}");
                }
            }
            RealtimeFrame::Reply { topic, ok } => {
                if ok {
                    debug!(topic = %topic, "realtime join ok");
                } else {
                    warn!(topic = %topic, "realtime join rejected");
                }
            }
            RealtimeFrame::Ignored => {}
        }
    }
}
