//! Change feed over the Realtime Phoenix-channel WebSocket
//!
//! Every subscription owns one socket and one pump task. The join is
//! acknowledged before `subscribe` returns; dropping the [`Subscription`]
//! aborts the task, which closes the socket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::SupabaseBackend;
use crate::error::{Result, ZestyError};
use crate::models::Table;
use crate::realtime::{ChangeEvent, ChangeFeed, ChangeKind, Subscription, SUBSCRIPTION_BUFFER};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// One Phoenix frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixFrame {
    #[must_use]
    pub fn join(table: Table, access_token: Option<&str>, reference: u64) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": table.name() }
                ],
            },
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }
        Self {
            topic: topic(table),
            event: "phx_join".to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    #[must_use]
    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// Status of a `phx_reply`, if this is one
    #[must_use]
    pub fn reply_status(&self) -> Option<&str> {
        if self.event != "phx_reply" {
            return None;
        }
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Decode a `postgres_changes` payload into a change event
    #[must_use]
    pub fn change_event(&self, table: Table) -> Option<ChangeEvent> {
        if self.event != "postgres_changes" {
            return None;
        }
        let data = self.payload.get("data")?;
        let kind: ChangeKind = serde_json::from_value(data.get("type")?.clone()).ok()?;
        let record_id = ["record", "old_record"]
            .iter()
            .filter_map(|key| data.get(*key)?.get("id"))
            .find_map(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            });
        Some(ChangeEvent { table, kind, record_id })
    }
}

#[must_use]
pub fn topic(table: Table) -> String {
    format!("realtime:public:{}", table.name())
}

async fn send_frame(socket: &mut Socket, frame: &PhoenixFrame) -> Result<()> {
    socket.send(WsMessage::Text(serde_json::to_string(frame)?)).await?;
    Ok(())
}

fn parse(message: &WsMessage) -> Option<PhoenixFrame> {
    match message {
        WsMessage::Text(text) => serde_json::from_str(text).ok(),
        WsMessage::Binary(bytes) => serde_json::from_slice(bytes).ok(),
        _ => None,
    }
}

/// Read frames until the join reply for `reference` arrives
async fn await_join(socket: &mut Socket, topic: &str, reference: &str) -> Result<()> {
    while let Some(message) = socket.next().await {
        let Some(frame) = parse(&message?) else { continue };
        if frame.topic != topic || frame.reference.as_deref() != Some(reference) {
            continue;
        }
        return match frame.reply_status() {
            Some("ok") => Ok(()),
            Some(status) => Err(ZestyError::Realtime(format!("join {topic} answered {status}: {}", frame.payload))),
            None => continue,
        };
    }
    Err(ZestyError::Realtime(format!("socket closed before {topic} was joined")))
}

#[async_trait]
impl ChangeFeed for SupabaseBackend {
    async fn subscribe(&self, table: Table) -> Result<Subscription> {
        let url = self.client.realtime_url()?;
        let limit = self.realtime_timeout;
        let (mut socket, _) = timeout(limit, connect_async(url.as_str()))
            .await
            .map_err(|_| ZestyError::Timeout(limit))??;

        let join = PhoenixFrame::join(table, self.client.access_token().as_deref(), 1);
        send_frame(&mut socket, &join).await?;
        let reference = join.reference.clone().unwrap_or_default();
        timeout(limit, await_join(&mut socket, &join.topic, &reference))
            .await
            .map_err(|_| ZestyError::Timeout(limit))??;
        info!(%table, "Joined realtime channel");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let pump = tokio::spawn(pump(socket, table, tx));
        Ok(Subscription::new(table, rx, move || pump.abort()))
    }
}

/// Forward change frames until the socket or the receiver goes away
async fn pump(mut socket: Socket, table: Table, events: mpsc::Sender<ChangeEvent>) {
    let topic = topic(table);
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    let mut reference: u64 = 1;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                reference += 1;
                if let Err(e) = send_frame(&mut socket, &PhoenixFrame::heartbeat(reference)).await {
                    warn!(%table, error = %e, "Heartbeat failed");
                    break;
                }
            },
            () = events.closed() => break,
            message = socket.next() => match message {
                Some(Ok(WsMessage::Ping(data))) => {
                    if socket.send(WsMessage::Pong(data)).await.is_err() {
                        break;
                    }
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(%table, ?frame, "Realtime socket closed by server");
                    break;
                },
                Some(Ok(message)) => {
                    let Some(frame) = parse(&message) else { continue };
                    if frame.topic != topic {
                        continue;
                    }
                    if frame.event == "phx_error" || frame.event == "phx_close" {
                        warn!(%table, event = %frame.event, "Realtime channel dropped");
                        break;
                    }
                    if let Some(event) = frame.change_event(table) {
                        debug!(%table, kind = ?event.kind, "Change received");
                        if let Err(mpsc::error::TrySendError::Closed(_)) = events.try_send(event) {
                            break;
                        }
                    }
                },
                Some(Err(e)) => {
                    warn!(%table, error = %e, "Realtime socket error");
                    break;
                },
                None => break,
            },
        }
    }
    let _ = socket.close(None).await;
}
