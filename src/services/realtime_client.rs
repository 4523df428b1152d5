//! Realtime (Phoenix channel) client for the bookmarks change feed.
//!
//! One spawned task per subscription owns the websocket. It joins
//! `realtime:<channel>` with a `postgres_changes` filter for the owner, keeps
//! the socket alive with heartbeats, forwards the newest access token when the
//! session refreshes, and decodes change frames into [`ChangeEvent`]s. When
//! the socket drops it reconnects with exponential backoff; the consumer is
//! told through [`FeedStatus`] messages. Closing the subscription makes the
//! task leave the channel and exit.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::backend::ChangeSubscription;
use crate::types::bookmark::Bookmark;
use crate::types::change::{ChangeEvent, FeedMessage, FeedStatus};
use crate::types::errors::RealtimeError;
use crate::types::settings::{RealtimeSettings, ReconnectPolicy};

/// Phoenix serializer version spoken by this client.
const PROTOCOL_VSN: &str = "1.0.0";

/// Builds the websocket endpoint from the project URL.
pub fn websocket_url(base_url: &str, anon_key: &str) -> Result<String, RealtimeError> {
    let mut url = Url::parse(&format!(
        "{}/realtime/v1/websocket",
        base_url.trim_end_matches('/')
    ))
    .map_err(|e| RealtimeError::ConnectionFailed(format!("invalid backend url: {}", e)))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(RealtimeError::ConnectionFailed(format!(
                "unsupported scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| RealtimeError::ConnectionFailed("cannot switch to websocket scheme".to_string()))?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VSN);
    Ok(url.to_string())
}

/// Static description of the channel a subscription joins.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub channel: String,
    pub schema: String,
    pub table: String,
    pub heartbeat: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ChannelConfig {
    pub fn new(url: String, settings: &RealtimeSettings) -> Self {
        Self {
            url,
            channel: settings.channel.clone(),
            schema: settings.schema.clone(),
            table: settings.table.clone(),
            heartbeat: Duration::from_secs(settings.heartbeat_secs.max(1)),
            reconnect: settings.reconnect.clone(),
        }
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}", self.channel)
    }

    /// `phx_join` frame subscribing to every change of `owner`'s rows.
    pub fn join_frame(&self, owner: &str, access_token: &str, reference: &str) -> Value {
        json!({
            "topic": self.topic(),
            "event": "phx_join",
            "payload": {
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": "*",
                        "schema": self.schema,
                        "table": self.table,
                        "filter": format!("user_id=eq.{}", owner),
                    }],
                    "private": false,
                },
                "access_token": access_token,
            },
            "ref": reference,
            "join_ref": reference,
        })
    }

    pub fn leave_frame(&self, reference: &str) -> Value {
        json!({ "topic": self.topic(), "event": "phx_leave", "payload": {}, "ref": reference })
    }

    pub fn access_token_frame(&self, access_token: &str, reference: &str) -> Value {
        json!({
            "topic": self.topic(),
            "event": "access_token",
            "payload": { "access_token": access_token },
            "ref": reference,
        })
    }
}

pub fn heartbeat_frame(reference: &str) -> Value {
    json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": reference })
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Reply to one of our pushes (`ref` identifies which).
    Reply { reference: Option<String>, ok: bool, reason: String },
    Change(ChangeEvent),
    /// The server closed or errored the channel.
    ChannelDown(String),
    /// Anything this client does not act on (heartbeat replies, presence, ...).
    Ignored,
}

/// Decodes one text frame addressed to `topic` (or the `phoenix` topic).
pub fn decode_frame(text: &str, topic: &str) -> Result<Frame, RealtimeError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| RealtimeError::ProtocolError(e.to_string()))?;
    if raw.topic != topic {
        return Ok(Frame::Ignored);
    }

    match raw.event.as_str() {
        "phx_reply" => {
            let ok = raw.payload.get("status").and_then(Value::as_str) == Some("ok");
            let reason = raw
                .payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(Frame::Reply {
                reference: raw.reference,
                ok,
                reason,
            })
        }
        "postgres_changes" => decode_change(&raw.payload).map(Frame::Change),
        "system" => {
            if raw.payload.get("status").and_then(Value::as_str) == Some("error") {
                let message = raw
                    .payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("system error")
                    .to_string();
                Ok(Frame::ChannelDown(message))
            } else {
                Ok(Frame::Ignored)
            }
        }
        "phx_error" => Ok(Frame::ChannelDown("channel error".to_string())),
        "phx_close" => Ok(Frame::ChannelDown("channel closed by server".to_string())),
        _ => Ok(Frame::Ignored),
    }
}

fn decode_change(payload: &Value) -> Result<ChangeEvent, RealtimeError> {
    let data = payload
        .get("data")
        .ok_or_else(|| RealtimeError::ProtocolError("change without data".to_string()))?;
    let kind = data.get("type").and_then(Value::as_str).unwrap_or_default();

    let record = |field: &str| -> Result<Bookmark, RealtimeError> {
        let value = data
            .get(field)
            .cloned()
            .ok_or_else(|| RealtimeError::ProtocolError(format!("change without {}", field)))?;
        serde_json::from_value(value).map_err(|e| RealtimeError::ProtocolError(e.to_string()))
    };

    match kind {
        "INSERT" => Ok(ChangeEvent::Insert(record("record")?)),
        "UPDATE" => Ok(ChangeEvent::Update(record("record")?)),
        "DELETE" => {
            let id = data
                .pointer("/old_record/id")
                .and_then(Value::as_str)
                .ok_or_else(|| RealtimeError::ProtocolError("delete without old id".to_string()))?;
            Ok(ChangeEvent::Delete { id: id.to_string() })
        }
        other => Err(RealtimeError::ProtocolError(format!(
            "unknown change type: {}",
            other
        ))),
    }
}

/// Monotonic message references.
#[derive(Default)]
struct RefCounter(u64);

impl RefCounter {
    fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}

/// How a single connection ended.
enum Exit {
    /// The consumer closed the subscription or the session went away.
    Stopped,
    /// The socket or channel failed.
    Dropped { error: RealtimeError, joined: bool },
}

/// Spawns subscriptions against one realtime endpoint.
pub struct RealtimeClient {
    config: ChannelConfig,
}

impl RealtimeClient {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Starts a feed for `owner`. Requires a runtime; returns immediately.
    pub fn subscribe(&self, owner: &str, tokens: watch::Receiver<Option<String>>) -> ChangeSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = self.config.clone();
        let task_owner = owner.to_string();
        tokio::spawn(async move {
            run_channel(config, task_owner, tx, tokens).await;
        });
        ChangeSubscription::new(owner, rx)
    }
}

async fn run_channel(
    config: ChannelConfig,
    owner: String,
    tx: mpsc::UnboundedSender<FeedMessage>,
    mut tokens: watch::Receiver<Option<String>>,
) {
    let mut attempt: u32 = 0;
    loop {
        let token = tokens.borrow_and_update().clone();
        let Some(token) = token else {
            tracing::info!(%owner, "no session, change feed stopped");
            let _ = tx.send(FeedMessage::Status(FeedStatus::Closed));
            return;
        };

        let (error, joined) = match run_connection(&config, &owner, &token, &tx, &mut tokens).await {
            Exit::Stopped => {
                tracing::debug!(%owner, "change feed closed");
                return;
            }
            Exit::Dropped { error, joined } => (error, joined),
        };

        attempt = if joined { 1 } else { attempt + 1 };
        if !config.reconnect.allows(attempt) {
            tracing::error!(%owner, %error, attempt, "change feed gave up");
            let _ = tx.send(FeedMessage::Status(FeedStatus::Closed));
            return;
        }
        let delay_ms = config.reconnect.delay_for(attempt);
        tracing::warn!(%owner, %error, attempt, delay_ms, "change feed dropped, reconnecting");
        if tx
            .send(FeedMessage::Status(FeedStatus::Reconnecting { attempt, delay_ms }))
            .is_err()
        {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            _ = tx.closed() => return,
        }
    }
}

async fn run_connection(
    config: &ChannelConfig,
    owner: &str,
    token: &str,
    tx: &mpsc::UnboundedSender<FeedMessage>,
    tokens: &mut watch::Receiver<Option<String>>,
) -> Exit {
    let dropped = |error: RealtimeError, joined: bool| Exit::Dropped { error, joined };

    let (socket, _) = match connect_async(config.url.as_str()).await {
        Ok(pair) => pair,
        Err(e) => return dropped(RealtimeError::ConnectionFailed(e.to_string()), false),
    };
    let (mut sink, mut stream) = socket.split();
    let topic = config.topic();
    let mut refs = RefCounter::default();
    let join_ref = refs.next();
    let mut joined = false;

    let join = config.join_frame(owner, token, &join_ref);
    if let Err(e) = sink.send(Message::Text(join.to_string())).await {
        return dropped(RealtimeError::ConnectionFailed(e.to_string()), false);
    }

    let mut heartbeat = tokio::time::interval(config.heartbeat);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                let leave = config.leave_frame(&refs.next());
                let _ = sink.send(Message::Text(leave.to_string())).await;
                let _ = sink.close().await;
                return Exit::Stopped;
            }
            _ = heartbeat.tick() => {
                let beat = heartbeat_frame(&refs.next());
                if let Err(e) = sink.send(Message::Text(beat.to_string())).await {
                    return dropped(RealtimeError::ConnectionFailed(e.to_string()), joined);
                }
            }
            changed = tokens.changed() => {
                if changed.is_err() {
                    return Exit::Stopped;
                }
                let token = tokens.borrow_and_update().clone();
                match token {
                    Some(token) => {
                        let frame = config.access_token_frame(&token, &refs.next());
                        if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                            return dropped(RealtimeError::ConnectionFailed(e.to_string()), joined);
                        }
                    }
                    None => {
                        let _ = tx.send(FeedMessage::Status(FeedStatus::Closed));
                        let _ = sink.close().await;
                        return Exit::Stopped;
                    }
                }
            }
            message = stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return dropped(RealtimeError::ConnectionFailed("socket closed".to_string()), joined);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        return dropped(RealtimeError::ConnectionFailed(e.to_string()), joined);
                    }
                };

                match decode_frame(&text, &topic) {
                    Ok(Frame::Reply { reference, ok, reason }) if reference.as_deref() == Some(join_ref.as_str()) => {
                        if !ok {
                            return dropped(RealtimeError::JoinRejected(reason), false);
                        }
                        joined = true;
                        tracing::info!(%owner, topic = %topic, "change feed subscribed");
                        if tx.send(FeedMessage::Status(FeedStatus::Subscribed)).is_err() {
                            return Exit::Stopped;
                        }
                    }
                    Ok(Frame::Change(event)) => {
                        tracing::trace!(id = event.id(), "change received");
                        if tx.send(FeedMessage::Change(event)).is_err() {
                            return Exit::Stopped;
                        }
                    }
                    Ok(Frame::ChannelDown(reason)) => {
                        return dropped(RealtimeError::ConnectionFailed(reason), joined);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "undecodable realtime frame"),
                }
            }
        }
    }
}
