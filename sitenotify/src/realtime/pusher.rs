//! WebSocket transport speaking the Pusher channel protocol.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::transport::{PushSubscription, PushTransport, RawEvent};
use crate::api::{BroadcastingApi, DEFAULT_AUTH_ENDPOINT};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Protocol revision sent in the connection URL.
const PROTOCOL_VERSION: &str = "7";

/// Settings for [`PusherTransport`].
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket base, e.g. `wss://ws.example.com`.
    pub ws_url: String,
    /// Application key the socket server was configured with.
    pub app_key: String,
    /// Channel authorization endpoint, relative to the API base.
    pub auth_endpoint: String,
    /// Keep-alive interval used until the server announces its own.
    pub activity_timeout: Duration,
    /// Upper bound for connect, authorize and subscribe together.
    pub handshake_timeout: Duration,
    /// Events buffered between the socket and the consumer.
    pub event_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080".to_owned(),
            app_key: String::new(),
            auth_endpoint: DEFAULT_AUTH_ENDPOINT.to_owned(),
            activity_timeout: Duration::from_secs(120),
            handshake_timeout: Duration::from_secs(30),
            event_buffer: 64,
        }
    }
}

impl RealtimeConfig {
    /// Full socket URL including the app key and protocol query.
    pub fn socket_url(&self) -> Result<Url> {
        if self.app_key.trim().is_empty() {
            return Err(Error::InvalidArgument("realtime app key is empty".into()));
        }

        let mut url = Url::parse(&self.ws_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::InvalidArgument(format!(
                "unsupported socket scheme: {}",
                url.scheme()
            )));
        }

        let path = format!("{}/app/{}", url.path().trim_end_matches('/'), self.app_key.trim());
        url.set_path(&path);
        url.query_pairs_mut()
            .append_pair("protocol", PROTOCOL_VERSION)
            .append_pair("client", "sitenotify")
            .append_pair("version", env!("CARGO_PKG_VERSION"))
            .append_pair("flash", "false");

        Ok(url)
    }
}

/// A protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Frame {
    fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_owned(),
            channel: None,
            data,
        }
    }

    /// Decode `data`, which the server sends as a JSON string.
    fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.data {
            Value::String(text) => serde_json::from_str(text).map_err(Error::Json),
            other => serde_json::from_value(other.clone()).map_err(Error::Json),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionInfo {
    socket_id: String,
    #[serde(default)]
    activity_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorInfo {
    #[serde(default, alias = "error")]
    message: Option<String>,
    #[serde(default, alias = "status")]
    code: Option<u16>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl ErrorInfo {
    fn into_error(self, context: &str) -> Error {
        let message = self.message.unwrap_or_else(|| context.to_owned());
        let is_auth = matches!(self.code, Some(401) | Some(403))
            || self.kind.as_deref() == Some("AuthError");
        if is_auth {
            Error::Auth(message)
        } else {
            Error::channel(match self.code {
                Some(code) => format!("{context} [{code}]: {message}"),
                None => format!("{context}: {message}"),
            })
        }
    }
}

/// Push transport over a Pusher-compatible socket server.
#[derive(Debug, Clone)]
pub struct PusherTransport {
    config: RealtimeConfig,
    authorizer: BroadcastingApi,
}

impl PusherTransport {
    pub fn new(config: RealtimeConfig, authorizer: BroadcastingApi) -> Self {
        Self { config, authorizer }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    async fn handshake(&self, channel: &str, credential: &str) -> Result<(WsStream, Duration)> {
        let url = self.config.socket_url()?;
        info!(%url, channel, "Connecting push channel");
        let (mut ws, _) = connect_async(url.as_str()).await?;

        let established = await_frame(&mut ws, &["pusher:connection_established"]).await?;
        let info: ConnectionInfo = established.data_as()?;
        let activity_timeout = info
            .activity_timeout
            .map(Duration::from_secs)
            .unwrap_or(self.config.activity_timeout);
        debug!(socket_id = %info.socket_id, ?activity_timeout, "Socket established");

        let auth = self
            .authorizer
            .authorize_with(&info.socket_id, channel, credential)
            .await?;

        let mut subscribe = json!({"channel": channel, "auth": auth.auth});
        if let Some(channel_data) = auth.channel_data {
            subscribe["channel_data"] = Value::String(channel_data);
        }
        send_frame(&mut ws, &Frame::new("pusher:subscribe", subscribe)).await?;

        let reply = await_frame(
            &mut ws,
            &[
                "pusher_internal:subscription_succeeded",
                "pusher:subscription_error",
            ],
        )
        .await?;
        if reply.event == "pusher:subscription_error" {
            let info: ErrorInfo = reply.data_as().unwrap_or_default();
            return Err(info.into_error("subscription rejected"));
        }

        info!(channel, "Subscribed to push channel");
        Ok((ws, activity_timeout))
    }
}

#[async_trait]
impl PushTransport for PusherTransport {
    async fn subscribe(&self, channel: &str, credential: &str) -> Result<PushSubscription> {
        let (ws, activity_timeout) =
            tokio::time::timeout(self.config.handshake_timeout, self.handshake(channel, credential))
                .await
                .map_err(|_| Error::channel(format!("handshake for {channel} timed out")))??;

        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(drive_socket(
            ws,
            channel.to_owned(),
            event_tx,
            shutdown_rx,
            activity_timeout,
        ));

        Ok(PushSubscription::new(channel, event_rx).with_driver(shutdown_tx, task))
    }
}

async fn send_frame(ws: &mut WsStream, frame: &Frame) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    ws.send(Message::text(text)).await?;
    Ok(())
}

/// Read the next protocol frame. `None` once the socket closed.
async fn next_frame(ws: &mut WsStream) -> Result<Option<Frame>> {
    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => match serde_json::from_str::<Frame>(text.as_str()) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!(error = %e, "Skipping unreadable socket frame"),
            },
            Message::Close(reason) => {
                debug!(?reason, "Socket closed by server");
                return Ok(None);
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Read frames until one of `wanted` arrives, answering pings meanwhile.
async fn await_frame(ws: &mut WsStream, wanted: &[&str]) -> Result<Frame> {
    loop {
        let frame = next_frame(ws)
            .await?
            .ok_or_else(|| Error::channel("socket closed during handshake"))?;

        match frame.event.as_str() {
            event if wanted.contains(&event) => return Ok(frame),
            "pusher:ping" => send_frame(ws, &Frame::new("pusher:pong", json!({}))).await?,
            "pusher:error" => {
                let info: ErrorInfo = frame.data_as().unwrap_or_default();
                return Err(info.into_error("socket error"));
            }
            other => trace!(event = other, "Ignoring frame during handshake"),
        }
    }
}

/// Pump frames from the socket into `events` until shutdown or disconnect.
async fn drive_socket(
    mut ws: WsStream,
    channel: String,
    events: mpsc::Sender<RawEvent>,
    mut shutdown: oneshot::Receiver<()>,
    activity_timeout: Duration,
) {
    let mut keepalive = tokio::time::interval(activity_timeout);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    keepalive.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let leave = Frame::new("pusher:unsubscribe", json!({"channel": channel}));
                if let Err(e) = send_frame(&mut ws, &leave).await {
                    debug!(error = %e, "Unsubscribe frame not sent");
                }
                let _ = ws.close(None).await;
                break;
            }

            _ = keepalive.tick() => {
                if let Err(e) = send_frame(&mut ws, &Frame::new("pusher:ping", json!({}))).await {
                    warn!(error = %e, %channel, "Keep-alive failed");
                    break;
                }
            }

            frame = next_frame(&mut ws) => match frame {
                Ok(Some(frame)) => match frame.event.as_str() {
                    "pusher:ping" => {
                        if let Err(e) = send_frame(&mut ws, &Frame::new("pusher:pong", json!({}))).await {
                            warn!(error = %e, %channel, "Pong failed");
                            break;
                        }
                    }
                    "pusher:error" => {
                        let info: ErrorInfo = frame.data_as().unwrap_or_default();
                        warn!(error = %info.into_error("socket error"), %channel, "Server reported an error");
                    }
                    event if event.starts_with("pusher:") || event.starts_with("pusher_internal:") => {
                        trace!(event, "Protocol frame");
                    }
                    _ => {
                        if frame.channel.as_deref() != Some(channel.as_str()) {
                            trace!(event = %frame.event, "Frame for another channel");
                            continue;
                        }
                        let event = RawEvent {
                            event: frame.event.clone(),
                            channel: frame.channel,
                            payload: frame.data,
                        };
                        if events.send(event).await.is_err() {
                            debug!(%channel, "Event consumer gone");
                            let _ = ws.close(None).await;
                            break;
                        }
                    }
                },
                Ok(None) => {
                    warn!(%channel, "Push socket closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, %channel, "Push socket failed");
                    break;
                }
            },
        }
    }

    debug!(%channel, "Push socket task stopped");
}
