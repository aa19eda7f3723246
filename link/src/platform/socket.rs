//! [`RealtimePlatform`] over the backend's realtime WebSocket.
//!
//! One socket is shared by every channel of every manager that uses this
//! adapter. A single background task owns it and handles:
//!
//! - Lazy connect on the first join, and again after the socket drops
//! - `phx_join` / `phx_leave` per channel, routed back by topic
//! - Join acknowledgement deadline (`TIMED_OUT` when it passes)
//! - Heartbeats on the `phoenix` topic with a reply deadline
//! - Reporting `CHANNEL_ERROR` to every joined channel when the socket dies
//!
//! The adapter never retries on its own. Retrying is the managers' job.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{ChannelHandle, ChannelSink, RealtimePlatform, SessionProvider};
use crate::error::{CoachLinkError, Result};
use crate::event_handlers::{DisconnectReason, EventHandlers};
use crate::models::{
    ChangeFilter, ChannelStatus, InboundEvent, RealtimeFrame, Session, HEARTBEAT_TOPIC,
};
use crate::timeouts::CoachLinkTimeouts;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Far enough in the future (~100 years) to act as "never" for deadlines.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Largest text frame accepted from the server (16 MiB).
const MAX_TEXT_FRAME_BYTES: usize = 16 << 20;

const PROTOCOL_VERSION: &str = "1.0.0";

/// Connection settings for [`RealtimeSocket`].
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// HTTP(S) base URL of the backend, e.g. `https://coach.example.com`.
    pub base_url: String,
    /// Public API key, sent as the `apikey` query parameter.
    pub api_key: String,
    pub timeouts: CoachLinkTimeouts,
    pub event_handlers: EventHandlers,
}

impl SocketConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeouts: CoachLinkTimeouts::default(),
            event_handlers: EventHandlers::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: CoachLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_event_handlers(mut self, event_handlers: EventHandlers) -> Self {
        self.event_handlers = event_handlers;
        self
    }
}

/// Build the realtime endpoint from an HTTP(S) base URL.
///
/// Returns `(url, url_without_query)`; the second form is safe to log.
fn resolve_socket_url(base_url: &str, api_key: &str) -> Result<(String, String)> {
    let base = reqwest::Url::parse(base_url.trim()).map_err(|e| {
        CoachLinkError::ConfigurationError(format!("Invalid base_url '{}': {}", base_url, e))
    })?;

    if base.host_str().is_none() {
        return Err(CoachLinkError::ConfigurationError("base_url must include a host".to_string()));
    }
    if !base.username().is_empty() || base.password().is_some() {
        return Err(CoachLinkError::ConfigurationError(
            "base_url must not include username/password credentials".to_string(),
        ));
    }
    if api_key.trim().is_empty() {
        return Err(CoachLinkError::ConfigurationError("api_key must not be empty".to_string()));
    }

    let ws_scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CoachLinkError::ConfigurationError(format!(
                "Unsupported base_url scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    let mut ws_url = base.clone();
    ws_url.set_scheme(ws_scheme).map_err(|_| {
        CoachLinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    ws_url.set_fragment(None);
    let path = format!("{}/realtime/v1/websocket", base.path().trim_end_matches('/'));
    ws_url.set_path(&path);
    ws_url.set_query(None);
    let display = ws_url.to_string();

    ws_url
        .query_pairs_mut()
        .append_pair("apikey", api_key.trim())
        .append_pair("vsn", PROTOCOL_VERSION);

    Ok((ws_url.to_string(), display))
}

// ── Commands ────────────────────────────────────────────────────────────────

enum SocketCmd {
    Join {
        id: u64,
        topic: String,
        filter: ChangeFilter,
        access_token: Option<String>,
        sink: ChannelSink,
        result_tx: oneshot::Sender<Result<()>>,
    },
    Leave {
        id: u64,
    },
    Shutdown,
}

// ── RealtimeSocket (public handle) ──────────────────────────────────────────

/// Shared realtime WebSocket, usable as a [`RealtimePlatform`].
///
/// ```rust,no_run
/// # async fn example() -> coach_link::Result<()> {
/// use coach_link::{RealtimeSocket, SocketConfig, StaticSession};
/// use std::sync::Arc;
///
/// let socket = RealtimeSocket::new(
///     SocketConfig::new("https://coach.example.com", "public-anon-key"),
///     Arc::new(StaticSession::authenticated("user-1", "access-token")),
/// )?;
/// # Ok(())
/// # }
/// ```
pub struct RealtimeSocket {
    cmd_tx: mpsc::Sender<SocketCmd>,
    sessions: Arc<dyn SessionProvider>,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    display_url: String,
    _task: JoinHandle<()>,
}

impl RealtimeSocket {
    /// Validate the endpoint and start the socket task.
    ///
    /// Nothing is dialled until the first channel joins. Must be called from
    /// within a Tokio runtime.
    pub fn new(config: SocketConfig, sessions: Arc<dyn SessionProvider>) -> Result<Self> {
        let (url, display_url) = resolve_socket_url(&config.base_url, &config.api_key)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CoachLinkError::ConfigurationError(
                "RealtimeSocket must be created inside a Tokio runtime".to_string(),
            )
        })?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<SocketCmd>(256);
        let connected = Arc::new(AtomicBool::new(false));

        let task = SocketTask::new(url, display_url.clone(), config, connected.clone());
        let handle = runtime.spawn(task.run(cmd_rx));

        Ok(Self {
            cmd_tx,
            sessions,
            next_id: AtomicU64::new(1),
            connected,
            display_url,
            _task: handle,
        })
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Endpoint URL without the API key.
    pub fn url(&self) -> &str {
        &self.display_url
    }

    /// Leave every channel and close the socket.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SocketCmd::Shutdown).await;
    }
}

impl Drop for RealtimeSocket {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(SocketCmd::Shutdown);
    }
}

#[async_trait]
impl RealtimePlatform for RealtimeSocket {
    async fn get_session(&self) -> Result<Session> {
        self.sessions.get_session().await
    }

    async fn subscribe_to_changes(
        &self,
        channel_name: &str,
        filter: &ChangeFilter,
        sink: ChannelSink,
    ) -> Result<ChannelHandle> {
        let access_token = self.sessions.get_session().await?.access_token;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (result_tx, result_rx) = oneshot::channel();

        self.cmd_tx
            .send(SocketCmd::Join {
                id,
                topic: RealtimeFrame::channel_topic(channel_name),
                filter: filter.clone(),
                access_token,
                sink,
                result_tx,
            })
            .await
            .map_err(|_| CoachLinkError::InternalError("realtime socket task stopped".to_string()))?;

        result_rx.await.map_err(|_| {
            CoachLinkError::InternalError("realtime socket task dropped join reply".to_string())
        })??;

        Ok(ChannelHandle::new(id, channel_name))
    }

    async fn unsubscribe(&self, handle: ChannelHandle) -> Result<()> {
        self.cmd_tx
            .send(SocketCmd::Leave { id: handle.id() })
            .await
            .map_err(|_| CoachLinkError::InternalError("realtime socket task stopped".to_string()))
    }
}

// ── Background socket task ──────────────────────────────────────────────────

struct JoinedChannel {
    topic: String,
    sink: ChannelSink,
    join_ref: String,
    joined: bool,
    join_deadline: TokioInstant,
}

enum Wake {
    HeartbeatTimeout,
    Command(Option<SocketCmd>),
    JoinDeadline,
    Heartbeat,
    Frame(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

struct SocketTask {
    url: String,
    display_url: String,
    timeouts: CoachLinkTimeouts,
    event_handlers: EventHandlers,
    connected: Arc<AtomicBool>,
    ws: Option<Socket>,
    channels: HashMap<u64, JoinedChannel>,
    next_ref: u64,
    heartbeat_deadline: TokioInstant,
    awaiting_heartbeat: bool,
    heartbeat_reply_deadline: TokioInstant,
}

impl SocketTask {
    fn new(url: String, display_url: String, config: SocketConfig, connected: Arc<AtomicBool>) -> Self {
        Self {
            url,
            display_url,
            timeouts: config.timeouts,
            event_handlers: config.event_handlers,
            connected,
            ws: None,
            channels: HashMap::new(),
            next_ref: 1,
            heartbeat_deadline: TokioInstant::now() + FAR_FUTURE,
            awaiting_heartbeat: false,
            heartbeat_reply_deadline: TokioInstant::now() + FAR_FUTURE,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SocketCmd>) {
        let has_heartbeat = !self.timeouts.heartbeat_interval.is_zero();
        let has_reply_timeout = has_heartbeat && !self.timeouts.heartbeat_timeout.is_zero();

        loop {
            if self.ws.is_none() {
                // Idle until someone needs the socket.
                match cmd_rx.recv().await {
                    Some(SocketCmd::Join {
                        id,
                        topic,
                        filter,
                        access_token,
                        sink,
                        result_tx,
                    }) => {
                        let result = match self.connect().await {
                            Ok(()) => self.join(id, topic, &filter, access_token, sink).await,
                            Err(e) => Err(e),
                        };
                        let _ = result_tx.send(result);
                    },
                    Some(SocketCmd::Leave { id }) => {
                        self.channels.remove(&id);
                    },
                    Some(SocketCmd::Shutdown) | None => return,
                }
                continue;
            }

            let pending_joins = self.channels.values().any(|c| !c.joined);
            let join_deadline = self
                .channels
                .values()
                .filter(|c| !c.joined)
                .map(|c| c.join_deadline)
                .min()
                .unwrap_or_else(|| TokioInstant::now() + FAR_FUTURE);

            let heartbeat_sleep = tokio::time::sleep_until(self.heartbeat_deadline);
            tokio::pin!(heartbeat_sleep);
            let reply_sleep = tokio::time::sleep_until(self.heartbeat_reply_deadline);
            tokio::pin!(reply_sleep);
            let join_sleep = tokio::time::sleep_until(join_deadline);
            tokio::pin!(join_sleep);

            let awaiting_heartbeat = self.awaiting_heartbeat;
            let Some(ws) = self.ws.as_mut() else {
                continue;
            };

            let wake = tokio::select! {
                biased;

                _ = &mut reply_sleep, if has_reply_timeout && awaiting_heartbeat => Wake::HeartbeatTimeout,
                cmd = cmd_rx.recv() => Wake::Command(cmd),
                _ = &mut join_sleep, if pending_joins => Wake::JoinDeadline,
                _ = &mut heartbeat_sleep, if has_heartbeat && !awaiting_heartbeat => Wake::Heartbeat,
                frame = ws.next() => Wake::Frame(frame),
            };

            match wake {
                Wake::HeartbeatTimeout => {
                    let message =
                        format!("Heartbeat timeout ({:?}), server unresponsive", self.timeouts.heartbeat_timeout);
                    log::warn!("[coach-link] {}", message);
                    self.drop_connection(DisconnectReason::new(message));
                },
                Wake::Command(Some(SocketCmd::Join {
                    id,
                    topic,
                    filter,
                    access_token,
                    sink,
                    result_tx,
                })) => {
                    let result = self.join(id, topic, &filter, access_token, sink).await;
                    let _ = result_tx.send(result);
                },
                Wake::Command(Some(SocketCmd::Leave { id })) => self.leave(id).await,
                Wake::Command(Some(SocketCmd::Shutdown)) | Wake::Command(None) => {
                    self.close().await;
                    return;
                },
                Wake::JoinDeadline => self.expire_joins().await,
                Wake::Heartbeat => {
                    let reference = self.make_ref();
                    if self.send_frame(&RealtimeFrame::heartbeat(reference)).await.is_ok() && has_reply_timeout {
                        self.awaiting_heartbeat = true;
                        self.heartbeat_reply_deadline = TokioInstant::now() + self.timeouts.heartbeat_timeout;
                    }
                    self.heartbeat_deadline = TokioInstant::now() + self.timeouts.heartbeat_interval;
                },
                Wake::Frame(frame) => self.handle_frame(frame).await,
            }
        }
    }

    async fn connect(&mut self) -> Result<()> {
        log::debug!("[coach-link] Connecting realtime socket to {}", self.display_url);
        let connect = tokio_tungstenite::connect_async(self.url.as_str());

        let result = if CoachLinkTimeouts::is_no_timeout(self.timeouts.connection_timeout) {
            Ok(connect.await)
        } else {
            tokio::time::timeout(self.timeouts.connection_timeout, connect).await
        };

        match result {
            Ok(Ok((stream, _response))) => {
                log::info!("[coach-link] Realtime socket connected to {}", self.display_url);
                self.ws = Some(stream);
                self.connected.store(true, Ordering::SeqCst);
                self.awaiting_heartbeat = false;
                self.heartbeat_reply_deadline = TokioInstant::now() + FAR_FUTURE;
                self.heartbeat_deadline = if self.timeouts.heartbeat_interval.is_zero() {
                    TokioInstant::now() + FAR_FUTURE
                } else {
                    TokioInstant::now() + self.timeouts.heartbeat_interval
                };
                self.event_handlers.emit_connect();
                Ok(())
            },
            Ok(Err(tokio_tungstenite::tungstenite::Error::Http(response))) => {
                let message = match response.status().as_u16() {
                    401 => "Unauthorized: realtime endpoint rejected the API key".to_string(),
                    403 => "Forbidden: access to the realtime endpoint denied".to_string(),
                    code => format!("Realtime endpoint HTTP error: {}", code),
                };
                log::warn!("[coach-link] {}", message);
                Err(CoachLinkError::WebSocketError(message))
            },
            Ok(Err(e)) => {
                log::warn!("[coach-link] Realtime socket connection failed: {}", e);
                Err(CoachLinkError::WebSocketError(format!("Connection failed: {}", e)))
            },
            Err(_) => {
                let message = format!("Connection timeout ({:?})", self.timeouts.connection_timeout);
                log::warn!("[coach-link] {}", message);
                Err(CoachLinkError::TimedOut(message))
            },
        }
    }

    fn make_ref(&mut self) -> String {
        let reference = self.next_ref.to_string();
        self.next_ref += 1;
        reference
    }

    /// Send one frame. A failed send drops the connection.
    async fn send_frame(&mut self, frame: &RealtimeFrame) -> Result<()> {
        let payload = serde_json::to_string(frame)?;
        let Some(ws) = self.ws.as_mut() else {
            return Err(CoachLinkError::WebSocketError("Not connected".to_string()));
        };

        match ws.send(Message::Text(payload.clone().into())).await {
            Ok(()) => {
                self.event_handlers.emit_send(&payload);
                Ok(())
            },
            Err(e) => {
                let message = format!("Send failed: {}", e);
                log::warn!("[coach-link] {}", message);
                self.drop_connection(DisconnectReason::new(message.clone()));
                Err(CoachLinkError::WebSocketError(message))
            },
        }
    }

    async fn join(
        &mut self,
        id: u64,
        topic: String,
        filter: &ChangeFilter,
        access_token: Option<String>,
        sink: ChannelSink,
    ) -> Result<()> {
        let join_ref = self.make_ref();
        let frame = RealtimeFrame::join(&topic, filter, access_token.as_deref(), join_ref.clone());
        self.send_frame(&frame).await?;

        let join_deadline = if CoachLinkTimeouts::is_no_timeout(self.timeouts.join_timeout) {
            TokioInstant::now() + FAR_FUTURE
        } else {
            TokioInstant::now() + self.timeouts.join_timeout
        };

        log::debug!("[coach-link] Joining {} (ref {})", topic, join_ref);
        self.channels.insert(
            id,
            JoinedChannel {
                topic,
                sink,
                join_ref,
                joined: false,
                join_deadline,
            },
        );
        Ok(())
    }

    async fn leave(&mut self, id: u64) {
        let Some(channel) = self.channels.remove(&id) else {
            return;
        };
        log::debug!("[coach-link] Leaving {}", channel.topic);
        let reference = self.make_ref();
        let _ = self.send_frame(&RealtimeFrame::leave(&channel.topic, reference)).await;
    }

    async fn expire_joins(&mut self) {
        let now = TokioInstant::now();
        let expired: Vec<u64> = self
            .channels
            .iter()
            .filter(|(_, c)| !c.joined && c.join_deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(channel) = self.channels.remove(&id) {
                log::warn!(
                    "[coach-link] No join reply for {} within {:?}",
                    channel.topic,
                    self.timeouts.join_timeout
                );
                channel.sink.status(ChannelStatus::TimedOut);
                let reference = self.make_ref();
                let _ = self.send_frame(&RealtimeFrame::leave(&channel.topic, reference)).await;
            }
        }
    }

    async fn handle_frame(
        &mut self,
        frame: Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) {
        // Any traffic proves the server is alive.
        if self.awaiting_heartbeat {
            self.awaiting_heartbeat = false;
            self.heartbeat_reply_deadline = TokioInstant::now() + FAR_FUTURE;
        }

        match frame {
            Some(Ok(Message::Text(text))) => {
                if text.len() > MAX_TEXT_FRAME_BYTES {
                    log::warn!("[coach-link] Text frame too large ({} bytes)", text.len());
                    return;
                }
                self.event_handlers.emit_receive(text.as_str());
                self.route_text(text.as_str());
            },
            Some(Ok(Message::Binary(data))) => {
                log::debug!("[coach-link] Ignoring binary frame ({} bytes)", data.len());
            },
            Some(Ok(Message::Ping(payload))) => {
                if let Some(ws) = self.ws.as_mut() {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
            },
            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {},
            Some(Ok(Message::Close(frame))) => {
                let reason = match frame {
                    Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                    None => DisconnectReason::new("Server closed connection"),
                };
                log::info!("[coach-link] Realtime socket closed by server: {}", reason);
                self.drop_connection(reason);
            },
            Some(Err(e)) => {
                log::warn!("[coach-link] Realtime socket error: {}", e);
                self.drop_connection(DisconnectReason::new(format!("WebSocket error: {}", e)));
            },
            None => {
                self.drop_connection(DisconnectReason::new("WebSocket stream ended"));
            },
        }
    }

    fn route_text(&mut self, text: &str) {
        let frame: RealtimeFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[coach-link] Failed to parse realtime frame: {}", e);
                return;
            },
        };

        if frame.topic == HEARTBEAT_TOPIC {
            return;
        }

        let Some(id) = self
            .channels
            .iter()
            .find(|(_, c)| c.topic == frame.topic)
            .map(|(id, _)| *id)
        else {
            log::debug!("[coach-link] Frame '{}' for unknown topic {}", frame.event, frame.topic);
            return;
        };

        match frame.classify() {
            InboundEvent::Reply { ok, message } => {
                let Some(channel) = self.channels.get_mut(&id) else {
                    return;
                };
                if channel.joined || frame.reference.as_deref() != Some(channel.join_ref.as_str()) {
                    return;
                }
                if ok {
                    log::debug!("[coach-link] Joined {}", channel.topic);
                    channel.joined = true;
                    channel.sink.status(ChannelStatus::Subscribed);
                } else if let Some(channel) = self.channels.remove(&id) {
                    log::warn!(
                        "[coach-link] Join rejected for {}: {}",
                        channel.topic,
                        message.as_deref().unwrap_or("no reason given")
                    );
                    channel.sink.status(ChannelStatus::ChannelError);
                }
            },
            InboundEvent::ChannelError => {
                if let Some(channel) = self.channels.remove(&id) {
                    log::warn!("[coach-link] Channel error on {}", channel.topic);
                    channel.sink.status(ChannelStatus::ChannelError);
                }
            },
            InboundEvent::ChannelClosed => {
                if let Some(channel) = self.channels.remove(&id) {
                    log::info!("[coach-link] Channel {} closed by server", channel.topic);
                    channel.sink.status(ChannelStatus::Closed);
                }
            },
            InboundEvent::Change(event) => {
                if let Some(channel) = self.channels.get(&id) {
                    if channel.joined {
                        channel.sink.change(event);
                    }
                }
            },
            InboundEvent::Malformed(e) => {
                log::warn!("[coach-link] Malformed change payload on {}: {}", frame.topic, e);
            },
            InboundEvent::Other => {},
        }
    }

    /// Forget the socket and fail every channel riding on it.
    fn drop_connection(&mut self, reason: DisconnectReason) {
        self.ws = None;
        self.awaiting_heartbeat = false;
        self.heartbeat_reply_deadline = TokioInstant::now() + FAR_FUTURE;
        if self.connected.swap(false, Ordering::SeqCst) {
            self.event_handlers.emit_disconnect(reason);
        }
        for (_, channel) in self.channels.drain() {
            channel.sink.status(ChannelStatus::ChannelError);
        }
    }

    async fn close(&mut self) {
        let ids: Vec<u64> = self.channels.keys().copied().collect();
        for id in ids {
            self.leave(id).await;
        }
        if let Some(ws) = self.ws.as_mut() {
            let _ = ws.close(None).await;
        }
        self.ws = None;
        if self.connected.swap(false, Ordering::SeqCst) {
            self.event_handlers.emit_disconnect(DisconnectReason::new("Client disconnected"));
        }
    }
}
