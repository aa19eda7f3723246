//! `RealtimeSocket` against an in-process WebSocket server speaking the
//! realtime channel protocol.

use coach_link::{
    ChangeFilter, ChangeKind, ChannelSignal, ChannelSink, ChannelStatus, CoachLinkTimeouts,
    ManagerConfig, Purpose, RealtimePlatform, RealtimeSocket, RealtimeSubscriptionManager,
    SocketConfig, StaticSession, SubscriptionState, Target,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;

const WAIT: Duration = Duration::from_secs(5);

enum ServerAction {
    Send(Value),
    Close,
}

/// Accepts connections one after another; frames from the client are
/// forwarded to the test, frames from the test are written to the client.
struct TestServer {
    addr: SocketAddr,
    inbound: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<ServerAction>,
    request_uri: Arc<Mutex<Option<String>>>,
    connections: Arc<AtomicUsize>,
    _task: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerAction>();
        let request_uri = Arc::new(Mutex::new(None));
        let connections = Arc::new(AtomicUsize::new(0));

        let uri_slot = request_uri.clone();
        let accepted = connections.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let uri = uri_slot.clone();
                let callback = move |req: &Request, resp: Response| {
                    *uri.lock().unwrap() = Some(req.uri().to_string());
                    Ok::<Response, ErrorResponse>(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                accepted.fetch_add(1, Ordering::SeqCst);

                loop {
                    tokio::select! {
                        msg = ws.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                                let _ = inbound_tx.send(value);
                            },
                            Some(Ok(_)) => {},
                            _ => break,
                        },
                        action = outbound_rx.recv() => match action {
                            Some(ServerAction::Send(value)) => {
                                let _ = ws.send(Message::Text(value.to_string().into())).await;
                            },
                            Some(ServerAction::Close) => {
                                let _ = ws.close(None).await;
                                break;
                            },
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            addr,
            inbound,
            outbound,
            request_uri,
            connections,
            _task: task,
        }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("server stopped")
    }

    fn send(&self, value: Value) {
        let _ = self.outbound.send(ServerAction::Send(value));
    }

    fn close_connection(&self) {
        let _ = self.outbound.send(ServerAction::Close);
    }

    fn reply_ok(&self, join: &Value) {
        self.send(json!({
            "topic": join["topic"],
            "event": "phx_reply",
            "ref": join["ref"],
            "payload": { "status": "ok", "response": {} }
        }));
    }

    fn push_insert(&self, topic: &Value, conversation_id: &str) {
        self.send(json!({
            "topic": topic,
            "event": "postgres_changes",
            "ref": null,
            "payload": { "data": {
                "type": "INSERT",
                "schema": "public",
                "table": "messages",
                "record": { "id": 1, "conversation_id": conversation_id },
                "commit_timestamp": "2024-05-01T12:00:00Z"
            }}
        }));
    }
}

fn socket(server: &TestServer, timeouts: CoachLinkTimeouts) -> RealtimeSocket {
    RealtimeSocket::new(
        SocketConfig::new(server.base_url(), "anon-key").with_timeouts(timeouts),
        Arc::new(StaticSession::authenticated("user-1", "user-token")),
    )
    .unwrap()
}

fn recording_sink(generation: u64) -> (ChannelSink, mpsc::UnboundedReceiver<(u64, ChannelSignal)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = ChannelSink::new(generation, move |generation, signal| tx.send((generation, signal)).is_ok());
    (sink, rx)
}

async fn next_signal(rx: &mut mpsc::UnboundedReceiver<(u64, ChannelSignal)>) -> (u64, ChannelSignal) {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a channel signal")
        .expect("sink dropped")
}

fn messages_filter(conversation_id: &str) -> ChangeFilter {
    ChangeFilter::new(ChangeKind::Insert, "public", "messages").with_equals("conversation_id", conversation_id)
}

#[tokio::test]
async fn test_join_subscribe_change_and_leave() {
    let mut server = TestServer::start().await;
    let socket = socket(&server, CoachLinkTimeouts::for_testing());
    assert!(!socket.is_connected(), "connects lazily");

    let (sink, mut signals) = recording_sink(4);
    let handle = socket
        .subscribe_to_changes("messages:conv-1:user-1:1-4", &messages_filter("conv-1"), sink)
        .await
        .unwrap();
    assert!(socket.is_connected());
    assert_eq!(handle.channel_name(), "messages:conv-1:user-1:1-4");

    let join = server.next_frame().await;
    assert_eq!(join["event"], "phx_join");
    assert_eq!(join["topic"], "realtime:messages:conv-1:user-1:1-4");
    assert_eq!(join["payload"]["access_token"], "user-token");
    assert_eq!(
        join["payload"]["config"]["postgres_changes"][0],
        json!({ "event": "INSERT", "schema": "public", "table": "messages", "filter": "conversation_id=eq.conv-1" })
    );

    let uri = server.request_uri.lock().unwrap().clone().unwrap();
    assert!(uri.starts_with("/realtime/v1/websocket?"));
    assert!(uri.contains("apikey=anon-key"));
    assert!(uri.contains("vsn=1.0.0"));

    server.reply_ok(&join);
    assert_eq!(next_signal(&mut signals).await, (4, ChannelSignal::Status(ChannelStatus::Subscribed)));

    server.push_insert(&join["topic"], "conv-1");
    match next_signal(&mut signals).await {
        (4, ChannelSignal::Change(event)) => {
            assert_eq!(event.event_type, "INSERT");
            assert_eq!(event.table, "messages");
            assert_eq!(event.column("conversation_id"), Some(&json!("conv-1")));
        },
        other => panic!("expected a change event, got {:?}", other),
    }

    socket.unsubscribe(handle).await.unwrap();
    let leave = server.next_frame().await;
    assert_eq!(leave["event"], "phx_leave");
    assert_eq!(leave["topic"], join["topic"]);
}

#[tokio::test]
async fn test_unacknowledged_join_times_out() {
    let mut server = TestServer::start().await;
    let timeouts = CoachLinkTimeouts::builder()
        .join_timeout(Duration::from_millis(200))
        .heartbeat_interval(Duration::ZERO)
        .build();
    let socket = socket(&server, timeouts);

    let (sink, mut signals) = recording_sink(1);
    socket
        .subscribe_to_changes("messages:conv-1:user-1:1-1", &messages_filter("conv-1"), sink)
        .await
        .unwrap();
    let join = server.next_frame().await;
    assert_eq!(join["event"], "phx_join");

    assert_eq!(next_signal(&mut signals).await, (1, ChannelSignal::Status(ChannelStatus::TimedOut)));

    // A late acknowledgement is ignored.
    server.reply_ok(&join);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(signals.try_recv().is_err());
}

#[tokio::test]
async fn test_rejected_join_reports_channel_error() {
    let mut server = TestServer::start().await;
    let socket = socket(&server, CoachLinkTimeouts::for_testing());

    let (sink, mut signals) = recording_sink(2);
    socket
        .subscribe_to_changes("messages:conv-1:user-1:1-2", &messages_filter("conv-1"), sink)
        .await
        .unwrap();
    let join = server.next_frame().await;

    server.send(json!({
        "topic": join["topic"],
        "event": "phx_reply",
        "ref": join["ref"],
        "payload": { "status": "error", "response": { "reason": "unauthorized" } }
    }));
    assert_eq!(next_signal(&mut signals).await, (2, ChannelSignal::Status(ChannelStatus::ChannelError)));
}

#[tokio::test]
async fn test_server_close_and_channel_close() {
    let mut server = TestServer::start().await;
    let socket = socket(&server, CoachLinkTimeouts::for_testing());

    let (sink_a, mut signals_a) = recording_sink(1);
    socket
        .subscribe_to_changes("notifications:conv-1:user-1:1-1", &messages_filter("conv-1"), sink_a)
        .await
        .unwrap();
    let join_a = server.next_frame().await;
    server.reply_ok(&join_a);
    assert_eq!(next_signal(&mut signals_a).await.1, ChannelSignal::Status(ChannelStatus::Subscribed));

    server.send(json!({ "topic": join_a["topic"], "event": "phx_close", "ref": null, "payload": {} }));
    assert_eq!(next_signal(&mut signals_a).await.1, ChannelSignal::Status(ChannelStatus::Closed));

    let (sink_b, mut signals_b) = recording_sink(2);
    socket
        .subscribe_to_changes("notifications:conv-2:user-1:1-2", &messages_filter("conv-2"), sink_b)
        .await
        .unwrap();
    let join_b = server.next_frame().await;
    server.reply_ok(&join_b);
    assert_eq!(next_signal(&mut signals_b).await.1, ChannelSignal::Status(ChannelStatus::Subscribed));

    // Losing the socket fails every joined channel.
    server.close_connection();
    assert_eq!(next_signal(&mut signals_b).await.1, ChannelSignal::Status(ChannelStatus::ChannelError));
}

#[tokio::test]
async fn test_reconnects_on_next_join_after_drop() {
    let mut server = TestServer::start().await;
    let socket = socket(&server, CoachLinkTimeouts::for_testing());

    let (sink, mut signals) = recording_sink(1);
    socket
        .subscribe_to_changes("messages:conv-1:user-1:1-1", &messages_filter("conv-1"), sink)
        .await
        .unwrap();
    let join = server.next_frame().await;
    server.reply_ok(&join);
    next_signal(&mut signals).await;

    server.close_connection();
    assert_eq!(next_signal(&mut signals).await.1, ChannelSignal::Status(ChannelStatus::ChannelError));
    tokio::time::timeout(WAIT, async {
        while socket.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let (sink, mut signals) = recording_sink(2);
    socket
        .subscribe_to_changes("messages:conv-1:user-1:2-2", &messages_filter("conv-1"), sink)
        .await
        .unwrap();
    let join = server.next_frame().await;
    assert_eq!(join["topic"], "realtime:messages:conv-1:user-1:2-2");
    server.reply_ok(&join);
    assert_eq!(next_signal(&mut signals).await, (2, ChannelSignal::Status(ChannelStatus::Subscribed)));
    assert_eq!(server.connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_heartbeats_are_sent() {
    let mut server = TestServer::start().await;
    let timeouts = CoachLinkTimeouts::builder()
        .heartbeat_interval(Duration::from_millis(100))
        .heartbeat_timeout(Duration::ZERO)
        .build();
    let socket = socket(&server, timeouts);

    let (sink, _signals) = recording_sink(1);
    socket
        .subscribe_to_changes("messages:conv-1:user-1:1-1", &messages_filter("conv-1"), sink)
        .await
        .unwrap();
    let join = server.next_frame().await;
    assert_eq!(join["event"], "phx_join");

    let heartbeat = server.next_frame().await;
    assert_eq!(heartbeat["topic"], "phoenix");
    assert_eq!(heartbeat["event"], "heartbeat");
}

#[tokio::test]
async fn test_connection_refused_is_a_setup_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let socket = RealtimeSocket::new(
        SocketConfig::new(format!("http://{}", addr), "anon-key").with_timeouts(CoachLinkTimeouts::for_testing()),
        Arc::new(StaticSession::authenticated("user-1", "user-token")),
    )
    .unwrap();
    let (sink, _signals) = recording_sink(1);
    let result = socket
        .subscribe_to_changes("messages:conv-1:user-1:1-1", &messages_filter("conv-1"), sink)
        .await;
    assert!(result.is_err());
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn test_manager_over_socket_end_to_end() {
    let mut server = TestServer::start().await;
    let timeouts = CoachLinkTimeouts::for_testing();
    let platform = Arc::new(socket(&server, timeouts.clone()));
    let manager = RealtimeSubscriptionManager::with_config(
        Purpose::messages(),
        platform,
        ManagerConfig {
            timeouts,
            ..ManagerConfig::default()
        },
    );

    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    let handle = manager
        .observe(Target::new("conv-9").unwrap(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    let join = server.next_frame().await;
    assert!(join["topic"].as_str().unwrap().starts_with("realtime:messages:conv-9:user-1:"));
    server.reply_ok(&join);

    tokio::time::timeout(WAIT, async {
        while manager.state().await != SubscriptionState::Active {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    server.push_insert(&join["topic"], "conv-9");
    tokio::time::timeout(WAIT, async {
        while received.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    manager.release(&handle).await;
    let leave = server.next_frame().await;
    assert_eq!(leave["event"], "phx_leave");
    assert_eq!(manager.state().await, SubscriptionState::Closed);
}
