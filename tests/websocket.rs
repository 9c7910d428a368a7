use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde_json::json;

use inbox_sync::credentials::StaticCredentials;
use inbox_sync::directory::{DirectoryError, DirectoryResult, NotificationDirectory};
use inbox_sync::models::notification::{InboxPage, ListQuery, Notification, NotificationType};
use inbox_sync::sync::InboxEngine;
use inbox_sync::transport::{ReconnectPolicy, TransportChannel, TransportError, WebSocketChannel};

const TOKEN: &str = "socket-token";

#[derive(Default)]
struct Gateway {
    connections: AtomicUsize,
    auth: Mutex<Vec<String>>,
    hold_open: bool,
}

fn sample(id: &str) -> Notification {
    Notification {
        id: id.to_string(),
        kind: NotificationType::SiteSuspended,
        title: format!("Site {id} suspended"),
        message: "Pending review".into(),
        data: None,
        is_read: false,
        created_at: Utc::now(),
    }
}

async fn ws_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let n = gateway.connections.fetch_add(1, Ordering::SeqCst);
    gateway.auth.lock().unwrap().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    );
    let hold_open = gateway.hold_open;
    ws.on_upgrade(move |socket| serve_socket(socket, n, hold_open))
}

async fn serve_socket(mut socket: WebSocket, n: usize, hold_open: bool) {
    let frames = vec![
        json!({ "event": "ping", "data": {} }).to_string(),
        "{not json".to_string(),
        json!({ "event": "notification", "data": "oops" }).to_string(),
        json!({ "event": "notification", "data": sample(&format!("c{n}-a")) }).to_string(),
        json!({ "event": "notification", "data": sample(&format!("c{n}-b")) }).to_string(),
    ];
    for frame in frames {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    if hold_open {
        while let Some(Ok(_)) = socket.recv().await {}
    } else {
        let _ = socket.send(Message::Close(None)).await;
    }
}

async fn spawn_server(gateway: Arc<Gateway>) -> SocketAddr {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route(
            "/down",
            get(|State(gateway): State<Arc<Gateway>>| async move {
                gateway.connections.fetch_add(1, Ordering::SeqCst);
                StatusCode::INTERNAL_SERVER_ERROR
            }),
        )
        .with_state(gateway);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_attempts,
    }
}

fn channel(addr: SocketAddr, path: &str, policy: ReconnectPolicy) -> WebSocketChannel {
    WebSocketChannel::new(
        &format!("ws://{addr}{path}"),
        Arc::new(StaticCredentials::new(Some(TOKEN.into()))),
        policy,
        Duration::from_secs(2),
    )
    .unwrap()
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn pushes_reach_engine_in_delivery_order() {
    let gateway = Arc::new(Gateway {
        hold_open: true,
        ..Default::default()
    });
    let addr = spawn_server(gateway.clone()).await;
    let channel = channel(addr, "/ws", ReconnectPolicy::default());
    let engine = InboxEngine::new(Arc::new(NoDirectory), 20);
    let _push = engine.attach(&channel);

    channel.connect().await.unwrap();
    channel.connect().await.unwrap();

    assert!(wait_until(|| engine.snapshot().notifications.len() == 2).await);
    let state = engine.snapshot();
    let ids: Vec<_> = state.notifications.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["c0-b", "c0-a"]);
    assert_eq!(state.unread_count, 2);

    assert!(channel.is_connected());
    assert_eq!(gateway.connections.load(Ordering::SeqCst), 1);
    assert_eq!(
        gateway.auth.lock().unwrap().as_slice(),
        [format!("Bearer {TOKEN}")]
    );

    channel.disconnect().await;
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn reconnects_after_server_closes() {
    let gateway = Arc::new(Gateway::default());
    let addr = spawn_server(gateway.clone()).await;
    let channel = channel(addr, "/ws", fast_policy(5));
    let engine = InboxEngine::new(Arc::new(NoDirectory), 20);
    let _push = engine.attach(&channel);

    channel.connect().await.unwrap();

    assert!(wait_until(|| gateway.connections.load(Ordering::SeqCst) >= 2).await);
    assert!(wait_until(|| engine.snapshot().find("c1-b").is_some()).await);
    channel.disconnect().await;

    let state = engine.snapshot();
    assert!(state.find("c0-a").is_some());
    assert!(state.find("c1-a").is_some());
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let gateway = Arc::new(Gateway::default());
    let addr = spawn_server(gateway.clone()).await;
    let channel = channel(addr, "/down", fast_policy(2));

    channel.connect().await.unwrap();

    assert!(wait_until(|| gateway.connections.load(Ordering::SeqCst) >= 3).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.connections.load(Ordering::SeqCst), 3);
    assert!(!channel.is_connected());

    // A fresh connect starts over.
    channel.connect().await.unwrap();
    assert!(wait_until(|| gateway.connections.load(Ordering::SeqCst) >= 4).await);
    channel.disconnect().await;
}

#[tokio::test]
async fn missing_credential_never_dials() {
    let gateway = Arc::new(Gateway::default());
    let addr = spawn_server(gateway.clone()).await;
    let channel = WebSocketChannel::new(
        &format!("ws://{addr}/ws"),
        Arc::new(StaticCredentials::default()),
        ReconnectPolicy::default(),
        Duration::from_secs(2),
    )
    .unwrap();

    assert!(matches!(
        channel.connect().await,
        Err(TransportError::MissingCredential)
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gateway.connections.load(Ordering::SeqCst), 0);
}

/// Directory stand-in for tests that only exercise the push path.
struct NoDirectory;

#[async_trait::async_trait]
impl NotificationDirectory for NoDirectory {
    async fn list(&self, _: ListQuery) -> DirectoryResult<InboxPage> {
        Err(DirectoryError::MissingData)
    }

    async fn mark_read(&self, _: &str) -> DirectoryResult<Notification> {
        Err(DirectoryError::MissingData)
    }

    async fn mark_all_read(&self) -> DirectoryResult<()> {
        Ok(())
    }

    async fn delete(&self, _: &str) -> DirectoryResult<()> {
        Ok(())
    }

    async fn delete_all(&self) -> DirectoryResult<()> {
        Ok(())
    }
}
