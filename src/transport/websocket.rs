// src/transport/websocket.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{
    HandlerGuard, HandlerRegistry, NotificationHandler, ReconnectPolicy, TransportChannel,
    TransportError, TransportResult, NOTIFICATION_EVENT,
};
use crate::credentials::CredentialStore;
use crate::models::notification::Notification;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Named event as sent by the notification gateway: `{"event": .., "data": ..}`.
#[derive(Debug, Deserialize)]
struct EventFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Push channel over an authenticated WebSocket.
///
/// One background task owns the socket. When the socket drops the task
/// retries per `ReconnectPolicy` and gives up after the last attempt; a later
/// `connect()` starts a fresh task.
pub struct WebSocketChannel {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    url: Url,
    credentials: Arc<dyn CredentialStore>,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    connected: AtomicBool,
    handlers: Arc<HandlerRegistry>,
}

impl WebSocketChannel {
    pub fn new(
        url: &str,
        credentials: Arc<dyn CredentialStore>,
        policy: ReconnectPolicy,
        connect_timeout: Duration,
    ) -> TransportResult<Self> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidUrl(format!(
                "{url}: expected a ws:// or wss:// URL"
            )));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                url: parsed,
                credentials,
                policy,
                connect_timeout,
                connected: AtomicBool::new(false),
                handlers: HandlerRegistry::new(),
            }),
            task: Mutex::new(None),
        })
    }

    fn task_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.task_slot().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl TransportChannel for WebSocketChannel {
    async fn connect(&self) -> TransportResult<()> {
        if self.inner.credentials.token().is_none() {
            return Err(TransportError::MissingCredential);
        }

        let mut slot = self.task_slot();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("websocket session already running");
            return Ok(());
        }

        info!(url = %self.inner.url, "opening websocket");
        *slot = Some(tokio::spawn(connection_loop(self.inner.clone())));
        Ok(())
    }

    async fn disconnect(&self) {
        let handle = self.task_slot().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.handlers.clear();
        info!("websocket disconnected");
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn on_notification(&self, handler: NotificationHandler) -> HandlerGuard {
        self.inner.handlers.register(handler)
    }
}

/// Connection loop with reconnection logic.
async fn connection_loop(inner: Arc<Inner>) {
    let mut attempt: u32 = 0;
    loop {
        match inner.open().await {
            Ok(socket) => {
                attempt = 0;
                inner.connected.store(true, Ordering::SeqCst);
                info!("websocket connected");

                match inner.run_connection(socket).await {
                    Ok(()) => info!("websocket closed by server"),
                    Err(e) => warn!(error = %e, "websocket interrupted"),
                }
                inner.connected.store(false, Ordering::SeqCst);
            }
            Err(e) => warn!(error = %e, attempt, "connect_error"),
        }

        attempt += 1;
        if !inner.policy.should_retry(attempt) {
            warn!(
                attempts = inner.policy.max_attempts,
                "giving up on websocket reconnects"
            );
            return;
        }
        let delay = inner.policy.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::time::sleep(delay).await;
    }
}

impl Inner {
    async fn open(&self) -> TransportResult<Socket> {
        let token = self
            .credentials
            .token()
            .ok_or(TransportError::MissingCredential)?;

        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TransportError::InvalidCredential)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))??;
        Ok(socket)
    }

    async fn run_connection(&self, socket: Socket) -> TransportResult<()> {
        let (mut write, mut read) = socket.split();

        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => {
                    if let Some(notification) = decode_notification(text.as_str()) {
                        self.handlers.dispatch(notification);
                    }
                }
                Message::Ping(data) => write.send(Message::Pong(data)).await?,
                Message::Close(frame) => {
                    debug!(?frame, "close frame received");
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Extract the notification from a `notification` event frame. Other events
/// are ignored; malformed frames are logged and dropped.
fn decode_notification(text: &str) -> Option<Notification> {
    let frame: EventFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "dropping malformed frame");
            return None;
        }
    };

    if frame.event != NOTIFICATION_EVENT {
        debug!(event = %frame.event, "ignoring event");
        return None;
    }

    match serde_json::from_value(frame.data) {
        Ok(notification) => Some(notification),
        Err(e) => {
            warn!(error = %e, "dropping undecodable notification payload");
            None
        }
    }
}
