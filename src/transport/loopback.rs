use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    HandlerGuard, HandlerRegistry, NotificationHandler, TransportChannel, TransportError,
    TransportResult,
};
use crate::credentials::CredentialStore;
use crate::models::notification::Notification;

/// In-process channel. Pushes are injected with `deliver`, and link loss is
/// simulated with `set_reachable`; while the channel is wanted it reconnects
/// as soon as the link comes back.
pub struct LoopbackChannel {
    credentials: Arc<dyn CredentialStore>,
    wanted: AtomicBool,
    reachable: AtomicBool,
    connected: AtomicBool,
    sessions: AtomicUsize,
    handlers: Arc<HandlerRegistry>,
}

impl LoopbackChannel {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            credentials,
            wanted: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            sessions: AtomicUsize::new(0),
            handlers: HandlerRegistry::new(),
        }
    }

    /// Push a notification to the registered handlers. Returns `false` when
    /// the channel is down and the event was lost.
    pub fn deliver(&self, notification: Notification) -> bool {
        if !self.is_connected() {
            debug!(id = %notification.id, "loopback down, push dropped");
            return false;
        }
        self.handlers.dispatch(notification);
        true
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        self.refresh();
    }

    /// Number of underlying sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn refresh(&self) {
        let up = self.wanted.load(Ordering::SeqCst) && self.reachable.load(Ordering::SeqCst);
        let was_up = self.connected.swap(up, Ordering::SeqCst);
        if up && !was_up {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            info!("loopback connected");
        } else if !up && was_up {
            info!("loopback disconnected");
        }
    }
}

#[async_trait]
impl TransportChannel for LoopbackChannel {
    async fn connect(&self) -> TransportResult<()> {
        if self.credentials.token().is_none() {
            return Err(TransportError::MissingCredential);
        }
        self.wanted.store(true, Ordering::SeqCst);
        self.refresh();
        Ok(())
    }

    async fn disconnect(&self) {
        self.wanted.store(false, Ordering::SeqCst);
        self.refresh();
        self.handlers.clear();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn on_notification(&self, handler: NotificationHandler) -> HandlerGuard {
        self.handlers.register(handler)
    }
}
