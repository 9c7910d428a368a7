// src/transport/mod.rs
pub mod loopback;
pub mod websocket;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::models::notification::Notification;

pub use loopback::LoopbackChannel;
pub use websocket::WebSocketChannel;

/// Name of the only push event the inbox consumes.
pub const NOTIFICATION_EVENT: &str = "notification";

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No credential available; refusing to open the channel")]
    MissingCredential,

    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),

    #[error("Credential cannot be sent as a header")]
    InvalidCredential,

    #[error("Timed out after {0:?} opening the channel")]
    Timeout(Duration),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type NotificationHandler = Arc<dyn Fn(Notification) + Send + Sync>;

/// Persistent, self-reconnecting push channel.
///
/// Only one underlying connection exists per channel value; reconnects replace
/// it. Consumers observe reachability through `is_connected` alone.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Open the channel. No-op when already open. Fails without any network
    /// attempt when no credential is available.
    async fn connect(&self) -> TransportResult<()>;

    /// Tear the connection down and drop every registered handler.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Register a handler for `notification` events. Dropping the returned
    /// guard (or calling `unsubscribe`) removes it.
    fn on_notification(&self, handler: NotificationHandler) -> HandlerGuard;
}

/// Backoff applied between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt: doubling from `initial_delay`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

/// Handler table shared by channel implementations.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, NotificationHandler)>>,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(self: &Arc<Self>, handler: NotificationHandler) -> HandlerGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, handler));
        HandlerGuard {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Hand a notification to every handler, in registration order.
    pub fn dispatch(&self, notification: Notification) {
        let handlers: Vec<NotificationHandler> =
            self.lock().iter().map(|(_, h)| h.clone()).collect();
        debug!(id = %notification.id, handlers = handlers.len(), "dispatching push");
        for handler in handlers {
            handler(notification.clone());
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.lock().retain(|(hid, _)| *hid != id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, NotificationHandler)>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Registration handle returned by `TransportChannel::on_notification`.
#[must_use = "dropping the guard unregisters the handler"]
pub struct HandlerGuard {
    id: u64,
    registry: Weak<HandlerRegistry>,
}

impl HandlerGuard {
    pub fn unsubscribe(self) {}
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn backoff_doubles_up_to_ceiling() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=6).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5, 5]);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(5));
        assert!(!policy.should_retry(6));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn dropping_guard_unregisters_handler() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let guard = registry.register(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(registry.len(), 1);

        drop(guard);
        assert!(registry.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
