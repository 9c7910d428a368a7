// src/session.rs
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::alerts::{AlertListener, AudioCue, DesktopPopup};
use crate::directory::NotificationDirectory;
use crate::sync::{HealthMonitor, InboxEngine, InboxState, Subscription};
use crate::transport::{HandlerGuard, TransportChannel};

pub type StateObserver = Arc<dyn Fn(&InboxState) + Send + Sync>;

/// Collaborators a session is built from. The session takes ownership of the
/// channel; nothing else should connect or disconnect it.
pub struct SessionParts {
    pub directory: Arc<dyn NotificationDirectory>,
    pub channel: Arc<dyn TransportChannel>,
    pub page_size: u32,
    pub poll_interval: Duration,
    pub alerts: Option<(Arc<dyn DesktopPopup>, Arc<dyn AudioCue>)>,
    /// Subscribed before anything else runs, so it sees the initial fetch
    /// and the first health change.
    pub observer: Option<StateObserver>,
}

/// One signed-in inbox: engine, push binding, health monitor and alerts,
/// torn down together.
pub struct InboxSession {
    engine: InboxEngine,
    channel: Arc<dyn TransportChannel>,
    observer: Option<Subscription>,
    push: Option<HandlerGuard>,
    monitor: Option<HealthMonitor>,
    alerts: Option<AlertListener>,
}

impl InboxSession {
    pub async fn start(parts: SessionParts) -> Self {
        let engine = InboxEngine::new(parts.directory, parts.page_size);
        let observer = parts
            .observer
            .map(|observer| engine.subscribe(move |state| observer(state)));

        let alerts = parts
            .alerts
            .map(|(popup, cue)| AlertListener::spawn(engine.arrivals(), popup, cue));

        let push = engine.attach(parts.channel.as_ref());
        if let Err(e) = parts.channel.connect().await {
            warn!(error = %e, "live channel not started; inbox will only refresh on demand");
        }

        let monitor = HealthMonitor::spawn(parts.channel.clone(), engine.clone(), parts.poll_interval);

        engine.fetch_all().await;
        info!(
            unread = engine.snapshot().unread_count,
            "inbox session started"
        );

        Self {
            engine,
            channel: parts.channel,
            observer,
            push: Some(push),
            monitor: Some(monitor),
            alerts,
        }
    }

    pub fn engine(&self) -> &InboxEngine {
        &self.engine
    }

    pub async fn shutdown(mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop().await;
        }
        if let Some(alerts) = self.alerts.take() {
            alerts.stop();
        }
        drop(self.push.take());
        self.channel.disconnect().await;
        drop(self.observer.take());
        info!("inbox session closed");
    }
}
