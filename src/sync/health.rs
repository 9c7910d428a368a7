// src/sync/health.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::engine::InboxEngine;
use crate::config::DEFAULT_POLL_INTERVAL_MS;
use crate::transport::TransportChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Connected,
    Disconnected,
}

impl HealthState {
    pub fn is_connected(self) -> bool {
        self == HealthState::Connected
    }

    fn from_flag(connected: bool) -> Self {
        if connected {
            HealthState::Connected
        } else {
            HealthState::Disconnected
        }
    }
}

/// Two-state sampler over `TransportChannel::is_connected`, starting
/// disconnected.
pub struct HealthProbe {
    channel: Arc<dyn TransportChannel>,
    state: HealthState,
}

impl HealthProbe {
    pub fn new(channel: Arc<dyn TransportChannel>) -> Self {
        Self {
            channel,
            state: HealthState::Disconnected,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Sample once; returns the new state only on a transition.
    pub fn poll(&mut self) -> Option<HealthState> {
        let sampled = HealthState::from_flag(self.channel.is_connected());
        if sampled == self.state {
            return None;
        }
        self.state = sampled;
        Some(sampled)
    }
}

/// Periodic poller that republishes channel health into the engine.
///
/// Polling rather than listening to connect/disconnect events keeps the
/// displayed status correct within one interval even if such events are lost.
pub struct HealthMonitor {
    shutdown: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn spawn(
        channel: Arc<dyn TransportChannel>,
        engine: InboxEngine,
        interval: Duration,
    ) -> Self {
        let interval = if interval.is_zero() {
            warn!(
                fallback_ms = DEFAULT_POLL_INTERVAL_MS,
                "zero health poll interval, using default"
            );
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        } else {
            interval
        };
        let (shutdown, mut shutdown_rx) = broadcast::channel::<()>(1);
        let mut probe = HealthProbe::new(channel);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if let Some(state) = probe.poll() {
                            info!(?state, "channel health changed");
                            engine.set_health(state.is_connected());
                        }
                    }
                }
            }
            debug!("health monitor stopped");
        });

        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Stop polling and wait for the task to exit.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
