// src/sync/engine.rs
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, warn};

use super::state::InboxState;
use crate::directory::NotificationDirectory;
use crate::models::notification::{ListQuery, Notification};
use crate::transport::{HandlerGuard, TransportChannel};

/// Capacity of the arrival broadcast. Slow listeners lag rather than block.
pub const ARRIVAL_CHANNEL_CAPACITY: usize = 64;

type Observer = Arc<dyn Fn(&InboxState) + Send + Sync>;

/// Owner of the inbox state.
///
/// Every mutation goes through one lock, and observers are called in mutation
/// order with the state that mutation produced. Observers run with no engine
/// lock held, so they may read snapshots, mutate, or unsubscribe. User actions update the local
/// state first and then call the directory; a failed remote call is logged and
/// the local change is kept. Only `fetch_all` takes the server as ground truth.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct InboxEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    directory: Arc<dyn NotificationDirectory>,
    page_size: u32,
    core: Mutex<Core>,
    observers: Mutex<Vec<(u64, Observer)>>,
    outbox: Mutex<Outbox>,
    next_observer: AtomicU64,
    latest: watch::Sender<InboxState>,
    arrivals: broadcast::Sender<Notification>,
}

/// States waiting for observer delivery, in mutation order. At most one
/// caller drains it at a time.
#[derive(Default)]
struct Outbox {
    pending: VecDeque<InboxState>,
    draining: bool,
}

#[derive(Default)]
struct Core {
    state: InboxState,
    fetches_in_flight: usize,
}

impl InboxEngine {
    pub fn new(directory: Arc<dyn NotificationDirectory>, page_size: u32) -> Self {
        let (latest, _) = watch::channel(InboxState::default());
        let (arrivals, _) = broadcast::channel(ARRIVAL_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                directory,
                page_size,
                core: Mutex::new(Core::default()),
                observers: Mutex::new(Vec::new()),
                outbox: Mutex::new(Outbox::default()),
                next_observer: AtomicU64::new(0),
                latest,
                arrivals,
            }),
        }
    }

    pub fn snapshot(&self) -> InboxState {
        self.inner.lock_core().state.clone()
    }

    /// Latest published state for async consumers. Intermediate states may
    /// be coalesced; use `subscribe` to see every transition.
    pub fn watch(&self) -> watch::Receiver<InboxState> {
        self.inner.latest.subscribe()
    }

    /// Stream of pushed notifications, sent after the state already holds them.
    pub fn arrivals(&self) -> broadcast::Receiver<Notification> {
        self.inner.arrivals.subscribe()
    }

    /// Register an observer called after each state change, in order.
    ///
    /// Delivery is synchronous on the mutating thread unless another thread
    /// is already delivering, in which case that thread delivers this state
    /// too, right after the ones queued before it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&InboxState) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer.fetch_add(1, Ordering::Relaxed);
        self.inner.lock_observers().push((id, Arc::new(handler)));
        debug!(observer = id, "observer subscribed");
        Subscription {
            id,
            engine: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_observers().len()
    }

    /// Route the channel's push events into `ingest_push`. Dropping the guard
    /// detaches the engine again.
    pub fn attach(&self, channel: &dyn TransportChannel) -> HandlerGuard {
        let engine = Arc::downgrade(&self.inner);
        channel.on_notification(Arc::new(move |notification| {
            if let Some(inner) = engine.upgrade() {
                InboxEngine { inner }.ingest_push(notification);
            }
        }))
    }

    /// Replace list and counter from the first page of the directory.
    ///
    /// Failures keep the previous state. Responses are applied in arrival
    /// order, so a slow older fetch can overwrite a newer one.
    pub async fn fetch_all(&self) {
        let loading = LoadingGuard::begin(self);
        let query = ListQuery::first_page(self.inner.page_size);

        match self.inner.directory.list(query).await {
            Ok(page) => {
                debug!(
                    entries = page.notifications.len(),
                    unread = page.unread_count,
                    "inbox resynced"
                );
                loading.finish(move |state| state.replace_page(page));
            }
            Err(e) => {
                error!(error = %e, "failed to fetch notifications; keeping cached inbox");
                loading.finish(|_| {});
            }
        }
    }

    /// Apply a pushed notification at the head of the list, then announce it
    /// on the arrival stream.
    pub fn ingest_push(&self, notification: Notification) {
        debug!(id = %notification.id, unread = !notification.is_read, "push received");
        let announced = notification.clone();
        self.inner.apply(|core| {
            core.state.prepend(notification);
            true
        });

        if self.inner.arrivals.send(announced).is_err() {
            debug!("no arrival listeners");
        }
    }

    pub async fn mark_read(&self, id: &str) {
        self.inner.apply(|core| core.state.mark_read(id));
        if let Err(e) = self.inner.directory.mark_read(id).await {
            error!(id, error = %e, "mark-read failed; local change kept");
        }
    }

    pub async fn mark_all_read(&self) {
        self.inner.apply(|core| core.state.mark_all_read());
        if let Err(e) = self.inner.directory.mark_all_read().await {
            error!(error = %e, "mark-all-read failed; local change kept");
        }
    }

    pub async fn delete_one(&self, id: &str) {
        self.inner.apply(|core| core.state.remove(id));
        if let Err(e) = self.inner.directory.delete(id).await {
            error!(id, error = %e, "delete failed; local change kept");
        }
    }

    pub async fn delete_all(&self) {
        self.inner.apply(|core| core.state.clear());
        if let Err(e) = self.inner.directory.delete_all().await {
            error!(error = %e, "delete-all failed; local change kept");
        }
    }

    /// Publish channel reachability. Unchanged values are not republished.
    pub fn set_health(&self, connected: bool) {
        self.inner.apply(|core| {
            let changed = core.state.connection_health != connected;
            core.state.connection_health = connected;
            changed
        });
    }
}

impl EngineInner {
    /// Run `mutate` under the state lock and, if it reports a change, queue
    /// the resulting state for observers. Queueing happens under the state
    /// lock, so the queue holds states in mutation order.
    fn apply(&self, mutate: impl FnOnce(&mut Core) -> bool) {
        {
            let mut core = self.lock_core();
            if !mutate(&mut *core) {
                return;
            }
            let snapshot = core.state.clone();
            self.latest.send_replace(snapshot.clone());
            self.lock_outbox().pending.push_back(snapshot);
        }
        self.drain();
    }

    /// Deliver queued states until the queue is empty. Returns immediately
    /// when another caller is already draining.
    fn drain(&self) {
        {
            let mut outbox = self.lock_outbox();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        let mut guard = DrainGuard {
            inner: self,
            finished: false,
        };

        loop {
            let next = {
                let mut outbox = self.lock_outbox();
                match outbox.pending.pop_front() {
                    Some(state) => state,
                    None => {
                        outbox.draining = false;
                        guard.finished = true;
                        return;
                    }
                }
            };
            let observers: Vec<Observer> = self
                .lock_observers()
                .iter()
                .map(|(_, observer)| observer.clone())
                .collect();
            for observer in observers {
                observer(&next);
            }
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_observers(&self) -> MutexGuard<'_, Vec<(u64, Observer)>> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the drain slot if an observer panics mid-delivery.
struct DrainGuard<'a> {
    inner: &'a EngineInner,
    finished: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.lock_outbox().draining = false;
        }
    }
}

/// Keeps `is_loading` raised while any fetch is in flight, including when the
/// fetch future is dropped before completing.
struct LoadingGuard<'a> {
    engine: &'a InboxEngine,
    done: bool,
}

impl<'a> LoadingGuard<'a> {
    fn begin(engine: &'a InboxEngine) -> Self {
        engine.inner.apply(|core| {
            core.fetches_in_flight += 1;
            let changed = !core.state.is_loading;
            core.state.is_loading = true;
            changed
        });
        Self {
            engine,
            done: false,
        }
    }

    fn finish(mut self, update: impl FnOnce(&mut InboxState)) {
        self.done = true;
        self.engine.inner.apply(|core| {
            update(&mut core.state);
            core.fetches_in_flight = core.fetches_in_flight.saturating_sub(1);
            core.state.is_loading = core.fetches_in_flight > 0;
            true
        });
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!("fetch abandoned before completion");
        self.engine.inner.apply(|core| {
            core.fetches_in_flight = core.fetches_in_flight.saturating_sub(1);
            let loading = core.fetches_in_flight > 0;
            let changed = core.state.is_loading != loading;
            core.state.is_loading = loading;
            changed
        });
    }
}

/// Observer registration returned by `InboxEngine::subscribe`.
#[must_use = "dropping the subscription unregisters the observer"]
pub struct Subscription {
    id: u64,
    engine: Weak<EngineInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.engine.upgrade() {
            inner.lock_observers().retain(|(id, _)| *id != self.id);
            debug!(observer = self.id, "observer unsubscribed");
        }
    }
}
