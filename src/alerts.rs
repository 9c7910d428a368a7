//! Desktop popup and audio cue for newly pushed notifications.
//!
//! These run off the engine's arrival stream in their own task. Nothing here
//! can touch inbox state, and every failure stays local to one effect.

use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::notification::Notification;

/// How long a headless popup stays visible.
const POPUP_TTL: Duration = Duration::from_secs(10);
const MAX_VISIBLE_POPUPS: u64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert output unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Undecided,
}

pub trait DesktopPopup: Send + Sync {
    fn permission(&self) -> Permission;

    /// Show a popup. A popup with the same `tag` replaces the previous one.
    fn show(&self, tag: &str, title: &str, body: &str) -> Result<(), AlertError>;
}

pub trait AudioCue: Send + Sync {
    fn play(&self) -> Result<(), AlertError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub title: String,
    pub body: String,
}

/// Headless popup: logs each popup and tracks the visible set, keyed by tag,
/// in a TTL cache.
pub struct TracingPopup {
    permission: Permission,
    visible: Cache<String, Popup>,
}

impl TracingPopup {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            visible: Cache::builder()
                .max_capacity(MAX_VISIBLE_POPUPS)
                .time_to_live(POPUP_TTL)
                .build(),
        }
    }

    pub fn visible(&self, tag: &str) -> Option<Popup> {
        self.visible.get(tag)
    }

    pub fn visible_count(&self) -> u64 {
        self.visible.run_pending_tasks();
        self.visible.entry_count()
    }
}

impl DesktopPopup for TracingPopup {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn show(&self, tag: &str, title: &str, body: &str) -> Result<(), AlertError> {
        info!(tag, title, body, "🔔 notification popup");
        self.visible.insert(
            tag.to_string(),
            Popup {
                title: title.to_string(),
                body: body.to_string(),
            },
        );
        Ok(())
    }
}

/// Terminal bell on stderr.
pub struct BellCue;

impl AudioCue for BellCue {
    fn play(&self) -> Result<(), AlertError> {
        let mut err = std::io::stderr().lock();
        err.write_all(b"\x07")?;
        err.flush()?;
        Ok(())
    }
}

/// Background consumer of the arrival stream.
pub struct AlertListener {
    task: JoinHandle<()>,
}

impl AlertListener {
    pub fn spawn(
        mut arrivals: broadcast::Receiver<Notification>,
        popup: Arc<dyn DesktopPopup>,
        cue: Arc<dyn AudioCue>,
    ) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match arrivals.recv().await {
                    Ok(notification) => alert(&notification, popup.as_ref(), cue.as_ref()),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "alert listener lagged, skipping arrivals");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("alert listener stopped");
        });
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Run both effects for one arrival. Errors and panics in one effect are
/// logged at debug level and do not stop the other.
pub fn alert(notification: &Notification, popup: &dyn DesktopPopup, cue: &dyn AudioCue) {
    isolated("popup", || {
        if popup.permission() != Permission::Granted {
            return Ok(());
        }
        popup.show(&notification.id, &notification.title, &notification.message)
    });
    isolated("audio cue", || cue.play());
}

fn isolated(effect: &str, run: impl FnOnce() -> Result<(), AlertError>) {
    match catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(effect, error = %e, "alert effect failed"),
        Err(_) => debug!(effect, "alert effect panicked"),
    }
}
