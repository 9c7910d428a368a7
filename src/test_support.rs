//! Fixtures shared by unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tokio::sync::Notify;

use crate::directory::{DirectoryError, DirectoryResult, NotificationDirectory};
use crate::models::notification::{
    InboxPage, ListQuery, Notification, NotificationType, Pagination,
};

pub fn notification(id: &str, is_read: bool) -> Notification {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Notification {
        id: id.to_string(),
        kind: NotificationType::ContentSubmitted,
        title: format!("Title {id}"),
        message: format!("Message {id}"),
        data: None,
        is_read,
        created_at: base + Duration::seconds(id.len() as i64),
    }
}

pub fn page(notifications: Vec<Notification>, unread_count: u64) -> InboxPage {
    let total = notifications.len() as u64;
    InboxPage {
        notifications,
        unread_count,
        pagination: Pagination {
            page: 1,
            limit: 20,
            total,
            total_pages: 1,
        },
    }
}

/// Scriptable in-memory directory.
#[derive(Default)]
pub struct MockDirectory {
    page: Mutex<Option<InboxPage>>,
    fail_list: AtomicBool,
    fail_mutations: AtomicBool,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_page(page: InboxPage) -> Arc<Self> {
        let dir = Self::default();
        *dir.page.lock().unwrap() = Some(page);
        Arc::new(dir)
    }

    pub fn set_page(&self, page: InboxPage) {
        *self.page.lock().unwrap() = Some(page);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Make every mutation wait until the returned `Notify` is signalled once
    /// per call.
    pub fn hold_mutations(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn mutation(&self, call: String) -> DirectoryResult<()> {
        self.calls.lock().unwrap().push(call);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(DirectoryError::Api {
                status: 500,
                message: "boom".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationDirectory for MockDirectory {
    async fn list(&self, query: ListQuery) -> DirectoryResult<InboxPage> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("list:{}:{}", query.page, query.limit));
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(DirectoryError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(self
            .page
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| page(Vec::new(), 0)))
    }

    async fn mark_read(&self, id: &str) -> DirectoryResult<Notification> {
        self.mutation(format!("mark_read:{id}")).await?;
        Ok(notification(id, true))
    }

    async fn mark_all_read(&self) -> DirectoryResult<()> {
        self.mutation("mark_all_read".into()).await
    }

    async fn delete(&self, id: &str) -> DirectoryResult<()> {
        self.mutation(format!("delete:{id}")).await
    }

    async fn delete_all(&self) -> DirectoryResult<()> {
        self.mutation("delete_all".into()).await
    }
}
