// src/directory/mod.rs
pub mod http;

use async_trait::async_trait;

use crate::models::notification::{InboxPage, ListQuery, Notification};

pub use http::HttpDirectory;

/// Result type for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors that can occur talking to the notification directory
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("No credential available for directory request")]
    MissingCredential,

    #[error("Invalid directory URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Directory response carried no data")]
    MissingData,

    #[error("Failed to decode directory response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Remote CRUD resource holding the caller's inbox. Implementations keep no
/// cache of their own.
#[async_trait]
pub trait NotificationDirectory: Send + Sync {
    async fn list(&self, query: ListQuery) -> DirectoryResult<InboxPage>;

    async fn mark_read(&self, id: &str) -> DirectoryResult<Notification>;

    async fn mark_all_read(&self) -> DirectoryResult<()>;

    async fn delete(&self, id: &str) -> DirectoryResult<()>;

    async fn delete_all(&self) -> DirectoryResult<()>;
}
