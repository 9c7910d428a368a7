// src/models/notification.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which dashboard role a notification kind is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleScope {
    Admin,
    Manager,
}

/// Closed set of notification kinds delivered to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    // Admin-facing
    VerificationSubmitted,
    SiteRegistrationSubmitted,
    SosCreated,

    // Manager-facing: content submissions
    ContentSubmitted,
    ContentApproved,
    ContentRejected,
    ContentRevisionRequested,
    ContentPublished,

    // Manager-facing: site status
    SiteApproved,
    SiteRejected,
    SiteSuspended,
    SiteReactivated,
}

impl NotificationType {
    pub const ALL: [NotificationType; 12] = [
        NotificationType::VerificationSubmitted,
        NotificationType::SiteRegistrationSubmitted,
        NotificationType::SosCreated,
        NotificationType::ContentSubmitted,
        NotificationType::ContentApproved,
        NotificationType::ContentRejected,
        NotificationType::ContentRevisionRequested,
        NotificationType::ContentPublished,
        NotificationType::SiteApproved,
        NotificationType::SiteRejected,
        NotificationType::SiteSuspended,
        NotificationType::SiteReactivated,
    ];

    pub fn scope(&self) -> RoleScope {
        match self {
            NotificationType::VerificationSubmitted
            | NotificationType::SiteRegistrationSubmitted
            | NotificationType::SosCreated => RoleScope::Admin,
            _ => RoleScope::Manager,
        }
    }

    /// Wire name, as used in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::VerificationSubmitted => "verification_submitted",
            NotificationType::SiteRegistrationSubmitted => "site_registration_submitted",
            NotificationType::SosCreated => "sos_created",
            NotificationType::ContentSubmitted => "content_submitted",
            NotificationType::ContentApproved => "content_approved",
            NotificationType::ContentRejected => "content_rejected",
            NotificationType::ContentRevisionRequested => "content_revision_requested",
            NotificationType::ContentPublished => "content_published",
            NotificationType::SiteApproved => "site_approved",
            NotificationType::SiteRejected => "site_rejected",
            NotificationType::SiteSuspended => "site_suspended",
            NotificationType::SiteReactivated => "site_reactivated",
        }
    }
}

/// One inbox entry. `id` is the merge key shared by fetch and push delivery.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// One page of the caller's inbox as returned by the directory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InboxPage {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    pub pagination: Pagination,
}

/// Query for `NotificationDirectory::list`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl ListQuery {
    pub fn first_page(limit: u32) -> Self {
        Self {
            page: 1,
            limit,
            is_read: None,
        }
    }
}
