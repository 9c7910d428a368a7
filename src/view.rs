//! Read-only projections handed to the presentation layer.

use serde::Serialize;

use crate::models::notification::Notification;
use crate::sync::InboxState;

/// Largest unread count shown verbatim on the bell badge.
pub const BADGE_LIMIT: u64 = 9;

/// Bell badge text; `None` hides the badge.
pub fn badge_label(unread_count: u64) -> Option<String> {
    match unread_count {
        0 => None,
        n if n <= BADGE_LIMIT => Some(n.to_string()),
        _ => Some(format!("{BADGE_LIMIT}+")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBadge {
    Connected,
    Disconnected,
}

impl From<bool> for HealthBadge {
    fn from(connected: bool) -> Self {
        if connected {
            HealthBadge::Connected
        } else {
            HealthBadge::Disconnected
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboxView {
    pub feed: Vec<Notification>,
    pub badge: Option<String>,
    pub health: HealthBadge,
    pub is_loading: bool,
}

impl From<&InboxState> for InboxView {
    fn from(state: &InboxState) -> Self {
        Self {
            feed: state.notifications.clone(),
            badge: badge_label(state.unread_count),
            health: state.connection_health.into(),
            is_loading: state.is_loading,
        }
    }
}
