use std::sync::{Arc, RwLock};

/// Source of the bearer credential attached to directory calls and the
/// live channel. Read at call time, so a refreshed token is picked up on
/// the next request or reconnect.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// In-memory credential slot. Empty strings count as absent.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    token: Arc<RwLock<Option<String>>>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: Option<String>) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = token;
    }
}

impl CredentialStore for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .filter(|t| !t.trim().is_empty())
    }
}
