// src/directory/http.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{DirectoryError, DirectoryResult, NotificationDirectory};
use crate::credentials::CredentialStore;
use crate::models::notification::{InboxPage, ListQuery, Notification};
use crate::utils::api_response::ApiResponse;

/// `NotificationDirectory` backed by the dashboard REST API.
///
/// Routes, relative to the API base URL:
/// - `GET    /notifications?page=&limit=&is_read=`
/// - `PATCH  /notifications/{id}/read`
/// - `PATCH  /notifications/read-all`
/// - `DELETE /notifications/{id}`
/// - `DELETE /notifications`
#[derive(Clone)]
pub struct HttpDirectory {
    client: Client,
    base: Url,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpDirectory {
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialStore>,
        timeout: Duration,
    ) -> DirectoryResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| DirectoryError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(DirectoryError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            credentials,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> DirectoryResult<RequestBuilder> {
        let token = self
            .credentials
            .token()
            .ok_or(DirectoryError::MissingCredential)?;
        let url = self.endpoint(segments);
        debug!(%method, %url, "directory request");
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> DirectoryResult<ApiResponse<T>> {
        let response = request.send().await?;
        read_envelope(response).await
    }
}

/// Decode the envelope, folding the HTTP status into it so that a non-2xx
/// reply is never mistaken for success.
async fn read_envelope<T: DeserializeOwned>(response: Response) -> DirectoryResult<ApiResponse<T>> {
    let status = response.status();
    let body = response.bytes().await?;

    match serde_json::from_slice::<ApiResponse<T>>(&body) {
        Ok(mut envelope) => {
            if !status.is_success() {
                envelope.success = false;
            }
            if envelope.status_code == 0 {
                envelope.status_code = status.as_u16();
            }
            Ok(envelope)
        }
        Err(e) if status.is_success() => Err(e.into()),
        Err(_) => Err(DirectoryError::Api {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        }),
    }
}

#[async_trait]
impl NotificationDirectory for HttpDirectory {
    async fn list(&self, query: ListQuery) -> DirectoryResult<InboxPage> {
        let request = self.request(Method::GET, &["notifications"])?.query(&query);
        self.send::<InboxPage>(request).await?.into_data()
    }

    async fn mark_read(&self, id: &str) -> DirectoryResult<Notification> {
        let request = self.request(Method::PATCH, &["notifications", id, "read"])?;
        self.send::<Notification>(request).await?.into_data()
    }

    async fn mark_all_read(&self) -> DirectoryResult<()> {
        let request = self.request(Method::PATCH, &["notifications", "read-all"])?;
        self.send::<serde_json::Value>(request).await?.into_unit()
    }

    async fn delete(&self, id: &str) -> DirectoryResult<()> {
        let request = self.request(Method::DELETE, &["notifications", id])?;
        self.send::<serde_json::Value>(request).await?.into_unit()
    }

    async fn delete_all(&self) -> DirectoryResult<()> {
        let request = self.request(Method::DELETE, &["notifications"])?;
        self.send::<serde_json::Value>(request).await?.into_unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;

    fn directory(base: &str) -> HttpDirectory {
        HttpDirectory::new(
            base,
            Arc::new(StaticCredentials::new(Some("t".into()))),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn endpoint_keeps_base_path_and_escapes_ids() {
        let dir = directory("http://localhost:3000/api/");
        assert_eq!(
            dir.endpoint(&["notifications", "a/b", "read"]).as_str(),
            "http://localhost:3000/api/notifications/a%2Fb/read"
        );

        let dir = directory("http://localhost:3000/api");
        assert_eq!(
            dir.endpoint(&["notifications"]).as_str(),
            "http://localhost:3000/api/notifications"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        let result = HttpDirectory::new(
            "mailto:someone@example.com",
            Arc::new(StaticCredentials::default()),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(DirectoryError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn missing_credential_fails_before_sending() {
        let dir = HttpDirectory::new(
            "http://127.0.0.1:9",
            Arc::new(StaticCredentials::default()),
            Duration::from_secs(5),
        )
        .unwrap();
        let result = dir.delete_all().await;
        assert!(matches!(result, Err(DirectoryError::MissingCredential)));
    }
}
