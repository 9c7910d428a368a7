use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::directory::DirectoryError;

/// Envelope every directory endpoint wraps its payload in.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    /// Create a success envelope
    pub fn success(status_code: u16, message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            status_code,
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: Some(data),
            errors: None,
        }
    }

    /// Create an error envelope
    pub fn error(
        status_code: u16,
        message: impl Into<String>,
        errors: Option<serde_json::Value>,
    ) -> Self {
        ApiResponse {
            success: false,
            status_code,
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: None,
            errors,
        }
    }

    /// Unwrap the payload, turning a failed or empty envelope into an error.
    pub fn into_data(self) -> Result<T, DirectoryError> {
        if !self.success {
            return Err(self.into_api_error());
        }
        self.data.ok_or(DirectoryError::MissingData)
    }

    /// Check the envelope for endpoints without a payload.
    pub fn into_unit(self) -> Result<(), DirectoryError> {
        if self.success {
            Ok(())
        } else {
            Err(self.into_api_error())
        }
    }

    fn into_api_error(self) -> DirectoryError {
        DirectoryError::Api {
            status: self.status_code,
            message: self.message,
        }
    }
}
