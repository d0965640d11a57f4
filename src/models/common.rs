use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Response envelope shared by the platform backend.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    /// Unwraps the payload, turning an unsuccessful or empty envelope into an error.
    pub fn into_data(self) -> AppResult<T> {
        if !self.success {
            let reason = self
                .error
                .map(|e| format!("{}: {}", e.code, e.message))
                .or(self.message)
                .unwrap_or_else(|| "request was not successful".to_string());
            return Err(AppError::ExternalApiError(reason));
        }

        self.data
            .ok_or_else(|| AppError::ExternalApiError("response data is empty".to_string()))
    }
}
