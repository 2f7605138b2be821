//! Management API error types
//!
//! Errors returned by the tool CRUD and connectivity-test endpoints,
//! rendered as JSON bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::tools::RegistryError;

/// Management API error type
#[derive(Error, Debug)]
pub enum ManagementError {
    /// Request body rejected
    #[error("请求参数错误: {0}")]
    InvalidPayload(String),

    /// Registry is empty
    #[error("未配置任何管理工具")]
    NoToolsConfigured,

    /// Unknown tool id
    #[error("工具不存在: {0}")]
    ToolNotFound(String),

    /// Registry read/write error
    #[error("工具注册表错误: {0}")]
    Registry(#[from] RegistryError),
}

/// Serializable error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Short, stable description
    pub error: String,
    /// Error code for client-side handling
    pub code: String,
    /// Detail message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ManagementError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::NoToolsConfigured | Self::ToolNotFound(_) => StatusCode::NOT_FOUND,
            Self::Registry(RegistryError::Invalid(_)) => StatusCode::BAD_REQUEST,
            Self::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn to_response_body(&self) -> ErrorResponse {
        let (error, code, message) = match self {
            Self::InvalidPayload(msg) => ("Invalid request", "INVALID_PAYLOAD", Some(msg.clone())),
            Self::NoToolsConfigured => ("No management tools configured", "NO_TOOLS", None),
            Self::ToolNotFound(id) => ("Tool not found", "TOOL_NOT_FOUND", Some(id.clone())),
            Self::Registry(RegistryError::Invalid(msg)) => {
                ("Invalid tool definition", "INVALID_TOOL", Some(msg.clone()))
            }
            Self::Registry(RegistryError::Malformed { message, .. }) => (
                "Invalid tools configuration",
                "CONFIGURATION_ERROR",
                Some(message.clone()),
            ),
            Self::Registry(RegistryError::Storage(e)) => {
                ("Failed to access management tools", "STORAGE_ERROR", Some(e.to_string()))
            }
            Self::Registry(RegistryError::Task(e)) => {
                ("Failed to access management tools", "STORAGE_ERROR", Some(e.to_string()))
            }
        };

        ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
            message,
        }
    }
}

impl IntoResponse for ManagementError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "Management request failed");
        }
        (self.status_code(), Json(self.to_response_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    #[test]
    fn test_error_display() {
        let err = ManagementError::ToolNotFound("radarr".into());
        assert_eq!(err.to_string(), "工具不存在: radarr");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ManagementError::InvalidPayload("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ManagementError::Registry(RegistryError::Invalid("dup".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ManagementError::ToolNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ManagementError::Registry(RegistryError::Storage(StorageError::LockError)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_serialization() {
        let body = ManagementError::ToolNotFound("radarr".into()).to_response_body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Tool not found");
        assert_eq!(json["code"], "TOOL_NOT_FOUND");
        assert_eq!(json["message"], "radarr");

        let json = serde_json::to_value(ManagementError::NoToolsConfigured.to_response_body()).unwrap();
        assert!(json.get("message").is_none());
    }
}
