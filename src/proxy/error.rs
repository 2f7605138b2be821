//! 代理模块错误类型定义

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::tools::{AccessMode, RegistryError, ToolSummary};

/// 上游传输层失败（DNS / 连接 / 超时 / TLS）
///
/// 保留原始错误码、错误信息和目标 URL，代理与连通性探测共用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub code: &'static str,
    pub message: String,
    pub target_url: String,
}

impl TransportFailure {
    /// 从 reqwest 错误构造
    pub fn from_reqwest(err: &reqwest::Error, target_url: &str) -> Self {
        Self {
            code: transport_code(err),
            message: error_chain(err),
            target_url: target_url.to_string(),
        }
    }
}

/// 将 reqwest 错误归类为稳定的错误码
pub fn transport_code(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "TIMEOUT"
    } else if err.is_connect() {
        "CONNECT_FAILED"
    } else if err.is_body() {
        "BODY_FAILED"
    } else if err.is_decode() {
        "DECODE_FAILED"
    } else if err.is_request() {
        "REQUEST_FAILED"
    } else {
        "UNKNOWN"
    }
}

/// 拼接错误及其 source 链
///
/// reqwest 的顶层信息通常只有 "error sending request"，真正原因在 source 中。
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// 代理请求错误
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 注册表为空
    #[error("未配置任何管理工具")]
    NoToolsConfigured,

    /// 工具 id 不存在
    #[error("工具不存在: {tool_id}")]
    ToolNotFound {
        tool_id: String,
        available: Vec<ToolSummary>,
    },

    /// 访问模式禁止代理
    #[error("工具 {tool_id} 不支持 iframe 访问 ({})", .mode.as_str())]
    AccessDenied { tool_id: String, mode: AccessMode },

    /// 注册表内容损坏或工具配置无效
    #[error("工具配置错误: {0}")]
    Configuration(String),

    /// 上游传输失败，不会自动重试
    #[error("上游请求失败 ({}): {}", .0.code, .0.message)]
    UpstreamTransport(TransportFailure),

    /// HTML 文档超过缓冲上限
    #[error("上游文档超过 {limit} 字节上限")]
    DocumentTooLarge { limit: usize, target_url: String },

    /// 设置存储错误
    #[error("存储错误: {0}")]
    Storage(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ProxyError {
    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoToolsConfigured | Self::ToolNotFound { .. } => StatusCode::NOT_FOUND,
            Self::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Self::UpstreamTransport(_) | Self::DocumentTooLarge { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 构造 JSON 错误体，字段名与管理界面约定一致
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::NoToolsConfigured => json!({ "error": "No management tools configured" }),
            Self::ToolNotFound { tool_id, available } => json!({
                "error": "Tool not found",
                "toolId": tool_id,
                "availableTools": available,
            }),
            Self::AccessDenied { tool_id, mode } => json!({
                "error": "Tool does not support iframe access",
                "toolId": tool_id,
                "accessMode": mode.as_str(),
            }),
            Self::Configuration(message) => json!({
                "error": "Invalid tools configuration",
                "message": message,
            }),
            Self::UpstreamTransport(failure) => json!({
                "error": "Proxy Error",
                "message": failure.message,
                "details": failure.code,
                "targetUrl": failure.target_url,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
            Self::DocumentTooLarge { limit, target_url } => json!({
                "error": "Upstream document too large",
                "message": format!("HTML document exceeds {} bytes", limit),
                "details": "DOCUMENT_TOO_LARGE",
                "targetUrl": target_url,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
            Self::Storage(message) => json!({
                "error": "Failed to read management tools",
                "message": message,
            }),
            Self::Internal(message) => json!({
                "error": "Internal proxy error",
                "message": message,
            }),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

impl From<RegistryError> for ProxyError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Storage(e) => Self::Storage(e.to_string()),
            RegistryError::Task(e) => Self::Storage(e.to_string()),
            RegistryError::Malformed { message, .. } => Self::Configuration(message),
            RegistryError::Invalid(message) => Self::Configuration(message),
        }
    }
}
