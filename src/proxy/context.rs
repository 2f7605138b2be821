//! 单次代理请求的上下文

use axum::http::{HeaderMap, Method};
use uuid::Uuid;

use crate::tools::ToolDefinition;

/// 工具的代理前缀 `{api_prefix}/tools/{toolId}/proxy`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyPrefix(String);

impl ProxyPrefix {
    pub fn new(api_prefix: &str, tool_id: &str) -> Self {
        Self(format!(
            "{}/tools/{}/proxy",
            api_prefix.trim_end_matches('/'),
            urlencoding::encode(tool_id)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 拼接上游路径（以 `/` 开头或为空）
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }

    /// 路径是否已经位于本前缀之下
    pub fn covers(&self, path: &str) -> bool {
        match path.strip_prefix(self.0.as_str()) {
            Some(rest) => {
                rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('#')
            }
            None => false,
        }
    }
}

/// 代理请求上下文，仅在请求处理期间存在
#[derive(Debug, Clone)]
pub struct ProxyRequestContext {
    pub request_id: Uuid,
    pub method: Method,
    pub tool_id: String,
    pub sub_path: String,
    /// 原始查询串（不含 `?`）
    pub query: String,
    pub inbound_headers: HeaderMap,
    pub prefix: ProxyPrefix,
    pub target_url: String,
    pub tool: ToolDefinition,
}
