//! 工具连通性探测
//!
//! 对工具的 base_url 发起一次 GET，不跟随重定向，记录延迟和状态。
//! 传输失败也返回结构化结果，不作为错误抛出。

use std::time::{Duration, Instant};

use axum::http::header::X_FRAME_OPTIONS;
use reqwest::redirect::Policy;
use serde::Serialize;

use super::error::{error_chain, transport_code, ProxyError};
use super::forwarder::{inject_basic_auth, DEFAULT_USER_AGENT};
use crate::tools::ToolDefinition;

/// 探测成功（收到了 HTTP 状态）
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSuccess {
    /// status < 500
    pub success: bool,
    pub status: u16,
    pub status_text: String,
    pub response_time: String,
    pub url: String,
    /// 200 <= status < 400
    pub accessible: bool,
    /// 响应中没有 X-Frame-Options
    pub supports_iframe: bool,
    pub timestamp: String,
}

/// 探测失败（传输层错误）
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeFailure {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub response_time: String,
    pub url: String,
    pub accessible: bool,
    pub timestamp: String,
}

/// 探测结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ProbeReport {
    Reached(ProbeSuccess),
    Failed(ProbeFailure),
}

impl ProbeReport {
    /// 上游是否返回了 500 以下的状态
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reached(s) if s.success)
    }
}

/// 连通性探测器
#[derive(Debug, Clone)]
pub struct ConnectivityProber {
    http_client: reqwest::Client,
    user_agent: String,
}

impl ConnectivityProber {
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self, ProxyError> {
        let http_client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            user_agent: user_agent.unwrap_or(DEFAULT_USER_AGENT).to_string(),
        })
    }

    /// 探测一个工具
    pub async fn probe(&self, tool: &ToolDefinition) -> ProbeReport {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&self.user_agent) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }
        inject_basic_auth(&mut headers, tool);

        let started = Instant::now();
        let result = self
            .http_client
            .get(&tool.base_url)
            .headers(headers)
            .send()
            .await;
        let response_time = format!("{}ms", started.elapsed().as_millis());
        let timestamp = chrono::Utc::now().to_rfc3339();

        match result {
            Ok(response) => {
                let status = response.status();
                let report = ProbeSuccess {
                    success: status.as_u16() < 500,
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or("").to_string(),
                    response_time,
                    url: tool.base_url.clone(),
                    accessible: (200..400).contains(&status.as_u16()),
                    supports_iframe: !response.headers().contains_key(X_FRAME_OPTIONS),
                    timestamp,
                };
                tracing::info!(
                    tool_id = %tool.id,
                    status = report.status,
                    response_time = %report.response_time,
                    "Tool probe completed"
                );
                ProbeReport::Reached(report)
            }
            Err(e) => {
                let code = transport_code(&e);
                tracing::warn!(tool_id = %tool.id, code, error = %e, "Tool probe failed");
                ProbeReport::Failed(ProbeFailure {
                    success: false,
                    error: error_chain(&e),
                    code: code.to_string(),
                    response_time,
                    url: tool.base_url.clone(),
                    accessible: false,
                    timestamp,
                })
            }
        }
    }
}
