//! 代理服务
//!
//! 组合 解析 → 转发 → 转换 三个步骤，每个请求在独立的 tracing span 中执行。

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

use super::context::{ProxyPrefix, ProxyRequestContext};
use super::error::ProxyError;
use super::forwarder::UpstreamForwarder;
use super::resolver::resolve_target;
use super::router::ProxyRoute;
use super::transformer::ResponseTransformer;
use crate::tools::ToolRegistry;

/// 代理服务配置
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// 代理路由挂载的 API 前缀
    pub api_prefix: String,
    pub timeout: Duration,
    pub max_html_bytes: usize,
    pub user_agent: Option<String>,
}

/// 工具代理
pub struct ToolProxy {
    registry: Arc<ToolRegistry>,
    forwarder: UpstreamForwarder,
    transformer: ResponseTransformer,
    api_prefix: String,
}

impl ToolProxy {
    pub fn new(registry: Arc<ToolRegistry>, settings: &ProxySettings) -> Result<Self, ProxyError> {
        Ok(Self {
            registry,
            forwarder: UpstreamForwarder::new(settings.timeout, settings.user_agent.as_deref())?,
            transformer: ResponseTransformer::new(settings.max_html_bytes),
            api_prefix: settings.api_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 处理一次代理请求
    pub async fn handle(
        &self,
        route: ProxyRoute,
        method: Method,
        query: Option<&str>,
        headers: HeaderMap,
        body: Body,
    ) -> Result<Response, ProxyError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "proxy",
            %request_id,
            tool_id = %route.tool_id,
            method = %method,
        );

        async move {
            let started = Instant::now();
            let result = self
                .dispatch(request_id, route, method, query.unwrap_or(""), headers, body)
                .await;

            match &result {
                Ok(response) => tracing::info!(
                    status = response.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Proxied request"
                ),
                Err(e) => tracing::warn!(
                    status = e.status_code().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Proxy request failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        request_id: Uuid,
        route: ProxyRoute,
        method: Method,
        query: &str,
        headers: HeaderMap,
        body: Body,
    ) -> Result<Response, ProxyError> {
        let tools = self.registry.list().await?;
        let target = resolve_target(&tools, &route.tool_id, &route.sub_path, query)?;
        tracing::debug!(target_url = %target.url, "Resolved upstream target");

        let ctx = ProxyRequestContext {
            request_id,
            method,
            prefix: ProxyPrefix::new(&self.api_prefix, &route.tool_id),
            tool_id: route.tool_id,
            sub_path: route.sub_path,
            query: query.to_string(),
            inbound_headers: headers,
            target_url: target.url,
            tool: target.tool,
        };

        let upstream = self
            .forwarder
            .forward(
                ctx.method.clone(),
                &ctx.target_url,
                &ctx.tool,
                &ctx.inbound_headers,
                body,
            )
            .await?;

        self.transformer.transform(&ctx, upstream).await
    }
}
