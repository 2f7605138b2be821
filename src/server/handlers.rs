//! HTTP 请求处理器

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::error::ManagementError;
use crate::proxy::{strip_api_prefix, ConnectivityProber, ProbeReport, ProxyRoute, ToolProxy};
use crate::tools::{lookup_tool, ToolDefinition, ToolLookup, ToolRegistry};

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub proxy: Arc<ToolProxy>,
    pub prober: Arc<ConnectivityProber>,
    /// 规范化后的 API 前缀（无尾部斜杠，可以为空）
    pub api_prefix: String,
}

/// GET /tools
pub async fn list_tools(
    State(state): State<AppState>,
) -> Result<Json<Vec<ToolDefinition>>, ManagementError> {
    let tools = state.registry.list().await?;
    Ok(Json(tools.as_ref().clone()))
}

/// POST /tools
///
/// 请求体 `{ "tools": [...] }`，整体替换工具列表。
pub async fn save_tools(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ManagementError> {
    let Json(payload) = payload.map_err(|e| ManagementError::InvalidPayload(e.body_text()))?;

    let entries = match payload.get("tools") {
        Some(Value::Array(entries)) => entries.clone(),
        _ => {
            return Err(ManagementError::InvalidPayload(
                "Tools must be an array".to_string(),
            ))
        }
    };

    let tools: Vec<ToolDefinition> = serde_json::from_value(Value::Array(entries))
        .map_err(|e| ManagementError::InvalidPayload(format!("Invalid tool definition: {}", e)))?;

    let saved = state.registry.replace(tools).await?;

    Ok(Json(json!({
        "message": "Management tools saved successfully",
        "count": saved.len(),
    })))
}

/// POST /tools/{tool_id}/test
pub async fn test_tool(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
) -> Result<Json<ProbeReport>, ManagementError> {
    let tools = state.registry.list().await?;
    let tool = match lookup_tool(&tools, &tool_id) {
        ToolLookup::Found(tool) => tool,
        ToolLookup::NoTools => return Err(ManagementError::NoToolsConfigured),
        ToolLookup::NotFound => return Err(ManagementError::ToolNotFound(tool_id)),
    };

    Ok(Json(state.prober.probe(tool).await))
}

/// GET /api/health
///
/// 健康检查端点
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "tool-gateway",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// 未命中显式路由的请求：代理路径交给代理服务，其余返回 404
pub async fn proxy_dispatch(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();

    let route = strip_api_prefix(path, &state.api_prefix).and_then(ProxyRoute::match_path);
    let Some(route) = route else {
        return not_found(path);
    };

    match state
        .proxy
        .handle(
            route,
            parts.method,
            parts.uri.query(),
            parts.headers,
            body,
        )
        .await
    {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

fn not_found(path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "path": path,
        })),
    )
        .into_response()
}
