//! 目标地址解析
//!
//! 根据 (toolId, subPath, query) 和当前工具列表计算上游 URL，并执行访问策略。

use super::error::ProxyError;
use crate::tools::{lookup_tool, ToolDefinition, ToolLookup};

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub url: String,
    pub tool: ToolDefinition,
}

/// 拼接上游 URL：`base_url + sub_path`，查询串非空时追加 `?query`
pub fn build_target_url(base_url: &str, sub_path: &str, query: &str) -> String {
    let mut url = String::with_capacity(base_url.len() + sub_path.len() + query.len() + 1);
    url.push_str(base_url.trim_end_matches('/'));
    url.push_str(sub_path);
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// 解析代理目标
///
/// # Errors
/// - 工具列表为空 / 找不到 id → `NoToolsConfigured` / `ToolNotFound`
/// - 访问模式为 new_tab_only → `AccessDenied`
pub fn resolve_target(
    tools: &[ToolDefinition],
    tool_id: &str,
    sub_path: &str,
    query: &str,
) -> Result<ResolvedTarget, ProxyError> {
    let tool = match lookup_tool(tools, tool_id) {
        ToolLookup::Found(tool) => tool,
        ToolLookup::NoTools => return Err(ProxyError::NoToolsConfigured),
        ToolLookup::NotFound => {
            return Err(ProxyError::ToolNotFound {
                tool_id: tool_id.to_string(),
                available: tools.iter().map(ToolDefinition::summary).collect(),
            })
        }
    };

    if !tool.access_mode.allows_proxy() {
        return Err(ProxyError::AccessDenied {
            tool_id: tool.id.clone(),
            mode: tool.access_mode,
        });
    }

    Ok(ResolvedTarget {
        url: build_target_url(&tool.base_url, sub_path, query),
        tool: tool.clone(),
    })
}
