//! 代理路径识别
//!
//! 只识别一种形状：`/tools/{toolId}/proxy{subPath}`，subPath 可以为空，
//! 非空时必须以 `/` 开头。不匹配的路径交给其他处理器。

/// 识别出的代理路由
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    /// 工具 id（已做百分号解码）
    pub tool_id: String,
    /// 上游子路径，保持原始编码
    pub sub_path: String,
}

impl ProxyRoute {
    /// 匹配 API 前缀之后的路径
    ///
    /// 区分大小写，只尝试一次。
    pub fn match_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix("/tools/")?;
        let (raw_id, rest) = rest.split_once('/')?;
        if raw_id.is_empty() {
            return None;
        }

        let sub_path = rest.strip_prefix("proxy")?;
        if !sub_path.is_empty() && !sub_path.starts_with('/') {
            return None;
        }

        let tool_id = urlencoding::decode(raw_id).ok()?.into_owned();
        Some(Self {
            tool_id,
            sub_path: sub_path.to_string(),
        })
    }
}

/// 去掉 API 前缀，返回前缀之后的路径
///
/// 前缀为空时原样返回；前缀必须落在路径段边界上。
pub fn strip_api_prefix<'a>(path: &'a str, api_prefix: &str) -> Option<&'a str> {
    let prefix = api_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
