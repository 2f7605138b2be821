//! 上游请求转发器
//!
//! 每个入站请求对应一次上游请求：复制白名单内的请求头、补齐默认值、
//! 注入工具配置的 Basic 认证，非 GET/HEAD 请求体以流的形式直接转发。
//! 不跟随重定向，也不重试。

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{
    HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, AUTHORIZATION, COOKIE,
    ORIGIN, REFERER, USER_AGENT,
};
use axum::http::{HeaderMap, Method};
use reqwest::redirect::Policy;
use reqwest::Url;

use super::error::{ProxyError, TransportFailure};
use crate::tools::ToolDefinition;

/// 默认 User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("ToolGateway/", env!("CARGO_PKG_VERSION"));

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// 允许从入站请求复制到上游的请求头
const FORWARDED_HEADERS: &[&str] = &[
    "user-agent",
    "accept",
    "accept-language",
    "referer",
    "authorization",
    "x-csrf-token",
    "x-xsrf-token",
    "x-requested-with",
    "content-type",
    "cache-control",
    "pragma",
];

/// 网关能够解码的内容编码
const SUPPORTED_ENCODINGS: &[&str] = &["gzip", "deflate", "br", "identity"];

/// 上游请求转发器
#[derive(Debug, Clone)]
pub struct UpstreamForwarder {
    http_client: reqwest::Client,
    timeout: Duration,
    user_agent: String,
}

impl UpstreamForwarder {
    /// 创建转发器
    ///
    /// `timeout` 限制从发出请求到收到响应头的时间，响应体按流读取不受此限制。
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self, ProxyError> {
        let http_client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            timeout,
            user_agent: user_agent.unwrap_or(DEFAULT_USER_AGENT).to_string(),
        })
    }

    /// 构建上游请求头
    pub fn build_headers(
        &self,
        inbound: &HeaderMap,
        tool: &ToolDefinition,
        target: &Url,
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for name in FORWARDED_HEADERS {
            for value in inbound.get_all(*name) {
                headers.append(HeaderName::from_static(*name), value.clone());
            }
        }

        if let Some(encoding) = inbound
            .get(ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .and_then(narrow_accept_encoding)
        {
            headers.insert(ACCEPT_ENCODING, encoding);
        }

        // Cookie 原样转发
        for value in inbound.get_all(COOKIE) {
            headers.append(COOKIE, value.clone());
        }

        if !headers.contains_key(USER_AGENT) {
            if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
                headers.insert(USER_AGENT, value);
            }
        }
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        }
        if !headers.contains_key(ACCEPT_LANGUAGE) {
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE));
        }
        if !headers.contains_key(REFERER) {
            if let Ok(value) = HeaderValue::from_str(&tool.base_url) {
                headers.insert(REFERER, value);
            }
        }

        // Host 由 HTTP 客户端按目标 URL 生成
        if let Ok(value) = HeaderValue::from_str(&target.origin().ascii_serialization()) {
            headers.insert(ORIGIN, value);
        }

        inject_basic_auth(&mut headers, tool);
        headers
    }

    /// 转发请求，返回上游响应
    ///
    /// # Errors
    /// 传输层失败或超时返回 `ProxyError::UpstreamTransport`
    pub async fn forward(
        &self,
        method: Method,
        target_url: &str,
        tool: &ToolDefinition,
        inbound_headers: &HeaderMap,
        body: Body,
    ) -> Result<reqwest::Response, ProxyError> {
        let target = Url::parse(target_url).map_err(|e| {
            ProxyError::UpstreamTransport(TransportFailure {
                code: "REQUEST_FAILED",
                message: format!("Invalid target URL: {}", e),
                target_url: target_url.to_string(),
            })
        })?;

        let headers = self.build_headers(inbound_headers, tool, &target);
        let mut request = self
            .http_client
            .request(method.clone(), target)
            .headers(headers);

        if method != Method::GET && method != Method::HEAD {
            request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ProxyError::UpstreamTransport(TransportFailure::from_reqwest(
                &e, target_url,
            ))),
            Err(_) => Err(ProxyError::UpstreamTransport(TransportFailure {
                code: "TIMEOUT",
                message: format!("Upstream did not respond within {}s", self.timeout.as_secs()),
                target_url: target_url.to_string(),
            })),
        }
    }
}

/// 以 Basic 认证替换 Authorization 头
///
/// 用户名和密码都非空时才生效。
pub fn inject_basic_auth(headers: &mut HeaderMap, tool: &ToolDefinition) {
    let Some((username, password)) = tool.basic_credentials() else {
        return;
    };

    let credentials = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        format!("{}:{}", username, password),
    );
    if let Ok(value) = HeaderValue::try_from(format!("Basic {}", credentials)) {
        headers.insert(AUTHORIZATION, value);
    }
}

/// 只保留网关能解码的编码，全部不支持时返回 None
fn narrow_accept_encoding(raw: &str) -> Option<HeaderValue> {
    let kept: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|item| {
            let coding = item.split(';').next().unwrap_or("").trim();
            SUPPORTED_ENCODINGS
                .iter()
                .any(|supported| coding.eq_ignore_ascii_case(supported))
        })
        .collect();

    if kept.is_empty() {
        return None;
    }
    HeaderValue::from_str(&kept.join(", ")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::AccessMode;

    fn tool_with_auth(username: Option<&str>, password: Option<&str>) -> ToolDefinition {
        ToolDefinition {
            id: "radarr".to_string(),
            name: "Radarr".to_string(),
            base_url: "http://radarr.local:7878".to_string(),
            username: username.map(String::from),
            password: password.map(String::from),
            api_key: None,
            access_mode: AccessMode::Both,
            notes: String::new(),
        }
    }

    fn forwarder() -> UpstreamForwarder {
        UpstreamForwarder::new(Duration::from_secs(5), Some("TestAgent/1.0")).unwrap()
    }

    fn target() -> Url {
        Url::parse("http://radarr.local:7878/login").unwrap()
    }

    #[test]
    fn test_defaults_when_absent() {
        let headers = forwarder().build_headers(&HeaderMap::new(), &tool_with_auth(None, None), &target());

        assert_eq!(headers[USER_AGENT], "TestAgent/1.0");
        assert_eq!(headers[ACCEPT], DEFAULT_ACCEPT);
        assert_eq!(headers[ACCEPT_LANGUAGE], DEFAULT_ACCEPT_LANGUAGE);
        assert_eq!(headers[REFERER], "http://radarr.local:7878");
        assert_eq!(headers[ORIGIN], "http://radarr.local:7878");
        assert!(!headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_inbound_user_agent_kept() {
        let mut inbound = HeaderMap::new();
        inbound.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0 Browser"));

        let headers = forwarder().build_headers(&inbound, &tool_with_auth(None, None), &target());

        assert_eq!(headers[USER_AGENT], "Mozilla/5.0 Browser");
        assert_eq!(headers.get_all(USER_AGENT).iter().count(), 1);
    }

    #[test]
    fn test_allow_list() {
        let mut inbound = HeaderMap::new();
        inbound.insert(ACCEPT, HeaderValue::from_static("application/json"));
        inbound.insert("x-csrf-token", HeaderValue::from_static("abc"));
        inbound.insert(COOKIE, HeaderValue::from_static("session=1"));
        inbound.insert("x-custom", HeaderValue::from_static("dropped"));
        inbound.insert("host", HeaderValue::from_static("gateway.local"));
        inbound.insert(ORIGIN, HeaderValue::from_static("http://gateway.local"));

        let headers = forwarder().build_headers(&inbound, &tool_with_auth(None, None), &target());

        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers["x-csrf-token"], "abc");
        assert_eq!(headers[COOKIE], "session=1");
        assert!(!headers.contains_key("x-custom"));
        assert!(!headers.contains_key("host"));
        assert_eq!(headers[ORIGIN], "http://radarr.local:7878");
    }

    #[test]
    fn test_basic_auth_replaces_authorization() {
        let mut inbound = HeaderMap::new();
        inbound.insert(AUTHORIZATION, HeaderValue::from_static("Bearer browser-token"));

        let headers = forwarder().build_headers(
            &inbound,
            &tool_with_auth(Some("admin"), Some("secret")),
            &target(),
        );

        // base64("admin:secret")
        assert_eq!(headers[AUTHORIZATION], "Basic YWRtaW46c2VjcmV0");
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_partial_credentials_not_injected() {
        let mut inbound = HeaderMap::new();
        inbound.insert(AUTHORIZATION, HeaderValue::from_static("Bearer browser-token"));

        let headers =
            forwarder().build_headers(&inbound, &tool_with_auth(Some("admin"), None), &target());
        assert_eq!(headers[AUTHORIZATION], "Bearer browser-token");
    }

    #[test]
    fn test_narrow_accept_encoding() {
        assert_eq!(
            narrow_accept_encoding("gzip, deflate, br, zstd").unwrap(),
            "gzip, deflate, br"
        );
        assert_eq!(narrow_accept_encoding("gzip;q=1.0, compress").unwrap(), "gzip;q=1.0");
        assert!(narrow_accept_encoding("zstd").is_none());
    }

    #[test]
    fn test_accept_encoding_forwarded_narrowed() {
        let mut inbound = HeaderMap::new();
        inbound.insert(ACCEPT_ENCODING, HeaderValue::from_static("zstd, gzip"));
        let headers = forwarder().build_headers(&inbound, &tool_with_auth(None, None), &target());
        assert_eq!(headers[ACCEPT_ENCODING], "gzip");
    }
}
