//! 上游响应转换
//!
//! 按 (method, status, headers) 把上游响应分为三类：
//! 重定向、HTML 文档、其他内容（原样流式转发）。

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use futures::{StreamExt, TryStreamExt};

use super::context::ProxyRequestContext;
use super::error::{ProxyError, TransportFailure};
use super::inject::{compat_script, inject_script};
use super::rewrite::{rewrite_html_urls, rewrite_location};

/// HTML 缓冲默认上限
pub const DEFAULT_MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

/// 不复制到客户端的响应头
const STRIPPED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
    "content-encoding",
    "transfer-encoding",
    "content-length",
    "x-frame-options",
    "content-security-policy",
];

/// 允许嵌入所需的响应头
const EMBED_HEADERS: &[(&str, &str)] = &[
    ("access-control-allow-origin", "*"),
    (
        "access-control-allow-methods",
        "GET, POST, PUT, DELETE, OPTIONS, HEAD",
    ),
    (
        "access-control-allow-headers",
        "Content-Type, Authorization, X-Requested-With, Accept, Cookie",
    ),
    ("access-control-allow-credentials", "true"),
];

/// 响应分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// 3xx 且带 Location
    Redirect(String),
    /// 需要改写的 HTML 文档
    Html,
    /// 原样转发
    Passthrough,
}

/// 对上游响应分类
pub fn classify(method: &Method, status: StatusCode, headers: &HeaderMap) -> ResponseShape {
    if status.is_redirection() {
        if let Some(location) = headers.get(LOCATION).and_then(|v| v.to_str().ok()) {
            return ResponseShape::Redirect(location.to_string());
        }
    }

    let is_html = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false);
    let has_body = *method != Method::HEAD
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED;

    if is_html && has_body {
        ResponseShape::Html
    } else {
        ResponseShape::Passthrough
    }
}

/// 复制上游响应头，跳过 hop-by-hop 和阻止嵌入的头
///
/// 多值头（Set-Cookie 等）逐个追加。
pub fn copy_response_headers(upstream: &HeaderMap, out: &mut HeaderMap) {
    for (name, value) in upstream {
        if STRIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
}

/// 添加跨域和嵌入相关的响应头
pub fn add_embed_headers(out: &mut HeaderMap) {
    for (name, value) in EMBED_HEADERS {
        out.insert(HeaderName::from_static(*name), HeaderValue::from_static(*value));
    }
}

/// 响应转换器
#[derive(Debug, Clone)]
pub struct ResponseTransformer {
    max_html_bytes: usize,
}

impl Default for ResponseTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HTML_BYTES)
    }
}

impl ResponseTransformer {
    pub fn new(max_html_bytes: usize) -> Self {
        Self { max_html_bytes }
    }

    /// 把上游响应转换为返回给客户端的响应
    pub async fn transform(
        &self,
        ctx: &ProxyRequestContext,
        upstream: reqwest::Response,
    ) -> Result<Response, ProxyError> {
        let status = upstream.status();

        match classify(&ctx.method, status, upstream.headers()) {
            ResponseShape::Redirect(location) => {
                let rewritten = rewrite_location(&location, &ctx.tool.base_url, &ctx.prefix);
                tracing::debug!(from = %location, to = %rewritten, status = status.as_u16(), "Rewriting redirect");
                self.redirect_response(status, upstream.headers(), &rewritten)
            }
            ResponseShape::Html => self.html_response(ctx, upstream).await,
            ResponseShape::Passthrough => Ok(self.stream_response(ctx, upstream)),
        }
    }

    fn redirect_response(
        &self,
        status: StatusCode,
        upstream: &HeaderMap,
        location: &str,
    ) -> Result<Response, ProxyError> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for cookie in upstream.get_all(SET_COOKIE) {
            headers.append(SET_COOKIE, cookie.clone());
        }
        let location = HeaderValue::from_str(location)
            .map_err(|e| ProxyError::Internal(format!("Invalid Location header: {}", e)))?;
        headers.insert(LOCATION, location);

        Ok(response)
    }

    async fn html_response(
        &self,
        ctx: &ProxyRequestContext,
        upstream: reqwest::Response,
    ) -> Result<Response, ProxyError> {
        let status = upstream.status();
        let mut headers = HeaderMap::new();
        copy_response_headers(upstream.headers(), &mut headers);
        add_embed_headers(&mut headers);

        let document = self.read_limited(ctx, upstream).await?;
        let original_len = document.len();

        let rewritten = rewrite_html_urls(&document, &ctx.prefix);
        let script = compat_script(&ctx.prefix, &ctx.tool.base_url);
        let body = inject_script(&rewritten, &script);

        tracing::debug!(original_len, rewritten_len = body.len(), "Rewrote HTML document");

        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// 读取完整 HTML，超过上限时报错
    async fn read_limited(
        &self,
        ctx: &ProxyRequestContext,
        upstream: reqwest::Response,
    ) -> Result<Vec<u8>, ProxyError> {
        let mut document = Vec::new();
        let mut stream = upstream.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ProxyError::UpstreamTransport(TransportFailure::from_reqwest(&e, &ctx.target_url))
            })?;
            if document.len() + chunk.len() > self.max_html_bytes {
                tracing::warn!(limit = self.max_html_bytes, "Upstream HTML document exceeds limit");
                return Err(ProxyError::DocumentTooLarge {
                    limit: self.max_html_bytes,
                    target_url: ctx.target_url.clone(),
                });
            }
            document.extend_from_slice(&chunk);
        }

        Ok(document)
    }

    fn stream_response(&self, ctx: &ProxyRequestContext, upstream: reqwest::Response) -> Response {
        let status = upstream.status();
        let mut headers = HeaderMap::new();
        copy_response_headers(upstream.headers(), &mut headers);
        add_embed_headers(&mut headers);

        // reqwest 解压后会移除 Content-Length，仍存在时说明长度准确
        if let Some(length) = upstream.headers().get(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, length.clone());
        }

        let request_id = ctx.request_id;
        let tool_id = ctx.tool_id.clone();
        let stream = upstream.bytes_stream().inspect_err(move |e| {
            tracing::warn!(%request_id, %tool_id, error = %e, "Upstream stream interrupted");
        });

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}
