//! 工具反向代理
//!
//! 把 `/tools/{toolId}/proxy{subPath}` 上的请求转发到工具的上游地址，
//! 改写 HTML 和重定向使工具页面可以在同源 iframe 中运行。

mod context;
mod error;
mod forwarder;
mod inject;
mod prober;
mod resolver;
mod rewrite;
mod router;
mod service;
mod transformer;


pub use context::{ProxyPrefix, ProxyRequestContext};
pub use error::{ProxyError, TransportFailure};
pub use forwarder::{UpstreamForwarder, DEFAULT_USER_AGENT};
pub use inject::{compat_script, inject_script};
pub use prober::{ConnectivityProber, ProbeFailure, ProbeReport, ProbeSuccess};
pub use resolver::{build_target_url, resolve_target, ResolvedTarget};
pub use rewrite::{rewrite_html_urls, rewrite_location, QuoteStyle, RewriteRule, RewriteTarget, REWRITE_RULES};
pub use router::{strip_api_prefix, ProxyRoute};
pub use service::{ProxySettings, ToolProxy};
pub use transformer::{classify, ResponseShape, ResponseTransformer, DEFAULT_MAX_HTML_BYTES};
