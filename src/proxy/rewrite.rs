//! URL 改写规则
//!
//! 把上游 HTML 中以单个 `/` 开头的路径挂到工具的代理前缀下，
//! 并把重定向的 Location 映射回代理路径空间。
//!
//! 改写在原始字节上进行，未命中的区域逐字节保持不变。
//! 已经位于本工具前缀下的值不会再次改写，因此改写是幂等的。

use once_cell::sync::Lazy;
use regex::bytes::{Captures, Regex};
use reqwest::Url;

use super::context::ProxyPrefix;

/// 被改写的属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteTarget {
    Href,
    Src,
    CssUrl,
}

/// 属性值的引号风格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Double,
    Single,
    Bare,
}

/// 一条改写规则
///
/// 正则包含三个分组：值之前的部分、以 `/` 开头的值、值之后的部分。
pub struct RewriteRule {
    pub target: RewriteTarget,
    pub quote: QuoteStyle,
    pattern: Regex,
}

impl RewriteRule {
    fn new(target: RewriteTarget, quote: QuoteStyle) -> Result<Self, regex::Error> {
        let pattern = match (target, quote) {
            (RewriteTarget::CssUrl, QuoteStyle::Bare) => {
                r#"(?i-u)(url\(\s*)(/(?:[^/)"'\s][^)"'\s]*)?)(\s*\))"#.to_string()
            }
            (RewriteTarget::CssUrl, _) => {
                let q = quote_char(quote);
                format!(r#"(?i-u)(url\(\s*{q})(/(?:[^/{q}][^{q}]*)?)({q})"#)
            }
            (attr, _) => {
                let name = if attr == RewriteTarget::Href { "href" } else { "src" };
                let q = quote_char(quote);
                format!(r#"(?i-u)(\b{name}\s*=\s*{q})(/(?:[^/{q}][^{q}]*)?)({q})"#)
            }
        };

        Ok(Self {
            target,
            quote,
            pattern: Regex::new(&pattern)?,
        })
    }
}

fn quote_char(quote: QuoteStyle) -> char {
    match quote {
        QuoteStyle::Double => '"',
        QuoteStyle::Single => '\'',
        QuoteStyle::Bare => ' ',
    }
}

/// 全部改写规则，按顺序应用
pub static REWRITE_RULES: Lazy<Vec<RewriteRule>> = Lazy::new(|| {
    [
        (RewriteTarget::Href, QuoteStyle::Double),
        (RewriteTarget::Src, QuoteStyle::Double),
        (RewriteTarget::Href, QuoteStyle::Single),
        (RewriteTarget::Src, QuoteStyle::Single),
        (RewriteTarget::CssUrl, QuoteStyle::Bare),
        (RewriteTarget::CssUrl, QuoteStyle::Double),
        (RewriteTarget::CssUrl, QuoteStyle::Single),
    ]
    .into_iter()
    .filter_map(|(target, quote)| match RewriteRule::new(target, quote) {
        Ok(rule) => Some(rule),
        Err(e) => {
            tracing::error!(?target, ?quote, error = %e, "Invalid rewrite rule");
            None
        }
    })
    .collect()
});

/// 改写 HTML 中的根相对 URL
pub fn rewrite_html_urls(html: &[u8], prefix: &ProxyPrefix) -> Vec<u8> {
    let mut output = html.to_vec();

    for rule in REWRITE_RULES.iter() {
        let rewritten = rule.pattern.replace_all(&output, |caps: &Captures| {
            let value = &caps[2];
            let covered = std::str::from_utf8(value)
                .map(|v| prefix.covers(v))
                .unwrap_or(false);

            let mut out = Vec::with_capacity(caps[0].len() + prefix.as_str().len());
            out.extend_from_slice(&caps[1]);
            if !covered {
                out.extend_from_slice(prefix.as_str().as_bytes());
            }
            out.extend_from_slice(value);
            out.extend_from_slice(&caps[3]);
            out
        });
        output = rewritten.into_owned();
    }

    output
}

/// 把重定向 Location 映射到代理路径空间
///
/// - `/x` → `{prefix}/x`
/// - 与工具同源的绝对 URL → `{prefix}` + 剩余路径（位于 base_url 路径之下时去掉该路径）
/// - 其他（外部地址、协议相对、相对路径）保持不变
pub fn rewrite_location(location: &str, base_url: &str, prefix: &ProxyPrefix) -> String {
    if location.starts_with("//") {
        return location.to_string();
    }

    if location.starts_with('/') {
        if prefix.covers(location) {
            return location.to_string();
        }
        return prefix.join(location);
    }

    let (Ok(target), Ok(base)) = (Url::parse(location), Url::parse(base_url)) else {
        return location.to_string();
    };
    if target.origin() != base.origin() {
        return location.to_string();
    }

    let mut path = target.path();
    let base_path = base.path().trim_end_matches('/');
    if !base_path.is_empty() {
        if let Some(rest) = path.strip_prefix(base_path) {
            if rest.is_empty() || rest.starts_with('/') {
                path = rest;
            }
        }
    }

    let mut remainder = path.to_string();
    if let Some(query) = target.query() {
        remainder.push('?');
        remainder.push_str(query);
    }
    if let Some(fragment) = target.fragment() {
        remainder.push('#');
        remainder.push_str(fragment);
    }

    prefix.join(&remainder)
}
