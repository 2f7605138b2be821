//! iframe 兼容脚本

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use super::context::ProxyPrefix;

static BODY_CLOSE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i-u)</body\s*>").ok());

/// 脚本模板，`__PROXY_PREFIX__` 与 `__BASE_URL__` 替换为 JSON 字符串字面量
const SCRIPT_TEMPLATE: &str = r#"<script>
(function () {
  var proxyPrefix = __PROXY_PREFIX__;
  var baseUrl = __BASE_URL__;
  var inIframe = window !== window.top;

  function toProxyPath(action) {
    if (action && action.charAt(0) === '/' && action.charAt(1) !== '/' &&
        action.indexOf(proxyPrefix) !== 0) {
      return proxyPrefix + action;
    }
    return action;
  }

  function deproxiedUrl() {
    var path = window.location.pathname;
    if (path.indexOf(proxyPrefix) === 0) {
      path = path.substring(proxyPrefix.length);
    }
    return baseUrl + path + window.location.search + window.location.hash;
  }

  if (inIframe) {
    var originalFetch = window.fetch;
    if (originalFetch) {
      window.fetch = function (input, init) {
        init = init || {};
        init.credentials = 'include';
        return originalFetch.call(this, input, init);
      };
    }

    setTimeout(function () {
      if (!document.body || document.querySelectorAll('form').length === 0) {
        return;
      }
      var button = document.createElement('div');
      button.textContent = 'Open in New Tab';
      button.style.cssText = 'position:fixed;top:10px;right:10px;background:#f44336;' +
        'color:#fff;padding:10px;border-radius:5px;z-index:9999;font-size:12px;' +
        'cursor:pointer;box-shadow:0 2px 5px rgba(0,0,0,0.3);';
      button.onclick = function () {
        window.top.postMessage({ type: 'OPEN_IN_NEW_TAB', url: deproxiedUrl() }, '*');
      };
      document.body.appendChild(button);
    }, 2000);
  }

  document.addEventListener('submit', function (event) {
    var form = event.target;
    if (!form || form.tagName !== 'FORM') {
      return;
    }
    var action = form.getAttribute('action');

    if (inIframe) {
      var rewritten = toProxyPath(action);
      if (rewritten !== action) {
        form.setAttribute('action', rewritten);
      }
      return;
    }

    event.preventDefault();
    var target = toProxyPath(action) || window.location.href;
    var controller = new AbortController();
    var timedOut = false;
    var timer = setTimeout(function () {
      timedOut = true;
      controller.abort();
      window.location.reload();
    }, 15000);

    fetch(target, {
      method: (form.getAttribute('method') || 'POST').toUpperCase(),
      body: new FormData(form),
      credentials: 'include',
      headers: { 'X-Requested-With': 'XMLHttpRequest' },
      signal: controller.signal
    }).then(function (response) {
      clearTimeout(timer);
      if (!response.ok) {
        throw new Error('HTTP ' + response.status);
      }
      return response.text();
    }).then(function (html) {
      document.open();
      document.write(html);
      document.close();
    }).catch(function (error) {
      clearTimeout(timer);
      if (error.name !== 'AbortError' && !timedOut) {
        window.location.reload();
      }
    });
  }, true);
})();
</script>"#;

/// 生成注入脚本
pub fn compat_script(prefix: &ProxyPrefix, base_url: &str) -> String {
    SCRIPT_TEMPLATE
        .replace("__PROXY_PREFIX__", &script_literal(prefix.as_str()))
        .replace("__BASE_URL__", &script_literal(base_url))
}

/// 编码为可以安全嵌入 `<script>` 的 JS 字符串字面量
fn script_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace("</", "<\\/")
}

/// 在最后一个 `</body>` 之前插入脚本，没有时追加到末尾
pub fn inject_script(html: &[u8], script: &str) -> Vec<u8> {
    let position = BODY_CLOSE
        .as_ref()
        .and_then(|re| re.find_iter(html).last())
        .map(|m| m.start())
        .unwrap_or(html.len());

    let mut output = Vec::with_capacity(html.len() + script.len());
    output.extend_from_slice(&html[..position]);
    output.extend_from_slice(script.as_bytes());
    output.extend_from_slice(&html[position..]);
    output
}
