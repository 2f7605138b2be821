//! 工具定义数据模型
//!
//! 定义运维人员注册的外部 Web 工具及其访问模式

use serde::{Deserialize, Deserializer, Serialize};

/// 工具访问模式
///
/// 决定工具是否允许通过代理路径在 iframe 中嵌入
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// 仅允许 iframe 嵌入
    #[serde(alias = "iframe")]
    IframeOnly,
    /// 仅允许新标签页打开（禁止代理）
    ///
    /// 未声明访问模式的旧记录视为此模式
    #[serde(alias = "new_tab")]
    #[default]
    NewTabOnly,
    /// 两者皆可
    Both,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::IframeOnly => "iframe_only",
            AccessMode::NewTabOnly => "new_tab_only",
            AccessMode::Both => "both",
        }
    }

    /// 是否允许走代理路径
    pub fn allows_proxy(&self) -> bool {
        !matches!(self, AccessMode::NewTabOnly)
    }
}

/// 工具定义
///
/// 反序列化同时接受旧版字段名 `url` / `access_type`；新旧字段同时出现时以新字段为准。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolDefinition {
    /// 稳定唯一的标识符，重写后的链接依赖它保持不变
    pub id: String,
    /// 显示名称
    pub name: String,
    /// 上游基础 URL（不带末尾斜杠）
    pub base_url: String,
    /// 上游 Basic 认证用户名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// 上游 Basic 认证密码
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// API Key（仅存储，不会自动注入）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// 访问模式
    pub access_mode: AccessMode,
    /// 备注
    pub notes: String,
}

/// 存储或请求中的原始工具记录
#[derive(Deserialize)]
struct ToolRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    username: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    password: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    api_key: Option<String>,
    #[serde(default)]
    access_mode: Option<AccessMode>,
    #[serde(default)]
    access_type: Option<AccessMode>,
    #[serde(default)]
    notes: String,
}

impl ToolRecord {
    fn into_definition(self) -> Result<ToolDefinition, String> {
        let base_url = match (self.base_url, self.url) {
            (Some(base_url), _) if !base_url.trim().is_empty() => base_url,
            (_, Some(url)) => url,
            (Some(base_url), None) => base_url,
            (None, None) => return Err("missing field `base_url`".to_string()),
        };

        Ok(ToolDefinition {
            id: self.id,
            name: self.name,
            base_url,
            username: self.username,
            password: self.password,
            api_key: self.api_key,
            access_mode: self.access_mode.or(self.access_type).unwrap_or_default(),
            notes: self.notes,
        })
    }
}

impl<'de> Deserialize<'de> for ToolDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        ToolRecord::deserialize(deserializer)?
            .into_definition()
            .map_err(serde::de::Error::custom)
    }
}

/// 空字符串视为未设置（管理界面对未填写的字段保存为 ""）
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

impl ToolDefinition {
    /// 规范化字段：去掉 id 两端空白和 base_url 末尾的斜杠
    pub fn normalized(mut self) -> Self {
        self.id = self.id.trim().to_string();
        let trimmed_len = self.base_url.trim().trim_end_matches('/').len();
        self.base_url = self.base_url.trim()[..trimmed_len].to_string();
        self
    }

    /// 校验工具定义
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("工具 id 不能为空".to_string());
        }
        if self.id.contains('/') {
            return Err(format!("工具 id 不能包含 '/': {}", self.id));
        }

        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| format!("工具 {} 的 base_url 无效: {}", self.id, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "工具 {} 的 base_url 必须是 http(s) 地址: {}",
                self.id, self.base_url
            ));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(format!(
                "工具 {} 的 base_url 不能包含查询参数或片段: {}",
                self.id, self.base_url
            ));
        }
        Ok(())
    }

    /// 返回 (用户名, 密码)，仅当两者都已配置时
    pub fn basic_credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// 工具摘要（用于 404 诊断信息）
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolSummary {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_record() {
        let json = r#"{
            "id": "radarr",
            "name": "Radarr",
            "base_url": "http://host:7878/",
            "username": "admin",
            "password": "secret",
            "api_key": "k",
            "access_mode": "both",
            "notes": "movies"
        }"#;
        let tool: ToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(tool.access_mode, AccessMode::Both);
        assert_eq!(tool.basic_credentials(), Some(("admin", "secret")));
        assert_eq!(tool.normalized().base_url, "http://host:7878");
    }

    #[test]
    fn test_deserialize_legacy_field_names() {
        let json = r#"{
            "id": "sonarr",
            "name": "Sonarr",
            "url": "http://host:8989",
            "username": "",
            "password": "",
            "access_type": "iframe"
        }"#;
        let tool: ToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(tool.base_url, "http://host:8989");
        assert_eq!(tool.access_mode, AccessMode::IframeOnly);
        assert_eq!(tool.username, None);
        assert_eq!(tool.basic_credentials(), None);
        assert_eq!(tool.notes, "");
    }

    #[test]
    fn test_missing_access_mode_defaults_to_new_tab() {
        let tool: ToolDefinition =
            serde_json::from_str(r#"{"id":"x","url":"http://h"}"#).unwrap();
        assert_eq!(tool.access_mode, AccessMode::NewTabOnly);
        assert!(!tool.access_mode.allows_proxy());
    }

    #[test]
    fn test_legacy_new_tab_alias() {
        let tool: ToolDefinition =
            serde_json::from_str(r#"{"id":"x","url":"http://h","access_type":"new_tab"}"#)
                .unwrap();
        assert_eq!(tool.access_mode, AccessMode::NewTabOnly);
    }

    #[test]
    fn test_half_migrated_record_prefers_new_fields() {
        let tool: ToolDefinition = serde_json::from_str(
            r#"{
                "id": "lidarr",
                "url": "http://old:8686",
                "base_url": "http://new:8686",
                "access_type": "new_tab",
                "access_mode": "both"
            }"#,
        )
        .unwrap();
        assert_eq!(tool.base_url, "http://new:8686");
        assert_eq!(tool.access_mode, AccessMode::Both);
    }

    #[test]
    fn test_empty_base_url_falls_back_to_legacy_url() {
        let tool: ToolDefinition =
            serde_json::from_str(r#"{"id":"x","base_url":"","url":"http://h"}"#).unwrap();
        assert_eq!(tool.base_url, "http://h");
    }

    #[test]
    fn test_missing_url_rejected() {
        let err = serde_json::from_str::<ToolDefinition>(r#"{"id":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_serialize_uses_canonical_names() {
        let tool = ToolDefinition {
            id: "x".to_string(),
            name: "X".to_string(),
            base_url: "http://h".to_string(),
            username: None,
            password: None,
            api_key: None,
            access_mode: AccessMode::IframeOnly,
            notes: String::new(),
        };
        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(value["base_url"], "http://h");
        assert_eq!(value["access_mode"], "iframe_only");
        assert!(value.get("username").is_none());
    }

    #[test]
    fn test_password_without_username_is_not_credentials() {
        let tool: ToolDefinition = serde_json::from_str(
            r#"{"id":"x","url":"http://h","password":"p"}"#,
        )
        .unwrap();
        assert_eq!(tool.basic_credentials(), None);
    }

    #[test]
    fn test_normalized_strips_multiple_slashes_and_whitespace() {
        let tool: ToolDefinition =
            serde_json::from_str(r#"{"id":" a ","url":" http://h/app// "}"#).unwrap();
        let tool = tool.normalized();
        assert_eq!(tool.id, "a");
        assert_eq!(tool.base_url, "http://h/app");
    }

    #[test]
    fn test_validate() {
        let mut tool: ToolDefinition =
            serde_json::from_str(r#"{"id":"a","url":"http://h:9000"}"#).unwrap();
        assert!(tool.validate().is_ok());

        tool.base_url = "ftp://h".to_string();
        assert!(tool.validate().is_err());

        tool.base_url = "not a url".to_string();
        assert!(tool.validate().is_err());

        tool.base_url = "http://h?x=1".to_string();
        assert!(tool.validate().is_err());

        tool.base_url = "http://h".to_string();
        tool.id = String::new();
        assert!(tool.validate().is_err());

        tool.id = "a/b".to_string();
        assert!(tool.validate().is_err());
    }
}
