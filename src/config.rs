//! 网关配置模块
//!
//! 配置保存在配置目录下的 `settings.yaml`，文件不存在时使用默认值。

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proxy::{ProxySettings, DEFAULT_MAX_HTML_BYTES};

/// 默认端口号
pub const DEFAULT_PORT: u16 = 19840;

/// 默认管理 API 前缀
pub const DEFAULT_API_PREFIX: &str = "/api/management";

/// 配置文件名
const CONFIG_FILENAME: &str = "settings.yaml";

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置文件格式错误: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 代理相关配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// 上游响应头超时（秒）
    #[serde(default = "default_proxy_timeout")]
    pub timeout_secs: u64,
    /// HTML 缓冲上限（字节）
    #[serde(default = "default_max_html_bytes")]
    pub max_html_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// 是否缓存工具列表
    #[serde(default = "default_true")]
    pub cache_registry: bool,
}

/// 连通性探测配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// 网关配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 管理 API 挂载前缀，可以为空
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// SQLite 数据库文件，相对路径基于配置目录
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    /// 以 JSON 格式输出日志
    #[serde(default)]
    pub log_json: bool,
}

fn default_bind_address() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_api_prefix() -> String {
    DEFAULT_API_PREFIX.to_string()
}

fn default_database_file() -> PathBuf {
    PathBuf::from("gateway.db")
}

fn default_proxy_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_max_html_bytes() -> usize {
    DEFAULT_MAX_HTML_BYTES
}

fn default_true() -> bool {
    true
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_proxy_timeout(),
            max_html_bytes: default_max_html_bytes(),
            user_agent: None,
            cache_registry: true,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
            user_agent: None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: DEFAULT_PORT,
            api_prefix: default_api_prefix(),
            database_file: default_database_file(),
            proxy: ProxyConfig::default(),
            probe: ProbeConfig::default(),
            log_json: false,
        }
    }
}

impl GatewayConfig {
    /// 从配置目录加载配置
    ///
    /// 文件不存在时返回默认配置；文件存在但无法解析时返回错误。
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(config_dir);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到配置目录
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
        }

        let content = serde_yaml::to_string(self)?;
        fs::write(Self::get_config_path(config_dir), content)?;
        Ok(())
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::validate_port(self.port)?;
        if !self.api_prefix.is_empty() && !self.api_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "api_prefix must start with '/': {}",
                self.api_prefix
            )));
        }
        if self.proxy.timeout_secs == 0 || self.probe.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        if self.proxy.max_html_bytes == 0 {
            return Err(ConfigError::Invalid("max_html_bytes must be positive".to_string()));
        }
        Ok(())
    }

    /// 验证端口是否有效
    ///
    /// 0 表示由系统分配；其余端口必须 >= 1024
    pub fn validate_port(port: u16) -> Result<(), ConfigError> {
        if port != 0 && port < 1024 {
            return Err(ConfigError::Invalid(
                "Port must be >= 1024 (non-privileged ports)".to_string(),
            ));
        }
        Ok(())
    }

    /// 获取配置文件的完整路径
    pub fn get_config_path(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILENAME)
    }

    /// 数据库文件的完整路径
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        if self.database_file.is_absolute() {
            self.database_file.clone()
        } else {
            config_dir.join(&self.database_file)
        }
    }

    /// 规范化后的 API 前缀（无尾部斜杠）
    pub fn normalized_api_prefix(&self) -> String {
        self.api_prefix.trim_end_matches('/').to_string()
    }

    /// 代理服务参数
    pub fn proxy_settings(&self) -> ProxySettings {
        ProxySettings {
            api_prefix: self.normalized_api_prefix(),
            timeout: Duration::from_secs(self.proxy.timeout_secs),
            max_html_bytes: self.proxy.max_html_bytes,
            user_agent: self.proxy.user_agent.clone(),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.timeout_secs)
    }
}

/// 默认配置目录
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tool-gateway")
}
