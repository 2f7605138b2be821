//! 工具注册表错误类型

use thiserror::Error;

use crate::storage::StorageError;

/// 工具注册表错误
#[derive(Debug, Error)]
pub enum RegistryError {
    /// 设置存储读写失败
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 存储中的注册表内容无法解析
    #[error("工具配置格式错误: {message}")]
    Malformed {
        /// 原始存储值（用于日志诊断）
        raw: String,
        message: String,
    },

    /// 阻塞线程中的存储任务异常退出
    #[error("存储任务失败: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// 提交的工具定义无效
    #[error("工具定义无效: {0}")]
    Invalid(String),
}
