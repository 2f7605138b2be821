//! Storage module error types
//!
//! Provides error types for settings store operations.

use thiserror::Error;

/// Storage operation error type
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    /// Lock error when accessing database
    #[error("数据库锁错误")]
    LockError,

    /// Invalid input parameters
    #[error("无效输入: {0}")]
    InvalidInput(String),
}
