//! 键值设置存储
//!
//! 工具注册表以 JSON 形式保存在单个设置键下。管理后台的其他数据
//! （用户、订阅、邮件模板等）也共用这张表，但其结构不在本 crate 的范围内。

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use rusqlite::{params, OptionalExtension};

use super::database::Database;
use super::error::StorageError;

/// 设置存储 trait
///
/// 只暴露 `get` / `set` 两个操作，写入对后续读取立即可见。
pub trait SettingsStore: Send + Sync {
    /// 读取设置值，键不存在时返回 `None`
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// 写入设置值（存在则覆盖）
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// 基于 SQLite `settings` 表的设置存储
pub struct SqliteSettingsStore {
    db: Mutex<Database>,
}

impl SqliteSettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

/// 推断 setting_type 列的值
fn infer_setting_type(value: &str) -> &'static str {
    let trimmed = value.trim_start();
    let looks_structured = trimmed.starts_with('[') || trimmed.starts_with('{');
    if looks_structured && serde_json::from_str::<serde_json::Value>(value).is_ok() {
        "json"
    } else {
        "string"
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let db = self.db.lock().map_err(|_| StorageError::LockError)?;
        let value = db
            .connection()
            .query_row(
                "SELECT setting_value FROM settings WHERE setting_key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidInput("设置键不能为空".to_string()));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().map_err(|_| StorageError::LockError)?;
        db.connection().execute(
            "INSERT INTO settings (setting_key, setting_value, setting_type, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(setting_key) DO UPDATE SET
                setting_value = excluded.setting_value,
                setting_type = excluded.setting_type,
                updated_at = excluded.updated_at",
            params![key, value, infer_setting_type(value), &now],
        )?;
        Ok(())
    }
}

/// 内存设置存储
pub struct InMemorySettingsStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }

    /// 以预置的键值对创建存储
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
        store
    }
}

impl Default for InMemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.read().map_err(|_| StorageError::LockError)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidInput("设置键不能为空".to_string()));
        }
        let mut values = self.values.write().map_err(|_| StorageError::LockError)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
