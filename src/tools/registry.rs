//! 工具注册表
//!
//! 集中管理工具定义的读取与写入。工具列表以 JSON 数组形式保存在设置存储的
//! `management_tools` 键下；读取结果可缓存，写入时同步替换缓存，保证下一次
//! 请求即可看到修改。

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::error::RegistryError;
use super::model::ToolDefinition;
use crate::storage::SettingsStore;

/// 工具列表所在的设置键
pub const TOOLS_SETTING_KEY: &str = "management_tools";

/// 共享的工具列表快照
pub type ToolList = Arc<Vec<ToolDefinition>>;

/// 工具注册表
pub struct ToolRegistry {
    store: Arc<dyn SettingsStore>,
    /// 已解析的工具列表缓存
    cache: RwLock<Option<ToolList>>,
    cache_enabled: bool,
}

impl ToolRegistry {
    /// 创建注册表
    ///
    /// # Arguments
    /// * `store` - 设置存储
    /// * `cache_enabled` - 是否缓存解析结果；关闭时每次请求都重新读取存储
    pub fn new(store: Arc<dyn SettingsStore>, cache_enabled: bool) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
            cache_enabled,
        }
    }

    /// 获取当前全部工具
    pub async fn list(&self) -> Result<ToolList, RegistryError> {
        if !self.cache_enabled {
            return Ok(Arc::new(self.load_from_store().await?));
        }

        if let Some(tools) = self.cache.read().await.as_ref() {
            return Ok(tools.clone());
        }

        let mut cache = self.cache.write().await;
        // 等待写锁期间可能已被其他请求填充
        if let Some(tools) = cache.as_ref() {
            return Ok(tools.clone());
        }
        let tools = Arc::new(self.load_from_store().await?);
        *cache = Some(tools.clone());
        Ok(tools)
    }

    /// 整体替换工具列表
    ///
    /// 校验并规范化后写入存储，随后替换缓存。
    pub async fn replace(&self, tools: Vec<ToolDefinition>) -> Result<ToolList, RegistryError> {
        let tools = prepare_tools(tools)?;
        let raw = serde_json::to_string(&tools).map_err(|e| RegistryError::Invalid(e.to_string()))?;

        // 持有写锁完成存储写入，避免并发读取把旧值重新放回缓存
        let mut cache = self.cache.write().await;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.set(TOOLS_SETTING_KEY, &raw)).await??;

        let tools = Arc::new(tools);
        *cache = if self.cache_enabled {
            Some(tools.clone())
        } else {
            None
        };

        tracing::info!(count = tools.len(), "工具列表已更新");
        Ok(tools)
    }

    /// 丢弃缓存，下一次读取将重新解析存储
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// 在阻塞线程中读取存储，SQLite 访问是同步的
    async fn load_from_store(&self) -> Result<Vec<ToolDefinition>, RegistryError> {
        let store = self.store.clone();
        let raw = tokio::task::spawn_blocking(move || store.get(TOOLS_SETTING_KEY)).await??;
        match raw {
            Some(raw) => decode_tools(&raw).inspect_err(|e| {
                if let RegistryError::Malformed { raw, message } = e {
                    tracing::error!(raw = %raw, error = %message, "存储中的工具配置无法解析");
                }
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// 按 id 查找工具的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolLookup<'a> {
    /// 工具列表为空
    NoTools,
    /// 列表中没有该 id
    NotFound,
    Found(&'a ToolDefinition),
}

/// 按 id 查找工具
///
/// 代理解析与连通性测试共用，空列表和未知 id 分别返回。
pub fn lookup_tool<'a>(tools: &'a [ToolDefinition], tool_id: &str) -> ToolLookup<'a> {
    if tools.is_empty() {
        return ToolLookup::NoTools;
    }
    match tools.iter().find(|t| t.id == tool_id) {
        Some(tool) => ToolLookup::Found(tool),
        None => ToolLookup::NotFound,
    }
}

/// 解析存储中的工具列表
///
/// 支持 JSON 数组，以及值为工具记录的 JSON 对象（旧版布局）。空值视为空列表。
pub fn decode_tools(raw: &str) -> Result<Vec<ToolDefinition>, RegistryError> {
    let malformed = |message: String| RegistryError::Malformed {
        raw: raw.to_string(),
        message,
    };

    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;

    let entries = match value {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => {
            return Err(malformed(format!("期望数组或对象，实际为: {}", other)));
        }
    };

    entries
        .into_iter()
        .map(|entry| {
            serde_json::from_value::<ToolDefinition>(entry)
                .map(ToolDefinition::normalized)
                .map_err(|e| malformed(e.to_string()))
        })
        .collect()
}

/// 规范化并校验待保存的工具列表
pub fn prepare_tools(tools: Vec<ToolDefinition>) -> Result<Vec<ToolDefinition>, RegistryError> {
    let mut seen = HashSet::new();
    let mut prepared = Vec::with_capacity(tools.len());

    for tool in tools {
        let tool = tool.normalized();
        tool.validate().map_err(RegistryError::Invalid)?;
        if !seen.insert(tool.id.clone()) {
            return Err(RegistryError::Invalid(format!("工具 id 重复: {}", tool.id)));
        }
        prepared.push(tool);
    }

    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemorySettingsStore, StorageError};
    use crate::tools::AccessMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tool(id: &str, url: &str) -> ToolDefinition {
        ToolDefinition {
            id: id.to_string(),
            name: id.to_uppercase(),
            base_url: url.to_string(),
            username: None,
            password: None,
            api_key: None,
            access_mode: AccessMode::Both,
            notes: String::new(),
        }
    }

    /// 统计 get 调用次数的存储
    struct CountingStore {
        inner: InMemorySettingsStore,
        reads: AtomicUsize,
    }

    impl SettingsStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }
    }

    #[test]
    fn test_decode_array() {
        let tools =
            decode_tools(r#"[{"id":"a","url":"http://h/"},{"id":"b","base_url":"http://g"}]"#)
                .unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].base_url, "http://h");
    }

    #[test]
    fn test_decode_object_layout() {
        let tools = decode_tools(r#"{"0":{"id":"a","url":"http://h"}}"#).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].id, "a");
    }

    #[test]
    fn test_decode_empty_values() {
        assert!(decode_tools("").unwrap().is_empty());
        assert!(decode_tools("null").unwrap().is_empty());
        assert!(decode_tools("[]").unwrap().is_empty());
    }

    #[test]
    fn test_decode_malformed_keeps_raw_value() {
        let err = decode_tools("{not json").unwrap_err();
        match err {
            RegistryError::Malformed { raw, .. } => assert_eq!(raw, "{not json"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(decode_tools("42"), Err(RegistryError::Malformed { .. })));
        assert!(matches!(
            decode_tools(r#"[{"name":"no id"}]"#),
            Err(RegistryError::Malformed { .. })
        ));
    }

    #[test]
    fn test_lookup_tool() {
        let tools = vec![tool("a", "http://h"), tool("b", "http://g")];
        assert_eq!(lookup_tool(&tools, "b"), ToolLookup::Found(&tools[1]));
        assert_eq!(lookup_tool(&tools, "c"), ToolLookup::NotFound);
        assert_eq!(lookup_tool(&[], "a"), ToolLookup::NoTools);
    }

    #[test]
    fn test_decode_half_migrated_entry() {
        let tools = decode_tools(
            r#"[{"id":"a","url":"http://old","base_url":"http://new","access_type":"iframe","access_mode":"both"}]"#,
        )
        .unwrap();
        assert_eq!(tools[0].base_url, "http://new");
        assert_eq!(tools[0].access_mode, AccessMode::Both);
    }

    #[test]
    fn test_prepare_rejects_duplicates() {
        let result = prepare_tools(vec![tool("a", "http://h"), tool("a", "http://g")]);
        assert!(matches!(result, Err(RegistryError::Invalid(_))));
    }

    #[test]
    fn test_prepare_rejects_invalid_url() {
        let result = prepare_tools(vec![tool("a", "nope")]);
        assert!(matches!(result, Err(RegistryError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_empty_store_lists_nothing() {
        let registry = ToolRegistry::new(Arc::new(InMemorySettingsStore::new()), true);
        let tools = registry.list().await.unwrap();
        assert!(tools.is_empty());
        assert_eq!(lookup_tool(&tools, "a"), ToolLookup::NoTools);
    }

    #[tokio::test]
    async fn test_replace_persists_and_normalizes() {
        let store = Arc::new(InMemorySettingsStore::new());
        let registry = ToolRegistry::new(store.clone(), true);

        registry
            .replace(vec![tool("radarr", "http://host:7878/")])
            .await
            .unwrap();

        let raw = store.get(TOOLS_SETTING_KEY).unwrap().unwrap();
        let stored = decode_tools(&raw).unwrap();
        assert_eq!(stored[0].base_url, "http://host:7878");

        let tools = registry.list().await.unwrap();
        match lookup_tool(&tools, "radarr") {
            ToolLookup::Found(found) => assert_eq!(found.base_url, "http://host:7878"),
            other => panic!("unexpected lookup: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_avoids_rereading_store() {
        let store = Arc::new(CountingStore {
            inner: InMemorySettingsStore::with_value(
                TOOLS_SETTING_KEY,
                r#"[{"id":"a","url":"http://h"}]"#,
            ),
            reads: AtomicUsize::new(0),
        });
        let registry = ToolRegistry::new(store.clone(), true);

        registry.list().await.unwrap();
        registry.list().await.unwrap();
        registry.list().await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        registry.invalidate().await;
        registry.list().await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    /// 记录 set 所在线程的存储
    struct ThreadRecordingStore {
        inner: InMemorySettingsStore,
        writer: std::sync::Mutex<Option<std::thread::ThreadId>>,
    }

    impl SettingsStore for ThreadRecordingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            *self.writer.lock().unwrap() = Some(std::thread::current().id());
            self.inner.set(key, value)
        }
    }

    #[tokio::test]
    async fn test_store_write_runs_off_the_async_thread() {
        let store = Arc::new(ThreadRecordingStore {
            inner: InMemorySettingsStore::new(),
            writer: std::sync::Mutex::new(None),
        });
        let registry = ToolRegistry::new(store.clone(), true);

        registry.replace(vec![tool("a", "http://h")]).await.unwrap();

        let writer = store.writer.lock().unwrap().expect("set was called");
        assert_ne!(writer, std::thread::current().id());
        assert_eq!(registry.list().await.unwrap()[0].id, "a");
    }

    #[tokio::test]
    async fn test_uncached_registry_reads_every_time() {
        let store = Arc::new(CountingStore {
            inner: InMemorySettingsStore::new(),
            reads: AtomicUsize::new(0),
        });
        let registry = ToolRegistry::new(store.clone(), false);

        registry.list().await.unwrap();
        registry.list().await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_write_visible_on_next_read() {
        let registry = ToolRegistry::new(Arc::new(InMemorySettingsStore::new()), true);
        registry.replace(vec![tool("a", "http://h")]).await.unwrap();
        assert!(registry.list().await.unwrap().iter().any(|t| t.id == "a"));

        registry.replace(vec![tool("b", "http://g")]).await.unwrap();
        let tools = registry.list().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].id, "b");
    }

    #[tokio::test]
    async fn test_invalid_replace_leaves_store_untouched() {
        let store = Arc::new(InMemorySettingsStore::new());
        let registry = ToolRegistry::new(store.clone(), true);
        registry.replace(vec![tool("a", "http://h")]).await.unwrap();

        let result = registry.replace(vec![tool("", "http://h")]).await;
        assert!(result.is_err());
        assert_eq!(registry.list().await.unwrap()[0].id, "a");
    }

    #[tokio::test]
    async fn test_malformed_store_surfaces_error() {
        let store = Arc::new(InMemorySettingsStore::with_value(TOOLS_SETTING_KEY, "[oops"));
        let registry = ToolRegistry::new(store, true);
        assert!(matches!(
            registry.list().await,
            Err(RegistryError::Malformed { .. })
        ));
    }
}
