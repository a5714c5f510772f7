//! 键值存储模块
//!
//! 健康检查注册表和调度索引只通过此抽象访问持久化层

pub mod file;
pub mod memory;

use crate::config::types::{StoreBackend, StoreConfig};
use crate::error::{StorageError, StorageResult};
use std::sync::Arc;

// 重新导出主要类型
pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// 键值存储trait
pub trait KeyValueStore: Send + Sync {
    /// 读取单个键
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// 写入（插入或覆盖）单个键
    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// 删除单个键，返回键是否存在
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// 按前缀扫描，结果按键的字典序排列
    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;
}

/// 根据配置打开存储后端
pub fn open_store(config: &StoreConfig) -> StorageResult<Arc<dyn KeyValueStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::File => {
            let path = config.path.as_ref().ok_or_else(|| {
                StorageError::Unavailable("文件存储未配置路径".to_string())
            })?;
            Ok(Arc::new(JsonFileStore::open(path)?))
        }
    }
}
