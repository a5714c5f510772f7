//! JSON文件键值存储
//!
//! 打开时整体加载，每次写操作后整体落盘（先写临时文件再重命名）

use super::KeyValueStore;
use crate::error::{StorageError, StorageResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// 基于单个JSON文件的持久化存储
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// 打开（或创建）存储文件
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let data = fs::read_to_string(&path).map_err(|e| StorageError::Io(e.to_string()))?;
            if data.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&data).map_err(|e| StorageError::Deserialize(e.to_string()))?
            }
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
                }
            }
            BTreeMap::new()
        };

        debug!("打开存储文件: {}, 记录数: {}", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// 存储文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let data =
            serde_json::to_vec_pretty(entries).map_err(|e| StorageError::Serialize(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data).map_err(|e| StorageError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("文件存储锁已中毒".to_string()))
    }
}

// 值以UTF-8字符串形式保存，记录本身都是JSON
fn encode(value: Vec<u8>) -> StorageResult<String> {
    String::from_utf8(value).map_err(|e| StorageError::Serialize(e.to_string()))
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let entries = self.lock()?;
        Ok(entries.get(key).map(|v| v.clone().into_bytes()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let value = encode(value)?;
        let mut entries = self.lock()?;
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.flush(&entries) {
            // 落盘失败时回滚内存状态，保持与文件一致
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut entries = self.lock()?;
        match entries.remove(key) {
            Some(old) => {
                if let Err(e) = self.flush(&entries) {
                    entries.insert(key.to_string(), old);
                    return Err(e);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let entries = self.lock()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone().into_bytes()))
            .collect())
    }
}
