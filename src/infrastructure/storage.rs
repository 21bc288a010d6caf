//! 本地持久化键值存储
//!
//! Flow 进度与心跳队列的持久层。写入是单键原子覆盖（整表落盘走
//! 临时文件 + rename），满足单写者假设下的崩溃一致性。
//!
//! 键名规范:
//! - `flow.<id>.stepIndex` / `flow.<id>.modulePageNum` / `flow.<id>.definition`
//! - `flow.<id>.completed` / `flow.<id>.flags.flowContextLogged.<stepIndex>`
//! - `flow.<id>.heartbeatQueue`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::warn;

use crate::error::{AppError, Result};

/// 键值存储能力
///
/// 读失败返回 None；写失败返回错误，由调用方决定吞掉还是上抛
/// （进度持久化按原实现吞掉并告警，不阻断导航）。
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// 前缀扫描（用于整 Flow 清理）
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

/// 内存存储（测试与无盘环境）
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.read().expect("存储锁中毒").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .write()
            .expect("存储锁中毒")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.write().expect("存储锁中毒").remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.map
            .read()
            .expect("存储锁中毒")
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// 文件存储
///
/// 启动时整表加载进内存，每次写入全量序列化为 JSON 落盘。
pub struct FileStore {
    path: PathBuf,
    map: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// 打开（或创建）存储文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("⚠️ 存储文件解析失败，重建: {}", e);
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(AppError::Storage {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        Ok(Self {
            path,
            map: RwLock::new(map),
        })
    }

    fn persist(&self, snapshot: &HashMap<String, String>) -> Result<()> {
        let storage_err = |source| AppError::Storage {
            path: self.path.display().to_string(),
            source,
        };

        let raw = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(storage_err)?;
        std::fs::rename(&tmp, &self.path).map_err(storage_err)?;
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.read().expect("存储锁中毒").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let snapshot = {
            let mut map = self.map.write().expect("存储锁中毒");
            map.insert(key.to_string(), value.to_string());
            map.clone()
        };
        self.persist(&snapshot)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let (changed, snapshot) = {
            let mut map = self.map.write().expect("存储锁中毒");
            let changed = map.remove(key).is_some();
            (changed, map.clone())
        };
        if changed {
            self.persist(&snapshot)?;
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.map
            .read()
            .expect("存储锁中毒")
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// 生成 Flow 专用键名
pub fn flow_key(flow_id: &str, key: &str) -> String {
    format!("flow.{}.{}", flow_id, key)
}

/// 一次性 flow_context 打点标志键名
pub fn flow_context_logged_key(flow_id: &str, step_index: usize) -> String {
    format!("flow.{}.flags.flowContextLogged.{}", flow_id, step_index)
}

/// 心跳队列键名
pub fn heartbeat_queue_key(flow_id: &str) -> String {
    flow_key(flow_id, "heartbeatQueue")
}

/// 清除指定 Flow 的全部本地状态
pub fn clear_flow_storage(store: &dyn KvStore, flow_id: &str) {
    let prefix = format!("flow.{}.", flow_id);
    for key in store.keys_with_prefix(&prefix) {
        if let Err(e) = store.remove(&key) {
            warn!("⚠️ 清理存储键 {} 失败: {}", key, e);
        }
    }
}
