//! 基础设施层
//!
//! 持有稀缺资源，只向上暴露能力：
//! - `ApiClient` - 唯一的 HTTP 出口
//! - `KvStore` - 本地持久化键值存储（Flow 进度、心跳队列）

pub mod api_client;
pub mod endpoints;
pub mod storage;

pub use api_client::{ApiClient, ApiResponse};
pub use storage::{
    clear_flow_storage, flow_context_logged_key, flow_key, heartbeat_queue_key, FileStore,
    KvStore, MemoryStore,
};
