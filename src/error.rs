//! 应用程序错误类型
//!
//! 错误分类决定了调用链路的处理策略：
//! - `Validation` / `Configuration`：本地错误，永不重试，阻断触发它的操作
//! - `Authorization`：会话过期（401），绕过重试，触发会话清理副作用
//! - `TransientNetwork`：超时 / 连接失败 / 5xx，按退避策略重试
//! - `RegistryMiss`：未知子模块，本地降级到占位模块，不会使外层崩溃

use thiserror::Error;

/// 应用程序结果类型
pub type Result<T> = std::result::Result<T, AppError>;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 本地校验错误（数据格式非法、越界导航等）
    #[error("校验失败: {0}")]
    Validation(String),

    /// 会话已过期（HTTP 401 或业务码 401）
    #[error("会话已过期: {message}")]
    Authorization {
        /// 后端返回的提示信息
        message: String,
    },

    /// 瞬时网络错误（超时、连接失败、5xx）
    #[error("网络错误 ({endpoint}): {message}")]
    TransientNetwork {
        /// 请求的端点路径
        endpoint: String,
        /// 失败原因
        message: String,
    },

    /// 配置 / 注册错误（启动期致命）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 子模块未注册
    #[error("子模块未注册: {submodule_id}")]
    RegistryMiss {
        /// 请求的子模块 ID
        submodule_id: String,
    },

    /// 本地存储读写失败
    #[error("存储错误 ({path}): {source}")]
    Storage {
        /// 存储文件路径
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON 序列化 / 反序列化失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// 创建校验错误
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// 创建会话过期错误
    pub fn session_expired(message: impl Into<String>) -> Self {
        AppError::Authorization {
            message: message.into(),
        }
    }

    /// 创建瞬时网络错误
    pub fn transient(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::TransientNetwork {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// 创建配置错误
    pub fn configuration(message: impl Into<String>) -> Self {
        AppError::Configuration(message.into())
    }

    /// 该错误是否允许重试
    ///
    /// 只有瞬时网络错误可以重试；校验、授权、配置错误必须快速失败。
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientNetwork { .. })
    }

    /// 该错误是否为会话过期
    pub fn is_session_expired(&self) -> bool {
        matches!(self, AppError::Authorization { .. })
    }
}
