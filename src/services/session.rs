//! 会话检查服务
//!
//! 与提交通道共享同一套错误分类，但策略不同：
//! 401（传输层或业务码）触发会话过期回调；
//! 网络错误被吞掉——瞬时断网不应把会话判死。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::endpoints;
use crate::services::submission::SessionExpiredHandler;

/// 会话检查服务
pub struct SessionService {
    client: Arc<ApiClient>,
    on_session_expired: Option<SessionExpiredHandler>,
}

impl SessionService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            on_session_expired: None,
        }
    }

    /// 设置会话过期回调
    pub fn with_session_expired_handler(mut self, handler: SessionExpiredHandler) -> Self {
        self.on_session_expired = Some(handler);
        self
    }

    /// 检查会话有效性
    ///
    /// 返回 false 仅表示确认过期；网络异常视为"未知但存活"。
    pub async fn check(&self, session_id: &str, student_code: &str) -> bool {
        let path = endpoints::check_session(session_id, student_code);
        match self.client.get(&path).await {
            Ok(response) if response.is_ok() => {
                debug!("✓ 会话有效: {}", student_code);
                true
            }
            Ok(response) => {
                // 非 200 非 401 的业务码：保守视为存活
                warn!("⚠️ 会话检查返回异常业务码: {}", response.code);
                true
            }
            Err(e) if e.is_session_expired() => {
                warn!("🚪 会话已过期: {}", student_code);
                if let Some(handler) = &self.on_session_expired {
                    handler();
                }
                false
            }
            Err(e) => {
                // 瞬时网络故障：吞掉，不判死会话
                warn!("⚠️ 会话检查网络失败（忽略）: {}", e);
                true
            }
        }
    }
}
