//! 过渡页倒计时
//!
//! 步骤完成后、下一步挂载前渲染的过渡页可配置自动推进：
//! `auto_next_seconds > 0` 时启动倒计时自动触发推进回调；
//! 为 0 时不调度，必须由用户显式操作。
//!
//! 倒计时未到期就销毁（步骤卸载）时必须取消调度，
//! 不允许定时器落到已卸载的上下文里。

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// 过渡页倒计时句柄
pub struct TransitionCountdown {
    handle: Option<JoinHandle<()>>,
}

impl TransitionCountdown {
    /// 启动倒计时
    ///
    /// `auto_next_seconds == 0` 时不调度任何任务。
    pub fn start<F>(auto_next_seconds: u64, on_advance: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        if auto_next_seconds == 0 {
            debug!("过渡页无自动推进，等待用户操作");
            return Self { handle: None };
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(auto_next_seconds)).await;
            debug!("过渡页倒计时结束，自动推进");
            on_advance();
        });
        Self {
            handle: Some(handle),
        }
    }

    /// 是否有已调度的自动推进
    pub fn is_scheduled(&self) -> bool {
        self.handle.is_some()
    }

    /// 取消调度（幂等）
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("过渡页倒计时已取消");
        }
    }
}

impl Drop for TransitionCountdown {
    fn drop(&mut self) {
        self.cancel();
    }
}
