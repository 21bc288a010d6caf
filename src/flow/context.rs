//! Flow 运行时上下文
//!
//! 子模块在步骤切换时频繁装卸；上下文身份一旦抖动会连带子树整体重建，
//! 丢失交互中的页面状态。因此这里显式选择"引用稳定优先于响应式新鲜"：
//! - 身份字段是普通值（flowId / submoduleId / stepIndex）
//! - 回调句柄创建后不再更换，内部经 `Latest` 间接读取最新状态
//! - 用户 / 计时器快照是拉取式选择器，读取结果可能落后一拍

use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::Serialize;

use crate::error::Result;

/// 最新值持有器
///
/// 约定："在不改变依赖回调身份的前提下读到最新值"。
/// 写入方 set，读取方 get，句柄本身可以随意克隆共享。
pub struct Latest<T>(Arc<RwLock<T>>);

impl<T: Clone> Latest<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// 读取当前快照
    pub fn get(&self) -> T {
        self.0.read().expect("Latest 锁中毒").clone()
    }

    /// 写入最新值
    pub fn set(&self, value: T) {
        *self.0.write().expect("Latest 锁中毒") = value;
    }
}

impl<T> Clone for Latest<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone + Default> Default for Latest<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// 用户上下文快照
#[derive(Debug, Clone, Default)]
pub struct UserSnapshot {
    /// 考号
    pub exam_no: String,
    /// 批次号
    pub batch_code: String,
    /// 当前页面 ID（可选）
    pub current_page_id: Option<String>,
}

/// 计时器快照
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerSnapshot {
    /// 任务剩余时间（秒）
    pub remaining_time: i64,
    /// 问卷剩余时间（秒）
    pub questionnaire_remaining_time: i64,
}

/// 最小 Flow 上下文快照（对外上报 / pageDesc 增强用）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContextSnapshot {
    pub flow_id: String,
    pub submodule_id: String,
    pub step_index: usize,
    pub module_page_num: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
}

/// 导航句柄（稳定引用）
pub type NavigateHandle = Arc<dyn Fn() -> bool + Send + Sync>;

/// 提交句柄（稳定引用）
pub type SubmitHandle = Arc<dyn Fn() -> BoxFuture<'static, Result<bool>> + Send + Sync>;

/// Flow 运行时上下文
///
/// 每个 Flow 步骤会话创建一次（以 flowId + submoduleId + stepIndex 为键）。
pub struct FlowContext {
    /// Flow 唯一 ID
    pub flow_id: String,
    /// 当前子模块 ID
    pub submodule_id: String,
    /// 当前步骤索引（从 0 开始）
    pub step_index: usize,
    /// 心跳是否启用
    pub heartbeat_enabled: bool,

    module_page_num: Latest<Option<String>>,
    user: Latest<UserSnapshot>,
    timers: Latest<TimerSnapshot>,
    navigate_to_next_step: NavigateHandle,
    submit_page: SubmitHandle,
}

impl FlowContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flow_id: String,
        submodule_id: String,
        step_index: usize,
        heartbeat_enabled: bool,
        module_page_num: Latest<Option<String>>,
        user: Latest<UserSnapshot>,
        timers: Latest<TimerSnapshot>,
        navigate_to_next_step: NavigateHandle,
        submit_page: SubmitHandle,
    ) -> Self {
        Self {
            flow_id,
            submodule_id,
            step_index,
            heartbeat_enabled,
            module_page_num,
            user,
            timers,
            navigate_to_next_step,
            submit_page,
        }
    }

    /// 进度快照（最小化：仅子模块内页码）
    pub fn module_page_num(&self) -> Option<String> {
        self.module_page_num.get()
    }

    /// 导航到下一步（稳定句柄）
    pub fn navigate_to_next_step(&self) -> bool {
        (self.navigate_to_next_step)()
    }

    /// 提交当前页面（稳定句柄）
    pub async fn submit_page(&self) -> Result<bool> {
        (self.submit_page)().await
    }

    /// 选择器：用户上下文快照
    pub fn user_context(&self) -> UserSnapshot {
        self.user.get()
    }

    /// 选择器：计时器快照
    pub fn timer_snapshot(&self) -> TimerSnapshot {
        self.timers.get()
    }

    /// 选择器：最小 Flow 上下文
    pub fn flow_context(&self) -> FlowContextSnapshot {
        FlowContextSnapshot {
            flow_id: self.flow_id.clone(),
            submodule_id: self.submodule_id.clone(),
            step_index: self.step_index,
            module_page_num: self.module_page_num.get(),
            page_id: self.user.get().current_page_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_reads_freshest_value() {
        let holder = Latest::new(1usize);
        let reader = holder.clone();
        // 依赖方持有的句柄不变，读到的值随写入更新
        holder.set(5);
        assert_eq!(reader.get(), 5);
        holder.set(7);
        assert_eq!(reader.get(), 7);
    }
}
