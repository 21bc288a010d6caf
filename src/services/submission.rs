//! 页面提交通道
//!
//! 构建离开页面的 Mark 记录并提交到后端：
//! 1. 归一化（code 重排、时间补齐、flow_context 操作注入、pageDesc 增强）
//! 2. 结构校验（本地错误，不发起网络请求，不重试）
//! 3. 提交，瞬时失败按 1s/2s/4s 退避重试，最多 3 次
//!
//! 401 绕过重试并触发会话过期回调（恰好一次）；
//! 重试耗尽后错误通过 `last_error` 暴露，默认策略是调用方阻断导航
//! （丢失提交即丢失数据）。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::flow::context::FlowContextSnapshot;
use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::endpoints;
use crate::models::mark::{
    build_mark_object, validate_mark_object, EventType, MarkInput, MarkObject, Operation,
    OperationValue,
};
use crate::utils::time::now_timestamp;

/// 重试间隔（次数即最大尝试次数）
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(1000),
    Duration::from_millis(2000),
    Duration::from_millis(4000),
];

/// 提交所需的用户上下文
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub exam_no: String,
    pub batch_code: String,
}

/// 提交状态（供 UI 层读取）
#[derive(Debug, Clone, Default)]
pub struct SubmissionStatus {
    /// 请求在途（含重试期间）
    pub is_submitting: bool,
    /// 本次提交已发生的重试次数
    pub retry_count: u32,
    /// 最近一次失败原因
    pub last_error: Option<String>,
}

/// 会话过期回调
pub type SessionExpiredHandler = Arc<dyn Fn() + Send + Sync>;

/// 页面提交通道
pub struct SubmissionChannel {
    client: Arc<ApiClient>,
    status: Mutex<SubmissionStatus>,
    on_session_expired: Option<SessionExpiredHandler>,
}

impl SubmissionChannel {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            status: Mutex::new(SubmissionStatus::default()),
            on_session_expired: None,
        }
    }

    /// 设置会话过期回调
    pub fn with_session_expired_handler(mut self, handler: SessionExpiredHandler) -> Self {
        self.on_session_expired = Some(handler);
        self
    }

    /// 当前提交状态快照
    pub fn status(&self) -> SubmissionStatus {
        self.status.lock().expect("提交状态锁中毒").clone()
    }

    /// 清除错误状态
    pub fn clear_error(&self) {
        self.status.lock().expect("提交状态锁中毒").last_error = None;
    }

    /// 提交页面 Mark
    ///
    /// 返回 Ok(true) 提交成功；Ok(false) 跳过（已有提交在途）；
    /// Err 为校验 / 授权 / 重试耗尽错误，同时写入 `last_error`。
    pub async fn submit(
        &self,
        user: &UserContext,
        input: MarkInput,
        flow: Option<&FlowContextSnapshot>,
    ) -> Result<bool> {
        {
            let mut status = self.status.lock().expect("提交状态锁中毒");
            if status.is_submitting {
                warn!("⚠️ 正在提交中，跳过重复请求");
                return Ok(false);
            }
            *status = SubmissionStatus {
                is_submitting: true,
                retry_count: 0,
                last_error: None,
            };
        }

        match self.submit_inner(user, input, flow).await {
            Ok(()) => {
                self.finish(None);
                Ok(true)
            }
            Err(e) => {
                self.finish(Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn submit_inner(
        &self,
        user: &UserContext,
        input: MarkInput,
        flow: Option<&FlowContextSnapshot>,
    ) -> Result<()> {
        if user.batch_code.trim().is_empty() || user.exam_no.trim().is_empty() {
            return Err(AppError::validation("提交失败：缺少 batchCode/examNo"));
        }

        let mark = prepare_mark(input, flow);
        validate_mark_object(&mark)?;

        let mark_json = serde_json::to_string(&mark)?;
        let form = vec![
            ("mark", mark_json),
            ("batchCode", user.batch_code.clone()),
            ("examNo", user.exam_no.clone()),
        ];

        for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
            info!(
                "📤 发起页面提交 (尝试 {}/{}): {} {}",
                attempt + 1,
                RETRY_DELAYS.len(),
                mark.page_number,
                mark.page_desc
            );

            let outcome = self.client.post_form(endpoints::save_mark(), &form).await;

            let failure = match outcome {
                Ok(response) if response.is_ok() => {
                    info!("✓ 页面提交成功: {}", mark.page_number);
                    return Ok(());
                }
                Ok(response) => AppError::transient(
                    endpoints::save_mark(),
                    response
                        .message
                        .unwrap_or_else(|| format!("提交失败（{}）", response.code)),
                ),
                Err(e) if e.is_session_expired() => {
                    warn!("🚪 会话过期，终止重试");
                    if let Some(handler) = &self.on_session_expired {
                        handler();
                    }
                    return Err(e);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            let is_last_attempt = attempt == RETRY_DELAYS.len() - 1;
            warn!(
                "⚠️ 页面提交失败 (尝试 {}/{}): {}",
                attempt + 1,
                RETRY_DELAYS.len(),
                failure
            );
            if is_last_attempt {
                return Err(failure);
            }

            self.status.lock().expect("提交状态锁中毒").retry_count += 1;
            sleep(*delay).await;
        }

        unreachable!("重试循环总是在最后一次尝试返回")
    }

    fn finish(&self, error: Option<String>) {
        let mut status = self.status.lock().expect("提交状态锁中毒");
        status.is_submitting = false;
        status.last_error = error;
    }
}

/// 归一化 Mark：注入 flow_context 操作并增强 pageDesc
fn prepare_mark(mut input: MarkInput, flow: Option<&FlowContextSnapshot>) -> MarkObject {
    if let Some(flow) = flow {
        inject_flow_context_operation(&mut input.operations, flow);
        input.page_desc = enhance_page_desc(&input.page_desc, flow);
    }
    build_mark_object(input)
}

/// 注入（或归一化已有的）flow_context 操作
fn inject_flow_context_operation(operations: &mut Vec<Operation>, flow: &FlowContextSnapshot) {
    let context_value = json!({
        "flowId": flow.flow_id,
        "submoduleId": flow.submodule_id,
        "stepIndex": flow.step_index,
        "pageId": flow.page_id,
    });

    if let Some(existing) = operations
        .iter_mut()
        .find(|op| op.event_type == EventType::FlowContext)
    {
        if !existing.value.is_object() {
            existing.value = OperationValue::Data(context_value);
        }
        if existing.page_id.is_none() {
            existing.page_id = flow.page_id.clone();
        }
        return;
    }

    operations.push(Operation {
        code: operations.len() as u32 + 1,
        target_element: "flow_context".to_string(),
        event_type: EventType::FlowContext,
        value: OperationValue::Data(context_value),
        time: now_timestamp(),
        page_id: flow.page_id.clone(),
    });
}

/// 增强 pageDesc，追加 Flow 上下文前缀
///
/// `问题1页面` → `[g7a-mix-001/g7-experiment/0] 问题1页面`
pub fn enhance_page_desc(original: &str, flow: &FlowContextSnapshot) -> String {
    if flow.flow_id.is_empty() || flow.submodule_id.is_empty() {
        warn!("⚠️ Flow 上下文不完整，跳过 pageDesc 增强");
        return original.to_string();
    }
    format!(
        "[{}/{}/{}] {}",
        flow.flow_id, flow.submodule_id, flow.step_index, original
    )
}

/// 从增强后的 pageDesc 提取 Flow 上下文
pub fn extract_flow_context(page_desc: &str) -> Option<(String, String, usize, String)> {
    let pattern = Regex::new(r"^\[([^/\]]+)/([^/\]]+)/(\d+)\]\s*(.*)$").ok()?;
    let captures = pattern.captures(page_desc)?;
    Some((
        captures[1].to_string(),
        captures[2].to_string(),
        captures[3].parse().ok()?,
        captures[4].to_string(),
    ))
}
