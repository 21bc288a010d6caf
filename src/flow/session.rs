//! Flow 会话
//!
//! 把编排器、注册表、提交通道、心跳装配成一次完整的测评会话，
//! 并承载宿主壳层的生命周期钩子（完成 / 超时 / 过渡页确认）。
//!
//! 导航默认被提交门禁：页面 Mark 提交未成功（或重试耗尽）前
//! 不提交步骤转移——丢失提交即丢失数据；心跳则是显式的
//! "发了就走 + 本地补发队列"策略，不门禁导航。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::flow::context::{
    FlowContext, FlowContextSnapshot, Latest, TimerSnapshot, UserSnapshot,
};
use crate::flow::orchestrator::{FlowOrchestrator, ResolvedStep};
use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::storage::{flow_context_logged_key, KvStore};
use crate::models::flow::{TimerOverrides, TransitionPage};
use crate::models::mark::{EventType, MarkInput, OperationValue};
use crate::models::page::PageId;
use crate::registry::{SubmoduleProps, SubmoduleRegistry};
use crate::services::heartbeat::{HeartbeatHandle, HeartbeatOptions, HeartbeatReporter};
use crate::services::recorder::PageRecorder;
use crate::services::submission::{SubmissionChannel, UserContext};
use crate::utils::logging::{log_flow_loaded, log_step_start};
use crate::utils::time::now_timestamp;

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Loading,
    Active,
    Transition,
    Completed,
}

/// 步骤完成后的去向
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// 需要先渲染过渡页
    Transition(TransitionPage),
    /// 已推进到下一步并完成挂载
    Advanced,
    /// 整个 Flow 进入终态
    Completed,
}

/// 子模块经稳定句柄发来的会话指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// 当前步骤完成，请求推进
    NextStep,
    /// 计时超时，按完成处理
    Timeout,
}

/// Flow 会话
pub struct FlowSession {
    registry: Arc<SubmoduleRegistry>,
    store: Arc<dyn KvStore>,
    channel: Arc<SubmissionChannel>,
    reporter: Arc<HeartbeatReporter>,
    orchestrator: FlowOrchestrator,
    recorder: Arc<PageRecorder>,

    user: Latest<UserSnapshot>,
    timers: Latest<TimerSnapshot>,
    step_index: Latest<usize>,
    module_page_num: Latest<Option<String>>,

    phase: SessionPhase,
    current: Option<ResolvedStep>,
    heartbeat: Option<HeartbeatHandle>,
    heartbeat_enabled: bool,
    heartbeat_interval: Duration,

    commands_tx: mpsc::UnboundedSender<SessionCommand>,
    commands_rx: mpsc::UnboundedReceiver<SessionCommand>,
}

impl FlowSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flow_id: impl Into<String>,
        registry: Arc<SubmoduleRegistry>,
        store: Arc<dyn KvStore>,
        client: Option<Arc<ApiClient>>,
        channel: Arc<SubmissionChannel>,
        reporter: Arc<HeartbeatReporter>,
        user: UserSnapshot,
        heartbeat_enabled: bool,
        heartbeat_interval: Duration,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let orchestrator = FlowOrchestrator::new(flow_id, Arc::clone(&store), client);
        Self {
            registry,
            store,
            channel,
            reporter,
            orchestrator,
            recorder: Arc::new(PageRecorder::new()),
            user: Latest::new(user),
            timers: Latest::new(TimerSnapshot::default()),
            step_index: Latest::new(0),
            module_page_num: Latest::new(None),
            phase: SessionPhase::Idle,
            current: None,
            heartbeat: None,
            heartbeat_enabled,
            heartbeat_interval,
            commands_tx,
            commands_rx,
        }
    }

    /// 启动会话：加载 Flow、启动心跳、挂载当前步骤
    pub async fn start(&mut self) -> Result<()> {
        self.phase = SessionPhase::Loading;
        let (definition, progress) = self.orchestrator.load().await?;
        log_flow_loaded(&definition.name, definition.steps.len(), progress.step_index);

        if self.orchestrator.is_completed() {
            info!("🏁 Flow 已是完成态: {}", self.orchestrator.flow_id());
            self.phase = SessionPhase::Completed;
            return Ok(());
        }

        self.start_heartbeat();
        self.mount_current()
    }

    /// 当前会话阶段
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// 当前已解析的步骤
    pub fn current_step(&self) -> Option<&ResolvedStep> {
        self.current.as_ref()
    }

    /// 页面数据记录器（子模块经 props 回调最终写到这里）
    pub fn recorder(&self) -> &Arc<PageRecorder> {
        &self.recorder
    }

    /// 构建当前步骤的运行时上下文
    ///
    /// 句柄内部经 `Latest` 间接取值：用户 / 计时器状态更新不需要
    /// 重建上下文，消费方持有的引用保持稳定。
    pub fn context(&self) -> FlowContext {
        let resolved = self.current.as_ref();
        let submodule_id = resolved
            .and_then(|r| r.submodule_id.clone())
            .unwrap_or_default();

        let commands = self.commands_tx.clone();
        let navigate: Arc<dyn Fn() -> bool + Send + Sync> =
            Arc::new(move || commands.send(SessionCommand::NextStep).is_ok());

        let channel = Arc::clone(&self.channel);
        let recorder = Arc::clone(&self.recorder);
        let user = self.user.clone();
        let step_index = self.step_index.clone();
        let module_page_num = self.module_page_num.clone();
        let flow_id = self.orchestrator.flow_id().to_string();
        let display_name = resolved
            .and_then(|r| r.step.as_ref().map(|s| s.display_name().to_string()))
            .unwrap_or_default();
        let submodule_for_submit = submodule_id.clone();

        let submit: Arc<
            dyn Fn() -> futures::future::BoxFuture<'static, Result<bool>> + Send + Sync,
        > = Arc::new(move || {
            let channel = Arc::clone(&channel);
            let recorder = Arc::clone(&recorder);
            let user = user.clone();
            let step_index = step_index.clone();
            let module_page_num = module_page_num.clone();
            let flow_id = flow_id.clone();
            let submodule_id = submodule_for_submit.clone();
            let display_name = display_name.clone();
            Box::pin(async move {
                let snapshot = FlowContextSnapshot {
                    flow_id,
                    submodule_id,
                    step_index: step_index.get(),
                    module_page_num: module_page_num.get(),
                    page_id: recorder.page_id(),
                };
                submit_page(
                    &channel,
                    &recorder,
                    &user.get(),
                    &display_name,
                    &snapshot,
                )
                .await
            })
        });

        FlowContext::new(
            self.orchestrator.flow_id().to_string(),
            submodule_id,
            self.step_index.get(),
            self.heartbeat_enabled,
            self.module_page_num.clone(),
            self.user.clone(),
            self.timers.clone(),
            navigate,
            submit,
        )
    }

    /// 提交当前页面的 Mark（导航门禁点）
    pub async fn submit_current_page(&self) -> Result<bool> {
        let display_name = self
            .current
            .as_ref()
            .and_then(|r| r.step.as_ref().map(|s| s.display_name().to_string()))
            .ok_or_else(|| AppError::validation("当前没有已挂载的步骤"))?;
        let snapshot = self.flow_snapshot();
        submit_page(
            &self.channel,
            &self.recorder,
            &self.user.get(),
            &display_name,
            &snapshot,
        )
        .await
    }

    /// 子模块内翻页：持久化子页码并开始记录新页面
    pub fn enter_module_page(&mut self, sub_page_num: &str, page: &PageId) {
        self.orchestrator
            .set_module_page_num(Some(sub_page_num.to_string()));
        self.module_page_num.set(Some(sub_page_num.to_string()));
        self.recorder.enter_page(Some(page.to_string()));
        let mut user = self.user.get();
        user.current_page_id = Some(page.to_string());
        self.user.set(user);
    }

    /// 当前步骤完成（宿主 onComplete 钩子）
    ///
    /// 调用子模块销毁钩子；配置了过渡页则先进入 Transition 阶段，
    /// 否则直接推进。
    pub fn complete_current_step(&mut self) -> Result<StepOutcome> {
        let Some(current) = self.current.as_ref() else {
            return Err(AppError::validation("当前没有已挂载的步骤"));
        };

        if let Some(submodule) = &current.submodule {
            submodule.component.on_destroy();
        }
        self.orchestrator.mark_step_completed(current.step_index);

        let transition = current
            .step
            .as_ref()
            .and_then(|s| s.transition_page.clone());
        if let Some(transition) = transition {
            info!("🎬 渲染过渡页 (autoNextSeconds={})", transition.auto_next_seconds);
            self.phase = SessionPhase::Transition;
            return Ok(StepOutcome::Transition(transition));
        }

        self.advance_step()
    }

    /// 计时超时（宿主 onTimeout 钩子）：按完成处理
    pub fn timeout_current_step(&mut self) -> Result<StepOutcome> {
        warn!("⏰ 子模块计时超时，按完成处理");
        self.complete_current_step()
    }

    /// 过渡页确认（倒计时回调或用户点击后调用）
    pub fn confirm_transition(&mut self) -> Result<StepOutcome> {
        if self.phase != SessionPhase::Transition {
            return Err(AppError::validation("当前不在过渡页阶段"));
        }
        self.advance_step()
    }

    /// 取出一条待处理的会话指令
    pub fn try_recv_command(&mut self) -> Option<SessionCommand> {
        self.commands_rx.try_recv().ok()
    }

    /// 处理子模块发来的会话指令
    pub fn handle_command(&mut self, command: SessionCommand) -> Result<StepOutcome> {
        match (command, self.phase) {
            (_, SessionPhase::Transition) => self.confirm_transition(),
            (SessionCommand::NextStep, _) => self.complete_current_step(),
            (SessionCommand::Timeout, _) => self.timeout_current_step(),
        }
    }

    /// 结束会话：取消心跳、销毁编排器
    pub fn shutdown(&mut self) {
        self.heartbeat = None;
        self.orchestrator.dispose();
    }

    fn advance_step(&mut self) -> Result<StepOutcome> {
        if self.orchestrator.advance() {
            self.mount_current()?;
            Ok(StepOutcome::Advanced)
        } else {
            self.phase = SessionPhase::Completed;
            self.current = None;
            // 终态：心跳随会话作用域一并撤下
            self.heartbeat = None;
            Ok(StepOutcome::Completed)
        }
    }

    /// 挂载当前步骤的子模块
    fn mount_current(&mut self) -> Result<()> {
        let resolved = self.orchestrator.resolve(&self.registry)?;
        let Some(submodule) = resolved.submodule.clone() else {
            return Err(AppError::RegistryMiss {
                submodule_id: resolved.submodule_id.clone().unwrap_or_default(),
            });
        };

        let total_steps = self
            .orchestrator
            .definition()
            .map(|d| d.steps.len())
            .unwrap_or(0);
        let display_name = resolved
            .step
            .as_ref()
            .map(|s| s.display_name().to_string())
            .unwrap_or_else(|| submodule.submodule_id.clone());
        log_step_start(resolved.step_index, total_steps, &display_name);

        self.step_index.set(resolved.step_index);
        self.module_page_num.set(resolved.module_page_num.clone());

        let initial_page = resolved
            .initial_page
            .clone()
            .unwrap_or(PageId::Notice);

        // 先进入页面（重置记录器），flow_context 操作才能留在首页的 Mark 里
        self.recorder.enter_page(Some(initial_page.to_string()));
        self.log_flow_context_once(&resolved, &display_name);
        submodule.component.on_initialize();

        let timers = effective_timers(&resolved, &submodule);
        self.timers.set(TimerSnapshot {
            remaining_time: timers.task.unwrap_or(0) as i64,
            questionnaire_remaining_time: timers.questionnaire.unwrap_or(0) as i64,
        });

        let mut user = self.user.get();
        user.current_page_id = Some(initial_page.to_string());
        self.user.set(user);

        let props = SubmoduleProps {
            initial_page: initial_page.clone(),
            user: self.user.get(),
            timers,
            flow: Some(self.flow_snapshot_for(&resolved)),
        };
        let output = submodule.component.render(&props);
        info!("🖥️ {}", output);

        self.current = Some(resolved);
        self.phase = SessionPhase::Active;
        Ok(())
    }

    /// 每个步骤只记录一次 flow_context 操作（持久化去重标志）
    fn log_flow_context_once(&self, resolved: &ResolvedStep, display_name: &str) {
        let flow_id = self.orchestrator.flow_id();
        let key = flow_context_logged_key(flow_id, resolved.step_index);
        if self.store.get(&key).as_deref() == Some("true") {
            return;
        }

        self.recorder.log_operation(
            "页面",
            EventType::FlowContext,
            OperationValue::Data(json!({
                "flowId": flow_id,
                "stepIndex": resolved.step_index,
                "submoduleId": resolved.submodule_id,
                "moduleName": display_name,
            })),
        );
        if let Err(e) = self.store.set(&key, "true") {
            warn!("⚠️ flow_context 打点标志写入失败: {}", e);
        }
    }

    fn start_heartbeat(&mut self) {
        let user = self.user.get();
        let enabled = self.heartbeat_enabled
            && !user.exam_no.is_empty()
            && !user.batch_code.is_empty();
        if !enabled {
            info!("💤 心跳未启用 (enabled={})", self.heartbeat_enabled);
            return;
        }

        let options = HeartbeatOptions {
            flow_id: self.orchestrator.flow_id().to_string(),
            exam_no: Some(user.exam_no),
            batch_code: Some(user.batch_code),
            step_index: self.step_index.clone(),
            module_page_num: self.module_page_num.clone(),
            interval: self.heartbeat_interval,
            on_error: None,
        };
        self.heartbeat = Some(self.reporter.start(options));
    }

    /// 页面可见性变化透传给心跳
    pub fn set_visible(&self, visible: bool) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.set_visible(visible);
        }
    }

    fn flow_snapshot(&self) -> FlowContextSnapshot {
        FlowContextSnapshot {
            flow_id: self.orchestrator.flow_id().to_string(),
            submodule_id: self
                .current
                .as_ref()
                .and_then(|r| r.submodule_id.clone())
                .unwrap_or_default(),
            step_index: self.step_index.get(),
            module_page_num: self.module_page_num.get(),
            page_id: self.recorder.page_id(),
        }
    }

    fn flow_snapshot_for(&self, resolved: &ResolvedStep) -> FlowContextSnapshot {
        FlowContextSnapshot {
            flow_id: self.orchestrator.flow_id().to_string(),
            submodule_id: resolved.submodule_id.clone().unwrap_or_default(),
            step_index: resolved.step_index,
            module_page_num: resolved.module_page_num.clone(),
            page_id: resolved.initial_page.as_ref().map(|p| p.to_string()),
        }
    }
}

/// 合并步骤覆盖与子模块默认计时器
fn effective_timers(
    resolved: &ResolvedStep,
    submodule: &crate::registry::SubmoduleDefinition,
) -> TimerOverrides {
    let defaults = submodule.component.default_timers();
    let overrides = resolved
        .step
        .as_ref()
        .and_then(|s| s.overrides.as_ref())
        .and_then(|o| o.timers)
        .unwrap_or_default();
    TimerOverrides {
        task: overrides.task.or(defaults.task),
        questionnaire: overrides.questionnaire.or(defaults.questionnaire),
    }
}

/// 提交一页：构建 Mark 输入并走提交通道，成功后清空记录器
async fn submit_page(
    channel: &SubmissionChannel,
    recorder: &PageRecorder,
    user: &UserSnapshot,
    step_display_name: &str,
    flow: &FlowContextSnapshot,
) -> Result<bool> {
    let sub_page = flow
        .module_page_num
        .clone()
        .unwrap_or_else(|| "1".to_string());
    let page_number = format!("{}.{}", flow.step_index + 1, sub_page);
    let page_desc = format!("{}第{}页", step_display_name, sub_page);

    let (operations, answers, begin_time) = recorder.snapshot();
    let input = MarkInput {
        page_number,
        page_desc,
        operations,
        answers,
        begin_time,
        end_time: Some(now_timestamp()),
    };

    let user_context = UserContext {
        exam_no: user.exam_no.clone(),
        batch_code: user.batch_code.clone(),
    };

    let submitted = channel.submit(&user_context, input, Some(flow)).await?;
    if submitted {
        recorder.clear();
    }
    Ok(submitted)
}
