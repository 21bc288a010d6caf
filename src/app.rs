//! 编排层 - 应用入口
//!
//! ## 职责
//!
//! 1. **应用初始化**：装配存储、HTTP 客户端、子模块注册表、提交通道、心跳
//! 2. **会话驱动**：无头跑完一次 Flow 会话（解析 → 挂载 → 记录 → 提交 →
//!    过渡 → 推进 → 完成）
//! 3. **全局统计**：汇总页面提交结果
//!
//! ## 设计特点
//!
//! - 资源只在这里装配一次，按依赖注入向下传递（没有进程级单例）
//! - 不做具体业务判断，向下委托 `FlowSession`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::flow::context::UserSnapshot;
use crate::flow::session::{FlowSession, SessionPhase, StepOutcome};
use crate::flow::transition::TransitionCountdown;
use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::storage::{FileStore, KvStore};
use crate::models::mark::EventType;
use crate::models::page::NavigationMode;
use crate::registry::SubmoduleRegistry;
use crate::services::heartbeat::HeartbeatReporter;
use crate::services::submission::SubmissionChannel;
use crate::submodules;
use crate::utils::logging::{log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    registry: Arc<SubmoduleRegistry>,
    store: Arc<dyn KvStore>,
    client: Arc<ApiClient>,
    channel: Arc<SubmissionChannel>,
    reporter: Arc<HeartbeatReporter>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let store: Arc<dyn KvStore> = Arc::new(FileStore::open(&config.storage_file)?);
        let client = Arc::new(ApiClient::new(&config)?);

        let registry = Arc::new(SubmoduleRegistry::new());
        registry.register_loader(submodules::builtin_loader());
        registry.initialize().await?;

        let channel = Arc::new(
            SubmissionChannel::new(Arc::clone(&client)).with_session_expired_handler(Arc::new(
                || {
                    warn!("🚪 会话已过期，请重新登录");
                },
            )),
        );
        let reporter = Arc::new(HeartbeatReporter::new(
            Arc::clone(&client),
            Arc::clone(&store),
        ));

        Ok(Self {
            config,
            registry,
            store,
            client,
            channel,
            reporter,
        })
    }

    /// 运行应用主逻辑：无头驱动一次完整的 Flow 会话
    pub async fn run(&self) -> Result<()> {
        let user = UserSnapshot {
            exam_no: self.config.exam_no.clone(),
            batch_code: self.config.batch_code.clone(),
            current_page_id: None,
        };

        let mut session = FlowSession::new(
            self.config.flow_id.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            Some(Arc::clone(&self.client)),
            Arc::clone(&self.channel),
            Arc::clone(&self.reporter),
            user,
            self.config.heartbeat_enabled,
            Duration::from_millis(self.config.heartbeat_interval_ms),
        );

        session.start().await?;

        let mut submitted = 0usize;
        let mut failed = 0usize;

        loop {
            match session.phase() {
                SessionPhase::Completed => break,
                SessionPhase::Active => {
                    self.drive_current_step(&mut session, &mut submitted, &mut failed)
                        .await?;
                    match session.complete_current_step()? {
                        StepOutcome::Transition(transition) => {
                            self.wait_for_transition(transition.auto_next_seconds, &transition)
                                .await;
                            if matches!(session.confirm_transition()?, StepOutcome::Completed) {
                                break;
                            }
                        }
                        StepOutcome::Advanced => {}
                        StepOutcome::Completed => break,
                    }
                }
                other => {
                    return Err(AppError::configuration(format!(
                        "会话处于意外阶段: {:?}",
                        other
                    )))
                }
            }
        }

        print_final_stats(submitted, failed, &self.config.flow_id);
        session.shutdown();
        Ok(())
    }

    /// 依次走完当前步骤的所有子页面：模拟作答、离页提交
    async fn drive_current_step(
        &self,
        session: &mut FlowSession,
        submitted: &mut usize,
        failed: &mut usize,
    ) -> Result<()> {
        let (submodule, start_page) = {
            let current = session
                .current_step()
                .ok_or_else(|| AppError::validation("当前没有已挂载的步骤"))?;
            let submodule = current
                .submodule
                .clone()
                .ok_or_else(|| AppError::RegistryMiss {
                    submodule_id: current.submodule_id.clone().unwrap_or_default(),
                })?;
            let start_page: u32 = current
                .module_page_num
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            (submodule, start_page)
        };

        let total_pages = submodule.component.total_steps();

        for page_num in start_page..=total_pages {
            let page = submodule.component.initial_page(&page_num.to_string());
            if page_num != start_page {
                session.enter_module_page(&page_num.to_string(), &page);
            }

            // 模拟学生操作与作答
            let recorder = session.recorder();
            recorder.log_operation("下一页按钮", EventType::Click, "下一页".into());
            if submodule.component.navigation_mode(&page) == NavigationMode::Questionnaire {
                recorder.collect_answer(&format!("P{}_Q1", page_num), "选项A");
            }
            recorder.exit_page();

            match session.submit_current_page().await {
                Ok(true) => *submitted += 1,
                Ok(false) => {
                    warn!("⚠️ 提交被跳过（已有提交在途）");
                    *failed += 1;
                }
                Err(e) => {
                    *failed += 1;
                    if !self.config.allow_proceed_on_failure {
                        return Err(e);
                    }
                    warn!("⚠️ 页面提交失败，按配置放行: {}", e);
                }
            }
        }
        Ok(())
    }

    /// 等待过渡页推进（倒计时自动或模拟用户点击）
    async fn wait_for_transition(
        &self,
        auto_next_seconds: u64,
        transition: &crate::models::flow::TransitionPage,
    ) {
        info!(
            "🎬 过渡页: {} - {}",
            transition.title.as_deref().unwrap_or(""),
            transition.content.as_deref().unwrap_or("")
        );

        if auto_next_seconds > 0 {
            let (advance_tx, advance_rx) = oneshot::channel();
            let _countdown = TransitionCountdown::start(auto_next_seconds, move || {
                let _ = advance_tx.send(());
            });
            let _ = advance_rx.await;
        } else {
            info!("👆 无自动推进，模拟用户点击继续");
        }
    }
}
