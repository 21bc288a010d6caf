//! # hci-flow
//!
//! 拼装式测评 Flow 编排与进度持久化运行时
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `ApiClient` - 唯一的 HTTP 出口，统一错误分类
//! - `KvStore` - 本地持久化键值存储（进度、心跳队列）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程顺序
//! - `PageRecorder` - 页面操作 / 答案累积能力
//! - `SubmissionChannel` - Mark 构建、校验与带重试的提交能力
//! - `HeartbeatReporter` - 进度心跳与持久化补发队列能力
//!
//! ### ③ 流程层（Flow）
//! - `flow/` - 定义"一次 Flow 会话"的完整流程
//! - `FlowOrchestrator` - 步骤状态机（加载 → 激活 → 过渡 → 完成）
//! - `FlowContext` - 稳定引用的运行时上下文
//! - `FlowSession` - 会话装配与生命周期钩子
//!
//! ### ④ 编排层（App）
//! - `app` - 应用入口：装配资源、驱动会话、输出统计
//!
//! ## 子模块契约
//!
//! 页面内容（实验、问卷）作为外部协作方，统一实现 `registry::Submodule`
//! 接口并注册进 `SubmoduleRegistry`；核心只按契约调用，不关心页面内部。

pub mod app;
pub mod config;
pub mod error;
pub mod flow;
pub mod infrastructure;
pub mod models;
pub mod registry;
pub mod services;
pub mod submodules;
pub mod utils;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, Result};
pub use flow::{FlowContext, FlowOrchestrator, FlowSession, Latest, TransitionCountdown};
pub use models::{FlowDefinition, FlowProgress, FlowStep, HeartbeatPayload, MarkObject};
pub use registry::{Submodule, SubmoduleDefinition, SubmoduleRegistry};
pub use services::{HeartbeatReporter, PageRecorder, SubmissionChannel};
