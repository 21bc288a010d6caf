//! 流程层
//!
//! 单个 Flow 会话的编排：
//! - `FlowOrchestrator` - 加载定义 / 解析进度 / 驱动步骤转移 / 持久化
//! - `FlowContext` - 稳定引用的运行时上下文
//! - `TransitionCountdown` - 过渡页自动推进倒计时（销毁即取消）
//! - `FlowSession` - 把注册表、提交通道、心跳装配成一次完整会话

pub mod context;
pub mod mock_definitions;
pub mod orchestrator;
pub mod session;
pub mod transition;

pub use context::{FlowContext, FlowContextSnapshot, Latest, TimerSnapshot, UserSnapshot};
pub use orchestrator::{FlowOrchestrator, ResolvedStep};
pub use session::{FlowSession, SessionCommand, SessionPhase, StepOutcome};
pub use transition::TransitionCountdown;
