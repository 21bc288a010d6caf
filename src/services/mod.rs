//! 业务能力层
//!
//! 描述"我能做什么"，不关心流程顺序：
//! - `PageRecorder` - 页面内操作 / 答案累积能力
//! - `SubmissionChannel` - Mark 构建、校验与带重试的提交能力
//! - `HeartbeatReporter` - 进度心跳与持久化补发队列能力
//! - `SessionService` - 会话有效性检查能力

pub mod heartbeat;
pub mod recorder;
pub mod session;
pub mod submission;

pub use heartbeat::{HeartbeatHandle, HeartbeatOptions, HeartbeatReporter};
pub use recorder::PageRecorder;
pub use session::SessionService;
pub use submission::{SubmissionChannel, SubmissionStatus, UserContext};
