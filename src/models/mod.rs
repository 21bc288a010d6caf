//! 数据模型层
//!
//! Flow 定义 / 进度、页面标识与复合页码、Mark 提交载荷、心跳载荷

pub mod flow;
pub mod heartbeat;
pub mod mark;
pub mod page;

pub use flow::{FlowDefinition, FlowProgress, FlowStep, StepOverrides, TimerOverrides, TransitionPage};
pub use heartbeat::HeartbeatPayload;
pub use mark::{Answer, EventType, MarkInput, MarkObject, Operation, OperationValue};
pub use page::{
    encode_composite_page_num, parse_composite_page_num, CompositePageNum, NavigationMode, PageId,
    PageMap,
};
