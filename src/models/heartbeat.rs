//! 心跳载荷
//!
//! 粗粒度进度快照，独立于页面级 Mark 提交，尽力送达即可。

use serde::{Deserialize, Serialize};

/// 心跳载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    /// Flow ID
    pub flow_id: String,
    /// 学生考号
    pub exam_no: Option<String>,
    /// 测评批次号
    pub batch_code: Option<String>,
    /// 当前步骤索引
    pub step_index: usize,
    /// 当前子模块内页码
    pub module_page_num: String,
    /// 发送时刻（epoch 毫秒）
    pub ts: i64,
}
