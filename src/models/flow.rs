//! Flow 定义与进度结构
//!
//! FlowDefinition 一经加载不可变；FlowProgress 是会话恢复的唯一事实来源，
//! 由编排器在每次确认的导航上更新并持久化。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flow 定义结构（后端存储 / 本地 Mock）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    /// Flow 唯一标识
    pub flow_id: String,
    /// Flow 显示名称
    pub name: String,
    /// Flow 路由路径，格式: /flow/<flowId>
    pub url: String,
    /// 描述信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 状态：draft/published 等
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// 版本号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// 步骤列表（顺序即测评顺序，加载后固定）
    pub steps: Vec<FlowStep>,
}

/// Flow 步骤定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStep {
    /// 子模块 ID (kebab-case)
    pub submodule_id: String,
    /// 步骤显示名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// 配置覆盖
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<StepOverrides>,
    /// 过渡页配置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_page: Option<TransitionPage>,
}

impl FlowStep {
    /// 步骤显示名称（缺省回落到子模块 ID）
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.submodule_id)
    }
}

/// 步骤级配置覆盖
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOverrides {
    /// 计时器配置覆盖
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timers: Option<TimerOverrides>,
}

/// 计时器覆盖（秒）
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerOverrides {
    /// 任务计时（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<u64>,
    /// 问卷计时（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire: Option<u64>,
}

/// 过渡页配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPage {
    /// 过渡页标题
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 过渡页内容
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// 自动跳转秒数（0 表示需用户手动点击）
    #[serde(default)]
    pub auto_next_seconds: u64,
}

/// Flow 进度结构（后端返回 + 本地持久化）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowProgress {
    /// 当前所在步骤索引（从 0 开始）
    pub step_index: usize,
    /// 当前子模块内的页码（首页解析前为 None）
    #[serde(default)]
    pub module_page_num: Option<String>,
    /// 是否已完成
    #[serde(default)]
    pub completed: bool,
    /// 各步骤完成状态
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub step_completed: BTreeMap<usize, bool>,
    /// 最后更新时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl Default for FlowProgress {
    fn default() -> Self {
        Self {
            step_index: 0,
            module_page_num: None,
            completed: false,
            step_completed: BTreeMap::new(),
            last_updated: None,
        }
    }
}
