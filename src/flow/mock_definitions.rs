//! 本地 Mock Flow 定义表
//!
//! 后端没有返回定义时的本地解析来源，开发与单元测试复用同一份数据。

use crate::models::flow::{FlowDefinition, FlowStep, TransitionPage};

fn define_flow(flow_id: &str, name: &str, description: &str, steps: Vec<FlowStep>) -> FlowDefinition {
    FlowDefinition {
        flow_id: flow_id.to_string(),
        name: name.to_string(),
        url: format!("/flow/{}", flow_id),
        description: Some(description.to_string()),
        status: Some("draft".to_string()),
        version: Some("0.1.0".to_string()),
        steps,
    }
}

fn step(submodule_id: &str, display_name: &str, transition_page: Option<TransitionPage>) -> FlowStep {
    FlowStep {
        submodule_id: submodule_id.to_string(),
        display_name: Some(display_name.to_string()),
        overrides: None,
        transition_page,
    }
}

/// 获取指定 Flow ID 的 Mock 定义
pub fn get(flow_id: &str) -> Option<FlowDefinition> {
    list().into_iter().find(|d| d.flow_id == flow_id)
}

/// 判断给定 Flow ID 是否在 Mock 列表中
pub fn is_mock(flow_id: &str) -> bool {
    get(flow_id).is_some()
}

/// 列出所有 Mock Flow 定义
pub fn list() -> Vec<FlowDefinition> {
    vec![
        define_flow(
            "example-flow-1",
            "示例 Flow - 实验+问卷",
            "用于开发测试的混合 Flow",
            vec![
                step(
                    "example-experiment",
                    "示例实验",
                    Some(TransitionPage {
                        title: Some("第一部分已完成".to_string()),
                        content: Some(
                            "您已完成实验部分，稍后将进入问卷环节。".to_string(),
                        ),
                        auto_next_seconds: 5,
                    }),
                ),
                step("example-questionnaire", "示例问卷", None),
            ],
        ),
        define_flow(
            "example-flow-2",
            "示例 Flow - 手动过渡",
            "用于测试手动过渡页的 Flow",
            vec![
                step(
                    "example-experiment",
                    "示例实验",
                    Some(TransitionPage {
                        title: Some("实验完成".to_string()),
                        content: Some("请点击继续进入问卷".to_string()),
                        auto_next_seconds: 0,
                    }),
                ),
                step("example-questionnaire", "示例问卷", None),
            ],
        ),
        define_flow(
            "example-flow-single",
            "示例 Flow - 单步骤",
            "单子模块评估",
            vec![step("example-questionnaire", "示例问卷", None)],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_lookup() {
        assert!(is_mock("example-flow-1"));
        assert!(!is_mock("unknown-flow"));
        let definition = get("example-flow-1").expect("应当存在");
        assert_eq!(definition.steps.len(), 2);
        assert_eq!(
            definition.steps[0]
                .transition_page
                .as_ref()
                .map(|t| t.auto_next_seconds),
            Some(5)
        );
    }
}
