//! Mark 提交载荷
//!
//! 每次离开页面构建一个 MarkObject（操作记录 + 答案 + 时间窗口），
//! 构建后不再修改，重试时原样重发。
//!
//! 校验在提交边界执行（见 `services::submission`）：
//! 校验失败属于本地错误，永不重试。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::utils::time::{is_valid_timestamp, now_timestamp};

/// 标准事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageEnter,
    PageExit,
    PageSubmitSuccess,
    PageSubmitFailed,
    FlowContext,
    Click,
    Change,
    ClickBlocked,
    Input,
    InputBlur,
    RadioSelect,
    CheckboxCheck,
    CheckboxUncheck,
    ModalOpen,
    ModalClose,
    ViewMaterial,
    TimerStart,
    TimerStop,
    QuestionnaireAnswer,
    SessionExpired,
    NetworkError,
}

/// 操作记录的值（字符串或任意 JSON 对象）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationValue {
    Text(String),
    Data(Value),
}

impl OperationValue {
    pub fn text(value: impl Into<String>) -> Self {
        OperationValue::Text(value.into())
    }

    /// 值是否为结构化对象
    pub fn is_object(&self) -> bool {
        match self {
            OperationValue::Text(_) => false,
            OperationValue::Data(value) => value.is_object(),
        }
    }
}

impl From<&str> for OperationValue {
    fn from(value: &str) -> Self {
        OperationValue::Text(value.to_string())
    }
}

/// 操作记录（页面内追加写，页面离开时随 Mark 一并清空）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// 页面内自增序号（从 1 开始）
    pub code: u32,
    /// 被操作 UI 元素的语义标签
    pub target_element: String,
    /// 事件类型
    pub event_type: EventType,
    /// 事件值
    pub value: OperationValue,
    /// 事件时间
    pub time: String,
    /// 页面 ID（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
}

/// 答案记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// 页面内自增序号（从 1 开始）
    pub code: u32,
    /// 答案目标，格式 `P{pageNumber}_{semanticId}`
    pub target_element: String,
    /// 答案内容（人类可读）
    pub value: String,
}

/// Mark 提交载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkObject {
    /// 页面序号（点分字符串，如 "H.1"、"1.4"）
    pub page_number: String,
    /// 页面描述，Flow 模式下为 `[flowId/submoduleId/stepIndex] 描述`
    pub page_desc: String,
    /// 操作记录列表
    pub operation_list: Vec<Operation>,
    /// 答案列表
    pub answer_list: Vec<Answer>,
    /// 进入页面时间（YYYY-MM-DD HH:mm:ss）
    pub begin_time: String,
    /// 离开页面时间（YYYY-MM-DD HH:mm:ss）
    pub end_time: String,
    /// 图片列表（本系统恒为空）
    pub img_list: Vec<Value>,
}

/// Mark 构建输入
#[derive(Debug, Clone, Default)]
pub struct MarkInput {
    pub page_number: String,
    pub page_desc: String,
    pub operations: Vec<Operation>,
    pub answers: Vec<Answer>,
    /// 缺省时取当前时间
    pub begin_time: Option<String>,
    /// 缺省时取当前时间
    pub end_time: Option<String>,
}

/// 构建标准化的 MarkObject
///
/// 归一化规则：
/// - code 缺失 / 乱序时按列表位置重排为 1..n
/// - 时间字段缺失时填充当前时间
pub fn build_mark_object(input: MarkInput) -> MarkObject {
    let operations = input
        .operations
        .into_iter()
        .enumerate()
        .map(|(index, mut op)| {
            op.code = index as u32 + 1;
            if op.time.trim().is_empty() {
                op.time = now_timestamp();
            }
            op
        })
        .collect();

    let answers = input
        .answers
        .into_iter()
        .enumerate()
        .map(|(index, mut answer)| {
            answer.code = index as u32 + 1;
            answer
        })
        .collect();

    MarkObject {
        page_number: input.page_number,
        page_desc: input.page_desc,
        operation_list: operations,
        answer_list: answers,
        begin_time: input.begin_time.unwrap_or_else(now_timestamp),
        end_time: input.end_time.unwrap_or_else(now_timestamp),
        img_list: Vec::new(),
    }
}

/// 校验 MarkObject 是否满足数据格式规范的最小要求
///
/// 提交链路在发起网络请求前调用；失败即本地校验错误，不进入重试。
pub fn validate_mark_object(mark: &MarkObject) -> Result<()> {
    if mark.page_number.trim().is_empty() {
        return Err(AppError::validation("字段 pageNumber 必须为非空字符串"));
    }
    if mark.page_desc.trim().is_empty() {
        return Err(AppError::validation("字段 pageDesc 必须为非空字符串"));
    }
    if !is_valid_timestamp(&mark.begin_time) {
        return Err(AppError::validation(format!(
            "字段 beginTime 非法: {:?}",
            mark.begin_time
        )));
    }
    if !is_valid_timestamp(&mark.end_time) {
        return Err(AppError::validation(format!(
            "字段 endTime 非法: {:?}",
            mark.end_time
        )));
    }

    for (index, operation) in mark.operation_list.iter().enumerate() {
        if operation.time.trim().is_empty() {
            return Err(AppError::validation(format!(
                "operationList[{}].time 必须为非空字符串",
                index
            )));
        }
        if operation.code != index as u32 + 1 {
            return Err(AppError::validation(format!(
                "operationList[{}].code 必须为 {}",
                index,
                index + 1
            )));
        }
        if operation.event_type == EventType::FlowContext && !operation.value.is_object() {
            return Err(AppError::validation(
                "flow_context 事件的 value 必须为对象",
            ));
        }
    }

    for (index, answer) in mark.answer_list.iter().enumerate() {
        if answer.code != index as u32 + 1 {
            return Err(AppError::validation(format!(
                "answerList[{}].code 必须为 {}",
                index,
                index + 1
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(code: u32, event_type: EventType, value: OperationValue) -> Operation {
        Operation {
            code,
            target_element: "按钮".to_string(),
            event_type,
            value,
            time: now_timestamp(),
            page_id: None,
        }
    }

    #[test]
    fn test_build_assigns_sequential_codes() {
        let mark = build_mark_object(MarkInput {
            page_number: "1.1".to_string(),
            page_desc: "示例页面".to_string(),
            operations: vec![
                op(9, EventType::PageEnter, OperationValue::text("进入")),
                op(0, EventType::Click, OperationValue::text("下一页")),
            ],
            answers: vec![Answer {
                code: 7,
                target_element: "P1_Q1".to_string(),
                value: "A".to_string(),
            }],
            ..Default::default()
        });

        assert_eq!(mark.operation_list.len(), 2);
        assert_eq!(mark.operation_list[0].code, 1);
        assert_eq!(mark.operation_list[1].code, 2);
        assert_eq!(mark.answer_list[0].code, 1);
        assert!(mark.img_list.is_empty());
        assert!(validate_mark_object(&mark).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_page_number() {
        let mut mark = build_mark_object(MarkInput {
            page_number: "1.1".to_string(),
            page_desc: "示例页面".to_string(),
            ..Default::default()
        });
        mark.page_number = " ".to_string();
        assert!(matches!(
            validate_mark_object(&mark),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_flow_context_requires_object() {
        let mark = build_mark_object(MarkInput {
            page_number: "1.1".to_string(),
            page_desc: "示例页面".to_string(),
            operations: vec![op(
                1,
                EventType::FlowContext,
                OperationValue::text("不是对象"),
            )],
            ..Default::default()
        });
        assert!(validate_mark_object(&mark).is_err());

        let ok = build_mark_object(MarkInput {
            page_number: "1.1".to_string(),
            page_desc: "示例页面".to_string(),
            operations: vec![op(
                1,
                EventType::FlowContext,
                OperationValue::Data(json!({"flowId": "f1"})),
            )],
            ..Default::default()
        });
        assert!(validate_mark_object(&ok).is_ok());
    }

    #[test]
    fn test_wire_format_uses_camel_case() {
        let mark = build_mark_object(MarkInput {
            page_number: "H.1".to_string(),
            page_desc: "注意事项".to_string(),
            ..Default::default()
        });
        let raw = serde_json::to_value(&mark).expect("序列化失败");
        assert!(raw.get("pageNumber").is_some());
        assert!(raw.get("operationList").is_some());
        assert!(raw.get("beginTime").is_some());
        assert!(raw.get("imgList").is_some());
    }

    #[test]
    fn test_event_type_snake_case() {
        let raw = serde_json::to_string(&EventType::PageEnter).expect("序列化失败");
        assert_eq!(raw, "\"page_enter\"");
        let raw = serde_json::to_string(&EventType::FlowContext).expect("序列化失败");
        assert_eq!(raw, "\"flow_context\"");
    }
}
