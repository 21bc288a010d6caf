//! 页面数据记录器
//!
//! 累积当前页面访问期间的操作记录与答案：
//! - 操作记录只追加，code 页面内自增
//! - 答案按 targetElement 覆盖写（重答同一题不追加）
//! - 页面离开并提交后整体清空

use std::sync::Mutex;

use tracing::debug;

use crate::models::mark::{Answer, EventType, Operation, OperationValue};
use crate::utils::time::now_timestamp;

#[derive(Debug, Default)]
struct RecorderInner {
    page_id: Option<String>,
    operations: Vec<Operation>,
    answers: Vec<Answer>,
    begin_time: Option<String>,
}

/// 页面数据记录器
#[derive(Debug, Default)]
pub struct PageRecorder {
    inner: Mutex<RecorderInner>,
}

impl PageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入页面：清空累积数据并记录 page_enter
    pub fn enter_page(&self, page_id: Option<String>) {
        {
            let mut inner = self.inner.lock().expect("记录器锁中毒");
            *inner = RecorderInner {
                page_id: page_id.clone(),
                begin_time: Some(now_timestamp()),
                ..Default::default()
            };
        }
        self.log_operation("页面", EventType::PageEnter, OperationValue::text("进入页面"));
        debug!("进入页面: {:?}", page_id);
    }

    /// 离开页面：记录 page_exit
    pub fn exit_page(&self) {
        self.log_operation("页面", EventType::PageExit, OperationValue::text("离开页面"));
    }

    /// 追加操作记录，返回分配的 code
    pub fn log_operation(
        &self,
        target_element: &str,
        event_type: EventType,
        value: OperationValue,
    ) -> u32 {
        let mut inner = self.inner.lock().expect("记录器锁中毒");
        let code = inner.operations.len() as u32 + 1;
        let page_id = inner.page_id.clone();
        inner.operations.push(Operation {
            code,
            target_element: target_element.to_string(),
            event_type,
            value,
            time: now_timestamp(),
            page_id,
        });
        code
    }

    /// 收集答案（同一 targetElement 覆盖旧值，code 保持不变）
    pub fn collect_answer(&self, target_element: &str, value: impl Into<String>) {
        let mut inner = self.inner.lock().expect("记录器锁中毒");
        if let Some(existing) = inner
            .answers
            .iter_mut()
            .find(|a| a.target_element == target_element)
        {
            existing.value = value.into();
            return;
        }
        let code = inner.answers.len() as u32 + 1;
        inner.answers.push(Answer {
            code,
            target_element: target_element.to_string(),
            value: value.into(),
        });
    }

    /// 当前页面快照（操作、答案、进入时间）
    pub fn snapshot(&self) -> (Vec<Operation>, Vec<Answer>, Option<String>) {
        let inner = self.inner.lock().expect("记录器锁中毒");
        (
            inner.operations.clone(),
            inner.answers.clone(),
            inner.begin_time.clone(),
        )
    }

    /// 当前页面 ID
    pub fn page_id(&self) -> Option<String> {
        self.inner.lock().expect("记录器锁中毒").page_id.clone()
    }

    /// 清空累积数据
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("记录器锁中毒");
        *inner = RecorderInner::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_increment_within_page() {
        let recorder = PageRecorder::new();
        recorder.enter_page(Some("intro".to_string()));
        let c2 = recorder.log_operation("下一页按钮", EventType::Click, "下一页".into());
        assert_eq!(c2, 2); // page_enter 占了 code 1

        let (operations, _, begin) = recorder.snapshot();
        assert_eq!(operations.len(), 2);
        assert_eq!(operations[0].event_type, EventType::PageEnter);
        assert!(begin.is_some());
    }

    #[test]
    fn test_answer_overwrite_keeps_code() {
        let recorder = PageRecorder::new();
        recorder.enter_page(None);
        recorder.collect_answer("P1_Q1", "A");
        recorder.collect_answer("P1_Q2", "B");
        recorder.collect_answer("P1_Q1", "C");

        let (_, answers, _) = recorder.snapshot();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].code, 1);
        assert_eq!(answers[0].value, "C");
        assert_eq!(answers[1].code, 2);
    }

    #[test]
    fn test_enter_page_resets() {
        let recorder = PageRecorder::new();
        recorder.enter_page(Some("intro".to_string()));
        recorder.collect_answer("P1_Q1", "A");
        recorder.enter_page(Some("experiment-1".to_string()));

        let (operations, answers, _) = recorder.snapshot();
        assert_eq!(operations.len(), 1);
        assert!(answers.is_empty());
    }
}
