//! 后端端点路径
//!
//! 路径拼接集中在这里，调用方不自行拼字符串。

/// Mark 提交端点（form-encoded）
pub fn save_mark() -> &'static str {
    "/stu/saveHcMark"
}

/// Flow 定义查询端点
pub fn flow_definition(flow_id: &str) -> String {
    format!("/stu/api/flows/{}", flow_id)
}

/// Flow 进度上报 / 查询端点
pub fn flow_progress(flow_id: &str) -> String {
    format!("/stu/api/flows/{}/progress", flow_id)
}

/// 会话检查端点
pub fn check_session(session_id: &str, student_code: &str) -> String {
    format!(
        "/stu/checkSession?sessionId={}&studentCode={}",
        session_id, student_code
    )
}
