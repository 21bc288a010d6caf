//! 时间格式化工具
//!
//! 后端要求的时间戳格式为 `YYYY-MM-DD HH:mm:ss`

use chrono::{DateTime, Local, NaiveDateTime};

/// 后端时间戳格式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 格式化时间戳为后端要求的格式
pub fn format_timestamp(date: DateTime<Local>) -> String {
    date.format(TIMESTAMP_FORMAT).to_string()
}

/// 当前时间的后端格式时间戳
pub fn now_timestamp() -> String {
    format_timestamp(Local::now())
}

/// 当前时间的 epoch 毫秒数（心跳 ts 字段）
pub fn now_epoch_ms() -> i64 {
    Local::now().timestamp_millis()
}

/// 校验时间戳字符串是否合法
///
/// 接受后端格式（`YYYY-MM-DD HH:mm:ss`）或 RFC3339
pub fn is_valid_timestamp(value: &str) -> bool {
    if value.trim().is_empty() {
        return false;
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format() {
        let formatted = now_timestamp();
        assert!(is_valid_timestamp(&formatted), "当前时间戳应当合法");
    }

    #[test]
    fn test_invalid_timestamp() {
        assert!(!is_valid_timestamp(""));
        assert!(!is_valid_timestamp("  "));
        assert!(!is_valid_timestamp("2026/01/01"));
    }

    #[test]
    fn test_rfc3339_accepted() {
        assert!(is_valid_timestamp("2026-01-01T08:00:00+08:00"));
    }
}
