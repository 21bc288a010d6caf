/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 后端 API 基地址
    pub api_base_url: String,
    /// 单次 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 心跳发送间隔（毫秒），运行时强制下限 3000ms
    pub heartbeat_interval_ms: u64,
    /// 是否启用 Flow 心跳
    pub heartbeat_enabled: bool,
    /// 本地持久化存储文件
    pub storage_file: String,
    /// 要运行的 Flow ID
    pub flow_id: String,
    /// 学生考号
    pub exam_no: String,
    /// 测评批次号
    pub batch_code: String,
    /// 提交失败后是否允许继续推进（调试用，生产应为 false）
    pub allow_proceed_on_failure: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 10,
            heartbeat_interval_ms: 15_000,
            heartbeat_enabled: true,
            storage_file: "flow_storage.json".to_string(),
            flow_id: "example-flow-1".to_string(),
            exam_no: "stu-0001".to_string(),
            batch_code: "batch-demo".to_string(),
            allow_proceed_on_failure: true,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(default.api_base_url),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            heartbeat_interval_ms: std::env::var("HEARTBEAT_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.heartbeat_interval_ms),
            heartbeat_enabled: std::env::var("FLOW_HEARTBEAT_ENABLED").ok().and_then(|v| parse_flag(&v)).unwrap_or(default.heartbeat_enabled),
            storage_file: std::env::var("STORAGE_FILE").unwrap_or(default.storage_file),
            flow_id: std::env::var("FLOW_ID").unwrap_or(default.flow_id),
            exam_no: std::env::var("EXAM_NO").unwrap_or(default.exam_no),
            batch_code: std::env::var("BATCH_CODE").unwrap_or(default.batch_code),
            allow_proceed_on_failure: std::env::var("ALLOW_PROCEED_ON_FAILURE").ok().and_then(|v| parse_flag(&v)).unwrap_or(default.allow_proceed_on_failure),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }
}

/// 解析开关型环境变量（true/1/yes/on → true）
fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
