//! 后端 API 客户端
//!
//! 封装所有 HTTP 调用并统一错误分类：
//! - 传输层 401 / 业务码 401 → `AppError::Authorization`
//! - 超时、连接失败、5xx、响应体异常 → `AppError::TransientNetwork`
//!
//! 重试策略不在这里实现，由各调用方（提交通道、心跳）按自身语义决定。

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, Result};

/// 后端统一响应包
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    /// 业务码：200 成功 / 401 会话过期 / 500 服务端错误
    pub code: i64,
    /// 提示信息
    #[serde(default, alias = "msg")]
    pub message: Option<String>,
    /// 业务数据
    #[serde(default)]
    pub obj: Option<Value>,
}

impl ApiResponse {
    /// 业务是否成功
    pub fn is_ok(&self) -> bool {
        self.code == 200
    }

    /// 取出 obj 并反序列化为目标类型
    pub fn obj_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.obj {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }
}

/// 后端 API 客户端
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// 创建新的 API 客户端
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::configuration(format!("HTTP 客户端构建失败: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET 请求，返回统一响应包
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        let request = self.http.get(self.url(path));
        self.execute(path, request).await
    }

    /// POST 表单请求，返回统一响应包
    pub async fn post_form(&self, path: &str, fields: &[(&str, String)]) -> Result<ApiResponse> {
        let request = self.http.post(self.url(path)).form(fields);
        self.execute(path, request).await
    }

    /// POST JSON 请求，返回统一响应包
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        let request = self.http.post(self.url(path)).json(body);
        self.execute(path, request).await
    }

    /// POST JSON 请求，只关心传输层是否成功
    ///
    /// 心跳端点可能返回空响应体，不解析统一响应包。
    pub async fn post_json_ok<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        let request = self.http.post(self.url(path)).json(body);
        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(path, e))?;
        check_http_status(path, &response)?;
        Ok(())
    }

    async fn execute(&self, path: &str, request: reqwest::RequestBuilder) -> Result<ApiResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(path, e))?;
        check_http_status(path, &response)?;

        let body = response
            .text()
            .await
            .map_err(|e| AppError::transient(path, format!("读取响应失败: {}", e)))?;
        let envelope: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::transient(path, format!("响应格式异常: {}", e)))?;

        debug!("API {} → code={}", path, envelope.code);

        // 业务码 401 与传输层 401 同等对待
        if envelope.code == 401 {
            return Err(AppError::session_expired(
                envelope.message.unwrap_or_else(|| "请重新登录".to_string()),
            ));
        }

        Ok(envelope)
    }
}

fn classify_transport_error(path: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::transient(path, "请求超时".to_string())
    } else {
        AppError::transient(path, error.to_string())
    }
}

fn check_http_status(path: &str, response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.as_u16() == 401 {
        return Err(AppError::session_expired("HTTP 401"));
    }
    if !status.is_success() {
        return Err(AppError::transient(path, format!("HTTP {}", status.as_u16())));
    }
    Ok(())
}
