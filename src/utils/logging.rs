//! 日志工具模块
//!
//! 基于 tracing / tracing-subscriber，支持环境变量配置日志级别

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 日志级别过滤器（默认: info）
///   例如: RUST_LOG=debug 或 RUST_LOG=hci_flow=trace
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .init();
}

/// 初始化测试环境的日志系统
///
/// 使用 test_writer，重复调用安全
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - Flow 测评编排模式");
    info!("📋 Flow ID: {}", config.flow_id);
    info!("🌐 API 地址: {}", config.api_base_url);
    info!(
        "💓 心跳: {} (间隔 {}ms)",
        if config.heartbeat_enabled { "启用" } else { "关闭" },
        config.heartbeat_interval_ms
    );
    info!("{}", "=".repeat(60));
}

/// 记录 Flow 加载完成信息
pub fn log_flow_loaded(flow_name: &str, total_steps: usize, step_index: usize) {
    info!("✓ Flow 已加载: {}", flow_name);
    info!("📄 共 {} 个步骤，从第 {} 步恢复\n", total_steps, step_index + 1);
}

/// 记录步骤开始信息
pub fn log_step_start(step_index: usize, total_steps: usize, display_name: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📦 进入第 {}/{} 步: {}", step_index + 1, total_steps, display_name);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(submitted: usize, failed: usize, flow_id: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 Flow {} 已完成", flow_id);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("✅ 页面提交成功: {}", submitted);
    info!("❌ 页面提交失败: {}", failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
