// ==========================================
// TransitionCountdown 集成测试
// ==========================================
// 测试目标: 倒计时自动推进窗口、销毁取消、手动模式
// 使用 tokio 暂停时钟精确控制时间推进
// ==========================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hci_flow::flow::transition::TransitionCountdown;

fn advance_flag() -> (Arc<AtomicBool>, impl FnOnce() + Send + 'static) {
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    (fired, move || flag.store(true, Ordering::SeqCst))
}

#[tokio::test(start_paused = true)]
async fn test_auto_advance_fires_after_configured_seconds() {
    let (fired, on_advance) = advance_flag();
    let countdown = TransitionCountdown::start(5, on_advance);
    assert!(countdown.is_scheduled(), "应当存在已调度的自动推进");

    // t=4s：还不应触发
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(!fired.load(Ordering::SeqCst), "倒计时未到不应触发");

    // t=6s：5±1s 窗口内应当已触发
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(fired.load(Ordering::SeqCst), "倒计时结束应当自动推进");
}

#[tokio::test(start_paused = true)]
async fn test_drop_at_two_seconds_cancels_callback() {
    let (fired, on_advance) = advance_flag();
    let countdown = TransitionCountdown::start(5, on_advance);

    // t=2s 卸载过渡页
    tokio::time::sleep(Duration::from_secs(2)).await;
    drop(countdown);

    // t=7s：被取消的回调不得触发
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(
        !fired.load(Ordering::SeqCst),
        "销毁后的倒计时不得落到已卸载的上下文"
    );
}

#[tokio::test(start_paused = true)]
async fn test_zero_seconds_requires_explicit_action() {
    let (fired, on_advance) = advance_flag();
    let countdown = TransitionCountdown::start(0, on_advance);
    assert!(!countdown.is_scheduled(), "autoNextSeconds=0 不应调度任务");

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!fired.load(Ordering::SeqCst), "手动模式不应自动推进");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let (fired, on_advance) = advance_flag();
    let mut countdown = TransitionCountdown::start(3, on_advance);
    countdown.cancel();
    countdown.cancel();
    assert!(!countdown.is_scheduled());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!fired.load(Ordering::SeqCst));
}
