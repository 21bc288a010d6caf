//! 进度心跳上报
//!
//! 周期性（默认 15s，下限 3s）上报 {flow, step, subPage} 粗粒度进度。
//! 发送失败的载荷进入按 Flow 隔离的持久化补发队列（上限 50 条，
//! 溢出时淘汰最旧），下次启动先补发再进入周期发送。
//!
//! 补发按 flowId 互斥：已有补发在途时新的补发请求是 no-op。
//! 周期发送与缓慢补发之间存在一次可接受的竞态——心跳是幂等的
//! 粗粒度快照，不是事务记录，这里不做修复。
//!
//! 心跳失败对用户静默（只入队），这是设计决定。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::flow::context::Latest;
use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::endpoints;
use crate::infrastructure::storage::{heartbeat_queue_key, KvStore};
use crate::models::heartbeat::HeartbeatPayload;
use crate::utils::time::now_epoch_ms;

/// 补发队列容量上限
pub const MAX_QUEUE: usize = 50;

/// 心跳间隔下限
pub const MIN_INTERVAL: Duration = Duration::from_secs(3);

/// 心跳错误回调（仅观测用，失败本身静默入队）
pub type HeartbeatErrorHandler = Arc<dyn Fn(&AppError) + Send + Sync>;

/// 心跳启动参数
#[derive(Clone)]
pub struct HeartbeatOptions {
    pub flow_id: String,
    pub exam_no: Option<String>,
    pub batch_code: Option<String>,
    /// 稳定访问器：读取最新步骤索引，不重启计时器
    pub step_index: Latest<usize>,
    /// 稳定访问器：读取最新子模块内页码
    pub module_page_num: Latest<Option<String>>,
    /// 发送间隔（低于下限时强制抬升到 3s）
    pub interval: Duration,
    pub on_error: Option<HeartbeatErrorHandler>,
}

/// 进度心跳上报器
pub struct HeartbeatReporter {
    client: Arc<ApiClient>,
    store: Arc<dyn KvStore>,
    flushing: Mutex<HashSet<String>>,
}

impl HeartbeatReporter {
    pub fn new(client: Arc<ApiClient>, store: Arc<dyn KvStore>) -> Self {
        Self {
            client,
            store,
            flushing: Mutex::new(HashSet::new()),
        }
    }

    /// 读取指定 Flow 的补发队列（解析失败视为空队列）
    pub fn load_queue(&self, flow_id: &str) -> Vec<HeartbeatPayload> {
        self.store
            .get(&heartbeat_queue_key(flow_id))
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save_queue(&self, flow_id: &str, queue: &[HeartbeatPayload]) {
        let start = queue.len().saturating_sub(MAX_QUEUE);
        let bounded = &queue[start..];
        let raw = match serde_json::to_string(bounded) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("⚠️ 心跳队列序列化失败: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(&heartbeat_queue_key(flow_id), &raw) {
            warn!("⚠️ 心跳队列写入失败: {}", e);
        }
    }

    /// 入队一条发送失败的载荷（溢出时淘汰最旧）
    pub fn enqueue(&self, payload: HeartbeatPayload) {
        let flow_id = payload.flow_id.clone();
        let mut queue = self.load_queue(&flow_id);
        queue.push(payload);
        self.save_queue(&flow_id, &queue);
    }

    /// 补发指定 Flow 的队列
    ///
    /// 按 flowId 互斥：补发在途时再次调用是 no-op（不排队）。
    /// 仍然失败的条目保留在队列中（不重复入队）等待下次补发。
    pub async fn flush(&self, flow_id: &str) {
        {
            let mut flushing = self.flushing.lock().expect("补发守卫锁中毒");
            if !flushing.insert(flow_id.to_string()) {
                debug!("补发在途，跳过: {}", flow_id);
                return;
            }
        }
        let _guard = FlushGuard {
            reporter: self,
            flow_id: flow_id.to_string(),
        };

        let queue = self.load_queue(flow_id);
        if queue.is_empty() {
            return;
        }

        let total = queue.len();
        let mut remain = Vec::new();
        for payload in queue {
            match self
                .client
                .post_json_ok(&endpoints::flow_progress(flow_id), &payload)
                .await
            {
                Ok(()) => debug!("✓ 心跳补发成功: {} ts={}", flow_id, payload.ts),
                Err(e) => {
                    warn!("⚠️ 心跳补发失败: {} ({})", flow_id, e);
                    remain.push(payload);
                }
            }
        }
        info!(
            "💓 心跳补发完成: {} 成功 {}/{}",
            flow_id,
            total - remain.len(),
            total
        );
        self.save_queue(flow_id, &remain);
    }

    /// 立即发送一条心跳，失败时入队
    pub async fn send_now(&self, payload: HeartbeatPayload, on_error: Option<&HeartbeatErrorHandler>) {
        let endpoint = endpoints::flow_progress(&payload.flow_id);
        match self.client.post_json_ok(&endpoint, &payload).await {
            Ok(()) => debug!("💓 心跳发送成功: {}", payload.flow_id),
            Err(e) => {
                warn!("⚠️ 心跳发送失败，入队等待补发: {}", e);
                if let Some(handler) = on_error {
                    handler(&e);
                }
                self.enqueue(payload);
            }
        }
    }

    /// 按最新快照发送一条心跳
    async fn send_snapshot(&self, options: &HeartbeatOptions) {
        let payload = HeartbeatPayload {
            flow_id: options.flow_id.clone(),
            exam_no: options.exam_no.clone(),
            batch_code: options.batch_code.clone(),
            step_index: options.step_index.get(),
            module_page_num: options
                .module_page_num
                .get()
                .unwrap_or_else(|| "1".to_string()),
            ts: now_epoch_ms(),
        };
        self.send_now(payload, options.on_error.as_ref()).await;
    }

    /// 启动周期心跳任务
    ///
    /// 先补发历史队列，随后立即发送一次，再进入周期发送。
    /// 页面隐藏时完全暂停（`set_visible(false)`），恢复可见时
    /// 立即发送一次并重置计时。句柄释放即取消任务，不留孤儿定时器。
    pub fn start(self: &Arc<Self>, options: HeartbeatOptions) -> HeartbeatHandle {
        let (visibility_tx, mut visibility_rx) = watch::channel(true);
        let reporter = Arc::clone(self);
        let interval = options.interval.max(MIN_INTERVAL);

        let task = tokio::spawn(async move {
            if options.flow_id.is_empty() {
                debug!("心跳未启动：缺少 flowId");
                return;
            }

            info!("💓 启动心跳: {} (间隔 {:?})", options.flow_id, interval);

            // 先补发再开始周期发送
            reporter.flush(&options.flow_id).await;
            reporter.send_snapshot(&options).await;

            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                let visible = *visibility_rx.borrow();
                if !visible {
                    // 页面隐藏：暂停计时，等待恢复可见
                    if visibility_rx.changed().await.is_err() {
                        break;
                    }
                    let now_visible = *visibility_rx.borrow();
                    if now_visible {
                        reporter.send_snapshot(&options).await;
                        ticker.reset();
                    }
                    continue;
                }

                tokio::select! {
                    _ = ticker.tick() => reporter.send_snapshot(&options).await,
                    changed = visibility_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        HeartbeatHandle {
            task,
            visibility: visibility_tx,
        }
    }
}

/// 补发互斥守卫（离开作用域即释放 flowId）
struct FlushGuard<'a> {
    reporter: &'a HeartbeatReporter,
    flow_id: String,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.reporter
            .flushing
            .lock()
            .expect("补发守卫锁中毒")
            .remove(&self.flow_id);
    }
}

/// 心跳任务句柄
///
/// 释放句柄即取消任务；所属作用域销毁后不会再有任何副作用。
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
    visibility: watch::Sender<bool>,
}

impl HeartbeatHandle {
    /// 页面可见性变化（隐藏暂停 / 可见恢复并立即发送）
    pub fn set_visible(&self, visible: bool) {
        let _ = self.visibility.send(visible);
    }

    /// 显式停止心跳任务
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
