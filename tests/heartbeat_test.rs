// ==========================================
// HeartbeatReporter 集成测试
// ==========================================
// 测试目标: 队列容量上限、补发互斥、失败保留、句柄取消
// ==========================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hci_flow::config::Config;
use hci_flow::flow::context::Latest;
use hci_flow::infrastructure::api_client::ApiClient;
use hci_flow::infrastructure::storage::{KvStore, MemoryStore};
use hci_flow::models::heartbeat::HeartbeatPayload;
use hci_flow::services::heartbeat::{HeartbeatOptions, HeartbeatReporter, MAX_QUEUE};
use hci_flow::utils::logging;

fn payload(flow_id: &str, ts: i64) -> HeartbeatPayload {
    HeartbeatPayload {
        flow_id: flow_id.to_string(),
        exam_no: Some("stu-0001".to_string()),
        batch_code: Some("batch-demo".to_string()),
        step_index: 0,
        module_page_num: "1".to_string(),
        ts,
    }
}

fn client_for_uri(uri: &str) -> Arc<ApiClient> {
    let config = Config {
        api_base_url: uri.to_string(),
        request_timeout_secs: 2,
        ..Config::default()
    };
    Arc::new(ApiClient::new(&config).expect("构建客户端失败"))
}

/// 无监听端口，连接立即被拒绝
fn dead_client() -> Arc<ApiClient> {
    client_for_uri("http://127.0.0.1:9")
}

#[tokio::test]
async fn test_queue_bounded_at_50_keeps_most_recent() {
    logging::init_test();
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let reporter = HeartbeatReporter::new(dead_client(), Arc::clone(&store));

    for ts in 0..60 {
        reporter.enqueue(payload("f1", ts));
    }

    let queue = reporter.load_queue("f1");
    assert_eq!(queue.len(), MAX_QUEUE, "队列应当封顶在 50 条");
    assert_eq!(queue[0].ts, 10, "最旧的 10 条应当被淘汰");
    assert_eq!(queue[49].ts, 59, "最新条目应当保留");
}

#[tokio::test]
async fn test_flush_is_mutually_exclusive_per_flow() {
    logging::init_test();
    let server = MockServer::start().await;

    // 放慢响应，让第二个补发请求撞上互斥守卫
    Mock::given(method("POST"))
        .and(path("/stu/api/flows/f1/progress"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 200}))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(5)
        .mount(&server)
        .await;

    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let reporter = Arc::new(HeartbeatReporter::new(
        client_for_uri(&server.uri()),
        Arc::clone(&store),
    ));
    for ts in 0..5 {
        reporter.enqueue(payload("f1", ts));
    }

    // 并发触发两次补发：只应执行一个请求序列
    let first = Arc::clone(&reporter);
    let second = Arc::clone(&reporter);
    tokio::join!(first.flush("f1"), second.flush("f1"));

    let requests = server.received_requests().await.expect("应当记录请求");
    assert_eq!(requests.len(), 5, "重复补发不应产生重复请求");
    assert!(reporter.load_queue("f1").is_empty(), "补发成功后队列应当清空");
}

#[tokio::test]
async fn test_flush_failures_remain_queued_once() {
    logging::init_test();
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let reporter = HeartbeatReporter::new(dead_client(), Arc::clone(&store));

    for ts in 0..3 {
        reporter.enqueue(payload("f1", ts));
    }

    reporter.flush("f1").await;

    let queue = reporter.load_queue("f1");
    assert_eq!(queue.len(), 3, "失败条目应当保留且不重复入队");
    assert_eq!(queue[0].ts, 0, "队列顺序应当保持 FIFO");
}

#[tokio::test]
async fn test_send_failure_enqueues_payload() {
    logging::init_test();
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let reporter = HeartbeatReporter::new(dead_client(), Arc::clone(&store));

    reporter.send_now(payload("f1", 42), None).await;

    let queue = reporter.load_queue("f1");
    assert_eq!(queue.len(), 1, "失败的心跳应当入队");
    assert_eq!(queue[0].ts, 42);
}

#[tokio::test]
async fn test_queue_isolated_per_flow() {
    logging::init_test();
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let reporter = HeartbeatReporter::new(dead_client(), Arc::clone(&store));

    reporter.enqueue(payload("f1", 1));
    reporter.enqueue(payload("f2", 2));

    assert_eq!(reporter.load_queue("f1").len(), 1);
    assert_eq!(reporter.load_queue("f2").len(), 1);
}

#[tokio::test]
async fn test_dropping_handle_cancels_interval() {
    logging::init_test();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stu/api/flows/f1/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 200})))
        .mount(&server)
        .await;

    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let reporter = Arc::new(HeartbeatReporter::new(
        client_for_uri(&server.uri()),
        Arc::clone(&store),
    ));

    let handle = reporter.start(HeartbeatOptions {
        flow_id: "f1".to_string(),
        exam_no: Some("stu-0001".to_string()),
        batch_code: Some("batch-demo".to_string()),
        step_index: Latest::new(0),
        module_page_num: Latest::new(Some("1".to_string())),
        interval: Duration::from_secs(3),
        on_error: None,
    });

    // 等待启动期的立即发送落地
    let mut waited = 0;
    loop {
        let count = server.received_requests().await.map(|r| r.len()).unwrap_or(0);
        if count >= 1 || waited > 2000 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += 50;
    }

    drop(handle);
    let before = server.received_requests().await.expect("应当记录请求").len();
    assert!(before >= 1, "启动期应当立即发送一次心跳");

    // 超过一个完整周期后不应再有新请求
    tokio::time::sleep(Duration::from_millis(3500)).await;
    let after = server.received_requests().await.expect("应当记录请求").len();
    assert_eq!(before, after, "句柄释放后不应再有心跳副作用");
}
