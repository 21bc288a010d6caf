// ==========================================
// FlowOrchestrator 集成测试
// ==========================================
// 测试目标: 步骤转移边界、进度持久化与刷新恢复、完成终态
// ==========================================

use std::sync::Arc;

use hci_flow::flow::orchestrator::FlowOrchestrator;
use hci_flow::infrastructure::storage::{flow_key, KvStore, MemoryStore};
use hci_flow::models::page::PageId;
use hci_flow::registry::SubmoduleRegistry;
use hci_flow::submodules::{ExampleExperiment, ExampleQuestionnaire};
use hci_flow::utils::logging;

fn registry_with_examples() -> SubmoduleRegistry {
    let registry = SubmoduleRegistry::new();
    registry
        .register(ExampleExperiment::definition())
        .expect("注册示例实验失败");
    registry
        .register(ExampleQuestionnaire::definition())
        .expect("注册示例问卷失败");
    registry
}

#[tokio::test]
async fn test_go_to_bounds() {
    logging::init_test();
    let store = Arc::new(MemoryStore::new());
    let mut orchestrator = FlowOrchestrator::new("example-flow-1", store, None);
    orchestrator.load().await.expect("加载 Flow 失败");

    // 合法范围内全部成功
    assert!(orchestrator.go_to(0), "go_to(0) 应当成功");
    assert!(orchestrator.go_to(1), "go_to(1) 应当成功");

    // 越界是返回失败的 no-op，状态不变（不钳位）
    assert!(!orchestrator.go_to(2), "越界跳转应当失败");
    assert_eq!(
        orchestrator.progress().expect("进度缺失").step_index,
        1,
        "失败的跳转不应改变状态"
    );

    assert!(orchestrator.prev(), "prev 应当成功");
    assert_eq!(orchestrator.progress().expect("进度缺失").step_index, 0);
    assert!(!orchestrator.prev(), "第一步的 prev 应当失败");
    assert!(orchestrator.next(), "next 在范围内应当成功");
    assert_eq!(orchestrator.progress().expect("进度缺失").step_index, 1);
}

#[tokio::test]
async fn test_go_to_does_not_persist() {
    logging::init_test();
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    {
        let mut orchestrator =
            FlowOrchestrator::new("example-flow-1", Arc::clone(&store) as Arc<dyn KvStore>, None);
        orchestrator.load().await.expect("加载 Flow 失败");
        assert!(orchestrator.go_to(1));
        // 不调用 update_progress：go_to 本身不落盘
    }

    let mut orchestrator =
        FlowOrchestrator::new("example-flow-1", Arc::clone(&store) as Arc<dyn KvStore>, None);
    let (_, progress) = orchestrator.load().await.expect("重新加载失败");
    assert_eq!(progress.step_index, 0, "未持久化的跳转不应在重载后生效");
}

#[tokio::test]
async fn test_reload_recovery() {
    logging::init_test();
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());

    {
        let mut orchestrator =
            FlowOrchestrator::new("example-flow-1", Arc::clone(&store) as Arc<dyn KvStore>, None);
        orchestrator.load().await.expect("加载 Flow 失败");
        orchestrator.update_progress(1, Some("2".to_string()));
    }

    // 模拟刷新：全新实例从持久化进度恢复
    let mut orchestrator =
        FlowOrchestrator::new("example-flow-1", Arc::clone(&store) as Arc<dyn KvStore>, None);
    let (_, progress) = orchestrator.load().await.expect("重新加载失败");
    assert_eq!(progress.step_index, 1, "应当从持久化步骤恢复");
    assert_eq!(
        progress.module_page_num.as_deref(),
        Some("2"),
        "应当从持久化子页码恢复"
    );
}

#[tokio::test]
async fn test_composite_page_num_relocates_on_load() {
    logging::init_test();
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    // 历史数据把复合页码存进了 modulePageNum
    store
        .set(&flow_key("example-flow-1", "stepIndex"), "0")
        .unwrap();
    store
        .set(&flow_key("example-flow-1", "modulePageNum"), "M1:4")
        .unwrap();

    let mut orchestrator =
        FlowOrchestrator::new("example-flow-1", Arc::clone(&store) as Arc<dyn KvStore>, None);
    let (_, progress) = orchestrator.load().await.expect("加载 Flow 失败");
    assert_eq!(progress.step_index, 1, "复合页码应当重定位步骤");
    assert_eq!(progress.module_page_num.as_deref(), Some("4"));
}

#[tokio::test]
async fn test_advance_to_completion() {
    logging::init_test();
    let store = Arc::new(MemoryStore::new());
    let mut orchestrator = FlowOrchestrator::new("example-flow-single", store, None);
    orchestrator.load().await.expect("加载 Flow 失败");

    // 单步骤 Flow：推进即完成
    assert!(!orchestrator.advance(), "最后一步推进应当返回 false");
    assert!(orchestrator.is_completed(), "应当进入完成终态");
    assert!(
        orchestrator.progress().expect("进度缺失").completed,
        "进度应当标记完成"
    );
}

#[tokio::test]
async fn test_resolve_locates_submodule() {
    logging::init_test();
    let registry = registry_with_examples();
    let store = Arc::new(MemoryStore::new());
    let mut orchestrator = FlowOrchestrator::new("example-flow-1", store, None);
    orchestrator.load().await.expect("加载 Flow 失败");

    let resolved = orchestrator.resolve(&registry).expect("解析失败");
    assert_eq!(resolved.step_index, 0);
    assert_eq!(resolved.submodule_id.as_deref(), Some("example-experiment"));
    assert!(resolved.submodule.is_some(), "子模块应当命中注册表");
    assert_eq!(
        resolved.initial_page,
        Some(PageId::Intro),
        "缺省子页码应当落到第 1 页"
    );
}

#[tokio::test]
async fn test_clear_cache_removes_keys() {
    logging::init_test();
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let mut orchestrator =
        FlowOrchestrator::new("example-flow-1", Arc::clone(&store) as Arc<dyn KvStore>, None);
    orchestrator.load().await.expect("加载 Flow 失败");
    orchestrator.update_progress(1, Some("3".to_string()));

    orchestrator.clear_cache();
    assert!(store.get(&flow_key("example-flow-1", "stepIndex")).is_none());
    assert!(store
        .get(&flow_key("example-flow-1", "modulePageNum"))
        .is_none());
    assert!(store
        .get(&flow_key("example-flow-1", "definition"))
        .is_none());
}

#[tokio::test]
async fn test_disposed_orchestrator_rejects_load() {
    logging::init_test();
    let store = Arc::new(MemoryStore::new());
    let mut orchestrator = FlowOrchestrator::new("example-flow-1", store, None);
    orchestrator.dispose();
    assert!(orchestrator.load().await.is_err(), "销毁后加载应当报错");
    assert!(!orchestrator.go_to(0), "销毁后跳转应当失败");
}
