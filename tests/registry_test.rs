// ==========================================
// SubmoduleRegistry 集成测试
// ==========================================
// 测试目标: 注册校验、幂等初始化、失败重试、路由降级兜底
// ==========================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use hci_flow::error::AppError;
use hci_flow::flow::context::UserSnapshot;
use hci_flow::models::flow::TimerOverrides;
use hci_flow::models::page::PageId;
use hci_flow::registry::routes::resolve_module_url;
use hci_flow::registry::{SubmoduleProps, SubmoduleRegistry};
use hci_flow::submodules::{ExampleExperiment, ExampleQuestionnaire};
use hci_flow::utils::logging;

fn props(page: PageId) -> SubmoduleProps {
    SubmoduleProps {
        initial_page: page,
        user: UserSnapshot::default(),
        timers: TimerOverrides::default(),
        flow: None,
    }
}

#[tokio::test]
async fn test_initialize_runs_loaders_exactly_once() {
    logging::init_test();
    let registry = SubmoduleRegistry::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let loader_counter = Arc::clone(&counter);
    registry.register_loader(Box::new(move || {
        let counter = Arc::clone(&loader_counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(vec![ExampleExperiment::definition()])
        }
        .boxed()
    }));

    registry.initialize().await.expect("首次初始化失败");
    registry.initialize().await.expect("重复初始化应当为 no-op");

    assert_eq!(counter.load(Ordering::SeqCst), 1, "装载器只应执行一次");
    assert!(registry.is_initialized());
    assert!(registry.has("example-experiment"));
}

#[tokio::test]
async fn test_initialize_failure_leaves_flag_unset() {
    logging::init_test();
    let registry = SubmoduleRegistry::new();
    let attempts = Arc::new(AtomicUsize::new(0));

    let loader_attempts = Arc::clone(&attempts);
    registry.register_loader(Box::new(move || {
        let attempts = Arc::clone(&loader_attempts);
        async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::configuration("首次装载失败"))
            } else {
                Ok(vec![ExampleQuestionnaire::definition()])
            }
        }
        .boxed()
    }));

    assert!(registry.initialize().await.is_err(), "首次初始化应当失败");
    assert!(!registry.is_initialized(), "失败后标志不应置位");

    // 失败不消耗装载器，重试应当成功
    registry.initialize().await.expect("重试初始化失败");
    assert!(registry.is_initialized());
    assert!(registry.has("example-questionnaire"));
}

#[test]
fn test_register_validates_identity_fields() {
    let registry = SubmoduleRegistry::new();

    let mut definition = ExampleExperiment::definition();
    definition.submodule_id = String::new();
    assert!(
        matches!(registry.register(definition), Err(AppError::Configuration(_))),
        "空 ID 应当快速失败"
    );

    let mut definition = ExampleExperiment::definition();
    definition.submodule_id = "Bad_Id".to_string();
    assert!(registry.register(definition).is_err(), "非 kebab-case 应当快速失败");

    let mut definition = ExampleExperiment::definition();
    definition.display_name = "  ".to_string();
    assert!(registry.register(definition).is_err(), "空显示名应当快速失败");
}

#[test]
fn test_register_overwrites_duplicate_id() {
    let registry = SubmoduleRegistry::new();
    registry
        .register(ExampleExperiment::definition())
        .expect("注册失败");

    let mut replacement = ExampleExperiment::definition();
    replacement.display_name = "新版实验".to_string();
    registry.register(replacement).expect("覆盖注册失败");

    let definition = registry.get("example-experiment").expect("应当存在");
    assert_eq!(definition.display_name, "新版实验", "重复注册应当覆盖");
    assert_eq!(registry.all_ids().len(), 1);
}

#[test]
fn test_get_missing_returns_none() {
    let registry = SubmoduleRegistry::new();
    assert!(registry.get("ghost-module").is_none(), "未注册应当返回 None");
}

#[test]
fn test_unknown_url_falls_back_to_placeholder() {
    let registry = SubmoduleRegistry::new();
    registry
        .register(ExampleExperiment::definition())
        .expect("注册失败");

    let definition = resolve_module_url(&registry, "/unknown-path");
    assert_eq!(definition.submodule_id, "not-found");

    // 占位模块：固定初始页 + 诊断渲染，永不崩溃
    assert_eq!(definition.component.initial_page("7"), PageId::Notice);
    assert_eq!(definition.component.initial_page("abc"), PageId::Notice);
    let output = definition.component.render(&props(PageId::Notice));
    assert!(
        output.contains("/example-experiment"),
        "诊断输出应当列出可用路径: {}",
        output
    );
}

#[test]
fn test_known_url_resolves_to_module() {
    let registry = SubmoduleRegistry::new();
    registry
        .register(ExampleExperiment::definition())
        .expect("注册失败");

    let definition = resolve_module_url(&registry, "/example-experiment");
    assert_eq!(definition.submodule_id, "example-experiment");

    // 带查询串和末尾斜杠也应命中
    let definition = resolve_module_url(&registry, "https://host.cn/example-experiment/?x=1");
    assert_eq!(definition.submodule_id, "example-experiment");
}
