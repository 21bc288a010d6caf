//! 子模块注册表
//!
//! 提供 submoduleId → SubmoduleDefinition 的映射。
//!
//! 注册表是显式构造、按依赖注入传递的对象（不是进程级单例），
//! 测试可以各自持有隔离实例。

pub mod routes;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::flow::context::{FlowContextSnapshot, UserSnapshot};
use crate::models::flow::TimerOverrides;
use crate::models::page::{NavigationMode, PageId};

/// 子模块默认计时器配置（秒）
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerDefaults {
    pub task: Option<u64>,
    pub questionnaire: Option<u64>,
}

/// 子模块组件挂载参数
#[derive(Debug, Clone)]
pub struct SubmoduleProps {
    /// 初始页面 ID
    pub initial_page: PageId,
    /// 用户上下文快照
    pub user: UserSnapshot,
    /// 步骤级计时器覆盖（来自 FlowStep.overrides）
    pub timers: TimerOverrides,
    /// Flow 上下文（仅 Flow 模式下存在）
    pub flow: Option<FlowContextSnapshot>,
}

/// 子模块接口（CMI - Composable Module Interface）
///
/// 所有子模块包装器必须实现此接口。核心只调用接口，
/// 页面内容与领域逻辑由外部协作方提供。
pub trait Submodule: Send + Sync {
    /// 根据子页码获取初始页面 ID
    fn initial_page(&self, sub_page_num: &str) -> PageId;

    /// 获取总步数
    fn total_steps(&self) -> u32;

    /// 获取导航模式
    fn navigation_mode(&self, page: &PageId) -> NavigationMode;

    /// 获取默认计时器配置
    fn default_timers(&self) -> TimerDefaults {
        TimerDefaults::default()
    }

    /// 将页面 ID 解析为子模块内部页码
    fn resolve_page_num(&self, _page: &PageId) -> Option<String> {
        None
    }

    /// 初始化钩子
    fn on_initialize(&self) {}

    /// 销毁钩子
    fn on_destroy(&self) {}

    /// 子模块主组件入口（无头渲染，返回展示文本）
    fn render(&self, props: &SubmoduleProps) -> String;
}

/// 子模块定义
#[derive(Clone)]
pub struct SubmoduleDefinition {
    /// 子模块唯一标识 (kebab-case)
    pub submodule_id: String,
    /// 显示名称
    pub display_name: String,
    /// 版本号
    pub version: String,
    /// 子模块主组件
    pub component: Arc<dyn Submodule>,
}

impl std::fmt::Debug for SubmoduleDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmoduleDefinition")
            .field("submodule_id", &self.submodule_id)
            .field("display_name", &self.display_name)
            .field("version", &self.version)
            .finish()
    }
}

/// 子模块装载器（initialize 时执行一次）
pub type SubmoduleLoader =
    Box<dyn Fn() -> BoxFuture<'static, Result<Vec<SubmoduleDefinition>>> + Send + Sync>;

/// 子模块注册表
pub struct SubmoduleRegistry {
    registry: RwLock<HashMap<String, SubmoduleDefinition>>,
    loaders: Mutex<Vec<SubmoduleLoader>>,
    init_lock: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
}

impl Default for SubmoduleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmoduleRegistry {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            loaders: Mutex::new(Vec::new()),
            init_lock: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    /// 注册装载器，待 `initialize` 统一执行
    pub fn register_loader(&self, loader: SubmoduleLoader) {
        self.loaders.lock().expect("注册表锁中毒").push(loader);
    }

    /// 初始化注册表（执行全部装载器）
    ///
    /// 幂等：首次调用异步执行装载，成功后置位标志；
    /// 再次调用直接返回。装载失败向上传播且不置位，允许重试。
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            debug!("注册表已初始化，跳过");
            return Ok(());
        }

        info!("🚀 初始化子模块注册表...");

        let loaders = std::mem::take(&mut *self.loaders.lock().expect("注册表锁中毒"));
        let mut definitions = Vec::new();
        let mut failure = None;
        for loader in &loaders {
            match loader().await {
                Ok(mut defs) => definitions.append(&mut defs),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        // 装载器放回，失败后允许重试
        *self.loaders.lock().expect("注册表锁中毒") = loaders;

        if let Some(e) = failure {
            error!("❌ 子模块注册表初始化失败: {}", e);
            return Err(e);
        }

        for definition in definitions {
            self.register(definition)?;
        }

        self.initialized.store(true, Ordering::Release);
        info!(
            "✅ 子模块注册表初始化完成，共 {} 个子模块",
            self.registry.read().expect("注册表锁中毒").len()
        );
        info!("📋 已注册子模块: {:?}", self.all_ids());
        Ok(())
    }

    /// 注册表是否已完成初始化
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// 注册子模块
    ///
    /// 身份字段校验失败快速失败；重复 ID 告警后静默覆盖
    /// （支持热更新 / 测试场景）。
    pub fn register(&self, definition: SubmoduleDefinition) -> Result<()> {
        validate_definition(&definition)?;

        let mut registry = self.registry.write().expect("注册表锁中毒");
        if registry.contains_key(&definition.submodule_id) {
            warn!(
                "⚠️ 子模块 \"{}\" 已注册，覆盖旧定义",
                definition.submodule_id
            );
        }
        info!("✅ 注册子模块: {}", definition.submodule_id);
        registry.insert(definition.submodule_id.clone(), definition);
        Ok(())
    }

    /// 获取子模块定义（未注册返回 None，永不报错）
    pub fn get(&self, submodule_id: &str) -> Option<SubmoduleDefinition> {
        self.registry
            .read()
            .expect("注册表锁中毒")
            .get(submodule_id)
            .cloned()
    }

    /// 检查子模块是否已注册
    pub fn has(&self, submodule_id: &str) -> bool {
        self.registry
            .read()
            .expect("注册表锁中毒")
            .contains_key(submodule_id)
    }

    /// 获取所有已注册的子模块 ID
    pub fn all_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registry
            .read()
            .expect("注册表锁中毒")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// 获取所有子模块定义
    pub fn all(&self) -> Vec<SubmoduleDefinition> {
        self.registry
            .read()
            .expect("注册表锁中毒")
            .values()
            .cloned()
            .collect()
    }
}

fn validate_definition(definition: &SubmoduleDefinition) -> Result<()> {
    let id = &definition.submodule_id;
    if id.is_empty() {
        return Err(AppError::configuration("子模块缺少必需字段: submoduleId"));
    }
    let kebab_case = id
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !id.starts_with('-')
        && !id.ends_with('-');
    if !kebab_case {
        return Err(AppError::configuration(format!(
            "子模块 ID \"{}\" 必须为 kebab-case",
            id
        )));
    }
    if definition.display_name.trim().is_empty() {
        return Err(AppError::configuration(format!(
            "子模块 \"{}\" 缺少必需字段: displayName",
            id
        )));
    }
    if definition.version.trim().is_empty() {
        return Err(AppError::configuration(format!(
            "子模块 \"{}\" 缺少必需字段: version",
            id
        )));
    }
    Ok(())
}
