//! Flow 编排器
//!
//! 负责加载 Flow 定义、解析与归一化进度、驱动步骤转移并持久化。
//!
//! 状态机：Idle → Loading → Active(stepIndex) → [过渡页] → Active(stepIndex+1)
//! → ... → Completed。Completed 是终态，没有自动回退。
//!
//! 持久化的进度记录是刷新 / 断网恢复的唯一事实来源；
//! `go_to` 本身不持久化（越界调用是返回失败的 no-op，不钳位、不 panic），
//! 每次被接受的转移由调用方触发持久化。

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::flow::mock_definitions;
use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::endpoints;
use crate::infrastructure::storage::{flow_key, KvStore};
use crate::models::flow::{FlowDefinition, FlowProgress, FlowStep};
use crate::models::page::{parse_composite_page_num, PageId};
use crate::registry::{SubmoduleDefinition, SubmoduleRegistry};

/// 进度解析结果：当前步骤与子模块定位
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub step_index: usize,
    pub step: Option<FlowStep>,
    pub submodule_id: Option<String>,
    pub module_page_num: Option<String>,
    pub initial_page: Option<PageId>,
    pub submodule: Option<SubmoduleDefinition>,
}

/// Flow 编排器
pub struct FlowOrchestrator {
    flow_id: String,
    store: Arc<dyn KvStore>,
    client: Option<Arc<ApiClient>>,
    definition: Option<FlowDefinition>,
    progress: Option<FlowProgress>,
    has_loaded: bool,
    disposed: bool,
}

impl FlowOrchestrator {
    pub fn new(flow_id: impl Into<String>, store: Arc<dyn KvStore>, client: Option<Arc<ApiClient>>) -> Self {
        Self {
            flow_id: flow_id.into(),
            store,
            client,
            definition: None,
            progress: None,
            has_loaded: false,
            disposed: false,
        }
    }

    /// 加载 Flow 定义和进度
    ///
    /// 优先远端，失败回退本地缓存，最后回退 Mock 表；
    /// 进度归一化后立即持久化。重复调用复用内存数据。
    pub async fn load(&mut self) -> Result<(FlowDefinition, FlowProgress)> {
        self.ensure_active()?;

        if self.has_loaded {
            if let (Some(definition), Some(progress)) = (&self.definition, &self.progress) {
                info!("复用内存中的 Flow 数据: {}", self.flow_id);
                return Ok((definition.clone(), progress.clone()));
            }
        }

        info!("开始加载 Flow 数据: {}", self.flow_id);

        let mut definition = self
            .definition
            .clone()
            .or_else(|| self.load_definition_from_cache());
        let mut progress = self
            .progress
            .clone()
            .or_else(|| self.load_progress_from_cache());

        if let Some(client) = self.client.clone() {
            match self.fetch_definition_bundle(&client).await {
                Ok((remote_definition, remote_progress)) => {
                    self.save_definition_to_cache(&remote_definition);
                    definition = Some(remote_definition);
                    if remote_progress.is_some() {
                        progress = remote_progress;
                    }
                }
                Err(e) => {
                    warn!("⚠️ 后端加载 Flow 定义失败，回退本地缓存: {}", e);
                }
            }

            if progress.is_none() {
                match self.fetch_remote_progress(&client).await {
                    Ok(remote) => progress = remote,
                    Err(e) => warn!("⚠️ 后端加载进度失败: {}", e),
                }
            }
        }

        let definition = definition
            .or_else(|| mock_definitions::get(&self.flow_id))
            .ok_or_else(|| {
                AppError::configuration(format!("未找到 Flow 定义: {}", self.flow_id))
            })?;

        if definition.steps.is_empty() {
            return Err(AppError::configuration("Flow 定义缺少步骤"));
        }

        let progress = normalize_progress(progress, &definition);

        self.definition = Some(definition.clone());
        self.progress = Some(progress.clone());
        self.has_loaded = true;
        self.persist_progress();

        info!(
            "✓ Flow 已加载: {} (stepIndex={}, modulePageNum={:?})",
            self.flow_id, progress.step_index, progress.module_page_num
        );

        Ok((definition, progress))
    }

    /// 解析进度，定位当前步骤和子模块
    pub fn resolve(&self, registry: &SubmoduleRegistry) -> Result<ResolvedStep> {
        self.ensure_active()?;

        let definition = self
            .definition
            .as_ref()
            .ok_or_else(|| AppError::configuration("Flow 尚未加载，无法解析"))?;
        let progress = self
            .progress
            .as_ref()
            .ok_or_else(|| AppError::configuration("Flow 进度缺失，无法解析"))?;

        let total_steps = definition.steps.len();
        let step_index = progress.step_index.min(total_steps.saturating_sub(1));

        let step = definition.steps.get(step_index).cloned();
        let submodule_id = step.as_ref().map(|s| s.submodule_id.clone());
        let submodule = submodule_id.as_deref().and_then(|id| registry.get(id));

        if submodule.is_none() {
            error!(
                "❌ 子模块定义未找到: {:?} (stepIndex={})",
                submodule_id, step_index
            );
        }

        let module_page_num = progress
            .module_page_num
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let initial_page = submodule.as_ref().map(|definition| {
            definition
                .component
                .initial_page(module_page_num.as_deref().unwrap_or("1"))
        });

        Ok(ResolvedStep {
            step_index,
            step,
            submodule_id,
            module_page_num,
            initial_page,
            submodule,
        })
    }

    /// 跳转到指定步骤（内存态转移，不持久化）
    ///
    /// 仅当 `0 <= index < steps.len()` 时成功；越界是返回 false 的
    /// no-op——不钳位、不 panic，歧义交还调用方处理。
    pub fn go_to(&mut self, index: usize) -> bool {
        if self.disposed {
            warn!("⚠️ 编排器已销毁，忽略跳转");
            return false;
        }
        let Some(definition) = &self.definition else {
            warn!("⚠️ Flow 未加载，无法跳转");
            return false;
        };
        if index >= definition.steps.len() {
            warn!(
                "⚠️ 跳转目标越界: {} (共 {} 步)",
                index,
                definition.steps.len()
            );
            return false;
        }

        let progress = self.progress.get_or_insert_with(FlowProgress::default);
        progress.step_index = index;
        progress.module_page_num = None;
        progress.last_updated = Some(chrono::Local::now().to_rfc3339());
        true
    }

    /// 进入下一步（`go_to(current + 1)` 的语法糖）
    pub fn next(&mut self) -> bool {
        let current = self.progress.as_ref().map(|p| p.step_index).unwrap_or(0);
        self.go_to(current + 1)
    }

    /// 回到上一步
    pub fn prev(&mut self) -> bool {
        let current = self.progress.as_ref().map(|p| p.step_index).unwrap_or(0);
        if current == 0 {
            warn!("⚠️ 已是第一步，无法回退");
            return false;
        }
        self.go_to(current - 1)
    }

    /// 推进到下一步并持久化；已是最后一步时标记整个 Flow 完成
    ///
    /// 返回 false 表示 Flow 已进入 Completed 终态。
    pub fn advance(&mut self) -> bool {
        let Some(definition) = &self.definition else {
            warn!("⚠️ Flow 未加载，无法推进");
            return false;
        };
        let current = self.progress.as_ref().map(|p| p.step_index).unwrap_or(0);
        let next_index = current + 1;

        if next_index >= definition.steps.len() {
            info!("🏁 Flow 已到最后一步，标记完成");
            self.mark_completed();
            return false;
        }

        self.update_progress(next_index, None);
        true
    }

    /// 更新进度并持久化
    pub fn update_progress(&mut self, step_index: usize, module_page_num: Option<String>) {
        if self.disposed {
            warn!("⚠️ 编排器已销毁，忽略进度更新");
            return;
        }
        let progress = self.progress.get_or_insert_with(FlowProgress::default);
        progress.step_index = step_index;
        progress.module_page_num = module_page_num;
        progress.last_updated = Some(chrono::Local::now().to_rfc3339());
        self.persist_progress();
    }

    /// 仅更新子模块内页码并持久化
    pub fn set_module_page_num(&mut self, module_page_num: Option<String>) {
        let step_index = self.progress.as_ref().map(|p| p.step_index).unwrap_or(0);
        self.update_progress(step_index, module_page_num);
    }

    /// 标记某一步骤已完成
    pub fn mark_step_completed(&mut self, step_index: usize) {
        let progress = self.progress.get_or_insert_with(FlowProgress::default);
        progress.step_completed.insert(step_index, true);
        self.persist_progress();
    }

    /// 标记整个 Flow 已完成（终态）
    pub fn mark_completed(&mut self) {
        if let Err(e) = self.store.set(&self.cache_key("completed"), "true") {
            warn!("⚠️ 完成标志写入失败: {}", e);
        }
        if let Some(progress) = &mut self.progress {
            progress.completed = true;
        }
        self.persist_progress();
    }

    /// 是否已完成
    pub fn is_completed(&self) -> bool {
        self.store.get(&self.cache_key("completed")).as_deref() == Some("true")
    }

    /// 清理本地缓存
    pub fn clear_cache(&self) {
        for key in ["definition", "stepIndex", "modulePageNum", "completed"] {
            if let Err(e) = self.store.remove(&self.cache_key(key)) {
                warn!("⚠️ 清理缓存键 {} 失败: {}", key, e);
            }
        }
        info!("缓存已清理: {}", self.flow_id);
    }

    /// 销毁实例（幂等）
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.definition = None;
        self.progress = None;
        self.has_loaded = false;
        info!("编排器实例已销毁: {}", self.flow_id);
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn definition(&self) -> Option<&FlowDefinition> {
        self.definition.as_ref()
    }

    pub fn progress(&self) -> Option<&FlowProgress> {
        self.progress.as_ref()
    }

    /// 持久化进度到本地缓存（失败告警但不阻断导航）
    fn persist_progress(&self) {
        let Some(progress) = &self.progress else {
            return;
        };
        if let Err(e) = self.store.set(
            &self.cache_key("stepIndex"),
            &progress.step_index.to_string(),
        ) {
            warn!("⚠️ 进度持久化失败: {}", e);
            return;
        }
        let page_key = self.cache_key("modulePageNum");
        let result = match &progress.module_page_num {
            Some(page_num) => self.store.set(&page_key, page_num),
            None => self.store.remove(&page_key),
        };
        if let Err(e) = result {
            warn!("⚠️ 进度持久化失败: {}", e);
        }
    }

    async fn fetch_definition_bundle(
        &self,
        client: &ApiClient,
    ) -> Result<(FlowDefinition, Option<FlowProgress>)> {
        let path = endpoints::flow_definition(&self.flow_id);
        let response = client.get(&path).await?;
        if !response.is_ok() {
            return Err(AppError::transient(
                &path,
                response
                    .message
                    .unwrap_or_else(|| format!("业务码 {}", response.code)),
            ));
        }

        let payload = response
            .obj
            .ok_or_else(|| AppError::transient(&path, "响应缺少数据"))?;

        // 载荷可能是 { definition, progress } 也可能直接是 definition
        if payload.get("definition").is_some() {
            let definition: FlowDefinition =
                serde_json::from_value(payload["definition"].clone())?;
            let progress = match payload.get("progress") {
                Some(value) if !value.is_null() => Some(serde_json::from_value(value.clone())?),
                _ => None,
            };
            Ok((definition, progress))
        } else {
            Ok((serde_json::from_value(payload)?, None))
        }
    }

    async fn fetch_remote_progress(&self, client: &ApiClient) -> Result<Option<FlowProgress>> {
        let path = endpoints::flow_progress(&self.flow_id);
        let response = client.get(&path).await?;
        if !response.is_ok() {
            return Ok(None);
        }
        let Some(payload) = response.obj else {
            return Ok(None);
        };
        if payload.is_null() {
            return Ok(None);
        }
        if let Some(progress) = payload.get("progress") {
            if progress.is_null() {
                return Ok(None);
            }
            return Ok(Some(serde_json::from_value(progress.clone())?));
        }
        Ok(Some(serde_json::from_value(payload)?))
    }

    fn load_definition_from_cache(&self) -> Option<FlowDefinition> {
        let raw = self.store.get(&self.cache_key("definition"))?;
        match serde_json::from_str(&raw) {
            Ok(definition) => Some(definition),
            Err(e) => {
                warn!("⚠️ 缓存的 Flow 定义解析失败: {}", e);
                None
            }
        }
    }

    fn save_definition_to_cache(&self, definition: &FlowDefinition) {
        match serde_json::to_string(definition) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&self.cache_key("definition"), &raw) {
                    warn!("⚠️ Flow 定义缓存失败: {}", e);
                }
            }
            Err(e) => warn!("⚠️ Flow 定义序列化失败: {}", e),
        }
    }

    fn load_progress_from_cache(&self) -> Option<FlowProgress> {
        let step_raw = self.store.get(&self.cache_key("stepIndex"));
        let page_raw = self.store.get(&self.cache_key("modulePageNum"));
        if step_raw.is_none() && page_raw.is_none() {
            return None;
        }

        let step_index = step_raw.and_then(|raw| raw.parse().ok()).unwrap_or(0);
        let module_page_num = page_raw
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());

        Some(FlowProgress {
            step_index,
            module_page_num,
            ..Default::default()
        })
    }

    fn cache_key(&self, key: &str) -> String {
        flow_key(&self.flow_id, key)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.disposed {
            return Err(AppError::configuration("编排器实例已被销毁"));
        }
        Ok(())
    }
}

/// 归一化进度：复合页码重定位 + 边界钳位（仅加载时）
fn normalize_progress(progress: Option<FlowProgress>, definition: &FlowDefinition) -> FlowProgress {
    let mut normalized = progress.unwrap_or_default();

    let mut module_page_num = normalized
        .module_page_num
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    // 历史数据可能把复合页码存进 modulePageNum，按其内容重定位
    if let Some(raw) = &module_page_num {
        if let Some(composite) = parse_composite_page_num(raw) {
            normalized.step_index = composite.step_index;
            module_page_num = Some(composite.sub_page_num.to_string());
        }
    }

    let max_step_index = definition.steps.len().saturating_sub(1);
    if normalized.step_index > max_step_index {
        normalized.step_index = max_step_index;
    }

    normalized.module_page_num = module_page_num;
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::MemoryStore;

    fn definition_with_steps(count: usize) -> FlowDefinition {
        FlowDefinition {
            flow_id: "f1".to_string(),
            name: "测试".to_string(),
            url: "/flow/f1".to_string(),
            description: None,
            status: None,
            version: None,
            steps: (0..count)
                .map(|i| FlowStep {
                    submodule_id: format!("sub-{}", i),
                    display_name: None,
                    overrides: None,
                    transition_page: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_normalize_relocates_composite_page_num() {
        let progress = FlowProgress {
            step_index: 0,
            module_page_num: Some("M1:5".to_string()),
            ..Default::default()
        };
        let normalized = normalize_progress(Some(progress), &definition_with_steps(3));
        assert_eq!(normalized.step_index, 1);
        assert_eq!(normalized.module_page_num.as_deref(), Some("5"));
    }

    #[test]
    fn test_normalize_clamps_step_index() {
        let progress = FlowProgress {
            step_index: 9,
            module_page_num: None,
            ..Default::default()
        };
        let normalized = normalize_progress(Some(progress), &definition_with_steps(2));
        assert_eq!(normalized.step_index, 1);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mut orchestrator = FlowOrchestrator::new("f1", store, None);
        orchestrator.dispose();
        orchestrator.dispose();
        assert!(orchestrator.ensure_active().is_err());
    }
}
