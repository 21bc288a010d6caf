//! 模块路由解析（经典非 Flow 模块）
//!
//! URL → 子模块定义。未知 URL 降级为占位模块：
//! `initial_page` 返回固定页面、组件渲染可用路径清单。
//! 路由层因此永远能产出可渲染的模块，代价是降级的用户体验
//! （这是约定的非崩溃失败模式）。

use std::sync::Arc;

use tracing::warn;

use crate::models::page::{NavigationMode, PageId};
use crate::registry::{Submodule, SubmoduleDefinition, SubmoduleProps, SubmoduleRegistry};

/// 静态路由表：URL 路径 → 子模块 ID
static MODULE_ROUTES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "/example-experiment" => "example-experiment",
    "/example-questionnaire" => "example-questionnaire",
};

/// 将 URL 解析为子模块定义
///
/// 解析顺序：静态路由表 → 直接按路径段匹配子模块 ID → 占位模块兜底。
pub fn resolve_module_url(registry: &SubmoduleRegistry, url: &str) -> SubmoduleDefinition {
    let path = normalize_path(url);

    let submodule_id = MODULE_ROUTES
        .get(path.as_str())
        .copied()
        .unwrap_or_else(|| path.trim_start_matches('/'));

    if let Some(definition) = registry.get(submodule_id) {
        return definition;
    }

    warn!("⚠️ 未找到 URL \"{}\" 对应的模块，降级为占位模块", url);
    not_found_module(registry)
}

/// 构造占位模块定义
pub fn not_found_module(registry: &SubmoduleRegistry) -> SubmoduleDefinition {
    let mut known_urls: Vec<String> = MODULE_ROUTES.keys().map(|k| k.to_string()).collect();
    known_urls.extend(registry.all_ids().into_iter().map(|id| format!("/{}", id)));
    known_urls.sort();
    known_urls.dedup();

    SubmoduleDefinition {
        submodule_id: "not-found".to_string(),
        display_name: "模块未找到".to_string(),
        version: "0.0.0".to_string(),
        component: Arc::new(NotFoundModule { known_urls }),
    }
}

/// 截取 URL 的路径部分并归一化
fn normalize_path(url: &str) -> String {
    let without_scheme = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => url.trim_start_matches('/'),
    };
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .trim_end_matches('/');
    format!("/{}", path)
}

/// 占位模块：渲染诊断信息，永不失败
struct NotFoundModule {
    known_urls: Vec<String>,
}

impl Submodule for NotFoundModule {
    fn initial_page(&self, _sub_page_num: &str) -> PageId {
        PageId::Notice
    }

    fn total_steps(&self) -> u32 {
        1
    }

    fn navigation_mode(&self, _page: &PageId) -> NavigationMode {
        NavigationMode::Hidden
    }

    fn render(&self, _props: &SubmoduleProps) -> String {
        let mut lines = vec!["⚠️ 模块未找到".to_string(), "可用模块路径:".to_string()];
        for url in &self.known_urls {
            lines.push(format!("  - {}", url));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/example-experiment/"), "/example-experiment");
        assert_eq!(
            normalize_path("https://host.cn/example-experiment?x=1#top"),
            "/example-experiment"
        );
        assert_eq!(normalize_path("example-experiment"), "/example-experiment");
    }
}
