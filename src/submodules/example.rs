//! 示例子模块
//!
//! 子模块包装器的参考实现：页码映射、导航模式、默认计时器、无头渲染。

use std::sync::Arc;

use futures::FutureExt;

use crate::error::AppError;
use crate::models::page::{NavigationMode, PageId, PageMap};
use crate::registry::{
    Submodule, SubmoduleDefinition, SubmoduleLoader, SubmoduleProps, TimerDefaults,
};

/// 示例实验子模块
pub struct ExampleExperiment {
    pages: PageMap,
}

impl ExampleExperiment {
    pub fn new() -> Self {
        Self {
            pages: PageMap::new(
                vec![
                    (1, PageId::Intro),
                    (2, PageId::Experiment(1)),
                    (3, PageId::Experiment(2)),
                    (4, PageId::Summary),
                ],
                PageId::Notice,
            ),
        }
    }

    pub fn definition() -> SubmoduleDefinition {
        SubmoduleDefinition {
            submodule_id: "example-experiment".to_string(),
            display_name: "示例实验".to_string(),
            version: "1.0.0".to_string(),
            component: Arc::new(Self::new()),
        }
    }
}

impl Default for ExampleExperiment {
    fn default() -> Self {
        Self::new()
    }
}

impl Submodule for ExampleExperiment {
    fn initial_page(&self, sub_page_num: &str) -> PageId {
        self.pages.page_for(Some(sub_page_num))
    }

    fn total_steps(&self) -> u32 {
        self.pages.total()
    }

    fn navigation_mode(&self, page: &PageId) -> NavigationMode {
        match page {
            PageId::Notice | PageId::Summary => NavigationMode::Hidden,
            _ => NavigationMode::Experiment,
        }
    }

    fn default_timers(&self) -> TimerDefaults {
        TimerDefaults {
            task: Some(2400),
            questionnaire: None,
        }
    }

    fn resolve_page_num(&self, page: &PageId) -> Option<String> {
        self.pages.num_for(page).map(|n| n.to_string())
    }

    fn render(&self, props: &SubmoduleProps) -> String {
        format!(
            "[示例实验] 页面 {} | 考号 {} | 任务计时 {:?}s",
            props.initial_page,
            props.user.exam_no,
            props.timers.task
        )
    }
}

/// 示例问卷子模块
pub struct ExampleQuestionnaire {
    pages: PageMap,
}

impl ExampleQuestionnaire {
    pub fn new() -> Self {
        Self {
            pages: PageMap::new(
                vec![
                    (1, PageId::Intro),
                    (2, PageId::Questionnaire(1)),
                    (3, PageId::Questionnaire(2)),
                    (4, PageId::Questionnaire(3)),
                ],
                PageId::Intro,
            ),
        }
    }

    pub fn definition() -> SubmoduleDefinition {
        SubmoduleDefinition {
            submodule_id: "example-questionnaire".to_string(),
            display_name: "示例问卷".to_string(),
            version: "1.0.0".to_string(),
            component: Arc::new(Self::new()),
        }
    }
}

impl Default for ExampleQuestionnaire {
    fn default() -> Self {
        Self::new()
    }
}

impl Submodule for ExampleQuestionnaire {
    fn initial_page(&self, sub_page_num: &str) -> PageId {
        self.pages.page_for(Some(sub_page_num))
    }

    fn total_steps(&self) -> u32 {
        self.pages.total()
    }

    fn navigation_mode(&self, page: &PageId) -> NavigationMode {
        match page {
            PageId::Intro => NavigationMode::Hidden,
            _ => NavigationMode::Questionnaire,
        }
    }

    fn default_timers(&self) -> TimerDefaults {
        TimerDefaults {
            task: None,
            questionnaire: Some(600),
        }
    }

    fn resolve_page_num(&self, page: &PageId) -> Option<String> {
        self.pages.num_for(page).map(|n| n.to_string())
    }

    fn render(&self, props: &SubmoduleProps) -> String {
        format!(
            "[示例问卷] 页面 {} | 考号 {} | 问卷计时 {:?}s",
            props.initial_page,
            props.user.exam_no,
            props.timers.questionnaire
        )
    }
}

/// 内置子模块装载器（注册表 initialize 时执行）
pub fn builtin_loader() -> SubmoduleLoader {
    Box::new(|| {
        async {
            Ok::<_, AppError>(vec![
                ExampleExperiment::definition(),
                ExampleQuestionnaire::definition(),
            ])
        }
        .boxed()
    })
}
