//! 页面标识与复合页码
//!
//! 页面 ID 采用封闭的枚举变体（跨子模块通用处理由 `Custom` 兜底），
//! 只在序列化边界还原为自由字符串。
//!
//! 复合页码把 Flow 级位置和子模块内页码编为一个字符串：
//! - 标准格式 `M<stepIndex>:<subPageNum>`（如 "M1:5"）
//! - 兼容格式 `<stepIndex>.<subPageNum>`（如 "1.5"）

use std::fmt;

/// 导航显示模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    /// 实验类页面（显示任务计时）
    Experiment,
    /// 问卷类页面（显示问卷计时）
    Questionnaire,
    /// 不显示导航
    Hidden,
}

/// 页面标识
///
/// 各子模块的页面类型有限，用封闭枚举表达；
/// 子模块私有的特殊页面通过 `Custom` 保留原始字符串。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageId {
    /// 注意事项页（默认页）
    Notice,
    /// 引导页
    Intro,
    /// 实验页（带序号）
    Experiment(u32),
    /// 问卷页（带序号）
    Questionnaire(u32),
    /// 分析页（带序号）
    Analysis(u32),
    /// 过渡页
    Transition,
    /// 总结页
    Summary,
    /// 子模块私有页面
    Custom(String),
}

impl PageId {
    /// 从自由字符串解析页面 ID（序列化边界，永不失败）
    pub fn parse(raw: &str) -> PageId {
        if let Some(n) = raw.strip_prefix("experiment-").and_then(|s| s.parse().ok()) {
            return PageId::Experiment(n);
        }
        if let Some(n) = raw.strip_prefix("questionnaire-").and_then(|s| s.parse().ok()) {
            return PageId::Questionnaire(n);
        }
        if let Some(n) = raw.strip_prefix("analysis-").and_then(|s| s.parse().ok()) {
            return PageId::Analysis(n);
        }
        match raw {
            "notice" => PageId::Notice,
            "intro" => PageId::Intro,
            "transition" => PageId::Transition,
            "summary" => PageId::Summary,
            other => PageId::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageId::Notice => write!(f, "notice"),
            PageId::Intro => write!(f, "intro"),
            PageId::Experiment(n) => write!(f, "experiment-{}", n),
            PageId::Questionnaire(n) => write!(f, "questionnaire-{}", n),
            PageId::Analysis(n) => write!(f, "analysis-{}", n),
            PageId::Transition => write!(f, "transition"),
            PageId::Summary => write!(f, "summary"),
            PageId::Custom(raw) => write!(f, "{}", raw),
        }
    }
}

/// 复合页码解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositePageNum {
    /// Flow 步骤索引
    pub step_index: usize,
    /// 子模块内的页码
    pub sub_page_num: u32,
}

/// 解析复合页码
///
/// 支持 `M<stepIndex>:<subPageNum>` 与 `<stepIndex>.<subPageNum>` 两种格式，
/// 无法识别时返回 None。
pub fn parse_composite_page_num(page_num: &str) -> Option<CompositePageNum> {
    let page_num = page_num.trim();
    if page_num.is_empty() {
        return None;
    }

    let (step_raw, sub_raw) = if let Some(rest) = page_num.strip_prefix('M') {
        rest.split_once(':')?
    } else {
        page_num.split_once('.')?
    };

    if step_raw.is_empty() || sub_raw.is_empty() {
        return None;
    }
    if !step_raw.bytes().all(|b| b.is_ascii_digit()) || !sub_raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(CompositePageNum {
        step_index: step_raw.parse().ok()?,
        sub_page_num: sub_raw.parse().ok()?,
    })
}

/// 编码复合页码（标准 M 格式）
pub fn encode_composite_page_num(step_index: usize, sub_page_num: &str) -> String {
    format!("M{}:{}", step_index, sub_page_num)
}

/// 页码映射表
///
/// 子模块内 "页码 → 页面ID" 的映射，带默认页兜底：
/// 页码缺失 / 非法 / 越界时统一回落到默认页，保证任何输入都能产出可渲染页面。
#[derive(Debug, Clone)]
pub struct PageMap {
    entries: Vec<(u32, PageId)>,
    default_page: PageId,
}

impl PageMap {
    pub fn new(entries: Vec<(u32, PageId)>, default_page: PageId) -> Self {
        Self {
            entries,
            default_page,
        }
    }

    /// 从页码获取页面 ID（非法输入回落默认页）
    pub fn page_for(&self, page_num: Option<&str>) -> PageId {
        let Some(raw) = page_num else {
            return self.default_page.clone();
        };
        let Ok(num) = raw.trim().parse::<u32>() else {
            return self.default_page.clone();
        };
        self.entries
            .iter()
            .find(|(n, _)| *n == num)
            .map(|(_, page)| page.clone())
            .unwrap_or_else(|| self.default_page.clone())
    }

    /// 从页面 ID 反查页码
    pub fn num_for(&self, page: &PageId) -> Option<u32> {
        self.entries
            .iter()
            .find(|(_, p)| p == page)
            .map(|(n, _)| *n)
    }

    /// 总页数
    pub fn total(&self) -> u32 {
        self.entries.len() as u32
    }

    /// 默认页
    pub fn default_page(&self) -> &PageId {
        &self.default_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_round_trip() {
        let encoded = encode_composite_page_num(2, "5");
        assert_eq!(encoded, "M2:5");
        let parsed = parse_composite_page_num(&encoded).expect("应当解析成功");
        assert_eq!(parsed.step_index, 2);
        assert_eq!(parsed.sub_page_num.to_string(), "5");
    }

    #[test]
    fn test_composite_dot_format() {
        let parsed = parse_composite_page_num("1.10").expect("点分格式应当解析成功");
        assert_eq!(parsed.step_index, 1);
        assert_eq!(parsed.sub_page_num, 10);
    }

    #[test]
    fn test_composite_invalid() {
        assert!(parse_composite_page_num("invalid").is_none());
        assert!(parse_composite_page_num("M:5").is_none());
        assert!(parse_composite_page_num("M1:").is_none());
        assert!(parse_composite_page_num("M-1:5").is_none());
        assert!(parse_composite_page_num("").is_none());
    }

    #[test]
    fn test_page_id_round_trip() {
        for page in [
            PageId::Notice,
            PageId::Experiment(3),
            PageId::Questionnaire(1),
            PageId::Custom("pv-sim".to_string()),
        ] {
            assert_eq!(PageId::parse(&page.to_string()), page);
        }
    }

    #[test]
    fn test_page_map_fallback() {
        let map = PageMap::new(
            vec![(1, PageId::Intro), (2, PageId::Experiment(1))],
            PageId::Notice,
        );
        assert_eq!(map.page_for(Some("2")), PageId::Experiment(1));
        assert_eq!(map.page_for(Some("999")), PageId::Notice);
        assert_eq!(map.page_for(Some("abc")), PageId::Notice);
        assert_eq!(map.page_for(None), PageId::Notice);
        assert_eq!(map.num_for(&PageId::Experiment(1)), Some(2));
        assert_eq!(map.total(), 2);
    }
}
