//! 任务关联条目的解析与恢复
//!
//! 任务记录的 `target_item_id` 可能因为条目被删除重建而失效。解析按固定顺序
//! 尝试各个策略，第一个命中的结果生效：
//!
//! 1. 精确 ID
//! 2. TMDB ID
//! 3. 标题精确匹配（忽略大小写与首尾空白）
//! 4. 标题模糊匹配（编辑距离相似度或子串包含）
//! 5. 去掉通用后缀后的任务名模糊匹配
//! 6. 最近创建的条目（兜底，可关闭）

use tracing::{debug, warn};

use media_scheduler_core::{config::WorkflowConfig, MediaItem, Task};

/// 命中的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    ExactId,
    TmdbId,
    ExactTitle,
    FuzzyTitle,
    TaskName,
    MostRecent,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::ExactId => "exact_id",
            MatchStrategy::TmdbId => "tmdb_id",
            MatchStrategy::ExactTitle => "exact_title",
            MatchStrategy::FuzzyTitle => "fuzzy_title",
            MatchStrategy::TaskName => "task_name",
            MatchStrategy::MostRecent => "most_recent",
        }
    }

    /// 是否需要把新关联写回任务
    pub fn requires_heal(&self) -> bool {
        *self != MatchStrategy::ExactId
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemMatch {
    pub item: MediaItem,
    pub strategy: MatchStrategy,
}

/// 单个解析策略
pub trait ResolutionStrategy: Send + Sync {
    fn kind(&self) -> MatchStrategy;

    fn find<'a>(&self, task: &Task, items: &'a [MediaItem]) -> Option<&'a MediaItem>;
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// 字符级编辑距离
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// 标题相似度判断
#[derive(Debug, Clone, Copy)]
pub struct TitleMatcher {
    threshold: f64,
    max_length_delta: usize,
}

impl TitleMatcher {
    pub fn new(threshold: f64, max_length_delta: usize) -> Self {
        Self {
            threshold,
            max_length_delta,
        }
    }

    /// `1 - 编辑距离 / 较长字符串长度`
    pub fn similarity(a: &str, b: &str) -> f64 {
        let a: Vec<char> = normalize(a).chars().collect();
        let b: Vec<char> = normalize(b).chars().collect();
        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        1.0 - levenshtein(&a, &b) as f64 / longest as f64
    }

    /// 相似度达到阈值，或一方包含另一方且长度差不超过限制
    pub fn score(&self, a: &str, b: &str) -> Option<f64> {
        let left = normalize(a);
        let right = normalize(b);
        if left.is_empty() || right.is_empty() {
            return None;
        }
        let similarity = Self::similarity(&left, &right);
        if similarity >= self.threshold {
            return Some(similarity);
        }
        let delta = left.chars().count().abs_diff(right.chars().count());
        if delta <= self.max_length_delta && (left.contains(&right) || right.contains(&left)) {
            return Some(similarity);
        }
        None
    }

    fn best_match<'a>(&self, needle: &str, items: &'a [MediaItem]) -> Option<&'a MediaItem> {
        items
            .iter()
            .filter_map(|item| self.score(needle, &item.title).map(|score| (score, item)))
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, item)| item)
    }
}

pub struct ExactIdStrategy;

impl ResolutionStrategy for ExactIdStrategy {
    fn kind(&self) -> MatchStrategy {
        MatchStrategy::ExactId
    }

    fn find<'a>(&self, task: &Task, items: &'a [MediaItem]) -> Option<&'a MediaItem> {
        items.iter().find(|item| item.id == task.target_item_id)
    }
}

pub struct TmdbIdStrategy;

impl ResolutionStrategy for TmdbIdStrategy {
    fn kind(&self) -> MatchStrategy {
        MatchStrategy::TmdbId
    }

    fn find<'a>(&self, task: &Task, items: &'a [MediaItem]) -> Option<&'a MediaItem> {
        let tmdb_id = task.target_tmdb_id.as_deref()?.trim();
        if tmdb_id.is_empty() {
            return None;
        }
        items
            .iter()
            .find(|item| item.tmdb_id.as_deref().map(str::trim) == Some(tmdb_id))
    }
}

pub struct ExactTitleStrategy;

impl ResolutionStrategy for ExactTitleStrategy {
    fn kind(&self) -> MatchStrategy {
        MatchStrategy::ExactTitle
    }

    fn find<'a>(&self, task: &Task, items: &'a [MediaItem]) -> Option<&'a MediaItem> {
        let title = normalize(task.target_item_title.as_deref()?);
        if title.is_empty() {
            return None;
        }
        items.iter().find(|item| normalize(&item.title) == title)
    }
}

pub struct FuzzyTitleStrategy {
    matcher: TitleMatcher,
}

impl FuzzyTitleStrategy {
    pub fn new(matcher: TitleMatcher) -> Self {
        Self { matcher }
    }
}

impl ResolutionStrategy for FuzzyTitleStrategy {
    fn kind(&self) -> MatchStrategy {
        MatchStrategy::FuzzyTitle
    }

    fn find<'a>(&self, task: &Task, items: &'a [MediaItem]) -> Option<&'a MediaItem> {
        self.matcher
            .best_match(task.target_item_title.as_deref()?, items)
    }
}

pub struct TaskNameStrategy {
    matcher: TitleMatcher,
    suffixes: Vec<String>,
}

impl TaskNameStrategy {
    pub fn new(matcher: TitleMatcher, suffixes: Vec<String>) -> Self {
        Self { matcher, suffixes }
    }

    /// 去掉任务名末尾的通用后缀（如“自动导入”）
    pub fn strip_generic_suffix(&self, name: &str) -> String {
        let separators: &[char] = &[' ', '-', '_', '·', '|', '：', ':'];
        let mut stripped = name.trim().to_string();
        loop {
            let lower = stripped.to_lowercase();
            let suffix = self
                .suffixes
                .iter()
                .map(|s| s.to_lowercase())
                .find(|s| !s.is_empty() && lower.ends_with(s.as_str()));
            let Some(suffix) = suffix else {
                break;
            };
            let keep = lower.len() - suffix.len();
            // 小写化可能改变字节长度，此时不做剥离
            if !stripped.is_char_boundary(keep) || lower.len() != stripped.len() {
                break;
            }
            stripped.truncate(keep);
            stripped = stripped.trim_end_matches(separators).to_string();
        }
        stripped
    }
}

impl ResolutionStrategy for TaskNameStrategy {
    fn kind(&self) -> MatchStrategy {
        MatchStrategy::TaskName
    }

    fn find<'a>(&self, task: &Task, items: &'a [MediaItem]) -> Option<&'a MediaItem> {
        let name = self.strip_generic_suffix(&task.name);
        if name.is_empty() {
            return None;
        }
        self.matcher.best_match(&name, items)
    }
}

pub struct MostRecentStrategy;

impl ResolutionStrategy for MostRecentStrategy {
    fn kind(&self) -> MatchStrategy {
        MatchStrategy::MostRecent
    }

    fn find<'a>(&self, _task: &Task, items: &'a [MediaItem]) -> Option<&'a MediaItem> {
        items.iter().max_by_key(|item| item.created_at)
    }
}

/// 有序的解析策略链
pub struct ItemResolver {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl ItemResolver {
    pub fn new(strategies: Vec<Box<dyn ResolutionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        let matcher = TitleMatcher::new(
            config.fuzzy_similarity_threshold,
            config.containment_length_delta,
        );
        let mut strategies: Vec<Box<dyn ResolutionStrategy>> = vec![
            Box::new(ExactIdStrategy),
            Box::new(TmdbIdStrategy),
            Box::new(ExactTitleStrategy),
            Box::new(FuzzyTitleStrategy::new(matcher)),
            Box::new(TaskNameStrategy::new(
                matcher,
                config.generic_name_suffixes.clone(),
            )),
        ];
        if config.allow_most_recent_fallback {
            strategies.push(Box::new(MostRecentStrategy));
        }
        Self::new(strategies)
    }

    pub fn strategies(&self) -> Vec<MatchStrategy> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// 依次尝试全部策略
    pub fn resolve(&self, task: &Task, items: &[MediaItem]) -> Option<ItemMatch> {
        self.resolve_with(task, items, true)
    }

    /// 跳过兜底策略，用于后台关联校验
    pub fn resolve_without_fallback(&self, task: &Task, items: &[MediaItem]) -> Option<ItemMatch> {
        self.resolve_with(task, items, false)
    }

    fn resolve_with(&self, task: &Task, items: &[MediaItem], allow_fallback: bool) -> Option<ItemMatch> {
        for strategy in &self.strategies {
            let kind = strategy.kind();
            if kind == MatchStrategy::MostRecent && !allow_fallback {
                continue;
            }
            if let Some(item) = strategy.find(task, items) {
                if kind == MatchStrategy::MostRecent {
                    warn!(
                        "任务 {} 的条目 {} 无法匹配，回退到最近创建的条目 {}（{}），可能关联错误",
                        task.id, task.target_item_id, item.id, item.title
                    );
                } else if kind.requires_heal() {
                    debug!(
                        "任务 {} 通过 {} 匹配到条目 {}",
                        task.id,
                        kind.as_str(),
                        item.id
                    );
                }
                return Some(ItemMatch {
                    item: item.clone(),
                    strategy: kind,
                });
            }
        }
        None
    }
}
