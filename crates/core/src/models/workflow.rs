use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ConflictPolicy;

/// 导入工作流中的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Extract,
    PruneMarked,
    ResidueCheck,
    Import,
    AnalyzeRemaining,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::Extract => "extract",
            WorkflowStep::PruneMarked => "prune_marked",
            WorkflowStep::ResidueCheck => "residue_check",
            WorkflowStep::Import => "import",
            WorkflowStep::AnalyzeRemaining => "analyze_remaining",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStep::Extract => "平台数据提取",
            WorkflowStep::PruneMarked => "已标记剧集清理",
            WorkflowStep::ResidueCheck => "标题残留检查",
            WorkflowStep::Import => "数据导入",
            WorkflowStep::AnalyzeRemaining => "剩余剧集分析",
        };
        f.write_str(name)
    }
}

/// 步骤层返回的类型化错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// 步骤本身执行失败
    #[error("{0}")]
    Failed(String),
    /// 底层长时间操作被操作员取消
    #[error("被中断: {0}")]
    Interrupted(String),
}

impl StepError {
    pub fn failed<S: Into<String>>(msg: S) -> Self {
        Self::Failed(msg.into())
    }
}

pub type StepResult<T> = std::result::Result<T, StepError>;

/// 传递给清理与导入步骤的附加选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepOptions {
    pub special_episode_handling: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOutput {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneOutput {
    pub path: PathBuf,
    #[serde(default)]
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutput {
    #[serde(default)]
    pub imported: usize,
}

/// 导入请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub path: PathBuf,
    pub season: u32,
    pub conflict_policy: ConflictPolicy,
    pub options: StepOptions,
}

/// 一次完整工作流运行的结果汇总
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkflowReport {
    pub item_id: String,
    pub rows_pruned: usize,
    pub imported: usize,
    pub residue_detected: bool,
    pub marked_episodes: BTreeSet<u32>,
    pub item_completed: bool,
}
