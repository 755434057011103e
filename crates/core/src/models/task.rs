use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 定时导入任务定义
///
/// 表示一个周期性执行的导入任务，调度器为每个启用的任务维护一个定时器。
///
/// # 字段说明
///
/// - `id`: 任务的唯一标识符（不透明字符串）
/// - `name`: 任务名称，关联条目失效时也会被用来模糊匹配条目
/// - `task_type`: 任务类型，目前只有 `platform_import` 可执行
/// - `target_item_id`: 关联的媒体条目 ID
/// - `target_item_title` / `target_tmdb_id`: 条目标题与 TMDB ID 的冗余缓存，用于恢复关联
/// - `schedule`: 每日或每周（支持一周两天）的执行时间
/// - `action`: 导入参数（季数、冲突写入策略、功能开关、完结后自动删除）
/// - `next_run` / `last_run*`: 调度器维护的运行状态
///
/// # 使用示例
///
/// ```rust,ignore
/// use media_scheduler_core::models::{Task, TaskSchedule};
///
/// let task = Task::new("task-1", "某剧 自动导入", "item-1", TaskSchedule::daily(9, 0));
/// assert!(task.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub task_type: TaskType,
    pub target_item_id: String,
    #[serde(default)]
    pub target_item_title: Option<String>,
    #[serde(default)]
    pub target_tmdb_id: Option<String>,
    pub schedule: TaskSchedule,
    #[serde(default)]
    pub action: TaskAction,
    pub enabled: bool,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_status: Option<RunStatus>,
    #[serde(default)]
    pub last_run_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        target_item_id: impl Into<String>,
        schedule: TaskSchedule,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            task_type: TaskType::PlatformImport,
            target_item_id: target_item_id.into(),
            target_item_title: None,
            target_tmdb_id: None,
            schedule,
            action: TaskAction::default(),
            enabled: true,
            last_run: None,
            next_run: None,
            last_run_status: None,
            last_run_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 两个版本之间是否有影响定时器的字段变化
    pub fn schedule_changed(&self, other: &Task) -> bool {
        self.enabled != other.enabled || self.schedule != other.schedule
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    PlatformImport,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::PlatformImport => write!(f, "platform_import"),
            TaskType::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Daily,
    Weekly,
}

/// 执行时间配置
///
/// 星期使用周一为 0、周日为 6 的约定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSchedule {
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    pub hour: u32,
    pub minute: u32,
    #[serde(default)]
    pub day_of_week: Option<u32>,
    #[serde(default)]
    pub second_day_of_week: Option<u32>,
}

impl TaskSchedule {
    pub fn daily(hour: u32, minute: u32) -> Self {
        Self {
            kind: ScheduleKind::Daily,
            hour,
            minute,
            day_of_week: None,
            second_day_of_week: None,
        }
    }

    pub fn weekly(day_of_week: u32, hour: u32, minute: u32) -> Self {
        Self {
            kind: ScheduleKind::Weekly,
            hour,
            minute,
            day_of_week: Some(day_of_week),
            second_day_of_week: None,
        }
    }

    pub fn twice_weekly(first: u32, second: u32, hour: u32, minute: u32) -> Self {
        Self {
            second_day_of_week: Some(second),
            ..Self::weekly(first, hour, minute)
        }
    }
}

/// 导入时与已有记录冲突的写入策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    Overwrite,
    #[default]
    Skip,
    Cancel,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAction {
    pub season_number: u32,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default = "default_true")]
    pub enable_title_residue_check: bool,
    #[serde(default)]
    pub enable_special_episode_handling: bool,
    #[serde(default)]
    pub auto_delete_when_completed: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TaskAction {
    fn default() -> Self {
        Self {
            season_number: 1,
            conflict_policy: ConflictPolicy::default(),
            enable_title_residue_check: true,
            enable_special_episode_handling: false,
            auto_delete_when_completed: false,
        }
    }
}

/// 最近一次运行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    UserInterrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::UserInterrupted => "user_interrupted",
        }
    }
}
