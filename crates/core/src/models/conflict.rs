use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 与候选执行时间冲突的已登记任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub task_id: String,
    pub scheduled_at: DateTime<Utc>,
}

/// 冲突解决方案：平移执行时间，或者排队延后执行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ConflictResolution {
    Shift { new_time: DateTime<Utc> },
    Queue { position: u32 },
}
